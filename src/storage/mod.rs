//! Card and review-log persistence boundary
//!
//! The engine treats storage as an injected collaborator: everything it
//! needs is the handful of operations on [`CardStore`]. Two backends ship
//! with the crate:
//! - [`MemoryCardStore`]: hash maps, for tests and ephemeral hosts
//! - [`FileCardStore`]: one JSON file per card and per log entry

use std::sync::{Arc, Mutex};

use thiserror::Error;
use uuid::Uuid;

use crate::models::{Card, ReviewLogEntry};

pub mod file;
pub mod memory;

pub use file::FileCardStore;
pub use memory::MemoryCardStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Review log entry not found: {0}")]
    LogEntryNotFound(Uuid),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable keyed storage for cards and review log entries
///
/// Each method commits its single write before returning; the session
/// controller relies on that to keep the undo stack aligned with what is
/// actually on disk. `put_card` is an upsert keyed by `card.id`.
/// `append_review_log` assigns and returns the entry's id, so the log
/// entry itself stays free of identity and the scheduler stays pure.
pub trait CardStore: Send {
    fn list_cards(&self, deck_id: Uuid) -> Result<Vec<Card>>;

    fn get_card(&self, id: Uuid) -> Result<Option<Card>>;

    fn put_card(&mut self, card: &Card) -> Result<()>;

    fn append_review_log(&mut self, entry: &ReviewLogEntry) -> Result<Uuid>;

    fn delete_review_log(&mut self, id: Uuid) -> Result<()>;
}

/// Shared handle to a store; one session locks it per operation
pub type SharedCardStore = Arc<Mutex<dyn CardStore>>;
