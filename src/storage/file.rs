//! File-backed card store
//!
//! Directory structure under the root:
//! ```text
//! {root}/
//! ├── cards/
//! │   └── {card-id}.json
//! └── review-log/
//!     └── {log-id}.json
//! ```
//!
//! One JSON document per record keeps every trait operation a single
//! write, which is what the session controller's undo bookkeeping
//! assumes.

use std::fs;
use std::path::PathBuf;

use log::warn;
use uuid::Uuid;

use super::{CardStore, Result, StorageError};
use crate::models::{Card, ReviewLogEntry};

/// JSON-on-disk implementation of [`CardStore`]
pub struct FileCardStore {
    root: PathBuf,
}

impl FileCardStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn new(root: PathBuf) -> Result<Self> {
        let store = Self { root };
        fs::create_dir_all(store.cards_dir())?;
        fs::create_dir_all(store.logs_dir())?;
        Ok(store)
    }

    fn cards_dir(&self) -> PathBuf {
        self.root.join("cards")
    }

    fn logs_dir(&self) -> PathBuf {
        self.root.join("review-log")
    }

    fn card_path(&self, id: Uuid) -> PathBuf {
        self.cards_dir().join(format!("{}.json", id))
    }

    fn log_path(&self, id: Uuid) -> PathBuf {
        self.logs_dir().join(format!("{}.json", id))
    }

    /// Read back a single log entry; mainly for hosts building statistics
    pub fn get_review_log(&self, id: Uuid) -> Result<Option<ReviewLogEntry>> {
        let path = self.log_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

impl CardStore for FileCardStore {
    fn list_cards(&self, deck_id: Uuid) -> Result<Vec<Card>> {
        let mut cards = Vec::new();
        for entry in fs::read_dir(self.cards_dir())? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<Card>(&content) {
                Ok(card) if card.deck_id == deck_id => cards.push(card),
                Ok(_) => {}
                Err(err) => {
                    // A single corrupt file should not take the deck down.
                    warn!("skipping unreadable card file {}: {}", path.display(), err);
                }
            }
        }
        cards.sort_by_key(|card| (card.position, card.id));
        Ok(cards)
    }

    fn get_card(&self, id: Uuid) -> Result<Option<Card>> {
        let path = self.card_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn put_card(&mut self, card: &Card) -> Result<()> {
        fs::write(self.card_path(card.id), serde_json::to_string_pretty(card)?)?;
        Ok(())
    }

    fn append_review_log(&mut self, entry: &ReviewLogEntry) -> Result<Uuid> {
        let id = Uuid::new_v4();
        fs::write(self.log_path(id), serde_json::to_string_pretty(entry)?)?;
        Ok(id)
    }

    fn delete_review_log(&mut self, id: Uuid) -> Result<()> {
        let path = self.log_path(id);
        if !path.exists() {
            return Err(StorageError::LogEntryNotFound(id));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}
