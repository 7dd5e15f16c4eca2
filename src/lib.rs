//! Spaced repetition scheduling engine
//!
//! This crate provides:
//! - An SM-2 style scheduler with learning steps, lapses and leech handling
//! - Daily-capped study queues with configurable new-card ordering
//! - A study session driver with exact multi-step undo
//! - Pluggable card storage (in-memory and one-JSON-file-per-card)
//!
//! Scheduling itself is a pure function over a card, a grade, a deck
//! config and an injected clock; everything nondeterministic (time,
//! shuffle seed, storage) enters through the edges.

pub mod clock;
pub mod models;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use models::*;
pub use queue::{QueueEntry, QueueKind, SessionQueue};
pub use scheduler::{answer, format_due, preview_intervals, AnswerContext, PreviewDue};
pub use session::{SessionError, SessionStats, StudySession};
pub use storage::{CardStore, FileCardStore, MemoryCardStore, SharedCardStore, StorageError};
