//! In-memory card store

use std::collections::HashMap;

use uuid::Uuid;

use super::{CardStore, Result, StorageError};
use crate::models::{Card, ReviewLogEntry};

/// Hash-map backed store, the reference implementation of [`CardStore`]
///
/// Nothing survives the process; useful for tests and for hosts that keep
/// their own persistence and only need the engine's bookkeeping.
#[derive(Debug, Default)]
pub struct MemoryCardStore {
    cards: HashMap<Uuid, Card>,
    logs: HashMap<Uuid, ReviewLogEntry>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_review_log(&self, id: Uuid) -> Option<&ReviewLogEntry> {
        self.logs.get(&id)
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }
}

impl CardStore for MemoryCardStore {
    fn list_cards(&self, deck_id: Uuid) -> Result<Vec<Card>> {
        let mut cards: Vec<Card> = self
            .cards
            .values()
            .filter(|card| card.deck_id == deck_id)
            .cloned()
            .collect();
        // Hash maps iterate in arbitrary order; hand out a stable one.
        cards.sort_by_key(|card| (card.position, card.id));
        Ok(cards)
    }

    fn get_card(&self, id: Uuid) -> Result<Option<Card>> {
        Ok(self.cards.get(&id).cloned())
    }

    fn put_card(&mut self, card: &Card) -> Result<()> {
        self.cards.insert(card.id, card.clone());
        Ok(())
    }

    fn append_review_log(&mut self, entry: &ReviewLogEntry) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.logs.insert(id, entry.clone());
        Ok(id)
    }

    fn delete_review_log(&mut self, id: Uuid) -> Result<()> {
        self.logs
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::LogEntryNotFound(id))
    }
}
