//! Study queue assembly
//!
//! One queue is built per session: active cards are partitioned into the
//! new, learning-due and review-due pools, the daily caps (net of what was
//! already served today) are applied, each pool is ordered, and new cards
//! are interleaved into the due stream at a fixed cadence. The assembly
//! step is a pure function over an already-fetched card list so ordering
//! and cap behavior can be tested without a store.

use chrono::{DateTime, Utc};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::models::{Card, CardState, DeckConfig, DeckCounters, NewCardOrder};
use crate::storage::{CardStore, Result};

/// One new card is inserted after this many emitted due cards
const NEW_INTERLEAVE_CADENCE: usize = 5;

/// Pool a queue entry was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    New,
    Learning,
    Review,
}

/// A scheduled slot in the session queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub card_id: Uuid,
    pub kind: QueueKind,
}

/// Ordered queue for one session plus the serving cursor
///
/// Entries behind the cursor are kept so chained undo can walk back over
/// them; entries are only ever inserted at the cursor (learning re-entry)
/// or removed from the cursor onward (undo of a re-entry).
#[derive(Debug, Default)]
pub struct SessionQueue {
    entries: Vec<QueueEntry>,
    cursor: usize,
}

impl SessionQueue {
    pub fn new(entries: Vec<QueueEntry>) -> Self {
        Self { entries, cursor: 0 }
    }

    /// Entry at the cursor, if the queue is not exhausted
    pub fn current(&self) -> Option<QueueEntry> {
        self.entries.get(self.cursor).copied()
    }

    pub fn advance(&mut self) {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        }
    }

    pub fn step_back(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Insert an entry to be served next
    pub fn insert_at_cursor(&mut self, entry: QueueEntry) {
        self.entries.insert(self.cursor, entry);
    }

    /// Remove the first not-yet-served entry for `card_id`
    pub fn remove_upcoming(&mut self, card_id: Uuid) -> bool {
        match self.entries[self.cursor..]
            .iter()
            .position(|entry| entry.card_id == card_id)
        {
            Some(offset) => {
                self.entries.remove(self.cursor + offset);
                true
            }
            None => false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.entries.len()
    }

    /// Entries still ahead of the cursor
    pub fn remaining(&self) -> &[QueueEntry] {
        &self.entries[self.cursor..]
    }

    /// Number of entries already served and answered
    pub fn answered(&self) -> usize {
        self.cursor
    }
}

/// Build the queue for a deck by reading the store once
///
/// `counters` must already be rolled over to `today`; the caps applied are
/// the configured daily limits minus what the counters say was served.
pub fn build(
    store: &dyn CardStore,
    deck_id: Uuid,
    config: &DeckConfig,
    counters: &DeckCounters,
    now: DateTime<Utc>,
    today: i64,
    rng: &mut StdRng,
) -> Result<SessionQueue> {
    let cards = store.list_cards(deck_id)?;
    let entries = assemble(&cards, config, counters, now, today, rng);
    debug!(
        "queue for deck {}: {} entries ({} new, {} learning, {} review)",
        deck_id,
        entries.len(),
        entries.iter().filter(|e| e.kind == QueueKind::New).count(),
        entries
            .iter()
            .filter(|e| e.kind == QueueKind::Learning)
            .count(),
        entries
            .iter()
            .filter(|e| e.kind == QueueKind::Review)
            .count(),
    );
    Ok(SessionQueue::new(entries))
}

/// Partition, cap, order and interleave an already-fetched card list
pub fn assemble(
    cards: &[Card],
    config: &DeckConfig,
    counters: &DeckCounters,
    now: DateTime<Utc>,
    today: i64,
    rng: &mut StdRng,
) -> Vec<QueueEntry> {
    let mut new_pool: Vec<(u64, Uuid)> = Vec::new();
    let mut learning_due: Vec<(DateTime<Utc>, Uuid)> = Vec::new();
    let mut review_due: Vec<(i64, Uuid)> = Vec::new();

    for card in cards.iter().filter(|card| card.is_active()) {
        match card.state {
            CardState::New => new_pool.push((card.position, card.id)),
            CardState::Learning { due, .. } | CardState::Relearning { due, .. }
                if due <= now =>
            {
                learning_due.push((due, card.id));
            }
            CardState::Review { due_day } if due_day <= today => {
                review_due.push((due_day, card.id));
            }
            _ => {}
        }
    }

    // Stable order regardless of how the store iterates; the shuffle below
    // needs a deterministic starting arrangement to be reproducible.
    new_pool.sort_unstable();
    learning_due.sort_unstable();
    review_due.sort_unstable();

    if config.new_card_order == NewCardOrder::Random {
        new_pool.shuffle(rng);
    }

    let new_cap = config.new_per_day.saturating_sub(counters.new_today) as usize;
    let review_cap = config
        .reviews_per_day
        .saturating_sub(counters.reviews_today) as usize;
    new_pool.truncate(new_cap);
    review_due.truncate(review_cap);

    // Learning steps are short-lived and never capped; they head the due
    // stream so a step that came due is not stuck behind the day's reviews.
    let mut due_stream = learning_due
        .into_iter()
        .map(|(_, card_id)| QueueEntry {
            card_id,
            kind: QueueKind::Learning,
        })
        .chain(review_due.into_iter().map(|(_, card_id)| QueueEntry {
            card_id,
            kind: QueueKind::Review,
        }));
    let mut new_stream = new_pool.into_iter().map(|(_, card_id)| QueueEntry {
        card_id,
        kind: QueueKind::New,
    });

    let mut entries = Vec::new();
    let mut emitted_due = 0;
    for due_entry in due_stream.by_ref() {
        entries.push(due_entry);
        emitted_due += 1;
        if emitted_due % NEW_INTERLEAVE_CADENCE == 0 {
            if let Some(new_entry) = new_stream.next() {
                entries.push(new_entry);
            }
        }
    }
    entries.extend(new_stream);

    entries
}
