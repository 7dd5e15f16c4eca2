//! Study session and undo controller
//!
//! Drives one card at a time through the scheduler: serve the card at the
//! queue cursor, persist the answer and its log entry, push the pre-image
//! onto the undo stack, advance. Undo pops the stack and reverses the last
//! answer exactly, however many times the caller chains it.
//!
//! The queue is built once at session start. Learning cards answered
//! during the session re-enter through a pending list that is checked
//! against the clock on every `current()` call, so short steps surface
//! without re-running the capped review/new selection.

use std::sync::MutexGuard;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::models::{Card, CardState, ConfigError, DeckConfig, DeckCounters, Grade, LeechAction};
use crate::queue::{self, QueueEntry, QueueKind, SessionQueue};
use crate::scheduler::{self, AnswerContext, PreviewDue};
use crate::storage::{CardStore, SharedCardStore, StorageError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid deck config: {0}")]
    Config(#[from] ConfigError),

    #[error("card {0} is queued but missing from the store")]
    CardMissing(Uuid),

    #[error("card store lock poisoned: {0}")]
    StoreLock(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Pre-image of one answered card plus what undoing it has to reverse
struct UndoEntry {
    pre_image: Card,
    log_id: Uuid,
    /// Pool the served entry came from, for counter rollback
    counted: QueueKind,
    /// Whether the answer re-queued the card as a pending learning step
    requeued_learning: bool,
}

/// Live counts for the session, for progress display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub new_remaining: usize,
    pub learning_remaining: usize,
    pub review_remaining: usize,
    pub answered: usize,
    pub new_today: u32,
    pub reviews_today: u32,
}

/// One study pass over a deck
///
/// Owns the session queue, the pending learning steps, the undo stack and
/// the daily counters. The store is shared; the clock and the random seed
/// are injected so sessions replay deterministically under test.
pub struct StudySession<C: Clock = SystemClock> {
    store: SharedCardStore,
    clock: C,
    deck_id: Uuid,
    config: DeckConfig,
    queue: SessionQueue,
    /// Learning cards answered this session that are not due yet
    pending_learning: Vec<(DateTime<Utc>, Uuid)>,
    undo_stack: Vec<UndoEntry>,
    counters: DeckCounters,
}

impl<C: Clock> StudySession<C> {
    /// Start a session with fresh daily counters
    pub fn start(
        store: SharedCardStore,
        clock: C,
        deck_id: Uuid,
        config: DeckConfig,
    ) -> Result<Self> {
        Self::start_inner(store, clock, deck_id, config, None, StdRng::from_entropy())
    }

    /// Start with a fixed shuffle seed; random new-card order replays
    pub fn start_seeded(
        store: SharedCardStore,
        clock: C,
        deck_id: Uuid,
        config: DeckConfig,
        seed: u64,
    ) -> Result<Self> {
        Self::start_inner(
            store,
            clock,
            deck_id,
            config,
            None,
            StdRng::seed_from_u64(seed),
        )
    }

    /// Start against counters persisted from an earlier session today
    ///
    /// The counters are rolled over first, so passing yesterday's tallies
    /// is fine; the daily caps shrink by whatever remains.
    pub fn start_with_counters(
        store: SharedCardStore,
        clock: C,
        deck_id: Uuid,
        config: DeckConfig,
        counters: DeckCounters,
    ) -> Result<Self> {
        Self::start_inner(
            store,
            clock,
            deck_id,
            config,
            Some(counters),
            StdRng::from_entropy(),
        )
    }

    fn start_inner(
        store: SharedCardStore,
        clock: C,
        deck_id: Uuid,
        config: DeckConfig,
        counters: Option<DeckCounters>,
        mut rng: StdRng,
    ) -> Result<Self> {
        config.validate()?;

        let now = clock.now();
        let today = clock.day_bucket(now);
        let mut counters = counters.unwrap_or_else(|| DeckCounters::new(today));
        counters.rollover(today);

        let queue = {
            let guard = store
                .lock()
                .map_err(|e| SessionError::StoreLock(e.to_string()))?;
            queue::build(&*guard, deck_id, &config, &counters, now, today, &mut rng)?
        };
        info!(
            "session started for deck {} with {} queued cards",
            deck_id,
            queue.remaining().len()
        );

        Ok(Self {
            store,
            clock,
            deck_id,
            config,
            queue,
            pending_learning: Vec::new(),
            undo_stack: Vec::new(),
            counters,
        })
    }

    /// The card to study next, or `None` when the session is finished
    ///
    /// Pending learning steps are re-checked against the clock here: a
    /// step that came due is served before anything else, and once the
    /// main queue is empty the next step may be served a little early
    /// (within the configured learn-ahead window).
    pub fn current(&mut self) -> Result<Option<Card>> {
        let now = self.clock.now();
        self.promote_due_learning(now);
        if self.queue.is_exhausted() {
            self.serve_learn_ahead(now);
        }

        match self.queue.current() {
            Some(entry) => {
                let card = self
                    .lock_store()?
                    .get_card(entry.card_id)?
                    .ok_or(SessionError::CardMissing(entry.card_id))?;
                Ok(Some(card))
            }
            None => Ok(None),
        }
    }

    /// Grade the current card and move on
    ///
    /// This is the session's only mutation path: it runs the scheduler,
    /// appends the review log entry, writes the card back, and only then
    /// touches the cursor, the counters and the undo stack. If either
    /// store write fails the session is left exactly as it was.
    ///
    /// Returns the next card, or `None` when the session is finished.
    ///
    /// # Panics
    /// Panics when no entry is at the cursor. `answer` grades whatever
    /// card `current()` last served, so call it first.
    pub fn answer(&mut self, grade: Grade, time_spent_ms: u64) -> Result<Option<Card>> {
        let entry = self
            .queue
            .current()
            .expect("answer() called with no current card");

        let now = self.clock.now();
        let ctx = AnswerContext {
            now,
            today: self.clock.day_bucket(now),
            time_spent_ms,
        };

        let pre_image = self
            .lock_store()?
            .get_card(entry.card_id)?
            .ok_or(SessionError::CardMissing(entry.card_id))?;

        let (next, log_entry) = scheduler::answer(&pre_image, grade, &self.config, &ctx);

        // Log first, card second, matching the undo order (restore card,
        // then delete the log). A failed card write rolls the log back so
        // the store never holds a log entry for an unapplied answer.
        let log_id = {
            let mut store = self.lock_store()?;
            let log_id = store.append_review_log(&log_entry)?;
            if let Err(err) = store.put_card(&next) {
                warn!(
                    "card write failed after log append, removing log entry {}",
                    log_id
                );
                if let Err(cleanup) = store.delete_review_log(log_id) {
                    warn!("orphaned review log entry {}: {}", log_id, cleanup);
                }
                return Err(err.into());
            }
            log_id
        };

        // The scheduler only flags leeches; reporting them is done here,
        // once the answer is actually on disk.
        if log_entry.leech {
            match self.config.leech_action {
                LeechAction::Suspend => warn!(
                    "card {} is a leech after {} lapses, suspending",
                    next.id, next.lapses
                ),
                LeechAction::Tag => {
                    info!("card {} is a leech after {} lapses", next.id, next.lapses)
                }
            }
        }

        // Both writes confirmed; now the in-memory bookkeeping. A card
        // suspended by the leech check stays out of the pending list.
        let requeued_learning = match next.state {
            CardState::Learning { due, .. } | CardState::Relearning { due, .. }
                if next.is_active() =>
            {
                self.pending_learning.push((due, next.id));
                true
            }
            _ => false,
        };

        self.undo_stack.push(UndoEntry {
            pre_image,
            log_id,
            counted: entry.kind,
            requeued_learning,
        });
        match entry.kind {
            QueueKind::New => self.counters.new_today += 1,
            QueueKind::Review => self.counters.reviews_today += 1,
            QueueKind::Learning => {}
        }
        self.queue.advance();
        debug!("card {} answered {:?}", next.id, grade);

        self.current()
    }

    /// Reverse the most recent answer of this session
    ///
    /// Restores the stored pre-image verbatim, deletes the review log
    /// entry, rolls the counters back and steps the cursor back so the
    /// card is served again. Returns `Ok(false)` when there is nothing
    /// to undo.
    pub fn undo(&mut self) -> Result<bool> {
        let entry = match self.undo_stack.pop() {
            Some(entry) => entry,
            None => return Ok(false),
        };

        {
            // Lock the field directly: the guard only borrows `store`, so
            // the entry can go back on the stack while the error is still
            // in scope.
            let mut store = match self.store.lock() {
                Ok(store) => store,
                Err(err) => {
                    let err = SessionError::StoreLock(err.to_string());
                    self.undo_stack.push(entry);
                    return Err(err);
                }
            };
            if let Err(err) = store.put_card(&entry.pre_image) {
                drop(store);
                self.undo_stack.push(entry);
                return Err(err.into());
            }
            if let Err(err) = store.delete_review_log(entry.log_id) {
                drop(store);
                // The pre-image write is idempotent; keep the entry so a
                // retry can finish the job.
                self.undo_stack.push(entry);
                return Err(err.into());
            }
        }

        let card_id = entry.pre_image.id;
        if entry.requeued_learning {
            // The re-entry is either still pending or was already promoted
            // into the live queue; drop whichever copy exists.
            if let Some(pos) = self
                .pending_learning
                .iter()
                .position(|&(_, id)| id == card_id)
            {
                self.pending_learning.remove(pos);
            } else {
                self.queue.remove_upcoming(card_id);
            }
        }
        match entry.counted {
            QueueKind::New => self.counters.new_today = self.counters.new_today.saturating_sub(1),
            QueueKind::Review => {
                self.counters.reviews_today = self.counters.reviews_today.saturating_sub(1)
            }
            QueueKind::Learning => {}
        }
        self.queue.step_back();
        info!("undid answer for card {}", card_id);

        Ok(true)
    }

    /// What each grade would do to the current card
    pub fn preview_current(&mut self) -> Result<Option<[PreviewDue; 4]>> {
        let card = match self.current()? {
            Some(card) => card,
            None => return Ok(None),
        };
        let now = self.clock.now();
        let ctx = AnswerContext {
            now,
            today: self.clock.day_bucket(now),
            time_spent_ms: 0,
        };
        Ok(Some(scheduler::preview_intervals(&card, &self.config, &ctx)))
    }

    /// Remaining work in the live queue plus today's tallies
    pub fn stats(&self) -> SessionStats {
        let mut new_remaining = 0;
        let mut learning_remaining = self.pending_learning.len();
        let mut review_remaining = 0;
        for entry in self.queue.remaining() {
            match entry.kind {
                QueueKind::New => new_remaining += 1,
                QueueKind::Learning => learning_remaining += 1,
                QueueKind::Review => review_remaining += 1,
            }
        }
        SessionStats {
            new_remaining,
            learning_remaining,
            review_remaining,
            answered: self.queue.answered(),
            new_today: self.counters.new_today,
            reviews_today: self.counters.reviews_today,
        }
    }

    /// Today's tallies, for hosts that persist them between sessions
    pub fn counters(&self) -> DeckCounters {
        self.counters
    }

    pub fn deck_id(&self) -> Uuid {
        self.deck_id
    }

    /// Move pending learning steps that came due into the live queue
    ///
    /// Earliest-due ends up at the cursor, so steps are served in the
    /// order they matured.
    fn promote_due_learning(&mut self, now: DateTime<Utc>) {
        let mut matured: Vec<(DateTime<Utc>, Uuid)> = Vec::new();
        self.pending_learning.retain(|&(due, id)| {
            if due <= now {
                matured.push((due, id));
                false
            } else {
                true
            }
        });
        matured.sort_unstable();
        for &(_, card_id) in matured.iter().rev() {
            self.queue.insert_at_cursor(QueueEntry {
                card_id,
                kind: QueueKind::Learning,
            });
        }
    }

    /// With the main queue exhausted, serve the next learning step early
    /// if it falls inside the learn-ahead window
    fn serve_learn_ahead(&mut self, now: DateTime<Utc>) {
        if self.config.learn_ahead_minutes == 0 || self.pending_learning.is_empty() {
            return;
        }
        let horizon = now + Duration::minutes(self.config.learn_ahead_minutes as i64);
        let earliest = self
            .pending_learning
            .iter()
            .enumerate()
            .min_by_key(|(_, &(due, id))| (due, id))
            .map(|(index, &(due, _))| (index, due));
        if let Some((index, due)) = earliest {
            if due <= horizon {
                let (_, card_id) = self.pending_learning.remove(index);
                debug!("serving learning card {} ahead of its due time", card_id);
                self.queue.insert_at_cursor(QueueEntry {
                    card_id,
                    kind: QueueKind::Learning,
                });
            }
        }
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, dyn CardStore + 'static>> {
        self.store
            .lock()
            .map_err(|e| SessionError::StoreLock(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{NewCardOrder, QueueStatus, ReviewLogEntry, StateKind};
    use crate::storage::{MemoryCardStore, Result as StorageResult};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    const DAY: i64 = 19_675;

    fn start_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn test_config() -> DeckConfig {
        DeckConfig {
            new_card_order: NewCardOrder::Sequential,
            learn_ahead_minutes: 0,
            ..DeckConfig::default()
        }
    }

    fn new_store() -> Arc<Mutex<MemoryCardStore>> {
        Arc::new(Mutex::new(MemoryCardStore::new()))
    }

    fn seed_new_card(store: &Arc<Mutex<MemoryCardStore>>, deck: Uuid, position: u64) -> Card {
        let card = Card::new(deck, Uuid::new_v4(), position);
        store.lock().unwrap().put_card(&card).unwrap();
        card
    }

    fn seed_review_card(store: &Arc<Mutex<MemoryCardStore>>, deck: Uuid, due_day: i64) -> Card {
        let mut card = Card::new(deck, Uuid::new_v4(), 0);
        card.state = CardState::Review { due_day };
        card.interval_days = 10;
        card.reps = 3;
        store.lock().unwrap().put_card(&card).unwrap();
        card
    }

    fn start_session(
        store: &Arc<Mutex<MemoryCardStore>>,
        clock: &FixedClock,
        deck: Uuid,
        config: DeckConfig,
    ) -> StudySession<FixedClock> {
        StudySession::start_seeded(store.clone(), clock.clone(), deck, config, 7).unwrap()
    }

    #[test]
    fn answering_persists_card_and_log() {
        let store = new_store();
        let deck = Uuid::new_v4();
        let card = seed_new_card(&store, deck, 0);
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        assert_eq!(session.current().unwrap().unwrap().id, card.id);
        let next = session.answer(Grade::Good, 3_000).unwrap();
        assert!(next.is_none());

        let stored = store.lock().unwrap().get_card(card.id).unwrap().unwrap();
        assert_eq!(stored.state, CardState::Review { due_day: DAY + 1 });
        assert_eq!(stored.reps, 1);
        assert_eq!(store.lock().unwrap().log_count(), 1);
    }

    #[test]
    fn answer_serves_the_next_card() {
        let store = new_store();
        let deck = Uuid::new_v4();
        let first = seed_review_card(&store, deck, DAY - 2);
        let second = seed_review_card(&store, deck, DAY - 1);
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        assert_eq!(session.current().unwrap().unwrap().id, first.id);
        let next = session.answer(Grade::Good, 1_000).unwrap().unwrap();
        assert_eq!(next.id, second.id);
    }

    #[test]
    fn undo_restores_the_pre_image_exactly() {
        let store = new_store();
        let deck = Uuid::new_v4();
        let card = seed_review_card(&store, deck, DAY - 1);
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        let before = store.lock().unwrap().get_card(card.id).unwrap().unwrap();
        session.answer(Grade::Hard, 2_000).unwrap();
        assert_eq!(store.lock().unwrap().log_count(), 1);

        assert!(session.undo().unwrap());
        let after = store.lock().unwrap().get_card(card.id).unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(store.lock().unwrap().log_count(), 0);

        // The card is served again.
        assert_eq!(session.current().unwrap().unwrap().id, card.id);
    }

    #[test]
    fn undo_chains_across_the_whole_session() {
        let store = new_store();
        let deck = Uuid::new_v4();
        let cards = [
            seed_review_card(&store, deck, DAY - 3),
            seed_review_card(&store, deck, DAY - 2),
            seed_review_card(&store, deck, DAY - 1),
        ];
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        let snapshot: Vec<Card> = cards
            .iter()
            .map(|c| store.lock().unwrap().get_card(c.id).unwrap().unwrap())
            .collect();

        session.answer(Grade::Good, 100).unwrap();
        session.answer(Grade::Again, 100).unwrap();
        session.answer(Grade::Easy, 100).unwrap();
        assert_eq!(store.lock().unwrap().log_count(), 3);

        assert!(session.undo().unwrap());
        assert!(session.undo().unwrap());
        assert!(session.undo().unwrap());
        assert!(!session.undo().unwrap());

        for (card, original) in cards.iter().zip(snapshot) {
            let restored = store.lock().unwrap().get_card(card.id).unwrap().unwrap();
            assert_eq!(restored, original);
        }
        assert_eq!(store.lock().unwrap().log_count(), 0);
        assert_eq!(session.stats().answered, 0);
    }

    #[test]
    fn undo_on_a_fresh_session_is_a_noop() {
        let store = new_store();
        let deck = Uuid::new_v4();
        seed_new_card(&store, deck, 0);
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        assert!(!session.undo().unwrap());
    }

    #[test]
    fn learning_cards_reenter_when_their_step_matures() {
        let store = new_store();
        let deck = Uuid::new_v4();
        let card = seed_new_card(&store, deck, 0);
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        // Again puts the card on the 1-minute step; nothing is due yet.
        assert!(session.answer(Grade::Again, 500).unwrap().is_none());
        assert!(session.current().unwrap().is_none());
        assert_eq!(session.stats().learning_remaining, 1);

        clock.advance(Duration::minutes(2));
        let served = session.current().unwrap().unwrap();
        assert_eq!(served.id, card.id);
        assert_eq!(served.state.kind(), StateKind::Learning);

        // Walk the remaining step and graduate.
        assert!(session.answer(Grade::Good, 500).unwrap().is_none());
        clock.advance(Duration::minutes(11));
        assert!(session.current().unwrap().is_some());
        session.answer(Grade::Good, 500).unwrap();

        let stored = store.lock().unwrap().get_card(card.id).unwrap().unwrap();
        assert_eq!(stored.state.kind(), StateKind::Review);
        assert_eq!(stored.interval_days, 1);
    }

    #[test]
    fn learn_ahead_serves_early_only_when_nothing_else_is_left() {
        let store = new_store();
        let deck = Uuid::new_v4();
        let first = seed_new_card(&store, deck, 0);
        let second = seed_new_card(&store, deck, 1);
        let clock = FixedClock::at(start_time());
        let config = DeckConfig {
            learn_ahead_minutes: 20,
            ..test_config()
        };
        let mut session = start_session(&store, &clock, deck, config);

        // The pending step is not served while other cards remain.
        let next = session.answer(Grade::Again, 500).unwrap().unwrap();
        assert_eq!(next.id, second.id);

        // Once the queue drains, the step is close enough to serve early.
        let ahead = session.answer(Grade::Good, 500).unwrap().unwrap();
        assert_eq!(ahead.id, first.id);
    }

    #[test]
    fn undo_pulls_a_pending_learning_step_back() {
        let store = new_store();
        let deck = Uuid::new_v4();
        let card = seed_review_card(&store, deck, DAY - 1);
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        let before = store.lock().unwrap().get_card(card.id).unwrap().unwrap();
        session.answer(Grade::Again, 500).unwrap();
        assert_eq!(session.stats().learning_remaining, 1);

        assert!(session.undo().unwrap());
        assert_eq!(session.stats().learning_remaining, 0);
        assert_eq!(
            store.lock().unwrap().get_card(card.id).unwrap().unwrap(),
            before
        );
        assert_eq!(session.stats().review_remaining, 1);
    }

    #[test]
    fn undo_removes_a_promoted_reentry_from_the_queue() {
        let store = new_store();
        let deck = Uuid::new_v4();
        let card = seed_new_card(&store, deck, 0);
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        session.answer(Grade::Again, 500).unwrap();
        clock.advance(Duration::minutes(2));
        // Promote the step into the live queue, then unwind it.
        assert_eq!(session.current().unwrap().unwrap().id, card.id);
        assert!(session.undo().unwrap());

        let stats = session.stats();
        assert_eq!(stats.learning_remaining, 0);
        assert_eq!(stats.new_remaining, 1);
        assert_eq!(session.current().unwrap().unwrap().state, CardState::New);
    }

    struct FlakyStore {
        inner: MemoryCardStore,
        fail_puts: Arc<AtomicBool>,
    }

    impl CardStore for FlakyStore {
        fn list_cards(&self, deck_id: Uuid) -> StorageResult<Vec<Card>> {
            self.inner.list_cards(deck_id)
        }

        fn get_card(&self, id: Uuid) -> StorageResult<Option<Card>> {
            self.inner.get_card(id)
        }

        fn put_card(&mut self, card: &Card) -> StorageResult<()> {
            if self.fail_puts.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.put_card(card)
        }

        fn append_review_log(&mut self, entry: &ReviewLogEntry) -> StorageResult<Uuid> {
            self.inner.append_review_log(entry)
        }

        fn delete_review_log(&mut self, id: Uuid) -> StorageResult<()> {
            self.inner.delete_review_log(id)
        }
    }

    #[test]
    fn a_failed_write_leaves_the_session_untouched() {
        let fail_puts = Arc::new(AtomicBool::new(false));
        let deck = Uuid::new_v4();
        let card = Card::new(deck, Uuid::new_v4(), 0);

        let store = Arc::new(Mutex::new(FlakyStore {
            inner: MemoryCardStore::new(),
            fail_puts: fail_puts.clone(),
        }));
        store.lock().unwrap().inner.put_card(&card).unwrap();

        let clock = FixedClock::at(start_time());
        let mut session =
            StudySession::start_seeded(store.clone(), clock, deck, test_config(), 7).unwrap();

        fail_puts.store(true, Ordering::SeqCst);
        let err = session.answer(Grade::Good, 500).unwrap_err();
        assert!(matches!(err, SessionError::Storage(StorageError::Io(_))));

        // Cursor, undo stack and counters are all unchanged, and the
        // compensating delete removed the orphaned log entry.
        assert_eq!(session.stats().answered, 0);
        assert_eq!(session.counters().new_today, 0);
        assert_eq!(store.lock().unwrap().inner.log_count(), 0);

        fail_puts.store(false, Ordering::SeqCst);
        assert!(!session.undo().unwrap());
        assert_eq!(session.current().unwrap().unwrap().id, card.id);
        assert!(session.answer(Grade::Good, 500).unwrap().is_none());
    }

    #[test]
    fn a_poisoned_lock_surfaces_and_keeps_the_undo_history() {
        let store = new_store();
        let deck = Uuid::new_v4();
        let first = seed_review_card(&store, deck, DAY - 2);
        seed_review_card(&store, deck, DAY - 1);
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        let before = store.lock().unwrap().get_card(first.id).unwrap().unwrap();
        session.answer(Grade::Good, 500).unwrap();

        // Panicking while holding the lock poisons it for everyone else.
        let poisoner = store.clone();
        let _ = std::panic::catch_unwind(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poisoned");
        });

        let err = session.current().unwrap_err();
        assert!(matches!(err, SessionError::StoreLock(_)));
        let err = session.undo().unwrap_err();
        assert!(matches!(err, SessionError::StoreLock(_)));
        assert_eq!(session.stats().answered, 1);

        // The entry went back on the stack, so once the lock recovers the
        // same undo still lands.
        store.clear_poison();
        assert!(session.undo().unwrap());
        assert_eq!(
            store.lock().unwrap().get_card(first.id).unwrap().unwrap(),
            before
        );
        assert_eq!(store.lock().unwrap().log_count(), 0);
    }

    #[test]
    fn counters_track_answers_and_roll_back_on_undo() {
        let store = new_store();
        let deck = Uuid::new_v4();
        seed_review_card(&store, deck, DAY - 1);
        seed_new_card(&store, deck, 0);
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        session.answer(Grade::Good, 100).unwrap();
        session.answer(Grade::Good, 100).unwrap();
        assert_eq!(session.counters().reviews_today, 1);
        assert_eq!(session.counters().new_today, 1);

        session.undo().unwrap();
        assert_eq!(session.counters().new_today, 0);
        assert_eq!(session.counters().reviews_today, 1);
    }

    #[test]
    fn stale_counters_roll_over_at_start() {
        let store = new_store();
        let deck = Uuid::new_v4();
        seed_new_card(&store, deck, 0);
        let clock = FixedClock::at(start_time());

        let mut stale = DeckCounters::new(DAY - 1);
        stale.new_today = 20;
        let session =
            StudySession::start_with_counters(store.clone(), clock, deck, test_config(), stale)
                .unwrap();

        assert_eq!(session.counters().day, DAY);
        assert_eq!(session.counters().new_today, 0);
        assert_eq!(session.stats().new_remaining, 1);
    }

    #[test]
    fn leech_suspension_drops_the_card_from_the_session() {
        let store = new_store();
        let deck = Uuid::new_v4();
        let mut card = Card::new(deck, Uuid::new_v4(), 0);
        card.state = CardState::Review { due_day: DAY - 1 };
        card.interval_days = 10;
        card.lapses = 7;
        store.lock().unwrap().put_card(&card).unwrap();

        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        assert!(session.answer(Grade::Again, 500).unwrap().is_none());
        let stored = store.lock().unwrap().get_card(card.id).unwrap().unwrap();
        assert_eq!(stored.queue_status, QueueStatus::Suspended);
        assert_eq!(stored.lapses, 8);

        // Suspended mid-lapse: it must not lurk in the pending list.
        assert_eq!(session.stats().learning_remaining, 0);
        assert!(session.current().unwrap().is_none());
    }

    #[test]
    fn stats_reflect_queue_composition() {
        let store = new_store();
        let deck = Uuid::new_v4();
        for n in 0..3 {
            seed_new_card(&store, deck, n);
        }
        for _ in 0..2 {
            seed_review_card(&store, deck, DAY - 1);
        }
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        let stats = session.stats();
        assert_eq!(stats.new_remaining, 3);
        assert_eq!(stats.review_remaining, 2);
        assert_eq!(stats.learning_remaining, 0);
        assert_eq!(stats.answered, 0);

        session.answer(Grade::Good, 100).unwrap();
        let stats = session.stats();
        assert_eq!(stats.answered, 1);
        assert_eq!(stats.review_remaining, 1);
    }

    #[test]
    fn preview_reports_all_four_grades() {
        let store = new_store();
        let deck = Uuid::new_v4();
        seed_review_card(&store, deck, DAY - 1);
        let clock = FixedClock::at(start_time());
        let mut session = start_session(&store, &clock, deck, test_config());

        let preview = session.preview_current().unwrap().unwrap();
        assert_eq!(preview[0], PreviewDue::Minutes(10));
        assert_eq!(preview[2], PreviewDue::Days(25));
    }

    #[test]
    fn invalid_config_is_rejected_at_start() {
        let store = new_store();
        let clock = FixedClock::at(start_time());
        let config = DeckConfig {
            learning_steps_minutes: vec![],
            ..DeckConfig::default()
        };

        let result = StudySession::start(store.clone(), clock, Uuid::new_v4(), config);
        assert!(matches!(result, Err(SessionError::Config(_))));
    }
}
