//! Data models for the scheduling engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lower bound for the ease factor, in permille (1.3)
pub const MIN_EASE_FACTOR: u32 = 1300;

/// Upper bound for the ease factor, in permille (4.9)
pub const MAX_EASE_FACTOR: u32 = 4900;

// ==================== Card ====================

/// Scheduling state of a card
///
/// Each variant carries exactly the fields that are meaningful in that
/// state, so a review card cannot have learning steps left over and a
/// learning card cannot lose its due instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CardState {
    /// Never studied; ordered by `Card::position`
    New,
    /// In the initial learning steps
    #[serde(rename_all = "camelCase")]
    Learning {
        steps_remaining: u32,
        due: DateTime<Utc>,
    },
    /// Graduated; due on a whole-day boundary
    #[serde(rename_all = "camelCase")]
    Review { due_day: i64 },
    /// Lapsed out of review; walking the relearning steps
    #[serde(rename_all = "camelCase")]
    Relearning {
        steps_remaining: u32,
        due: DateTime<Utc>,
    },
}

impl Default for CardState {
    fn default() -> Self {
        Self::New
    }
}

impl CardState {
    /// The payload-free discriminant, for logs and stats
    pub fn kind(&self) -> StateKind {
        match self {
            Self::New => StateKind::New,
            Self::Learning { .. } => StateKind::Learning,
            Self::Review { .. } => StateKind::Review,
            Self::Relearning { .. } => StateKind::Relearning,
        }
    }
}

/// Discriminant of [`CardState`] without the per-state payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateKind {
    New,
    Learning,
    Review,
    Relearning,
}

/// Whether a card participates in queue building
///
/// Orthogonal to [`CardState`]: a suspended card keeps its scheduling
/// state and resumes exactly where it left off when restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueStatus {
    /// Eligible for study
    Active,
    /// Hidden until tomorrow by the user
    UserBuried,
    /// Hidden until tomorrow by the scheduler (e.g. a sibling was studied)
    SchedulerBuried,
    /// Excluded until explicitly un-suspended
    Suspended,
}

impl Default for QueueStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// A single schedulable card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: Uuid,
    pub deck_id: Uuid,
    /// The note this card renders; content is outside the engine
    pub note_id: Uuid,
    #[serde(default)]
    pub state: CardState,
    #[serde(default)]
    pub queue_status: QueueStatus,
    /// Last granted interval in days; 0 until first graduation
    #[serde(default)]
    pub interval_days: u32,
    /// Ease factor in permille (2500 = 2.5)
    #[serde(default = "default_ease_factor")]
    pub ease_factor: u32,
    /// Total number of answers over the card's lifetime
    #[serde(default)]
    pub reps: u32,
    /// Number of times the card fell out of review
    #[serde(default)]
    pub lapses: u32,
    /// Insertion sequence within the deck; drives sequential new-card order
    #[serde(default)]
    pub position: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_ease_factor() -> u32 {
    2500
}

impl Card {
    pub fn new(deck_id: Uuid, note_id: Uuid, position: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            deck_id,
            note_id,
            state: CardState::New,
            queue_status: QueueStatus::Active,
            interval_days: 0,
            ease_factor: default_ease_factor(),
            reps: 0,
            lapses: 0,
            position,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.queue_status == QueueStatus::Active
    }

    pub fn suspend(&mut self) {
        self.queue_status = QueueStatus::Suspended;
    }

    pub fn bury(&mut self, by_user: bool) {
        self.queue_status = if by_user {
            QueueStatus::UserBuried
        } else {
            QueueStatus::SchedulerBuried
        };
    }

    /// Return the card to the active queue, keeping its scheduling state
    pub fn restore(&mut self) {
        self.queue_status = QueueStatus::Active;
    }
}

// ==================== Grades ====================

/// The four answer buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Grade {
    /// Failed to recall
    Again,
    /// Recalled with serious difficulty
    Hard,
    /// Recalled correctly
    Good,
    /// Recalled effortlessly
    Easy,
}

// ==================== Deck configuration ====================

/// What happens when a card crosses the leech threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeechAction {
    /// Suspend the card
    Suspend,
    /// Leave the card scheduled and only flag the review log entry
    Tag,
}

impl Default for LeechAction {
    fn default() -> Self {
        Self::Suspend
    }
}

/// How new cards are ordered in the study queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NewCardOrder {
    /// Ascending insertion position
    Sequential,
    /// Seeded shuffle of the new pool
    Random,
}

impl Default for NewCardOrder {
    fn default() -> Self {
        Self::Random
    }
}

/// Per-deck scheduling parameters
///
/// Treated as immutable for the lifetime of a study session. Hosts should
/// call [`DeckConfig::validate`] when loading external configuration; the
/// scheduler asserts the invariants it depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckConfig {
    /// Learning step delays in minutes; must not be empty
    #[serde(default = "default_learning_steps")]
    pub learning_steps_minutes: Vec<u32>,
    /// Relearning step delays in minutes; may be empty
    #[serde(default = "default_relearning_steps")]
    pub relearning_steps_minutes: Vec<u32>,
    /// Interval granted when graduating with Good
    #[serde(default = "default_graduating_interval")]
    pub graduating_interval_days: u32,
    /// Interval granted when a new card is answered Easy
    #[serde(default = "default_easy_interval")]
    pub easy_interval_days: u32,
    /// Ease factor assigned at graduation, in permille
    #[serde(default = "default_ease_factor")]
    pub starting_ease: u32,
    #[serde(default = "default_hard_multiplier")]
    pub hard_interval_multiplier: f64,
    #[serde(default = "default_easy_bonus")]
    pub easy_bonus_multiplier: f64,
    /// Global scaling applied to every interval that lands in review
    #[serde(default = "default_interval_modifier")]
    pub interval_modifier: f64,
    #[serde(default = "default_maximum_interval")]
    pub maximum_interval_days: u32,
    /// Fraction of the old interval kept after a lapse
    #[serde(default)]
    pub lapse_multiplier: f64,
    /// Floor for the post-lapse interval
    #[serde(default = "default_lapse_minimum_interval")]
    pub lapse_minimum_interval_days: u32,
    /// Lapse count at which a card becomes a leech
    #[serde(default = "default_leech_threshold")]
    pub leech_threshold: u32,
    #[serde(default)]
    pub leech_action: LeechAction,
    #[serde(default = "default_new_per_day")]
    pub new_per_day: u32,
    #[serde(default = "default_reviews_per_day")]
    pub reviews_per_day: u32,
    #[serde(default)]
    pub new_card_order: NewCardOrder,
    /// How far ahead a learning card may be served when nothing else is due
    #[serde(default = "default_learn_ahead")]
    pub learn_ahead_minutes: u32,
}

fn default_learning_steps() -> Vec<u32> {
    vec![1, 10]
}

fn default_relearning_steps() -> Vec<u32> {
    vec![10]
}

fn default_graduating_interval() -> u32 {
    1
}

fn default_easy_interval() -> u32 {
    4
}

fn default_hard_multiplier() -> f64 {
    1.2
}

fn default_easy_bonus() -> f64 {
    1.3
}

fn default_interval_modifier() -> f64 {
    1.0
}

fn default_maximum_interval() -> u32 {
    36500
}

fn default_lapse_minimum_interval() -> u32 {
    1
}

fn default_leech_threshold() -> u32 {
    8
}

fn default_new_per_day() -> u32 {
    20
}

fn default_reviews_per_day() -> u32 {
    200
}

fn default_learn_ahead() -> u32 {
    20
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            learning_steps_minutes: default_learning_steps(),
            relearning_steps_minutes: default_relearning_steps(),
            graduating_interval_days: default_graduating_interval(),
            easy_interval_days: default_easy_interval(),
            starting_ease: default_ease_factor(),
            hard_interval_multiplier: default_hard_multiplier(),
            easy_bonus_multiplier: default_easy_bonus(),
            interval_modifier: default_interval_modifier(),
            maximum_interval_days: default_maximum_interval(),
            lapse_multiplier: 0.0,
            lapse_minimum_interval_days: default_lapse_minimum_interval(),
            leech_threshold: default_leech_threshold(),
            leech_action: LeechAction::default(),
            new_per_day: default_new_per_day(),
            reviews_per_day: default_reviews_per_day(),
            new_card_order: NewCardOrder::default(),
            learn_ahead_minutes: default_learn_ahead(),
        }
    }
}

/// Validation failure for [`DeckConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("learning steps must not be empty")]
    EmptyLearningSteps,
    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),
    #[error("{0} must be greater than 1.0")]
    MultiplierTooSmall(&'static str),
    #[error("lapse multiplier must be within 0.0..=1.0")]
    LapseMultiplierOutOfRange,
    #[error("easy interval must be at least the graduating interval")]
    EasyIntervalBelowGraduating,
    #[error("starting ease must be within {MIN_EASE_FACTOR}..={MAX_EASE_FACTOR} permille")]
    StartingEaseOutOfRange,
}

impl DeckConfig {
    /// Check every bound the scheduler and queue builder rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.learning_steps_minutes.is_empty() {
            return Err(ConfigError::EmptyLearningSteps);
        }
        if self.learning_steps_minutes.iter().any(|&m| m == 0) {
            return Err(ConfigError::NonPositive("learning step"));
        }
        if self.relearning_steps_minutes.iter().any(|&m| m == 0) {
            return Err(ConfigError::NonPositive("relearning step"));
        }
        if self.graduating_interval_days == 0 {
            return Err(ConfigError::NonPositive("graduating interval"));
        }
        if self.easy_interval_days < self.graduating_interval_days {
            return Err(ConfigError::EasyIntervalBelowGraduating);
        }
        if !(MIN_EASE_FACTOR..=MAX_EASE_FACTOR).contains(&self.starting_ease) {
            return Err(ConfigError::StartingEaseOutOfRange);
        }
        if self.hard_interval_multiplier <= 1.0 {
            return Err(ConfigError::MultiplierTooSmall("hard interval multiplier"));
        }
        if self.easy_bonus_multiplier <= 1.0 {
            return Err(ConfigError::MultiplierTooSmall("easy bonus multiplier"));
        }
        if self.interval_modifier <= 0.0 {
            return Err(ConfigError::NonPositive("interval modifier"));
        }
        if self.maximum_interval_days == 0 {
            return Err(ConfigError::NonPositive("maximum interval"));
        }
        if !(0.0..=1.0).contains(&self.lapse_multiplier) {
            return Err(ConfigError::LapseMultiplierOutOfRange);
        }
        if self.lapse_minimum_interval_days == 0 {
            return Err(ConfigError::NonPositive("lapse minimum interval"));
        }
        if self.leech_threshold == 0 {
            return Err(ConfigError::NonPositive("leech threshold"));
        }
        Ok(())
    }
}

// ==================== Review log ====================

/// Append-only record of a single answer
///
/// Carries the before/after interval and ease so history queries never
/// need to replay the scheduler. The entry has no id of its own; the
/// store assigns one on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLogEntry {
    pub card_id: Uuid,
    pub grade: Grade,
    /// State the card landed in
    pub state: StateKind,
    /// Interval after the answer, in days
    pub interval_days: u32,
    pub prior_interval_days: u32,
    /// Ease after the answer, in permille
    pub ease_factor: u32,
    pub prior_ease_factor: u32,
    /// Whether this answer crossed the leech threshold
    pub leech: bool,
    pub time_spent_ms: u64,
    pub reviewed_at: DateTime<Utc>,
}

// ==================== Daily counters ====================

/// Per-deck tallies against the daily limits
///
/// Hosts persist this between sessions; the queue builder subtracts it
/// from the per-day caps and the session keeps it current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckCounters {
    /// Day bucket the tallies belong to
    pub day: i64,
    pub new_today: u32,
    pub reviews_today: u32,
}

impl DeckCounters {
    pub fn new(day: i64) -> Self {
        Self {
            day,
            new_today: 0,
            reviews_today: 0,
        }
    }

    /// Reset the tallies when the day bucket has moved on
    pub fn rollover(&mut self, today: i64) {
        if self.day != today {
            *self = Self::new(today);
        }
    }
}

impl Default for DeckCounters {
    fn default() -> Self {
        Self::new(0)
    }
}
