//! Card state machine and interval arithmetic
//!
//! The scheduler is a pure transition function over the four card states
//! (new, learning, review, relearning) keyed by the four answer grades.
//! It has no side effects: no clock reads, no storage, no logging, no
//! randomness. Identical inputs produce bit-identical output, which keeps
//! the pre-image undo model in the session controller sound and lets the
//! preview path run hypothetical grades silently.
//!
//! Interval arithmetic is integer-first: the ease factor is permille, so
//! review growth is computed as an exact integer ceiling division instead
//! of a float multiply that can drift across platforms.

use chrono::{DateTime, Duration, Utc};

use crate::models::{
    Card, CardState, DeckConfig, Grade, LeechAction, ReviewLogEntry, MAX_EASE_FACTOR,
    MIN_EASE_FACTOR,
};

/// Ease penalty for a lapse, in permille
const LAPSE_EASE_PENALTY: u32 = 200;

/// Ease penalty for Hard on a review card, in permille
const HARD_EASE_PENALTY: u32 = 150;

/// Ease reward for Easy on a review card, in permille
const EASY_EASE_REWARD: u32 = 150;

/// Inputs for one scheduling decision beyond the card itself
///
/// `today` must be the day bucket of `now` under the session's clock;
/// passing both keeps this module free of any `Clock` dependency.
#[derive(Debug, Clone, Copy)]
pub struct AnswerContext {
    pub now: DateTime<Utc>,
    pub today: i64,
    /// Milliseconds the caller took to answer, recorded in the log
    pub time_spent_ms: u64,
}

/// When a card would next be seen, for answer-button captions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewDue {
    /// Stepped outcome: due this many minutes from now
    Minutes(u32),
    /// Review outcome: due this many days from now
    Days(u32),
}

/// Apply a grade to a card
///
/// # Arguments
/// * `card` - the card as stored; not mutated
/// * `grade` - the answer button pressed
/// * `config` - deck policy, immutable for the session
/// * `ctx` - the answer instant, its day bucket, and the elapsed time
///
/// # Returns
/// The updated card and the log entry describing the transition. The log
/// entry is emitted on every call, including step repeats that leave the
/// interval untouched.
///
/// # Panics
/// Answering a card that is not in the active queue, or scheduling against
/// a config with no learning steps, is a contract violation and panics.
pub fn answer(
    card: &Card,
    grade: Grade,
    config: &DeckConfig,
    ctx: &AnswerContext,
) -> (Card, ReviewLogEntry) {
    assert!(
        !config.learning_steps_minutes.is_empty(),
        "deck config has no learning steps"
    );
    assert!(
        card.is_active(),
        "answered card {} which is not in the active queue",
        card.id
    );

    let mut next = card.clone();
    next.reps += 1;
    next.updated_at = ctx.now;
    let mut leech = false;

    match card.state {
        CardState::New => match grade {
            Grade::Again => {
                enter_learning(&mut next, &config.learning_steps_minutes, ctx.now);
            }
            // Hard is not meaningful before the first successful recall
            // and follows the Good row.
            Grade::Hard | Grade::Good => {
                next.ease_factor = clamp_ease(config.starting_ease);
                land_in_review(&mut next, config.graduating_interval_days, true, 1, config, ctx);
            }
            Grade::Easy => {
                next.ease_factor = clamp_ease(config.starting_ease);
                land_in_review(&mut next, config.easy_interval_days, true, 1, config, ctx);
            }
        },

        CardState::Learning { steps_remaining, .. } => {
            let steps = &config.learning_steps_minutes;
            match grade {
                Grade::Again => enter_learning(&mut next, steps, ctx.now),
                Grade::Hard => {
                    let minutes = current_step(steps, steps_remaining);
                    next.state = CardState::Learning {
                        steps_remaining,
                        due: ctx.now + Duration::minutes(minutes as i64),
                    };
                }
                Grade::Good => {
                    if steps_remaining > 1 {
                        let remaining = steps_remaining - 1;
                        let minutes = current_step(steps, remaining);
                        next.state = CardState::Learning {
                            steps_remaining: remaining,
                            due: ctx.now + Duration::minutes(minutes as i64),
                        };
                    } else {
                        next.ease_factor = clamp_ease(config.starting_ease);
                        land_in_review(
                            &mut next,
                            config.graduating_interval_days,
                            true,
                            1,
                            config,
                            ctx,
                        );
                    }
                }
                Grade::Easy => {
                    next.ease_factor = clamp_ease(config.starting_ease);
                    let raw =
                        ceil_mul(config.graduating_interval_days, config.easy_bonus_multiplier);
                    land_in_review(&mut next, raw, true, 1, config, ctx);
                }
            }
        }

        CardState::Review { .. } => match grade {
            Grade::Again => {
                next.lapses += 1;
                next.ease_factor = clamp_ease(next.ease_factor.saturating_sub(LAPSE_EASE_PENALTY));
                next.interval_days = lapse_interval(card.interval_days, config);
                enter_relearning(&mut next, &config.relearning_steps_minutes, ctx.now);
                leech = check_leech(&mut next, config);
            }
            Grade::Hard => {
                next.ease_factor = clamp_ease(next.ease_factor.saturating_sub(HARD_EASE_PENALTY));
                let raw = ceil_mul(card.interval_days, config.hard_interval_multiplier);
                let floor = card.interval_days.saturating_add(1);
                land_in_review(&mut next, raw, true, floor, config, ctx);
            }
            Grade::Good => {
                let raw = ceil_mul_permille(card.interval_days, card.ease_factor);
                let floor = card.interval_days.saturating_add(1);
                land_in_review(&mut next, raw, true, floor, config, ctx);
            }
            Grade::Easy => {
                let raw = (card.interval_days as f64 * card.ease_factor as f64 / 1000.0
                    * config.easy_bonus_multiplier)
                    .ceil() as u32;
                next.ease_factor = clamp_ease(card.ease_factor.saturating_add(EASY_EASE_REWARD));
                let floor = card.interval_days.saturating_add(1);
                land_in_review(&mut next, raw, true, floor, config, ctx);
            }
        },

        CardState::Relearning { steps_remaining, .. } => {
            let steps = &config.relearning_steps_minutes;
            match grade {
                Grade::Again => {
                    enter_relearning(&mut next, steps, ctx.now);
                    // A relearning Again does not count as a new lapse, but
                    // the leech check still fires on it.
                    leech = check_leech(&mut next, config);
                }
                Grade::Hard => {
                    if steps.is_empty() || steps_remaining == 0 {
                        // No step left to repeat; graduate as Good would.
                        regraduate(&mut next, false, config, ctx);
                    } else {
                        let minutes = current_step(steps, steps_remaining);
                        next.state = CardState::Relearning {
                            steps_remaining,
                            due: ctx.now + Duration::minutes(minutes as i64),
                        };
                    }
                }
                Grade::Good => {
                    if !steps.is_empty() && steps_remaining > 1 {
                        let remaining = steps_remaining - 1;
                        let minutes = current_step(steps, remaining);
                        next.state = CardState::Relearning {
                            steps_remaining: remaining,
                            due: ctx.now + Duration::minutes(minutes as i64),
                        };
                    } else {
                        regraduate(&mut next, false, config, ctx);
                    }
                }
                Grade::Easy => regraduate(&mut next, true, config, ctx),
            }
        }
    }

    let log = ReviewLogEntry {
        card_id: card.id,
        grade,
        state: next.state.kind(),
        interval_days: next.interval_days,
        prior_interval_days: card.interval_days,
        ease_factor: next.ease_factor,
        prior_ease_factor: card.ease_factor,
        leech,
        time_spent_ms: ctx.time_spent_ms,
        reviewed_at: ctx.now,
    };

    (next, log)
}

/// What each answer button would do to the card
///
/// Returns the hypothetical due delay for Again, Hard, Good and Easy in
/// that order. Purely informational; nothing is persisted or logged.
pub fn preview_intervals(
    card: &Card,
    config: &DeckConfig,
    ctx: &AnswerContext,
) -> [PreviewDue; 4] {
    [Grade::Again, Grade::Hard, Grade::Good, Grade::Easy].map(|grade| {
        let (next, _) = answer(card, grade, config, ctx);
        match next.state {
            CardState::Learning { due, .. } | CardState::Relearning { due, .. } => {
                let minutes = (due - ctx.now).num_minutes().max(0) as u32;
                PreviewDue::Minutes(minutes)
            }
            CardState::Review { .. } | CardState::New => PreviewDue::Days(next.interval_days),
        }
    })
}

/// Format a preview delay as a short caption ("10m", "3d", "2w", "1y")
pub fn format_due(due: PreviewDue) -> String {
    match due {
        PreviewDue::Minutes(0) => "now".to_string(),
        PreviewDue::Minutes(m) if m < 60 => format!("{}m", m),
        PreviewDue::Minutes(m) => format!("{}h", m / 60),
        PreviewDue::Days(d) if d < 7 => format!("{}d", d.max(1)),
        PreviewDue::Days(d) if d < 30 => format!("{}w", d / 7),
        PreviewDue::Days(d) if d < 365 => format!("{}mo", d / 30),
        PreviewDue::Days(d) => format!("{}y", d / 365),
    }
}

// ==================== Transition helpers ====================

fn enter_learning(card: &mut Card, steps: &[u32], now: DateTime<Utc>) {
    card.state = CardState::Learning {
        steps_remaining: steps.len() as u32,
        due: now + Duration::minutes(steps[0] as i64),
    };
}

fn enter_relearning(card: &mut Card, steps: &[u32], now: DateTime<Utc>) {
    card.state = if steps.is_empty() {
        // Empty relearning steps: due immediately, graduates on the first
        // answer that is not Again.
        CardState::Relearning {
            steps_remaining: 0,
            due: now,
        }
    } else {
        CardState::Relearning {
            steps_remaining: steps.len() as u32,
            due: now + Duration::minutes(steps[0] as i64),
        }
    };
}

/// Graduate a relearning card back into review
///
/// The interval was already seeded by the lapse; the multiplier is not
/// applied a second time here.
fn regraduate(card: &mut Card, easy: bool, config: &DeckConfig, ctx: &AnswerContext) {
    let raw = if easy {
        ceil_mul(card.interval_days, config.easy_bonus_multiplier)
    } else {
        card.interval_days
    };
    land_in_review(card, raw, false, 1, config, ctx);
}

/// Finish any transition that lands in the review state
///
/// Applies the global interval modifier (ceiling on growth paths, floor on
/// decay paths), re-asserts the growth floor, clamps to the configured
/// maximum, and converts the interval to a due day.
fn land_in_review(
    card: &mut Card,
    raw_days: u32,
    growth: bool,
    min_days: u32,
    config: &DeckConfig,
    ctx: &AnswerContext,
) {
    let scaled = raw_days as f64 * config.interval_modifier;
    let modified = if growth {
        scaled.ceil() as u32
    } else {
        scaled.floor() as u32
    };
    let days = modified.max(min_days).clamp(1, config.maximum_interval_days);
    card.interval_days = days;
    card.state = CardState::Review {
        due_day: ctx.today + days as i64,
    };
}

/// Delay of the step the card is currently on
///
/// Steps count down: a card that just entered a stepped state has
/// `steps_remaining == steps.len()` and sits on the first step.
fn current_step(steps: &[u32], steps_remaining: u32) -> u32 {
    let index = steps
        .len()
        .saturating_sub(steps_remaining as usize)
        .min(steps.len() - 1);
    steps[index]
}

fn lapse_interval(prior_days: u32, config: &DeckConfig) -> u32 {
    let scaled = (prior_days as f64 * config.lapse_multiplier).floor() as u32;
    scaled.max(config.lapse_minimum_interval_days)
}

fn clamp_ease(permille: u32) -> u32 {
    permille.clamp(MIN_EASE_FACTOR, MAX_EASE_FACTOR)
}

/// Exact `ceil(interval × factor/1000)` without float rounding drift
fn ceil_mul_permille(interval_days: u32, factor_permille: u32) -> u32 {
    let product = interval_days as u64 * factor_permille as u64;
    ((product + 999) / 1000).min(u32::MAX as u64) as u32
}

fn ceil_mul(interval_days: u32, factor: f64) -> u32 {
    (interval_days as f64 * factor).ceil() as u32
}

/// Suspend pulls the card out of the active queue; reporting the event is
/// left to the session so that preview answers stay silent.
fn check_leech(card: &mut Card, config: &DeckConfig) -> bool {
    if card.lapses < config.leech_threshold {
        return false;
    }
    match config.leech_action {
        LeechAction::Suspend => card.suspend(),
        LeechAction::Tag => {}
    }
    true
}
