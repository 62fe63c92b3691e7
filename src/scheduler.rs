//! SM-2 style spaced repetition scheduling.
//!
//! Every function here is pure: callers pass `now` explicitly (normally read
//! from a [`Clock`](crate::clock::Clock)) and get new values back. Cards are
//! never mutated in place, which lets the session manager persist first and
//! commit second.
//!
//! Ratings map onto SM-2 quality like this:
//! - `again`: no recall, the card goes back to the start
//! - `hard`: recalled with serious difficulty, interval kept at least flat
//! - `good`: recalled after hesitation
//! - `easy` / `perfect`: recalled quickly, interval and ease grow faster

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Flashcard, Rating, StudySession, INITIAL_EASE_FACTOR, INITIAL_INTERVAL_DAYS};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Interval at which a card counts as mastered in statistics.
pub const MASTERED_INTERVAL_DAYS: i64 = 21;

/// Hard ceiling on any configured interval, roughly a thousand years.
pub const MAX_INTERVAL_CEILING_DAYS: i64 = 365_000;

/// A value per successful rating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuccessTable {
    pub hard: f64,
    pub good: f64,
    pub easy: f64,
    pub perfect: f64,
}

impl SuccessTable {
    fn get(&self, rating: Rating) -> f64 {
        match rating {
            Rating::Again => 0.0,
            Rating::Hard => self.hard,
            Rating::Good => self.good,
            Rating::Easy => self.easy,
            Rating::Perfect => self.perfect,
        }
    }
}

fn default_ease_bonus() -> SuccessTable {
    SuccessTable {
        hard: 0.0,
        good: 0.05,
        easy: 0.10,
        perfect: 0.15,
    }
}

fn default_interval_modifier() -> SuccessTable {
    SuccessTable {
        hard: 0.6,
        good: 1.0,
        easy: 1.3,
        perfect: 1.5,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerParams {
    pub initial_ease: f64,
    pub min_ease: f64,
    pub initial_interval_days: i64,
    pub failure_ease_penalty: f64,
    #[serde(default = "default_ease_bonus")]
    pub ease_bonus: SuccessTable,
    pub max_ease_delta: f64,
    #[serde(default = "default_interval_modifier")]
    pub interval_modifier: SuccessTable,
    pub max_interval_days: i64,
    pub at_risk_window_days: f64,
    pub near_floor_margin: f64,
    pub max_session_size: usize,
    pub load_sensitivity: f64,
    pub load_history: usize,
    pub comfortable_sessions_per_day: f64,
    pub fatigue_minutes: f64,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            initial_ease: INITIAL_EASE_FACTOR,
            min_ease: 1.3,
            initial_interval_days: INITIAL_INTERVAL_DAYS,
            failure_ease_penalty: 0.2,
            ease_bonus: default_ease_bonus(),
            max_ease_delta: 0.15,
            interval_modifier: default_interval_modifier(),
            max_interval_days: 36_500,
            at_risk_window_days: 1.0,
            near_floor_margin: 0.15,
            max_session_size: 20,
            load_sensitivity: 0.75,
            load_history: 10,
            comfortable_sessions_per_day: 4.0,
            fatigue_minutes: 30.0,
        }
    }
}

impl SchedulerParams {
    // Pull user-supplied values back inside the ranges the card invariants need
    fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.min_ease > 0.0 && self.min_ease.is_finite()) {
            self.min_ease = defaults.min_ease;
        }
        if !self.initial_ease.is_finite() {
            self.initial_ease = defaults.initial_ease;
        }
        self.initial_ease = self.initial_ease.max(self.min_ease);
        self.initial_interval_days = self
            .initial_interval_days
            .clamp(1, MAX_INTERVAL_CEILING_DAYS);
        self.max_interval_days = self
            .max_interval_days
            .clamp(self.initial_interval_days, MAX_INTERVAL_CEILING_DAYS);
        self.failure_ease_penalty = self.failure_ease_penalty.max(0.0);
        self.max_ease_delta = self.max_ease_delta.max(0.0);
        self.max_session_size = self.max_session_size.max(1);
        self.load_sensitivity = self.load_sensitivity.clamp(0.0, 1.0);
        self.load_history = self.load_history.max(1);
        if !(self.comfortable_sessions_per_day > 0.0) {
            self.comfortable_sessions_per_day = defaults.comfortable_sessions_per_day;
        }
        if !(self.fatigue_minutes > 0.0) {
            self.fatigue_minutes = defaults.fatigue_minutes;
        }
        self
    }
}

/// Result of scheduling one review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledReview {
    pub card: Flashcard,
    pub rating: Rating,
    pub previous_interval: i64,
    pub previous_ease: f64,
}

impl ScheduledReview {
    pub fn next_review(&self) -> DateTime<Utc> {
        self.card.next_review
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyStats {
    pub total_cards: usize,
    pub due_now: usize,
    pub at_risk: usize,
    pub mastered: usize,
    pub average_ease: f64,
    pub total_reviews: u64,
    pub total_lapses: u64,
    pub sessions: usize,
    pub cognitive_load: f64,
    pub recommended_session_size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    params: SchedulerParams,
}

impl Scheduler {
    pub fn new(params: SchedulerParams) -> Self {
        Self {
            params: params.normalized(),
        }
    }

    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    /// Compute the card's state after a review at `now`.
    ///
    /// The first successful review always lands on the initial interval so the
    /// algorithm gathers evidence before spacing out.
    pub fn schedule_next_review(
        &self,
        card: &Flashcard,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> ScheduledReview {
        let p = &self.params;
        let previous_interval = card.interval.max(1);
        let previous_ease = card.ease_factor;
        let mut next = card.clone();

        if rating.is_success() {
            let bonus = p.ease_bonus.get(rating).min(p.max_ease_delta);
            next.ease_factor = (previous_ease + bonus).max(p.min_ease);

            next.interval = if card.repetitions == 0 {
                p.initial_interval_days
            } else {
                let raw = previous_interval as f64
                    * next.ease_factor
                    * p.interval_modifier.get(rating);
                let candidate = if raw.is_finite() {
                    raw.round().min(p.max_interval_days as f64) as i64
                } else {
                    p.max_interval_days
                };
                let floor = if rating == Rating::Hard {
                    previous_interval
                } else {
                    previous_interval.saturating_add(1)
                };
                candidate.max(floor)
            };
            next.repetitions = card.repetitions.saturating_add(1);
        } else {
            next.repetitions = 0;
            next.interval = p.initial_interval_days;
            next.ease_factor = (previous_ease - p.failure_ease_penalty).max(p.min_ease);
            next.lapse_count = card.lapse_count.saturating_add(1);
        }

        next.interval = next.interval.clamp(1, p.max_interval_days);
        next.review_count = card.review_count.saturating_add(1);
        next.last_reviewed = Some(now);
        next.next_review = now
            .checked_add_signed(Duration::days(next.interval))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        debug!(
            card_id = %card.id,
            rating = %rating,
            interval = next.interval,
            ease = next.ease_factor,
            repetitions = next.repetitions,
            "scheduled review"
        );

        ScheduledReview {
            card: next,
            rating,
            previous_interval,
            previous_ease,
        }
    }

    /// Interval each rating would produce, in `Rating::ALL` order.
    pub fn preview_intervals(&self, card: &Flashcard, now: DateTime<Utc>) -> [(Rating, i64); 5] {
        Rating::ALL.map(|r| (r, self.schedule_next_review(card, r, now).card.interval))
    }

    pub fn is_card_due(&self, card: &Flashcard, now: DateTime<Utc>) -> bool {
        card.is_due(now)
    }

    /// Due cards, most overdue first.
    pub fn get_due_cards(&self, cards: &[Flashcard], now: DateTime<Utc>) -> Vec<Flashcard> {
        let mut due: Vec<Flashcard> = cards.iter().filter(|c| c.is_due(now)).cloned().collect();
        due.sort_by(|a, b| {
            a.next_review
                .cmp(&b.next_review)
                .then_with(|| a.id.cmp(&b.id))
        });
        due
    }

    /// Cards not yet due that look likely to be forgotten soon.
    ///
    /// A reviewed card qualifies when it falls due within a window that widens
    /// with its lapse rate, or when its ease sits near the floor. Cards that
    /// have never been reviewed carry no evidence and are skipped.
    pub fn get_at_risk_cards(&self, cards: &[Flashcard], now: DateTime<Utc>) -> Vec<Flashcard> {
        let p = &self.params;
        let mut flagged: Vec<(f64, &Flashcard)> = cards
            .iter()
            .filter(|c| !c.is_due(now) && c.review_count > 0)
            .filter_map(|c| {
                let remaining = (c.next_review - now).num_seconds() as f64 / SECONDS_PER_DAY;
                let window = p.at_risk_window_days * (1.0 + 2.0 * c.lapse_rate());
                let near_floor = c.ease_factor <= p.min_ease + p.near_floor_margin;
                (remaining <= window || near_floor).then_some((remaining, c))
            })
            .collect();

        flagged.sort_by(|(ra, a), (rb, b)| {
            ra.total_cmp(rb).then_with(|| a.id.cmp(&b.id))
        });
        flagged.into_iter().map(|(_, c)| c.clone()).collect()
    }

    /// Fatigue estimate in `[0, 1]` from the most recent sessions.
    pub fn calculate_cognitive_load(&self, sessions: &[StudySession]) -> f64 {
        let p = &self.params;
        let mut recent: Vec<&StudySession> = sessions.iter().collect();
        recent.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        recent.truncate(p.load_history);

        let Some(newest) = recent.first().map(|s| s.start_time) else {
            return 0.0;
        };
        let n = recent.len() as f64;

        let incomplete = recent.iter().filter(|s| !s.completed).count() as f64 / n;

        let studied: u64 = recent.iter().map(|s| s.cards_studied as u64).sum();
        let lapsed: u64 = recent.iter().map(|s| s.cards_lapsed as u64).sum();
        let failure = if studied == 0 {
            0.0
        } else {
            (lapsed as f64 / studied as f64).min(1.0)
        };

        let day_ago = newest - Duration::hours(24);
        let same_day = recent.iter().filter(|s| s.start_time >= day_ago).count() as f64;
        let frequency = (same_day / p.comfortable_sessions_per_day).min(1.0);

        let minutes: i64 = recent.iter().map(|s| s.duration_minutes.unwrap_or(0).max(0)).sum();
        let duration = (minutes as f64 / n / p.fatigue_minutes).min(1.0);

        let load = 0.35 * incomplete + 0.25 * failure + 0.25 * frequency + 0.15 * duration;
        load.clamp(0.0, 1.0)
    }

    /// How many cards the next session should hold.
    pub fn get_optimal_session_size(&self, cognitive_load: f64, due_count: usize) -> usize {
        if due_count == 0 {
            return 0;
        }
        let load = if cognitive_load.is_nan() {
            1.0
        } else {
            cognitive_load.clamp(0.0, 1.0)
        };
        let p = &self.params;
        let capacity =
            (p.max_session_size as f64 * (1.0 - load * p.load_sensitivity)).round() as usize;
        capacity.max(1).min(due_count)
    }

    pub fn summarize(
        &self,
        cards: &[Flashcard],
        sessions: &[StudySession],
        now: DateTime<Utc>,
    ) -> StudyStats {
        let due_now = cards.iter().filter(|c| c.is_due(now)).count();
        let cognitive_load = self.calculate_cognitive_load(sessions);
        let average_ease = if cards.is_empty() {
            0.0
        } else {
            cards.iter().map(|c| c.ease_factor).sum::<f64>() / cards.len() as f64
        };

        StudyStats {
            total_cards: cards.len(),
            due_now,
            at_risk: self.get_at_risk_cards(cards, now).len(),
            mastered: cards
                .iter()
                .filter(|c| c.interval >= MASTERED_INTERVAL_DAYS)
                .count(),
            average_ease,
            total_reviews: cards.iter().map(|c| c.review_count as u64).sum(),
            total_lapses: cards.iter().map(|c| c.lapse_count as u64).sum(),
            sessions: sessions.len(),
            cognitive_load,
            recommended_session_size: self.get_optimal_session_size(cognitive_load, due_now),
        }
    }
}

/// Render an interval in days as a short human label.
pub fn format_interval(days: i64) -> String {
    if days <= 0 {
        "now".to_string()
    } else if days < 7 {
        format!("{}d", days)
    } else if days < 30 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", days / 30)
    } else {
        format!("{}y", days / 365)
    }
}
