use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SchedulerError, ValidationError};

pub const DEFAULT_CATEGORY: &str = "general";
pub const INITIAL_EASE_FACTOR: f64 = 2.5;
pub const INITIAL_INTERVAL_DAYS: i64 = 1;

// Recall quality, ordered from worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again = 0,
    Hard = 1,
    Good = 2,
    Easy = 3,
    Perfect = 4,
}

impl Rating {
    pub const ALL: [Rating; 5] = [
        Rating::Again,
        Rating::Hard,
        Rating::Good,
        Rating::Easy,
        Rating::Perfect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
            Rating::Perfect => "perfect",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Rating::Again => "Again",
            Rating::Hard => "Hard",
            Rating::Good => "Good",
            Rating::Easy => "Easy",
            Rating::Perfect => "Perfect",
        }
    }

    pub fn is_success(&self) -> bool {
        *self > Rating::Again
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "again" | "a" | "0" => Ok(Rating::Again),
            "hard" | "h" | "1" => Ok(Rating::Hard),
            "good" | "g" | "2" => Ok(Rating::Good),
            "easy" | "e" | "3" => Ok(Rating::Easy),
            "perfect" | "p" | "4" => Ok(Rating::Perfect),
            _ => Err(SchedulerError::InvalidRating(s.to_string())),
        }
    }
}

impl TryFrom<u8> for Rating {
    type Error = SchedulerError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Rating::Again),
            1 => Ok(Rating::Hard),
            2 => Ok(Rating::Good),
            3 => Ok(Rating::Easy),
            4 => Ok(Rating::Perfect),
            _ => Err(SchedulerError::InvalidRating(v.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flashcard {
    pub id: String,
    pub front: String,
    pub back: String,
    pub category: String,
    pub interval: i64,
    pub ease_factor: f64,
    pub repetitions: u32,
    pub next_review: DateTime<Utc>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub last_reviewed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub lapse_count: u32,
}

impl Flashcard {
    pub fn new(
        front: &str,
        back: &str,
        category: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let front = front.trim();
        let back = back.trim();
        if front.is_empty() {
            return Err(ValidationError::EmptyField("front"));
        }
        if back.is_empty() {
            return Err(ValidationError::EmptyField("back"));
        }
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY);

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            front: front.to_string(),
            back: back.to_string(),
            category: category.to_string(),
            interval: INITIAL_INTERVAL_DAYS,
            ease_factor: INITIAL_EASE_FACTOR,
            repetitions: 0,
            next_review: now + Duration::days(INITIAL_INTERVAL_DAYS),
            created: now,
            last_reviewed: None,
            review_count: 0,
            lapse_count: 0,
        })
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }

    /// The instant `next_review` is measured from.
    pub fn anchor(&self) -> DateTime<Utc> {
        self.last_reviewed.unwrap_or(self.created)
    }

    pub fn lapse_rate(&self) -> f64 {
        if self.review_count == 0 {
            0.0
        } else {
            self.lapse_count as f64 / self.review_count as f64
        }
    }

    pub fn maturity_label(&self) -> &'static str {
        if self.review_count == 0 {
            "New"
        } else if self.repetitions == 0 {
            "Relearning"
        } else if self.interval < 7 {
            "Learning"
        } else if self.interval < 21 {
            "Young"
        } else {
            "Mature"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Flashcards,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Flashcards => "flashcards",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "flashcards" | "flashcard" => Some(SessionType::Flashcards),
            _ => None,
        }
    }
}

// A study session record, immutable once persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudySession {
    pub id: String,
    pub session_type: SessionType,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub cards_studied: u32,
    #[serde(default)]
    pub cards_lapsed: u32,
    pub completed: bool,
}

impl StudySession {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_type: SessionType::Flashcards,
            start_time: now,
            end_time: None,
            duration_minutes: None,
            cards_studied: 0,
            cards_lapsed: 0,
            completed: false,
        }
    }

    pub fn finalize(mut self, end: DateTime<Utc>, completed: bool) -> Self {
        let seconds = (end - self.start_time).num_seconds().max(0);
        self.end_time = Some(end);
        self.duration_minutes = Some((seconds + 30) / 60);
        self.completed = completed;
        self
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
