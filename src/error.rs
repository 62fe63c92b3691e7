use thiserror::Error;

/// Raised before any card is touched when a rating is outside the vocabulary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Invalid rating '{0}'. Use: again, hard, good, easy or perfect")]
    InvalidRating(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Flashcard {0} must not be empty")]
    EmptyField(&'static str),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt stored record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Why a rating was refused by the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutOfSequenceRating {
    AnswerNotRevealed,
    CardMismatch { expected: String, actual: String },
}

impl std::fmt::Display for OutOfSequenceRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutOfSequenceRating::AnswerNotRevealed => {
                write!(f, "answer must be revealed before rating")
            }
            OutOfSequenceRating::CardMismatch { expected, actual } => {
                write!(f, "expected rating for card {}, got {}", expected, actual)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No cards are due for review")]
    NoCardsDue,

    #[error("A study session is already active")]
    AlreadyActive,

    #[error("No study session is active")]
    NotActive,

    #[error("Rating out of sequence: {0}")]
    OutOfSequenceRating(OutOfSequenceRating),

    #[error("A save is already in progress for this session")]
    SaveInProgress,

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
