//! Spaced-repetition scheduling with cognitive-load aware study sessions.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use db::Database;
pub use error::{ConfigError, SchedulerError, SessionError, StoreError, ValidationError};
pub use models::{Flashcard, Rating, StudySession};
pub use scheduler::{Scheduler, SchedulerParams};
pub use session::SessionManager;
pub use store::{CardStore, MemoryStore};
