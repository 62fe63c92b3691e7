//! Durable collection of flashcards and study sessions.
//!
//! Writes are atomic per call: a reader either sees the whole previous
//! collection or the whole new one.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Flashcard, StudySession};

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn get_flashcards(&self) -> Result<Vec<Flashcard>, StoreError>;

    /// Replace the stored flashcard collection with `cards`.
    async fn save_flashcards(&self, cards: &[Flashcard]) -> Result<(), StoreError>;

    async fn get_study_sessions(&self) -> Result<Vec<StudySession>, StoreError>;

    /// Record a finalized session. A session id can only be written once.
    async fn save_study_session(&self, session: &StudySession) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    cards: Vec<Flashcard>,
    sessions: Vec<StudySession>,
}

/// Process-local store, used for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cards(cards: Vec<Flashcard>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                cards,
                sessions: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CardStore for MemoryStore {
    async fn get_flashcards(&self) -> Result<Vec<Flashcard>, StoreError> {
        Ok(self.lock()?.cards.clone())
    }

    async fn save_flashcards(&self, cards: &[Flashcard]) -> Result<(), StoreError> {
        self.lock()?.cards = cards.to_vec();
        Ok(())
    }

    async fn get_study_sessions(&self) -> Result<Vec<StudySession>, StoreError> {
        Ok(self.lock()?.sessions.clone())
    }

    async fn save_study_session(&self, session: &StudySession) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.sessions.iter().any(|s| s.id == session.id) {
            return Err(StoreError::Corrupt(format!(
                "study session {} already recorded",
                session.id
            )));
        }
        state.sessions.push(session.clone());
        Ok(())
    }
}
