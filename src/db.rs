use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Flashcard, SessionType, StudySession};
use crate::store::CardStore;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database lock poisoned".to_string()))
    }

    pub fn init(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS flashcards (
                id TEXT PRIMARY KEY,
                front TEXT NOT NULL,
                back TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'general',
                interval_days INTEGER NOT NULL DEFAULT 1 CHECK(interval_days >= 1),
                ease_factor REAL NOT NULL DEFAULT 2.5 CHECK(ease_factor > 0),
                repetitions INTEGER NOT NULL DEFAULT 0,
                next_review TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_reviewed TEXT,
                review_count INTEGER NOT NULL DEFAULT 0,
                lapse_count INTEGER NOT NULL DEFAULT 0,
                position INTEGER NOT NULL DEFAULT 0
            );

            -- Finalized study sessions, written once
            CREATE TABLE IF NOT EXISTS study_sessions (
                id TEXT PRIMARY KEY,
                session_type TEXT NOT NULL CHECK(session_type IN ('flashcards')),
                start_time TEXT NOT NULL,
                end_time TEXT,
                duration_minutes INTEGER,
                cards_studied INTEGER NOT NULL DEFAULT 0,
                cards_lapsed INTEGER NOT NULL DEFAULT 0,
                completed INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_flashcards_next_review ON flashcards(next_review);
            CREATE INDEX IF NOT EXISTS idx_flashcards_category ON flashcards(category);
            CREATE INDEX IF NOT EXISTS idx_sessions_start ON study_sessions(start_time);
            "#,
        )?;

        debug!("database schema ready");

        Ok(())
    }

    fn load_flashcards(&self) -> Result<Vec<Flashcard>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, front, back, category, interval_days, ease_factor, repetitions,
                   next_review, created_at, last_reviewed, review_count, lapse_count
            FROM flashcards
            ORDER BY position, created_at
            "#,
        )?;

        let rows = stmt.query_map([], flashcard_from_row)?;
        let cards = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    fn replace_flashcards(&self, cards: &[Flashcard]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM flashcards", [])?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO flashcards (
                    id, front, back, category, interval_days, ease_factor, repetitions,
                    next_review, created_at, last_reviewed, review_count, lapse_count, position
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
            )?;
            for (position, card) in cards.iter().enumerate() {
                stmt.execute(params![
                    card.id,
                    card.front,
                    card.back,
                    card.category,
                    card.interval,
                    card.ease_factor,
                    card.repetitions,
                    card.next_review,
                    card.created,
                    card.last_reviewed,
                    card.review_count,
                    card.lapse_count,
                    position as i64,
                ])?;
            }
        }
        // Dropping an uncommitted transaction rolls back, so a failed insert
        // leaves the previous collection in place
        tx.commit()?;
        debug!(cards = cards.len(), "saved flashcards");
        Ok(())
    }

    fn load_sessions(&self) -> Result<Vec<StudySession>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, session_type, start_time, end_time, duration_minutes,
                   cards_studied, cards_lapsed, completed
            FROM study_sessions
            ORDER BY start_time DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let session_type_str: String = row.get(1)?;
            Ok((session_type_str, session_from_row(row)?))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (session_type_str, mut session) = row?;
            session.session_type = SessionType::from_str(&session_type_str).ok_or_else(|| {
                StoreError::Corrupt(format!("unknown session type '{}'", session_type_str))
            })?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    fn insert_session(&self, session: &StudySession) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO study_sessions (
                id, session_type, start_time, end_time, duration_minutes,
                cards_studied, cards_lapsed, completed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                session.id,
                session.session_type.as_str(),
                session.start_time,
                session.end_time,
                session.duration_minutes,
                session.cards_studied,
                session.cards_lapsed,
                session.completed,
            ],
        )?;
        debug!(session_id = %session.id, "saved study session");
        Ok(())
    }
}

fn flashcard_from_row(row: &Row<'_>) -> rusqlite::Result<Flashcard> {
    Ok(Flashcard {
        id: row.get(0)?,
        front: row.get(1)?,
        back: row.get(2)?,
        category: row.get(3)?,
        interval: row.get(4)?,
        ease_factor: row.get(5)?,
        repetitions: row.get(6)?,
        next_review: row.get(7)?,
        created: row.get(8)?,
        last_reviewed: row.get(9)?,
        review_count: row.get(10)?,
        lapse_count: row.get(11)?,
    })
}

// session_type is resolved by the caller so unknown values surface as Corrupt
fn session_from_row(row: &Row<'_>) -> rusqlite::Result<StudySession> {
    Ok(StudySession {
        id: row.get(0)?,
        session_type: SessionType::Flashcards,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
        duration_minutes: row.get(4)?,
        cards_studied: row.get(5)?,
        cards_lapsed: row.get(6)?,
        completed: row.get(7)?,
    })
}

#[async_trait]
impl CardStore for Database {
    async fn get_flashcards(&self) -> Result<Vec<Flashcard>, StoreError> {
        self.load_flashcards()
    }

    async fn save_flashcards(&self, cards: &[Flashcard]) -> Result<(), StoreError> {
        self.replace_flashcards(cards)
    }

    async fn get_study_sessions(&self) -> Result<Vec<StudySession>, StoreError> {
        self.load_sessions()
    }

    async fn save_study_session(&self, session: &StudySession) -> Result<(), StoreError> {
        self.insert_session(session)
    }
}
