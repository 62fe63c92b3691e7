//! Study session state machine.
//!
//! A manager runs at most one session at a time:
//!
//! ```text
//! Idle --start--> Active --rate (last card) / abort--> Finishing --saved--> Idle
//! ```
//!
//! `rate` re-reads the card set, swaps in the rated card and persists the
//! result before touching in-memory state, so a failed write leaves the
//! session exactly where it was and the learner can retry. Cards added or
//! edited by other writers while a session is open are kept. A summary whose
//! write fails stays in `Finishing` until `finish` or `abort` manages to store
//! it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{OutOfSequenceRating, SessionError};
use crate::models::{Flashcard, Rating, StudySession};
use crate::scheduler::Scheduler;
use crate::store::CardStore;

#[derive(Debug, Clone, Serialize)]
pub struct SessionPlan {
    pub session_id: String,
    pub planned: usize,
    pub due: usize,
    pub cognitive_load: f64,
    pub first_card: Flashcard,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateOutcome {
    Next(Flashcard),
    Completed(StudySession),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    /// 1-based position of the card being shown
    pub position: usize,
    pub total: usize,
    pub studied: u32,
    pub lapsed: u32,
    pub answer_revealed: bool,
}

struct ActiveSession {
    record: StudySession,
    queue: Vec<Flashcard>,
    current_index: usize,
    answer_revealed: bool,
}

impl ActiveSession {
    fn current(&self) -> Option<&Flashcard> {
        self.queue.get(self.current_index)
    }
}

enum Phase {
    Idle,
    Active(ActiveSession),
    Finishing(StudySession),
}

pub struct SessionManager {
    store: Arc<dyn CardStore>,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
    phase: Mutex<Phase>,
    rating: AtomicBool,
}

/// Clears the rating flag when a `rate` call returns.
struct RatingGuard<'a>(&'a AtomicBool);

impl Drop for RatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SessionManager {
    pub fn new(store: Arc<dyn CardStore>, scheduler: Scheduler, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            scheduler,
            clock,
            phase: Mutex::new(Phase::Idle),
            rating: AtomicBool::new(false),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Select the due cards for a new session, sized by recent cognitive load.
    pub async fn start(&self) -> Result<SessionPlan, SessionError> {
        let mut phase = self.phase.lock().await;
        if !matches!(*phase, Phase::Idle) {
            return Err(SessionError::AlreadyActive);
        }

        let now = self.clock.now();
        let deck = self.store.get_flashcards().await?;
        let history = self.store.get_study_sessions().await?;

        let cognitive_load = self.scheduler.calculate_cognitive_load(&history);
        let due = self.scheduler.get_due_cards(&deck, now);
        if due.is_empty() {
            return Err(SessionError::NoCardsDue);
        }
        let due_count = due.len();
        let planned = self
            .scheduler
            .get_optimal_session_size(cognitive_load, due_count);
        let queue: Vec<Flashcard> = due.into_iter().take(planned).collect();
        let first_card = queue[0].clone();
        let record = StudySession::start(now);

        info!(
            session_id = %record.id,
            planned,
            due = due_count,
            cognitive_load,
            "study session started"
        );

        let plan = SessionPlan {
            session_id: record.id.clone(),
            planned,
            due: due_count,
            cognitive_load,
            first_card,
        };
        *phase = Phase::Active(ActiveSession {
            record,
            queue,
            current_index: 0,
            answer_revealed: false,
        });
        Ok(plan)
    }

    pub async fn current_card(&self) -> Option<Flashcard> {
        match &*self.phase.lock().await {
            Phase::Active(active) => active.current().cloned(),
            _ => None,
        }
    }

    pub async fn reveal_answer(&self) -> Result<Flashcard, SessionError> {
        let mut phase = self.phase.lock().await;
        let Phase::Active(active) = &mut *phase else {
            return Err(SessionError::NotActive);
        };
        active.answer_revealed = true;
        active.current().cloned().ok_or(SessionError::NotActive)
    }

    /// Rate the card currently shown.
    ///
    /// Rejected with `SaveInProgress` while another rating for this session is
    /// still being saved. When the last card is rated the summary is written too;
    /// if that write fails the rating itself is already stored and
    /// [`finish`](Self::finish) retries the summary.
    pub async fn rate(&self, card_id: &str, rating: Rating) -> Result<RateOutcome, SessionError> {
        if self
            .rating
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(SessionError::SaveInProgress);
        }
        let _rating = RatingGuard(&self.rating);

        let mut phase = self.phase.lock().await;
        let Phase::Active(active) = &mut *phase else {
            return Err(SessionError::NotActive);
        };
        let current = active.current().ok_or(SessionError::NotActive)?;
        if current.id != card_id {
            return Err(SessionError::OutOfSequenceRating(
                OutOfSequenceRating::CardMismatch {
                    expected: current.id.clone(),
                    actual: card_id.to_string(),
                },
            ));
        }
        if !active.answer_revealed {
            return Err(SessionError::OutOfSequenceRating(
                OutOfSequenceRating::AnswerNotRevealed,
            ));
        }

        let now = self.clock.now();
        let mut deck = match self.store.get_flashcards().await {
            Ok(deck) => deck,
            Err(e) => {
                warn!(card_id, error = %e, "failed to load cards, session unchanged");
                return Err(e.into());
            }
        };
        // A card deleted elsewhere stays deleted; the rating still counts
        match deck.iter_mut().find(|c| c.id == card_id) {
            Some(stored) => {
                *stored = self
                    .scheduler
                    .schedule_next_review(stored, rating, now)
                    .card;
            }
            None => warn!(card_id, "rated card no longer in store"),
        }

        if let Err(e) = self.store.save_flashcards(&deck).await {
            warn!(card_id, error = %e, "failed to save rating, session unchanged");
            return Err(e.into());
        }

        active.record.cards_studied += 1;
        if rating == Rating::Again {
            active.record.cards_lapsed += 1;
        }
        active.current_index += 1;
        active.answer_revealed = false;

        if let Some(next) = active.current() {
            return Ok(RateOutcome::Next(next.clone()));
        }

        let summary = active.record.clone().finalize(now, true);
        *phase = Phase::Finishing(summary);
        self.persist_summary(&mut phase).await.map(RateOutcome::Completed)
    }

    /// End the session early. A no-op when nothing is running.
    ///
    /// Waits for an in-flight rating save before finalizing, so the last
    /// rating is counted.
    pub async fn abort(&self) -> Result<Option<StudySession>, SessionError> {
        let mut phase = self.phase.lock().await;
        match std::mem::replace(&mut *phase, Phase::Idle) {
            Phase::Idle => Ok(None),
            Phase::Active(active) => {
                let summary = active.record.finalize(self.clock.now(), false);
                *phase = Phase::Finishing(summary);
                self.persist_summary(&mut phase).await.map(Some)
            }
            Phase::Finishing(summary) => {
                *phase = Phase::Finishing(summary);
                self.persist_summary(&mut phase).await.map(Some)
            }
        }
    }

    /// Retry storing a finalized summary whose earlier write failed.
    pub async fn finish(&self) -> Result<Option<StudySession>, SessionError> {
        let mut phase = self.phase.lock().await;
        if matches!(*phase, Phase::Finishing(_)) {
            self.persist_summary(&mut phase).await.map(Some)
        } else {
            Ok(None)
        }
    }

    pub async fn progress(&self) -> Option<SessionProgress> {
        match &*self.phase.lock().await {
            Phase::Active(active) => Some(SessionProgress {
                position: active.current_index + 1,
                total: active.queue.len(),
                studied: active.record.cards_studied,
                lapsed: active.record.cards_lapsed,
                answer_revealed: active.answer_revealed,
            }),
            _ => None,
        }
    }

    pub async fn is_active(&self) -> bool {
        matches!(*self.phase.lock().await, Phase::Active(_))
    }

    pub async fn is_finishing(&self) -> bool {
        matches!(*self.phase.lock().await, Phase::Finishing(_))
    }

    async fn persist_summary(&self, phase: &mut Phase) -> Result<StudySession, SessionError> {
        let Phase::Finishing(summary) = phase else {
            return Err(SessionError::NotActive);
        };
        match self.store.save_study_session(summary).await {
            Ok(()) => {
                info!(
                    session_id = %summary.id,
                    cards_studied = summary.cards_studied,
                    completed = summary.completed,
                    duration_minutes = summary.duration_minutes.unwrap_or(0),
                    "study session finished"
                );
                let saved = summary.clone();
                *phase = Phase::Idle;
                Ok(saved)
            }
            Err(e) => {
                warn!(session_id = %summary.id, error = %e, "failed to save session summary");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tokio::sync::Notify;

    use crate::clock::FixedClock;
    use crate::error::StoreError;
    use crate::store::MemoryStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
    }

    // Cards created two days ago, so all are due at t0
    fn due_cards(n: usize) -> Vec<Flashcard> {
        (0..n)
            .map(|i| {
                let mut c = Flashcard::new(&format!("q{}", i), &format!("a{}", i), None, t0() - Duration::days(2))
                    .unwrap();
                c.next_review = t0() - Duration::hours(n as i64 - i as i64);
                c
            })
            .collect()
    }

    /// Store that can be told to fail writes.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_cards: AtomicBool,
        fail_sessions: AtomicBool,
        card_saves: AtomicUsize,
    }

    #[async_trait]
    impl CardStore for FlakyStore {
        async fn get_flashcards(&self) -> Result<Vec<Flashcard>, StoreError> {
            self.inner.get_flashcards().await
        }

        async fn save_flashcards(&self, cards: &[Flashcard]) -> Result<(), StoreError> {
            self.card_saves.fetch_add(1, Ordering::SeqCst);
            if self.fail_cards.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.save_flashcards(cards).await
        }

        async fn get_study_sessions(&self) -> Result<Vec<StudySession>, StoreError> {
            self.inner.get_study_sessions().await
        }

        async fn save_study_session(&self, session: &StudySession) -> Result<(), StoreError> {
            if self.fail_sessions.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.save_study_session(session).await
        }
    }

    /// Store whose card saves block until released.
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CardStore for GatedStore {
        async fn get_flashcards(&self) -> Result<Vec<Flashcard>, StoreError> {
            self.inner.get_flashcards().await
        }

        async fn save_flashcards(&self, cards: &[Flashcard]) -> Result<(), StoreError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.save_flashcards(cards).await
        }

        async fn get_study_sessions(&self) -> Result<Vec<StudySession>, StoreError> {
            self.inner.get_study_sessions().await
        }

        async fn save_study_session(&self, session: &StudySession) -> Result<(), StoreError> {
            self.inner.save_study_session(session).await
        }
    }

    fn manager_with(store: Arc<dyn CardStore>, clock: Arc<FixedClock>) -> SessionManager {
        SessionManager::new(store, Scheduler::default(), clock)
    }

    async fn flaky(cards: Vec<Flashcard>) -> (Arc<FlakyStore>, SessionManager, Arc<FixedClock>) {
        let store = Arc::new(FlakyStore::default());
        store.inner.save_flashcards(&cards).await.unwrap();
        let clock = Arc::new(FixedClock::new(t0()));
        let manager = manager_with(store.clone(), clock.clone());
        (store, manager, clock)
    }

    mod start_tests {
        use super::*;

        #[tokio::test]
        async fn start_without_due_cards_fails() {
            let mut cards = due_cards(2);
            for c in &mut cards {
                c.next_review = t0() + Duration::days(1);
            }
            let (_, manager, _) = flaky(cards).await;
            assert!(matches!(manager.start().await, Err(SessionError::NoCardsDue)));
            assert!(!manager.is_active().await);
        }

        #[tokio::test]
        async fn start_with_empty_store_fails() {
            let (_, manager, _) = flaky(Vec::new()).await;
            assert!(matches!(manager.start().await, Err(SessionError::NoCardsDue)));
        }

        #[tokio::test]
        async fn start_picks_most_overdue_first() {
            let cards = due_cards(3);
            let (_, manager, _) = flaky(cards.clone()).await;
            let plan = manager.start().await.unwrap();
            assert_eq!(plan.due, 3);
            assert_eq!(plan.planned, 3);
            assert_eq!(plan.first_card.id, cards[0].id);
            assert_eq!(manager.current_card().await.unwrap().id, cards[0].id);
        }

        #[tokio::test]
        async fn start_caps_at_session_size() {
            let (_, manager, _) = flaky(due_cards(50)).await;
            let plan = manager.start().await.unwrap();
            assert_eq!(plan.due, 50);
            assert_eq!(plan.planned, 20);
            assert_eq!(manager.progress().await.unwrap().total, 20);
        }

        #[tokio::test]
        async fn heavy_history_shrinks_session() {
            let (store, manager, _) = flaky(due_cards(50)).await;
            for i in 0..4 {
                let start = t0() - Duration::hours(2 * i + 1);
                let mut s = StudySession::start(start);
                s.cards_studied = 10;
                s.cards_lapsed = 8;
                let s = s.finalize(start + Duration::minutes(50), false);
                store.inner.save_study_session(&s).await.unwrap();
            }
            let plan = manager.start().await.unwrap();
            assert!(plan.cognitive_load > 0.8);
            assert!(plan.planned < 20);
            assert!(plan.planned >= 1);
        }

        #[tokio::test]
        async fn second_start_is_rejected() {
            let (_, manager, _) = flaky(due_cards(2)).await;
            manager.start().await.unwrap();
            assert!(matches!(manager.start().await, Err(SessionError::AlreadyActive)));
        }
    }

    mod rate_tests {
        use super::*;

        #[tokio::test]
        async fn rate_requires_reveal() {
            let (store, manager, _) = flaky(due_cards(2)).await;
            let plan = manager.start().await.unwrap();
            let result = manager.rate(&plan.first_card.id, Rating::Good).await;
            assert!(matches!(
                result,
                Err(SessionError::OutOfSequenceRating(OutOfSequenceRating::AnswerNotRevealed))
            ));
            assert_eq!(store.card_saves.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn rate_rejects_wrong_card() {
            let cards = due_cards(2);
            let (_, manager, _) = flaky(cards.clone()).await;
            manager.start().await.unwrap();
            manager.reveal_answer().await.unwrap();
            let result = manager.rate(&cards[1].id, Rating::Good).await;
            assert!(matches!(
                result,
                Err(SessionError::OutOfSequenceRating(OutOfSequenceRating::CardMismatch { .. }))
            ));
        }

        #[tokio::test]
        async fn rate_without_session_fails() {
            let (_, manager, _) = flaky(due_cards(1)).await;
            assert!(matches!(
                manager.rate("nope", Rating::Good).await,
                Err(SessionError::NotActive)
            ));
            assert!(matches!(
                manager.reveal_answer().await,
                Err(SessionError::NotActive)
            ));
        }

        #[tokio::test]
        async fn each_rating_schedules_and_saves_once() {
            let cards = due_cards(3);
            let (store, manager, _) = flaky(cards.clone()).await;
            manager.start().await.unwrap();

            let revealed = manager.reveal_answer().await.unwrap();
            assert_eq!(revealed.back, "a0");
            let outcome = manager.rate(&cards[0].id, Rating::Again).await.unwrap();
            assert_eq!(outcome, RateOutcome::Next(cards[1].clone()));
            assert_eq!(store.card_saves.load(Ordering::SeqCst), 1);

            let stored = store.get_flashcards().await.unwrap();
            let rated = stored.iter().find(|c| c.id == cards[0].id).unwrap();
            assert_eq!(rated.repetitions, 0);
            assert_eq!(rated.lapse_count, 1);
            assert_eq!(rated.next_review, t0() + Duration::days(1));
            assert_eq!(stored.len(), 3);

            let progress = manager.progress().await.unwrap();
            assert_eq!(progress.position, 2);
            assert_eq!(progress.studied, 1);
            assert_eq!(progress.lapsed, 1);
            assert!(!progress.answer_revealed);
        }

        #[tokio::test]
        async fn same_card_cannot_be_rated_twice() {
            let cards = due_cards(2);
            let (_, manager, _) = flaky(cards.clone()).await;
            manager.start().await.unwrap();
            manager.reveal_answer().await.unwrap();
            manager.rate(&cards[0].id, Rating::Good).await.unwrap();
            manager.reveal_answer().await.unwrap();
            assert!(matches!(
                manager.rate(&cards[0].id, Rating::Good).await,
                Err(SessionError::OutOfSequenceRating(_))
            ));
        }

        #[tokio::test]
        async fn completing_session_persists_summary() {
            let cards = due_cards(2);
            let (store, manager, clock) = flaky(cards.clone()).await;
            manager.start().await.unwrap();

            manager.reveal_answer().await.unwrap();
            manager.rate(&cards[0].id, Rating::Good).await.unwrap();
            clock.advance(Duration::minutes(4));
            manager.reveal_answer().await.unwrap();
            let outcome = manager.rate(&cards[1].id, Rating::Again).await.unwrap();

            let RateOutcome::Completed(summary) = outcome else {
                panic!("Expected completed session");
            };
            assert!(summary.completed);
            assert_eq!(summary.cards_studied, 2);
            assert_eq!(summary.cards_lapsed, 1);
            assert_eq!(summary.duration_minutes, Some(4));
            assert_eq!(store.get_study_sessions().await.unwrap(), vec![summary]);
            assert!(!manager.is_active().await);
            assert!(manager.current_card().await.is_none());
        }

        #[tokio::test]
        async fn failed_save_keeps_session_for_retry() {
            let cards = due_cards(2);
            let (store, manager, _) = flaky(cards.clone()).await;
            manager.start().await.unwrap();
            manager.reveal_answer().await.unwrap();

            store.fail_cards.store(true, Ordering::SeqCst);
            let result = manager.rate(&cards[0].id, Rating::Easy).await;
            assert!(matches!(result, Err(SessionError::Persistence(_))));

            // Nothing moved: same card, still revealed, store untouched
            assert_eq!(manager.current_card().await.unwrap().id, cards[0].id);
            let progress = manager.progress().await.unwrap();
            assert_eq!(progress.studied, 0);
            assert!(progress.answer_revealed);
            assert_eq!(store.get_flashcards().await.unwrap(), cards);

            store.fail_cards.store(false, Ordering::SeqCst);
            let outcome = manager.rate(&cards[0].id, Rating::Easy).await.unwrap();
            assert_eq!(outcome, RateOutcome::Next(cards[1].clone()));
            assert_eq!(manager.progress().await.unwrap().studied, 1);
        }

        #[tokio::test]
        async fn failed_summary_save_can_be_retried() {
            let cards = due_cards(1);
            let (store, manager, _) = flaky(cards.clone()).await;
            manager.start().await.unwrap();
            manager.reveal_answer().await.unwrap();

            store.fail_sessions.store(true, Ordering::SeqCst);
            let result = manager.rate(&cards[0].id, Rating::Good).await;
            assert!(matches!(result, Err(SessionError::Persistence(_))));
            assert!(manager.is_finishing().await);
            // The rating itself is stored
            assert_eq!(store.get_flashcards().await.unwrap()[0].repetitions, 1);

            store.fail_sessions.store(false, Ordering::SeqCst);
            let summary = manager.finish().await.unwrap().unwrap();
            assert!(summary.completed);
            assert_eq!(summary.cards_studied, 1);
            assert!(!manager.is_finishing().await);
            assert_eq!(manager.finish().await.unwrap(), None);
        }
    }

    mod external_write_tests {
        use super::*;

        #[tokio::test]
        async fn card_added_mid_session_survives_rating() {
            let cards = due_cards(1);
            let (store, manager, _) = flaky(cards.clone()).await;
            manager.start().await.unwrap();

            let added = Flashcard::new("new", "card", None, t0()).unwrap();
            let mut updated = store.get_flashcards().await.unwrap();
            updated.push(added.clone());
            store.inner.save_flashcards(&updated).await.unwrap();

            manager.reveal_answer().await.unwrap();
            manager.rate(&cards[0].id, Rating::Good).await.unwrap();

            let stored = store.get_flashcards().await.unwrap();
            assert_eq!(stored.len(), 2);
            assert!(stored.contains(&added));
            let rated = stored.iter().find(|c| c.id == cards[0].id).unwrap();
            assert_eq!(rated.repetitions, 1);
        }

        #[tokio::test]
        async fn rating_builds_on_latest_stored_card() {
            let cards = due_cards(2);
            let (store, manager, _) = flaky(cards.clone()).await;
            manager.start().await.unwrap();

            // Another writer edits the queued card's text
            let mut updated = store.get_flashcards().await.unwrap();
            updated[0].back = "edited".to_string();
            updated[1].front = "also edited".to_string();
            store.inner.save_flashcards(&updated).await.unwrap();

            manager.reveal_answer().await.unwrap();
            manager.rate(&cards[0].id, Rating::Easy).await.unwrap();

            let stored = store.get_flashcards().await.unwrap();
            assert_eq!(stored[0].back, "edited");
            assert_eq!(stored[0].review_count, 1);
            assert_eq!(stored[1].front, "also edited");
        }

        #[tokio::test]
        async fn card_deleted_mid_session_stays_deleted() {
            let cards = due_cards(2);
            let (store, manager, _) = flaky(cards.clone()).await;
            manager.start().await.unwrap();
            store.inner.save_flashcards(&cards[1..]).await.unwrap();

            manager.reveal_answer().await.unwrap();
            let outcome = manager.rate(&cards[0].id, Rating::Good).await.unwrap();
            assert_eq!(outcome, RateOutcome::Next(cards[1].clone()));

            assert_eq!(store.get_flashcards().await.unwrap(), cards[1..].to_vec());
            assert_eq!(manager.progress().await.unwrap().studied, 1);
        }
    }

    mod abort_tests {
        use super::*;

        #[tokio::test]
        async fn abort_records_incomplete_session() {
            let cards = due_cards(3);
            let (store, manager, clock) = flaky(cards.clone()).await;
            manager.start().await.unwrap();
            manager.reveal_answer().await.unwrap();
            manager.rate(&cards[0].id, Rating::Good).await.unwrap();
            clock.advance(Duration::minutes(2));

            let summary = manager.abort().await.unwrap().unwrap();
            assert!(!summary.completed);
            assert_eq!(summary.cards_studied, 1);
            assert_eq!(summary.duration_minutes, Some(2));
            assert_eq!(store.get_study_sessions().await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn abort_is_idempotent() {
            let (store, manager, _) = flaky(due_cards(2)).await;
            assert_eq!(manager.abort().await.unwrap(), None);

            manager.start().await.unwrap();
            assert!(manager.abort().await.unwrap().is_some());
            assert_eq!(manager.abort().await.unwrap(), None);
            assert_eq!(store.get_study_sessions().await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn abort_retries_pending_summary() {
            let (store, manager, _) = flaky(due_cards(2)).await;
            manager.start().await.unwrap();
            store.fail_sessions.store(true, Ordering::SeqCst);
            assert!(manager.abort().await.is_err());
            assert!(manager.is_finishing().await);

            store.fail_sessions.store(false, Ordering::SeqCst);
            let summary = manager.abort().await.unwrap().unwrap();
            assert!(!summary.completed);
            assert!(!manager.is_finishing().await);
        }

        #[tokio::test]
        async fn new_session_after_abort() {
            let (_, manager, _) = flaky(due_cards(2)).await;
            manager.start().await.unwrap();
            manager.abort().await.unwrap();
            assert!(manager.start().await.is_ok());
        }
    }

    mod concurrency_tests {
        use super::*;

        #[tokio::test]
        async fn rate_rejected_while_save_in_flight_and_abort_waits() {
            let cards = due_cards(2);
            let store = Arc::new(GatedStore::default());
            store.inner.save_flashcards(&cards).await.unwrap();
            let clock = Arc::new(FixedClock::new(t0()));
            let manager = Arc::new(manager_with(store.clone(), clock));

            manager.start().await.unwrap();
            manager.reveal_answer().await.unwrap();

            let first = {
                let manager = manager.clone();
                let id = cards[0].id.clone();
                tokio::spawn(async move { manager.rate(&id, Rating::Good).await })
            };
            store.entered.notified().await;

            assert!(matches!(
                manager.rate(&cards[0].id, Rating::Good).await,
                Err(SessionError::SaveInProgress)
            ));

            let abort = {
                let manager = manager.clone();
                tokio::spawn(async move { manager.abort().await })
            };
            tokio::task::yield_now().await;
            assert!(!abort.is_finished());

            store.release.notify_one();
            let outcome = first.await.unwrap().unwrap();
            assert_eq!(outcome, RateOutcome::Next(cards[1].clone()));

            let summary = abort.await.unwrap().unwrap().unwrap();
            assert_eq!(summary.cards_studied, 1);
            assert!(!summary.completed);
        }

        #[tokio::test]
        async fn rate_waits_for_readers_instead_of_failing() {
            let cards = due_cards(2);
            let (_, manager, _) = flaky(cards.clone()).await;
            let manager = Arc::new(manager);
            manager.start().await.unwrap();
            manager.reveal_answer().await.unwrap();

            // Hold the state lock the way a progress poll would
            let reader = manager.phase.lock().await;
            let rating = {
                let manager = manager.clone();
                let id = cards[0].id.clone();
                tokio::spawn(async move { manager.rate(&id, Rating::Good).await })
            };
            tokio::task::yield_now().await;
            assert!(!rating.is_finished());
            drop(reader);

            let outcome = rating.await.unwrap().unwrap();
            assert_eq!(outcome, RateOutcome::Next(cards[1].clone()));
        }

        #[tokio::test]
        async fn flag_clears_after_failed_rating() {
            let cards = due_cards(2);
            let (store, manager, _) = flaky(cards.clone()).await;
            manager.start().await.unwrap();
            manager.reveal_answer().await.unwrap();

            store.fail_cards.store(true, Ordering::SeqCst);
            assert!(matches!(
                manager.rate(&cards[0].id, Rating::Good).await,
                Err(SessionError::Persistence(_))
            ));
            store.fail_cards.store(false, Ordering::SeqCst);
            assert!(manager.rate(&cards[0].id, Rating::Good).await.is_ok());
        }
    }
}
