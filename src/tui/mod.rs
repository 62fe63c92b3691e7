mod ui;
mod widgets;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::warn;

use neurolearn::clock::Clock;
use neurolearn::error::SessionError;
use neurolearn::models::{Flashcard, Rating, StudySession};
use neurolearn::scheduler::{Scheduler, StudyStats};
use neurolearn::session::{RateOutcome, SessionManager, SessionPlan, SessionProgress};
use neurolearn::store::CardStore;

const DASHBOARD_LIST_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Cards,
    Study,
}

impl View {
    fn toggle(&self) -> Self {
        match self {
            View::Dashboard => View::Cards,
            View::Cards => View::Dashboard,
            View::Study => View::Study,
        }
    }
}

pub struct StatefulList<T> {
    pub items: Vec<T>,
    pub selected: Option<usize>,
}

impl<T> StatefulList<T> {
    fn with_items(items: Vec<T>) -> Self {
        let selected = if items.is_empty() { None } else { Some(0) };
        Self { items, selected }
    }

    fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(i) if i + 1 < self.items.len() => i + 1,
            _ => 0,
        };
        self.selected = Some(i);
    }

    fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(0) | None => self.items.len() - 1,
            Some(i) => i - 1,
        };
        self.selected = Some(i);
    }

    pub fn selected_item(&self) -> Option<&T> {
        self.selected.and_then(|i| self.items.get(i))
    }
}

/// What the study view shows for the card in front of the learner.
pub struct StudyScreen {
    pub plan: SessionPlan,
    pub card: Flashcard,
    pub progress: SessionProgress,
    pub previews: [(Rating, i64); 5],
}

pub struct App {
    store: Arc<dyn CardStore>,
    session: SessionManager,
    clock: Arc<dyn Clock>,
    pub view: View,
    pub stats: StudyStats,
    pub due: Vec<Flashcard>,
    pub at_risk: Vec<Flashcard>,
    pub recent_sessions: Vec<StudySession>,
    pub cards: StatefulList<Flashcard>,
    pub study: Option<StudyScreen>,
    pub status: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub async fn new(
        store: Arc<dyn CardStore>,
        scheduler: Scheduler,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let stats = scheduler.summarize(&[], &[], clock.now());
        let session = SessionManager::new(store.clone(), scheduler, clock.clone());
        let mut app = Self {
            store,
            session,
            clock,
            view: View::Dashboard,
            stats,
            due: Vec::new(),
            at_risk: Vec::new(),
            recent_sessions: Vec::new(),
            cards: StatefulList::with_items(Vec::new()),
            study: None,
            status: None,
            should_quit: false,
        };
        app.refresh_data().await?;
        Ok(app)
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.session.scheduler()
    }

    pub async fn refresh_data(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let now = self.clock.now();
        let cards = self.store.get_flashcards().await?;
        let sessions = self.store.get_study_sessions().await?;
        let scheduler = self.session.scheduler();

        self.stats = scheduler.summarize(&cards, &sessions, now);
        self.due = scheduler.get_due_cards(&cards, now);
        self.due.truncate(DASHBOARD_LIST_LEN);
        self.at_risk = scheduler.get_at_risk_cards(&cards, now);
        self.at_risk.truncate(DASHBOARD_LIST_LEN);

        let mut recent = sessions;
        recent.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        recent.truncate(DASHBOARD_LIST_LEN);
        self.recent_sessions = recent;

        let selected = self.cards.selected;
        self.cards = StatefulList::with_items(cards);
        if let Some(i) = selected {
            if i < self.cards.items.len() {
                self.cards.selected = Some(i);
            }
        }
        Ok(())
    }

    async fn start_session(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        match self.session.start().await {
            Ok(plan) => {
                self.status = Some(format!(
                    "Studying {} of {} due cards (load {:.0}%)",
                    plan.planned,
                    plan.due,
                    plan.cognitive_load * 100.0
                ));
                self.view = View::Study;
                self.sync_study(plan).await;
            }
            Err(SessionError::NoCardsDue) => {
                self.status = Some("No cards due right now".to_string());
            }
            Err(e) => self.status = Some(e.to_string()),
        }
        Ok(())
    }

    async fn sync_study(&mut self, plan: SessionPlan) {
        let card = self.session.current_card().await;
        let progress = self.session.progress().await;
        self.study = match (card, progress) {
            (Some(card), Some(progress)) => {
                let previews = self.scheduler().preview_intervals(&card, self.clock.now());
                Some(StudyScreen {
                    plan,
                    card,
                    progress,
                    previews,
                })
            }
            _ => None,
        };
    }

    async fn reveal(&mut self) {
        if let Err(e) = self.session.reveal_answer().await {
            self.status = Some(e.to_string());
            return;
        }
        if let Some(study) = self.study.take() {
            self.sync_study(study.plan).await;
        }
    }

    async fn rate(&mut self, rating: Rating) -> Result<(), Box<dyn std::error::Error>> {
        let Some(study) = self.study.take() else {
            return Ok(());
        };
        let card_id = study.card.id.clone();
        let plan = study.plan.clone();
        self.study = Some(study);

        match self.session.rate(&card_id, rating).await {
            Ok(RateOutcome::Next(_)) => {
                self.status = Some(format!("Rated {}", rating.label()));
                self.sync_study(plan).await;
            }
            Ok(RateOutcome::Completed(summary)) => {
                self.finish_study(&summary).await?;
            }
            Err(e) => {
                self.status = Some(if self.session.is_finishing().await {
                    format!("Session summary not saved ({}), press r to retry", e)
                } else {
                    e.to_string()
                });
            }
        }
        Ok(())
    }

    async fn retry_finish(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        match self.session.finish().await {
            Ok(Some(summary)) => self.finish_study(&summary).await?,
            Ok(None) => {}
            Err(e) => self.status = Some(format!("Session summary not saved ({}), press r to retry", e)),
        }
        Ok(())
    }

    async fn abort(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        match self.session.abort().await {
            Ok(Some(summary)) => self.finish_study(&summary).await?,
            Ok(None) => {
                self.study = None;
                self.view = View::Dashboard;
            }
            Err(e) => self.status = Some(format!("Session summary not saved ({}), press r to retry", e)),
        }
        Ok(())
    }

    async fn finish_study(&mut self, summary: &StudySession) -> Result<(), Box<dyn std::error::Error>> {
        self.status = Some(format!(
            "Session {}: {} cards, {} lapses, {} min",
            if summary.completed { "complete" } else { "ended early" },
            summary.cards_studied,
            summary.cards_lapsed,
            summary.duration_minutes.unwrap_or(0)
        ));
        self.study = None;
        self.view = View::Dashboard;
        self.refresh_data().await
    }

    async fn quit(&mut self) {
        if self.view == View::Study {
            if let Err(e) = self.session.abort().await {
                warn!(error = %e, "session summary lost on quit");
            }
        }
        self.should_quit = true;
    }

    async fn handle_key(
        &mut self,
        key: KeyCode,
        modifiers: KeyModifiers,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if key == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
            self.quit().await;
            return Ok(());
        }

        if self.view == View::Study {
            return self.handle_study_key(key).await;
        }

        match key {
            KeyCode::Char('q') => self.quit().await,

            KeyCode::Char('r') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.refresh_data().await?;
            }

            KeyCode::Char('s') | KeyCode::Enter if self.view == View::Dashboard => {
                self.start_session().await?;
            }

            KeyCode::Char('h') | KeyCode::Left | KeyCode::Char('l') | KeyCode::Right => {
                self.view = self.view.toggle();
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.view = self.view.toggle();
            }

            KeyCode::Char('j') | KeyCode::Down if self.view == View::Cards => self.cards.next(),
            KeyCode::Char('k') | KeyCode::Up if self.view == View::Cards => {
                self.cards.previous()
            }
            KeyCode::Char('g') if self.view == View::Cards && !self.cards.items.is_empty() => {
                self.cards.selected = Some(0);
            }
            KeyCode::Char('G') if self.view == View::Cards && !self.cards.items.is_empty() => {
                self.cards.selected = Some(self.cards.items.len() - 1);
            }

            _ => {}
        }
        Ok(())
    }

    async fn handle_study_key(&mut self, key: KeyCode) -> Result<(), Box<dyn std::error::Error>> {
        if self.session.is_finishing().await {
            match key {
                KeyCode::Char('r') => self.retry_finish().await?,
                KeyCode::Char('q') => self.quit().await,
                _ => {}
            }
            return Ok(());
        }

        match key {
            KeyCode::Char(' ') => self.reveal().await,
            KeyCode::Char(c @ '1'..='5') => {
                let revealed = self
                    .study
                    .as_ref()
                    .map_or(false, |s| s.progress.answer_revealed);
                if !revealed {
                    self.status = Some("Press space to reveal the answer first".to_string());
                } else if let Some(digit) = c.to_digit(10) {
                    let rating = Rating::try_from((digit - 1) as u8)?;
                    self.rate(rating).await?;
                }
            }
            KeyCode::Char('a') | KeyCode::Esc => self.abort().await?,
            KeyCode::Char('q') => self.quit().await,
            _ => {}
        }
        Ok(())
    }
}

pub async fn run(
    store: Arc<dyn CardStore>,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut app = App::new(store, scheduler, clock).await?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        let ready = tokio::task::block_in_place(|| event::poll(Duration::from_millis(100)))?;
        if ready {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key.code, key.modifiers).await?;
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
