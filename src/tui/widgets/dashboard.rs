use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
    Frame,
};

use neurolearn::models::Flashcard;

use super::{ease_bar, format_date};
use crate::truncate;
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(10), // Stats + load
            Constraint::Length(8),  // Due + at risk
            Constraint::Min(0),     // Recent sessions
        ])
        .split(area);

    let top_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);

    let card_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    draw_stats(f, app, top_chunks[0]);
    draw_load(f, app, top_chunks[1]);
    draw_card_list(f, " Due ", Color::Yellow, &app.due, card_chunks[0]);
    draw_card_list(f, " At Risk ", Color::Red, &app.at_risk, card_chunks[1]);
    draw_recent_sessions(f, app, chunks[2]);
}

fn stat_line(label: &str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{}: ", label), Style::default().fg(Color::Gray)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn draw_stats(f: &mut Frame, app: &App, area: Rect) {
    let stats = &app.stats;

    let text = vec![
        Line::from(vec![
            Span::styled("Cards: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", stats.total_cards),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        stat_line(
            "Due",
            stats.due_now.to_string(),
            if stats.due_now > 0 {
                Color::Yellow
            } else {
                Color::White
            },
        ),
        stat_line("At risk", stats.at_risk.to_string(), Color::Red),
        stat_line("Mastered", stats.mastered.to_string(), Color::Green),
        stat_line(
            "Reviews",
            format!("{} ({} lapses)", stats.total_reviews, stats.total_lapses),
            Color::White,
        ),
        stat_line(
            "Avg ease",
            format!("{:.2}", stats.average_ease),
            Color::Cyan,
        ),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Stats ")
        .title_style(Style::default().fg(Color::Cyan));

    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_load(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let load = app.stats.cognitive_load.clamp(0.0, 1.0);
    let color = if load >= 0.7 {
        Color::Red
    } else if load >= 0.4 {
        Color::Yellow
    } else {
        Color::Green
    };

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Cognitive Load ")
                .title_style(Style::default().fg(Color::Magenta)),
        )
        .gauge_style(Style::default().fg(color))
        .ratio(load);
    f.render_widget(gauge, chunks[0]);

    let text = vec![
        stat_line(
            "Next session",
            format!("{} cards", app.stats.recommended_session_size),
            Color::White,
        ),
        stat_line("Sessions", app.stats.sessions.to_string(), Color::White),
    ];
    let block = Block::default().borders(Borders::ALL);
    f.render_widget(Paragraph::new(text).block(block), chunks[1]);
}

fn draw_card_list(f: &mut Frame, title: &str, color: Color, cards: &[Flashcard], area: Rect) {
    let items: Vec<ListItem> = cards
        .iter()
        .enumerate()
        .map(|(i, card)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{}. ", i + 1), Style::default().fg(Color::DarkGray)),
                Span::styled(
                    format!("{:<24}", truncate(&card.front, 22)),
                    Style::default().fg(color),
                ),
                Span::styled(ease_bar(card.ease_factor), Style::default().fg(Color::Green)),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title.to_string())
        .title_style(Style::default().fg(color));

    f.render_widget(List::new(items).block(block), area);
}

fn draw_recent_sessions(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .recent_sessions
        .iter()
        .map(|session| {
            let (outcome_text, outcome_color) = if session.completed {
                ("Completed", Color::Green)
            } else {
                ("Ended early", Color::DarkGray)
            };

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<10}", format_date(&session.start_time)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{:>4} cards ", session.cards_studied),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("{:>3} lapses ", session.cards_lapsed),
                    Style::default().fg(Color::Red),
                ),
                Span::styled(
                    format!("{:>4} min  ", session.duration_minutes.unwrap_or(0)),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(outcome_text, Style::default().fg(outcome_color)),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Recent Sessions ")
        .title_style(Style::default().fg(Color::Magenta));

    f.render_widget(List::new(items).block(block), area);
}
