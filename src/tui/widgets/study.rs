use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
    Frame,
};

use neurolearn::models::Rating;
use neurolearn::scheduler::format_interval;

use crate::tui::{App, StudyScreen};

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let Some(study) = &app.study else {
        let block = Block::default().borders(Borders::ALL).title(" Study ");
        let paragraph = Paragraph::new("No session running. Press s on the dashboard to start.")
            .block(block);
        f.render_widget(paragraph, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Progress
            Constraint::Min(5),    // Front
            Constraint::Min(5),    // Back
            Constraint::Length(3), // Rating previews
        ])
        .split(area);

    draw_progress(f, study, chunks[0]);
    draw_front(f, study, chunks[1]);
    draw_back(f, study, chunks[2]);
    draw_ratings(f, study, chunks[3]);
}

fn draw_progress(f: &mut Frame, study: &StudyScreen, area: Rect) {
    let p = &study.progress;
    let ratio = if p.total == 0 {
        0.0
    } else {
        (p.position - 1) as f64 / p.total as f64
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Card {}/{}  ({} lapsed) ",
            p.position, p.total, p.lapsed
        )))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(ratio.clamp(0.0, 1.0));
    f.render_widget(gauge, area);
}

fn draw_front(f: &mut Frame, study: &StudyScreen, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", study.card.category))
        .title_style(Style::default().fg(Color::Yellow));
    let paragraph = Paragraph::new(Span::styled(
        study.card.front.as_str(),
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    ))
    .block(block)
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn draw_back(f: &mut Frame, study: &StudyScreen, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Answer ");
    let content = if study.progress.answer_revealed {
        Span::styled(study.card.back.as_str(), Style::default().fg(Color::Green))
    } else {
        Span::styled("Press space to reveal", Style::default().fg(Color::DarkGray))
    };
    let paragraph = Paragraph::new(content)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn rating_color(rating: Rating) -> Color {
    match rating {
        Rating::Again => Color::Red,
        Rating::Hard => Color::Yellow,
        Rating::Good => Color::Green,
        Rating::Easy => Color::Cyan,
        Rating::Perfect => Color::Magenta,
    }
}

fn draw_ratings(f: &mut Frame, study: &StudyScreen, area: Rect) {
    let mut spans = Vec::new();
    for (i, (rating, days)) in study.previews.iter().enumerate() {
        let style = if study.progress.answer_revealed {
            Style::default().fg(rating_color(*rating))
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!("{} ", i + 1), Style::default().fg(Color::Gray)));
        spans.push(Span::styled(
            format!("{} ({})   ", rating.label(), format_interval(*days)),
            style,
        ));
    }

    let block = Block::default().borders(Borders::ALL).title(" Rate ");
    f.render_widget(
        Paragraph::new(Line::from(spans))
            .block(block)
            .alignment(Alignment::Center),
        area,
    );
}
