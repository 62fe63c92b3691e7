use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Frame,
};

use super::widgets::{cards, dashboard, study};
use super::{App, View};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tab bar
            Constraint::Min(0),    // Content
            Constraint::Length(1), // Status line
            Constraint::Length(1), // Help bar
        ])
        .split(f.area());

    draw_tabs(f, app, chunks[0]);
    draw_content(f, app, chunks[1]);
    draw_status(f, app, chunks[2]);
    draw_help_bar(f, app, chunks[3]);
}

fn draw_tabs(f: &mut Frame, app: &App, area: Rect) {
    let tab_titles = vec!["Dashboard", "Cards", "Study"];
    let selected = match app.view {
        View::Dashboard => 0,
        View::Cards => 1,
        View::Study => 2,
    };

    let tabs = Tabs::new(tab_titles)
        .block(Block::default().borders(Borders::ALL).title(" NeuroLearn "))
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    f.render_widget(tabs, area);
}

fn draw_content(f: &mut Frame, app: &App, area: Rect) {
    match app.view {
        View::Dashboard => dashboard::draw(f, app, area),
        View::Cards => cards::draw(f, app, area),
        View::Study => study::draw(f, app, area),
    }
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let text = app.status.as_deref().unwrap_or("");
    let status = Paragraph::new(Span::styled(text, Style::default().fg(Color::Yellow)));
    f.render_widget(status, area);
}

fn key(k: &str) -> Span<'_> {
    Span::styled(k, Style::default().fg(Color::Cyan))
}

fn draw_help_bar(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();

    match app.view {
        View::Dashboard => {
            spans.extend(vec![
                key("s/<CR>"),
                Span::raw(" Study  "),
                key("h/l"),
                Span::raw(" Views  "),
                key("^r"),
                Span::raw(" Refresh  "),
            ]);
        }
        View::Cards => {
            spans.extend(vec![
                key("h/l"),
                Span::raw(" Views  "),
                key("j/k"),
                Span::raw(" Nav  "),
                key("g/G"),
                Span::raw(" Top/Bot  "),
            ]);
        }
        View::Study => {
            spans.extend(vec![
                key("<Space>"),
                Span::raw(" Reveal  "),
                key("1-5"),
                Span::raw(" Again/Hard/Good/Easy/Perfect  "),
                key("a"),
                Span::raw(" Abort  "),
                key("r"),
                Span::raw(" Retry save  "),
            ]);
        }
    }

    spans.extend(vec![key("q"), Span::raw(" Quit")]);

    let help = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    f.render_widget(help, area);
}
