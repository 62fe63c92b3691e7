use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use neurolearn::scheduler::format_interval;

use super::{ease_bar, format_date, stage_color};
use crate::truncate;
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    draw_list(f, app, chunks[0]);
    draw_detail(f, app, chunks[1]);
}

fn draw_list(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .cards
        .items
        .iter()
        .map(|card| {
            let stage = card.maturity_label();
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<30}", truncate(&card.front, 28)),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("{:<11}", stage),
                    Style::default().fg(stage_color(stage)),
                ),
                Span::styled(
                    format!("{:<5}", format_interval(card.interval)),
                    Style::default().fg(Color::Yellow),
                ),
                Span::styled(format_date(&card.next_review), Style::default().fg(Color::Gray)),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Cards ({}) ", app.cards.items.len()))
        .title_style(Style::default().fg(Color::Cyan));

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.cards.selected);
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_detail(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Card ")
        .title_style(Style::default().fg(Color::Yellow));

    let Some(card) = app.cards.selected_item() else {
        f.render_widget(Paragraph::new("No cards yet").block(block), area);
        return;
    };

    let label = |s: &'static str| Span::styled(s, Style::default().fg(Color::Gray));
    let text = vec![
        Line::from(vec![label("Front: "), Span::raw(card.front.clone())]),
        Line::from(vec![label("Back: "), Span::raw(card.back.clone())]),
        Line::from(vec![
            label("Category: "),
            Span::styled(card.category.clone(), Style::default().fg(Color::Cyan)),
        ]),
        Line::from(""),
        Line::from(vec![
            label("Ease: "),
            Span::styled(ease_bar(card.ease_factor), Style::default().fg(Color::Green)),
            Span::raw(format!(" {:.2}", card.ease_factor)),
        ]),
        Line::from(vec![
            label("Interval: "),
            Span::raw(format!("{} days", card.interval)),
        ]),
        Line::from(vec![
            label("Reviews: "),
            Span::raw(format!("{} ({} lapses)", card.review_count, card.lapse_count)),
        ]),
        Line::from(vec![
            label("Next: "),
            Span::raw(card.next_review.format("%Y-%m-%d %H:%M").to_string()),
        ]),
    ];

    let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}
