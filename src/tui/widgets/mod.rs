pub mod cards;
pub mod dashboard;
pub mod study;

use chrono::{DateTime, Utc};
use ratatui::style::Color;

pub(crate) fn format_date(dt: &DateTime<Utc>) -> String {
    dt.format("%b %d").to_string()
}

/// Ease bar from the 1.3 floor up to 3.0.
pub(crate) fn ease_bar(ease: f64) -> String {
    let filled = (((ease - 1.3) / 1.7) * 5.0).round().clamp(0.0, 5.0) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(5 - filled))
}

pub(crate) fn stage_color(label: &str) -> Color {
    match label {
        "New" => Color::Cyan,
        "Relearning" => Color::Red,
        "Learning" => Color::Yellow,
        "Young" => Color::LightGreen,
        _ => Color::Green,
    }
}
