mod tui;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use neurolearn::clock::{Clock, SystemClock};
use neurolearn::config::Config;
use neurolearn::db::Database;
use neurolearn::models::{Flashcard, JsonOutput, Rating};
use neurolearn::scheduler::{format_interval, Scheduler};
use neurolearn::store::CardStore;

#[derive(Parser)]
#[command(name = "neurolearn")]
#[command(about = "Spaced repetition flashcards with cognitive-load aware study sessions")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage flashcards
    #[command(subcommand)]
    Card(CardCommands),

    /// List cards due for review, most overdue first
    Due,

    /// List cards likely to be forgotten before their next review
    AtRisk,

    /// Rate a single card outside a study session
    Review {
        /// Card ID (or unique prefix)
        id: String,

        /// Rating: again/hard/good/easy/perfect or 0-4
        #[arg(long, short)]
        rating: String,
    },

    /// Show the interval each rating would give a card
    Preview {
        /// Card ID (or unique prefix)
        id: String,
    },

    /// Show study statistics
    Stats,

    /// Launch interactive study screen
    Tui,
}

#[derive(Subcommand)]
enum CardCommands {
    /// List all flashcards
    List {
        /// Filter by category
        #[arg(long, short)]
        category: Option<String>,
    },

    /// Add a new flashcard
    Add {
        /// Question side
        front: String,

        /// Answer side
        back: String,

        /// Category (defaults to "general")
        #[arg(long, short)]
        category: Option<String>,
    },

    /// Show flashcard details
    Show {
        /// Card ID (or unique prefix)
        id: String,
    },

    /// Delete a flashcard
    Delete {
        /// Card ID (or unique prefix)
        id: String,
    },
}

fn init_tracing(tui_mode: bool) {
    let default = if tui_mode { "warn" } else { "neurolearn=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Tui));
    let json = cli.json;

    if let Err(e) = run(cli).await {
        if json {
            let output = JsonOutput::<()>::err(e.to_string());
            if let Ok(line) = serde_json::to_string(&output) {
                println!("{}", line);
            }
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let db = Database::open(&db_path)?;
    db.init()?;

    let store = Arc::new(db);
    let scheduler = Scheduler::new(config.scheduler.clone());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let now = clock.now();

    match cli.command {
        Commands::Init => {
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Card(card_cmd) => match card_cmd {
            CardCommands::List { category } => {
                let cards = store.get_flashcards().await?;
                let cards: Vec<&Flashcard> = cards
                    .iter()
                    .filter(|c| category.as_deref().map_or(true, |cat| c.category == cat))
                    .collect();
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&cards))?);
                } else if cards.is_empty() {
                    println!("No flashcards found.");
                } else {
                    println!(
                        "{:<10} {:<40} {:<12} {:<10} NEXT",
                        "ID", "FRONT", "CATEGORY", "STAGE"
                    );
                    println!("{}", "-".repeat(90));
                    for card in cards {
                        println!(
                            "{:<10} {:<40} {:<12} {:<10} {}",
                            short_id(&card.id),
                            truncate(&card.front, 38),
                            truncate(&card.category, 12),
                            card.maturity_label(),
                            card.next_review.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
            }

            CardCommands::Add {
                front,
                back,
                category,
            } => {
                let card = Flashcard::new(&front, &back, category.as_deref(), now)?;
                let mut cards = store.get_flashcards().await?;
                cards.push(card.clone());
                store.save_flashcards(&cards).await?;

                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&card))?);
                } else {
                    println!("Added flashcard with ID: {}", card.id);
                }
            }

            CardCommands::Show { id } => {
                let cards = store.get_flashcards().await?;
                let card = resolve_card(&cards, &id)?;

                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(card))?);
                } else {
                    println!("Front: {}", card.front);
                    println!("Back: {}", card.back);
                    println!("ID: {}", card.id);
                    println!("Category: {}", card.category);
                    println!("Created: {}", card.created.to_rfc3339());
                    println!();
                    println!("--- Schedule ---");
                    println!("Stage: {}", card.maturity_label());
                    println!(
                        "Interval: {} ({} days)",
                        format_interval(card.interval),
                        card.interval
                    );
                    println!("Ease: {:.2}", card.ease_factor);
                    println!("Repetitions: {}", card.repetitions);
                    println!(
                        "Reviews: {} ({} lapses)",
                        card.review_count, card.lapse_count
                    );
                    if let Some(last) = &card.last_reviewed {
                        println!("Last reviewed: {}", last.to_rfc3339());
                    }
                    println!("Next review: {}", card.next_review.to_rfc3339());
                }
            }

            CardCommands::Delete { id } => {
                let mut cards = store.get_flashcards().await?;
                let target = resolve_card(&cards, &id)?.id.clone();
                cards.retain(|c| c.id != target);
                store.save_flashcards(&cards).await?;

                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                } else {
                    println!("Flashcard {} deleted.", target);
                }
            }
        },

        Commands::Due => {
            let cards = store.get_flashcards().await?;
            let due = scheduler.get_due_cards(&cards, now);
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&due))?);
            } else if due.is_empty() {
                println!("No cards due. Nice work!");
            } else {
                print_schedule_table(&due);
            }
        }

        Commands::AtRisk => {
            let cards = store.get_flashcards().await?;
            let at_risk = scheduler.get_at_risk_cards(&cards, now);
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&at_risk))?);
            } else if at_risk.is_empty() {
                println!("No cards at risk.");
            } else {
                print_schedule_table(&at_risk);
            }
        }

        Commands::Review { id, rating } => {
            let rating: Rating = rating.parse()?;
            let mut cards = store.get_flashcards().await?;
            let target = resolve_card(&cards, &id)?.id.clone();
            let index = cards
                .iter()
                .position(|c| c.id == target)
                .ok_or_else(|| format!("Flashcard '{}' not found", id))?;

            let review = scheduler.schedule_next_review(&cards[index], rating, now);
            cards[index] = review.card.clone();
            store.save_flashcards(&cards).await?;

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&review))?);
            } else {
                println!("Rated '{}' as {}.", truncate(&review.card.front, 40), rating);
                println!(
                    "Interval: {} -> {} days, ease {:.2} -> {:.2}",
                    review.previous_interval,
                    review.card.interval,
                    review.previous_ease,
                    review.card.ease_factor
                );
                println!("Next review: {}", review.next_review().to_rfc3339());
            }
        }

        Commands::Preview { id } => {
            let cards = store.get_flashcards().await?;
            let card = resolve_card(&cards, &id)?;
            let preview = scheduler.preview_intervals(card, now);

            if cli.json {
                let intervals: serde_json::Map<String, serde_json::Value> = preview
                    .iter()
                    .map(|(rating, days)| (rating.as_str().to_string(), (*days).into()))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "id": card.id,
                        "intervals": intervals
                    })))?
                );
            } else {
                println!("{}", card.front);
                println!("{}", "-".repeat(30));
                for (rating, days) in preview {
                    println!("{:<10} {}", rating.label(), format_interval(days));
                }
            }
        }

        Commands::Stats => {
            let cards = store.get_flashcards().await?;
            let sessions = store.get_study_sessions().await?;
            let stats = scheduler.summarize(&cards, &sessions, now);
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&stats))?);
            } else {
                println!("=== Study Statistics ===");
                println!("Total cards: {}", stats.total_cards);
                println!("Due now: {}", stats.due_now);
                println!("At risk: {}", stats.at_risk);
                println!("Mastered (21d+): {}", stats.mastered);
                println!("Average ease: {:.2}", stats.average_ease);
                println!(
                    "Reviews: {} ({} lapses)",
                    stats.total_reviews, stats.total_lapses
                );
                println!("Sessions: {}", stats.sessions);
                println!("Cognitive load: {:.0}%", stats.cognitive_load * 100.0);
                println!(
                    "Recommended session size: {}",
                    stats.recommended_session_size
                );
            }
        }

        Commands::Tui => {
            tui::run(store, scheduler, clock).await?;
        }
    }

    Ok(())
}

fn print_schedule_table(cards: &[Flashcard]) {
    println!(
        "{:<10} {:<40} {:<8} {:<6} NEXT",
        "ID", "FRONT", "INTERVAL", "EASE"
    );
    println!("{}", "-".repeat(84));
    for card in cards {
        println!(
            "{:<10} {:<40} {:<8} {:<6.2} {}",
            short_id(&card.id),
            truncate(&card.front, 38),
            format_interval(card.interval),
            card.ease_factor,
            card.next_review.format("%Y-%m-%d %H:%M")
        );
    }
}

/// Find a card by full id or by an unambiguous id prefix.
fn resolve_card<'a>(cards: &'a [Flashcard], id: &str) -> Result<&'a Flashcard, String> {
    if let Some(card) = cards.iter().find(|c| c.id == id) {
        return Ok(card);
    }
    let mut matches = cards.iter().filter(|c| !id.is_empty() && c.id.starts_with(id));
    match (matches.next(), matches.next()) {
        (Some(card), None) => Ok(card),
        (Some(_), Some(_)) => Err(format!("Card id '{}' is ambiguous", id)),
        (None, _) => Err(format!("Flashcard '{}' not found", id)),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clap::Parser;

    mod truncate_tests {
        use super::*;

        #[test]
        fn truncate_short_string() {
            assert_eq!(truncate("hello", 10), "hello");
        }

        #[test]
        fn truncate_exact_length() {
            assert_eq!(truncate("hello", 5), "hello");
        }

        #[test]
        fn truncate_long_string() {
            assert_eq!(truncate("hello world", 8), "hello...");
        }

        #[test]
        fn truncate_empty_string() {
            assert_eq!(truncate("", 10), "");
        }

        #[test]
        fn truncate_multibyte() {
            assert_eq!(truncate("čřžýáíé", 5), "čř...");
            assert_eq!(truncate("héllo", 5), "héllo");
        }
    }

    mod cli_parsing_tests {
        use super::*;

        #[test]
        fn parse_init_command() {
            let cli = Cli::try_parse_from(["neurolearn", "init"]).unwrap();
            assert!(!cli.json);
            assert!(matches!(cli.command, Commands::Init));
        }

        #[test]
        fn parse_init_with_json() {
            let cli = Cli::try_parse_from(["neurolearn", "--json", "init"]).unwrap();
            assert!(cli.json);
        }

        #[test]
        fn parse_card_add() {
            let cli = Cli::try_parse_from(["neurolearn", "card", "add", "2+2", "4"]).unwrap();
            match cli.command {
                Commands::Card(CardCommands::Add {
                    front,
                    back,
                    category,
                }) => {
                    assert_eq!(front, "2+2");
                    assert_eq!(back, "4");
                    assert!(category.is_none());
                }
                _ => panic!("Expected Card Add command"),
            }
        }

        #[test]
        fn parse_card_add_with_category() {
            let cli = Cli::try_parse_from([
                "neurolearn",
                "card",
                "add",
                "Capital of France",
                "Paris",
                "-c",
                "geography",
            ])
            .unwrap();
            match cli.command {
                Commands::Card(CardCommands::Add { category, .. }) => {
                    assert_eq!(category, Some("geography".to_string()));
                }
                _ => panic!("Expected Card Add command"),
            }
        }

        #[test]
        fn parse_card_list_with_category() {
            let cli =
                Cli::try_parse_from(["neurolearn", "card", "list", "--category", "math"]).unwrap();
            match cli.command {
                Commands::Card(CardCommands::List { category }) => {
                    assert_eq!(category, Some("math".to_string()));
                }
                _ => panic!("Expected Card List command"),
            }
        }

        #[test]
        fn parse_card_show_and_delete() {
            let cli = Cli::try_parse_from(["neurolearn", "card", "show", "abc"]).unwrap();
            assert!(matches!(cli.command, Commands::Card(CardCommands::Show { id }) if id == "abc"));
            let cli = Cli::try_parse_from(["neurolearn", "card", "delete", "abc"]).unwrap();
            assert!(
                matches!(cli.command, Commands::Card(CardCommands::Delete { id }) if id == "abc")
            );
        }

        #[test]
        fn parse_review_command() {
            let cli =
                Cli::try_parse_from(["neurolearn", "review", "abc", "--rating", "good"]).unwrap();
            match cli.command {
                Commands::Review { id, rating } => {
                    assert_eq!(id, "abc");
                    assert_eq!(rating, "good");
                }
                _ => panic!("Expected Review command"),
            }
        }

        #[test]
        fn parse_review_short_flag() {
            let cli = Cli::try_parse_from(["neurolearn", "review", "abc", "-r", "0"]).unwrap();
            assert!(matches!(cli.command, Commands::Review { rating, .. } if rating == "0"));
        }

        #[test]
        fn parse_due_at_risk_and_stats() {
            let cli = Cli::try_parse_from(["neurolearn", "due"]).unwrap();
            assert!(matches!(cli.command, Commands::Due));
            let cli = Cli::try_parse_from(["neurolearn", "at-risk"]).unwrap();
            assert!(matches!(cli.command, Commands::AtRisk));
            let cli = Cli::try_parse_from(["neurolearn", "stats", "--json"]).unwrap();
            assert!(cli.json);
            assert!(matches!(cli.command, Commands::Stats));
        }

        #[test]
        fn parse_preview_and_tui() {
            let cli = Cli::try_parse_from(["neurolearn", "preview", "abc"]).unwrap();
            assert!(matches!(cli.command, Commands::Preview { id } if id == "abc"));
            let cli = Cli::try_parse_from(["neurolearn", "tui"]).unwrap();
            assert!(matches!(cli.command, Commands::Tui));
        }

        #[test]
        fn parse_review_missing_rating_fails() {
            let result = Cli::try_parse_from(["neurolearn", "review", "abc"]);
            assert!(result.is_err());
        }

        #[test]
        fn parse_invalid_command_fails() {
            let result = Cli::try_parse_from(["neurolearn", "invalid"]);
            assert!(result.is_err());
        }
    }

    mod resolve_card_tests {
        use super::*;

        fn cards() -> Vec<Flashcard> {
            let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let mut a = Flashcard::new("a", "1", None, now).unwrap();
            let mut b = Flashcard::new("b", "2", None, now).unwrap();
            a.id = "abc123".to_string();
            b.id = "abd456".to_string();
            vec![a, b]
        }

        #[test]
        fn exact_id_matches() {
            let cards = cards();
            assert_eq!(resolve_card(&cards, "abc123").unwrap().front, "a");
        }

        #[test]
        fn unique_prefix_matches() {
            let cards = cards();
            assert_eq!(resolve_card(&cards, "abd").unwrap().front, "b");
            assert_eq!(resolve_card(&cards, "abc").unwrap().id, "abc123");
        }

        #[test]
        fn ambiguous_prefix_fails() {
            let cards = cards();
            assert!(resolve_card(&cards, "ab").unwrap_err().contains("ambiguous"));
        }

        #[test]
        fn unknown_id_fails() {
            let cards = cards();
            assert!(resolve_card(&cards, "zzz").is_err());
            assert!(resolve_card(&cards, "").is_err());
        }

        #[test]
        fn short_id_truncates() {
            assert_eq!(short_id("0123456789"), "01234567");
            assert_eq!(short_id("abc"), "abc");
        }
    }
}
