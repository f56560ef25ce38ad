use anyhow::{bail, Context, Result};
use bingo_card::grid::GRID_SIZE;
use bingo_card::{
    db, CardSession, CardSettingsUpdate, Config, NewCard, ReconcileReport,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bingo-card", version, about = "Personal 25-goal bingo cards")]
struct Cli {
    /// SQLite database file (overrides BINGO_DATABASE)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,
    /// Create a card from a CSV file with 25 goals (one per line)
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        goals: PathBuf,
        /// Zero-based index (in the file) of the free-space goal
        #[arg(long, default_value_t = 0)]
        free: i64,
    },
    /// Print a card
    Show { code: String },
    /// Mark the goal at a grid position (0-24) complete
    Complete {
        code: String,
        position: usize,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Mark the goal at a grid position incomplete
    Uncomplete { code: String, position: usize },
    /// Re-check bingos without changing any goal
    Check { code: String },
    /// Change display settings
    Settings {
        code: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        theme: Option<String>,
        #[arg(long)]
        stamp: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a card (requires the owner name)
    Delete {
        code: String,
        #[arg(long)]
        owner: String,
    },
    /// Show a card's history
    History { code: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let conn = db::open_database(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;

    match cli.command {
        Command::Init => {
            println!("✓ Database ready: {:?}", config.database_path);
            println!("✓ Cards stored: {}", db::count_cards(&conn)?);
        }
        Command::Create { owner, goals, free } => {
            let goals = load_goals_csv(&goals)?;
            let code = db::create_card(
                &conn,
                &NewCard {
                    owner_name: owner,
                    goals,
                    free_space_index: free,
                },
            )?;
            println!("🎉 Card created: {}", code);
            println!("   Share this code so others can follow along.");
        }
        Command::Show { code } => {
            let session = CardSession::load(&conn, &code)?;
            print_card(&session);
        }
        Command::Complete {
            code,
            position,
            date,
            notes,
        } => {
            let session = CardSession::load(&conn, &code)?;
            let id = goal_id(&session, position)?;
            let (session, report) = session.complete(&conn, id, date, notes)?;
            print_card(&session);
            print_report(&report);
        }
        Command::Uncomplete { code, position } => {
            let session = CardSession::load(&conn, &code)?;
            let id = goal_id(&session, position)?;
            let (session, report) = session.uncomplete(&conn, id)?;
            print_card(&session);
            print_report(&report);
        }
        Command::Check { code } => {
            let (session, report) = CardSession::load(&conn, &code)?.recheck(&conn)?;
            print_card(&session);
            print_report(&report);
        }
        Command::Settings {
            code,
            name,
            theme,
            stamp,
            color,
        } => {
            let card = db::update_card_settings(
                &conn,
                &code,
                &CardSettingsUpdate {
                    display_name: name,
                    theme,
                    stamp_icon: stamp,
                    stamp_color: color,
                },
            )?;
            println!(
                "✓ {}: theme {}, stamp {} {}",
                card.display_name, card.theme, card.stamp_icon, card.stamp_color
            );
        }
        Command::Delete { code, owner } => {
            db::delete_card(&conn, &code, &owner)?;
            println!("✓ Deleted card {}", code);
        }
        Command::History { code } => print_history(&conn, &code)?,
    }

    Ok(())
}

/// One goal per CSV record (first column), no header row
fn load_goals_csv(path: &Path) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open goals file {:?}", path))?;

    let mut goals = Vec::new();
    for record in rdr.records() {
        let record = record.context("Failed to read goals file")?;
        if let Some(goal) = record.get(0).map(str::trim).filter(|g| !g.is_empty()) {
            goals.push(goal.to_string());
        }
    }

    Ok(goals)
}

fn goal_id(session: &CardSession, position: usize) -> Result<i64> {
    match session.goal_at(position) {
        Some(goal) => Ok(goal.id),
        None => bail!("No goal at position {} (positions are 0-24)", position),
    }
}

fn print_card(session: &CardSession) {
    let card = &session.card;
    println!("\n{}'s Bingo Card ({})", card.display_name, card.code);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for row in session.goals.chunks(GRID_SIZE) {
        let cells: Vec<String> = row
            .iter()
            .map(|goal| {
                let mark = if goal.is_completed { card.stamp_icon.as_str() } else { "·" };
                let text: String = goal.text.chars().take(12).collect();
                format!("{:>2} {} {:<12}", goal.position, mark, text)
            })
            .collect();
        println!("{}", cells.join(" │ "));
    }

    println!(
        "\n✓ Goals complete: {}/{}   ✓ Bingos: {}",
        session.completed_count(),
        session.goals.len(),
        session.bingos.len()
    );
    for bingo in &session.bingos {
        println!("   • {}", bingo.line);
    }
}

fn print_report(report: &ReconcileReport) {
    if report.celebrate {
        println!("\n🎉 BINGO! 🎉");
    }
    for line in &report.removed {
        println!("   ✗ {} no longer complete", line);
    }
    if !report.is_converged() {
        eprintln!(
            "⚠️  {} bingo update(s) failed; run `bingo-card check` to retry",
            report.failures.len()
        );
    }
}

fn print_history(conn: &Connection, code: &str) -> Result<()> {
    let events = db::get_card_events(conn, code)?;
    if events.is_empty() {
        println!("No history for {}", code);
        return Ok(());
    }

    for event in events {
        println!(
            "{}  {:<14} {}",
            event.recorded_at.format("%Y-%m-%d %H:%M"),
            event.event_type,
            event.data
        );
    }
    Ok(())
}
