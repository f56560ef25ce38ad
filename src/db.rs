// 🗄️ Card Store - SQLite persistence for cards, goals, bingos and events
//
// Cards own their goals, bingos and history. Every write runs in one
// transaction together with the history entry it records.

use crate::card::{
    generate_card_code, layout_goals, Bingo, Card, CardDetails, CardSettingsUpdate, Goal,
    GoalUpdate, NewCard, Theme, DEFAULT_STAMP_COLOR, DEFAULT_STAMP_ICON,
};
use crate::error::{BingoError, Result};
use crate::lines::Line;
use crate::reconcile::BingoStore;
use crate::validation::{
    is_valid_card_code, validate_goal_update, validate_new_card, validate_settings_update,
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rand::Rng;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info};

// ============================================================================
// CARD HISTORY
// ============================================================================

/// One entry in a card's history. Removed together with the card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardEvent {
    pub id: String,
    pub card_code: String,
    pub event_type: String,
    pub data: serde_json::Value,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
}

const ACTOR_OWNER: &str = "owner";
const ACTOR_RECONCILER: &str = "reconciler";

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery, foreign keys for cascades
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cards (
            code TEXT PRIMARY KEY,
            owner_name TEXT NOT NULL,
            display_name TEXT NOT NULL,
            theme TEXT NOT NULL DEFAULT 'royal',
            stamp_icon TEXT NOT NULL,
            stamp_color TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS goals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            card_code TEXT NOT NULL REFERENCES cards(code) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            is_free_space INTEGER NOT NULL DEFAULT 0,
            is_completed INTEGER NOT NULL DEFAULT 0,
            completed_date TEXT,
            notes TEXT,
            UNIQUE (card_code, position)
        )",
        [],
    )?;

    // One record per (card, type, index)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS bingos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            card_code TEXT NOT NULL REFERENCES cards(code) ON DELETE CASCADE,
            line_type TEXT NOT NULL,
            line_index INTEGER NOT NULL,
            completed_at TEXT NOT NULL,
            UNIQUE (card_code, line_type, line_index)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS card_events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            card_code TEXT NOT NULL REFERENCES cards(code) ON DELETE CASCADE,
            event_type TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_goals_card ON goals(card_code)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bingos_card ON bingos(card_code)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_card_events_card ON card_events(card_code)",
        [],
    )?;

    Ok(())
}

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    info!(path = %path.display(), "database ready");
    Ok(conn)
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

const CARD_COLUMNS: &str =
    "code, owner_name, display_name, theme, stamp_icon, stamp_color, created_at, updated_at";

fn card_from_row(row: &Row) -> rusqlite::Result<Card> {
    let theme: String = row.get(3)?;

    Ok(Card {
        code: row.get(0)?,
        owner_name: row.get(1)?,
        display_name: row.get(2)?,
        // Unknown themes from older rows fall back to the default
        theme: theme.parse().unwrap_or_default(),
        stamp_icon: row.get(4)?,
        stamp_color: row.get(5)?,
        created_at: parse_timestamp(row, 6)?,
        updated_at: parse_timestamp(row, 7)?,
    })
}

const GOAL_COLUMNS: &str =
    "id, card_code, position, text, is_free_space, is_completed, completed_date, notes";

fn goal_from_row(row: &Row) -> rusqlite::Result<Goal> {
    let position: i64 = row.get(2)?;
    let completed_date: Option<String> = row.get(6)?;
    let completed_date = completed_date
        .map(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_error(6, e)))
        .transpose()?;

    Ok(Goal {
        id: row.get(0)?,
        card_code: row.get(1)?,
        position: position as usize,
        text: row.get(3)?,
        is_free_space: row.get(4)?,
        is_completed: row.get(5)?,
        completed_date,
        notes: row.get(7)?,
    })
}

const BINGO_COLUMNS: &str = "id, card_code, line_type, line_index, completed_at";

fn bingo_from_row(row: &Row) -> rusqlite::Result<Bingo> {
    let line_type: String = row.get(2)?;
    let line_index: i64 = row.get(3)?;

    Ok(Bingo {
        id: row.get(0)?,
        card_code: row.get(1)?,
        line: Line::parse(&line_type, line_index).map_err(|e| conversion_error(2, e))?,
        completed_at: parse_timestamp(row, 4)?,
    })
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// CARDS
// ============================================================================

/// Create a card with a fresh code and a shuffled layout
pub fn create_card(conn: &Connection, new_card: &NewCard) -> Result<String> {
    create_card_with(conn, new_card, &mut rand::thread_rng(), Utc::now())
}

/// `create_card` with the randomness and clock supplied by the caller
pub fn create_card_with<R: Rng + ?Sized>(
    conn: &Connection,
    new_card: &NewCard,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<String> {
    validate_new_card(new_card)?;

    let code = generate_card_code(&new_card.owner_name, now.year(), rng);
    let clean = new_card.sanitized();
    let seeds = layout_goals(&clean.goals, clean.free_space_index as usize, rng)?;
    let now_str = now.to_rfc3339();
    let today = format_date(Some(now.date_naive()));

    let tx = conn.unchecked_transaction()?;

    let inserted = tx.execute(
        "INSERT INTO cards (code, owner_name, display_name, theme, stamp_icon, stamp_color, created_at, updated_at)
         VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            code,
            clean.owner_name,
            Theme::default().as_str(),
            DEFAULT_STAMP_ICON,
            DEFAULT_STAMP_COLOR,
            now_str,
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            info!(code = %code, "card code collision");
            return Err(BingoError::DuplicateCode(code));
        }
        Err(e) => return Err(e.into()),
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO goals (card_code, position, text, is_free_space, is_completed, completed_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        for seed in &seeds {
            // The free space starts out completed
            stmt.execute(params![
                code,
                seed.position as i64,
                seed.text,
                seed.is_free_space,
                seed.is_free_space,
                if seed.is_free_space { today.clone() } else { None },
            ])?;
        }
    }

    record_event(
        &tx,
        &code,
        "card_created",
        serde_json::json!({ "free_space_index": clean.free_space_index }),
        ACTOR_OWNER,
    )?;

    tx.commit()?;

    info!(code = %code, "created card");
    Ok(code)
}

fn ensure_code_format(code: &str) -> Result<()> {
    if is_valid_card_code(code) {
        Ok(())
    } else {
        Err(BingoError::card_not_found(code))
    }
}

pub fn find_card(conn: &Connection, code: &str) -> Result<Option<Card>> {
    let card = conn
        .query_row(
            &format!("SELECT {} FROM cards WHERE code = ?1", CARD_COLUMNS),
            [code],
            card_from_row,
        )
        .optional()?;

    Ok(card)
}

fn require_card(conn: &Connection, code: &str) -> Result<Card> {
    ensure_code_format(code)?;
    find_card(conn, code)?.ok_or_else(|| BingoError::card_not_found(code))
}

/// Card with its 25 goals (by position) and its bingos
pub fn get_card(conn: &Connection, code: &str) -> Result<CardDetails> {
    let card = require_card(conn, code)?;
    let goals = get_goals(conn, code)?;
    let bingos = get_bingos(conn, code)?;

    Ok(CardDetails { card, goals, bingos })
}

pub fn update_card_settings(
    conn: &Connection,
    code: &str,
    update: &CardSettingsUpdate,
) -> Result<Card> {
    validate_settings_update(update)?;
    let mut card = require_card(conn, code)?;
    let clean = update.sanitized();

    if let Some(name) = clean.display_name {
        card.display_name = name;
    }
    if let Some(theme) = clean.theme {
        card.theme = theme.parse()?;
    }
    if let Some(icon) = clean.stamp_icon {
        card.stamp_icon = icon;
    }
    if let Some(color) = clean.stamp_color {
        card.stamp_color = color;
    }
    card.updated_at = Utc::now();

    conn.execute(
        "UPDATE cards
         SET display_name = ?1, theme = ?2, stamp_icon = ?3, stamp_color = ?4, updated_at = ?5
         WHERE code = ?6",
        params![
            card.display_name,
            card.theme.as_str(),
            card.stamp_icon,
            card.stamp_color,
            card.updated_at.to_rfc3339(),
            card.code,
        ],
    )?;

    Ok(card)
}

/// Delete a card and everything it owns. The owner name must match the one
/// given at creation exactly.
pub fn delete_card(conn: &Connection, code: &str, owner_name: &str) -> Result<()> {
    let card = require_card(conn, code)?;

    // Stored names are escaped, so compare in the same form
    let given = crate::validation::escape_html(owner_name.trim());
    if given != card.owner_name {
        info!(code = %code, "delete refused: owner name mismatch");
        return Err(BingoError::Forbidden(
            "owner name does not match this card".to_string(),
        ));
    }

    let tx = conn.unchecked_transaction()?;
    let bingos = tx.execute("DELETE FROM bingos WHERE card_code = ?1", [code])?;
    let goals = tx.execute("DELETE FROM goals WHERE card_code = ?1", [code])?;
    tx.execute("DELETE FROM card_events WHERE card_code = ?1", [code])?;
    tx.execute("DELETE FROM cards WHERE code = ?1", [code])?;
    tx.commit()?;

    info!(code = %code, goals, bingos, "deleted card");
    Ok(())
}

pub fn count_cards(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// GOALS
// ============================================================================

pub fn get_goals(conn: &Connection, code: &str) -> Result<Vec<Goal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM goals WHERE card_code = ?1 ORDER BY position",
        GOAL_COLUMNS
    ))?;

    let goals = stmt
        .query_map([code], goal_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(goals)
}

pub fn get_goal(conn: &Connection, id: i64) -> Result<Goal> {
    conn.query_row(
        &format!("SELECT {} FROM goals WHERE id = ?1", GOAL_COLUMNS),
        [id],
        goal_from_row,
    )
    .optional()?
    .ok_or_else(|| BingoError::goal_not_found(id))
}

pub fn update_goal(conn: &Connection, id: i64, update: &GoalUpdate) -> Result<Goal> {
    update_goal_on(conn, id, update, Utc::now().date_naive())
}

/// `update_goal` with "today" supplied by the caller
pub fn update_goal_on(
    conn: &Connection,
    id: i64,
    update: &GoalUpdate,
    today: NaiveDate,
) -> Result<Goal> {
    let mut goal = get_goal(conn, id)?;
    validate_goal_update(update, &goal)?;

    let was_completed = goal.is_completed;
    goal.apply_update(&update.sanitized(), today)?;

    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "UPDATE goals
         SET text = ?1, is_completed = ?2, completed_date = ?3, notes = ?4
         WHERE id = ?5",
        params![
            goal.text,
            goal.is_completed,
            format_date(goal.completed_date),
            goal.notes,
            goal.id,
        ],
    )?;

    record_event(
        &tx,
        &goal.card_code,
        "goal_updated",
        serde_json::json!({
            "goal_id": goal.id,
            "position": goal.position,
            "was_completed": was_completed,
            "is_completed": goal.is_completed,
        }),
        ACTOR_OWNER,
    )?;

    tx.commit()?;

    Ok(goal)
}

// ============================================================================
// BINGOS
// ============================================================================

pub fn get_bingos(conn: &Connection, code: &str) -> Result<Vec<Bingo>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM bingos WHERE card_code = ?1 ORDER BY line_type, line_index",
        BINGO_COLUMNS
    ))?;

    let bingos = stmt
        .query_map([code], bingo_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(bingos)
}

/// Insert a bingo record. An existing record for the same line is returned
/// unchanged.
pub fn add_bingo(conn: &Connection, code: &str, line: Line) -> Result<Bingo> {
    let tx = conn.unchecked_transaction()?;

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO bingos (card_code, line_type, line_index, completed_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            code,
            line.kind().as_str(),
            line.index() as i64,
            Utc::now().to_rfc3339(),
        ],
    )?;

    if inserted == 1 {
        record_event(&tx, code, "bingo_added", serde_json::to_value(line)?, ACTOR_RECONCILER)?;
    }

    let bingo = tx.query_row(
        &format!(
            "SELECT {} FROM bingos WHERE card_code = ?1 AND line_type = ?2 AND line_index = ?3",
            BINGO_COLUMNS
        ),
        params![code, line.kind().as_str(), line.index() as i64],
        bingo_from_row,
    )?;

    tx.commit()?;

    if inserted == 1 {
        info!(code = %code, %line, "bingo!");
    }
    Ok(bingo)
}

pub fn remove_bingo(conn: &Connection, code: &str, line: Line) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;

    let deleted = tx.execute(
        "DELETE FROM bingos WHERE card_code = ?1 AND line_type = ?2 AND line_index = ?3",
        params![code, line.kind().as_str(), line.index() as i64],
    )?;

    if deleted > 0 {
        record_event(&tx, code, "bingo_removed", serde_json::to_value(line)?, ACTOR_RECONCILER)?;
    }

    tx.commit()?;

    if deleted > 0 {
        info!(code = %code, %line, "bingo removed");
    }
    Ok(deleted > 0)
}

impl BingoStore for Connection {
    fn add_bingo(&self, card_code: &str, line: Line) -> Result<Bingo> {
        add_bingo(self, card_code, line).inspect_err(|e| {
            error!(operation = "add_bingo", code = card_code, %line, error = %e, "store failure");
        })
    }

    fn remove_bingo(&self, card_code: &str, line: Line) -> Result<bool> {
        remove_bingo(self, card_code, line).inspect_err(|e| {
            error!(operation = "remove_bingo", code = card_code, %line, error = %e, "store failure");
        })
    }
}

// ============================================================================
// HISTORY
// ============================================================================

fn record_event(
    conn: &Connection,
    code: &str,
    event_type: &str,
    data: serde_json::Value,
    actor: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO card_events (id, card_code, event_type, data, actor, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            uuid::Uuid::new_v4().to_string(),
            code,
            event_type,
            serde_json::to_string(&data)?,
            actor,
            Utc::now().to_rfc3339(),
        ],
    )?;

    Ok(())
}

fn event_from_row(row: &Row) -> rusqlite::Result<CardEvent> {
    let data: String = row.get(3)?;

    Ok(CardEvent {
        id: row.get(0)?,
        card_code: row.get(1)?,
        event_type: row.get(2)?,
        data: serde_json::from_str(&data).map_err(|e| conversion_error(3, e))?,
        actor: row.get(4)?,
        recorded_at: parse_timestamp(row, 5)?,
    })
}

/// History of an existing card, newest first
pub fn get_card_events(conn: &Connection, code: &str) -> Result<Vec<CardEvent>> {
    require_card(conn, code)?;

    let mut stmt = conn.prepare(
        "SELECT id, card_code, event_type, data, actor, recorded_at
         FROM card_events
         WHERE card_code = ?1
         ORDER BY seq DESC",
    )?;

    let events = stmt
        .query_map([code], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::FREE_SPACE_POSITION;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn new_card(owner: &str) -> NewCard {
        NewCard {
            owner_name: owner.to_string(),
            goals: (1..=25).map(|i| format!("Goal {}", i)).collect(),
            free_space_index: 3,
        }
    }

    fn create(conn: &Connection, owner: &str, seed: u64) -> String {
        create_card_with(conn, &new_card(owner), &mut StdRng::seed_from_u64(seed), Utc::now())
            .unwrap()
    }

    #[test]
    fn test_create_and_get_card() {
        let conn = test_db();
        let code = create(&conn, "Anna", 1);

        assert!(is_valid_card_code(&code));
        assert!(code.starts_with("ANNA-"));

        let details = get_card(&conn, &code).unwrap();
        assert_eq!(details.card.display_name, "Anna");
        assert_eq!(details.card.theme, Theme::Royal);
        assert_eq!(details.card.stamp_icon, DEFAULT_STAMP_ICON);
        assert_eq!(details.goals.len(), 25);
        assert!(details.bingos.is_empty());

        for (i, goal) in details.goals.iter().enumerate() {
            assert_eq!(goal.position, i, "goals ordered by position");
        }

        // Free space: original index 3, center, already complete
        let free = &details.goals[FREE_SPACE_POSITION];
        assert!(free.is_free_space);
        assert_eq!(free.text, "Goal 4");
        assert!(free.is_completed);
        assert!(free.completed_date.is_some());
        assert_eq!(details.goals.iter().filter(|g| g.is_completed).count(), 1);

        let texts: BTreeSet<String> = details.goals.iter().map(|g| g.text.clone()).collect();
        assert_eq!(texts.len(), 25);
    }

    #[test]
    fn test_create_rejects_invalid_card_without_writing() {
        let conn = test_db();
        let mut card = new_card("Anna");
        card.goals.truncate(24);

        let err = create_card(&conn, &card).unwrap_err();
        assert!(matches!(err, BingoError::Validation(_)));
        assert_eq!(count_cards(&conn).unwrap(), 0);
    }

    #[test]
    fn test_create_sanitizes_text() {
        let conn = test_db();
        let mut card = new_card("<Anna>");
        card.goals[0] = "<script>alert(1)</script>".to_string();
        card.free_space_index = 0;

        let code = create_card(&conn, &card).unwrap();
        let details = get_card(&conn, &code).unwrap();

        assert_eq!(details.card.owner_name, "&lt;Anna&gt;");
        assert_eq!(
            details.goals[FREE_SPACE_POSITION].text,
            "&lt;script&gt;alert(1)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_duplicate_code_is_reported() {
        let conn = test_db();
        let now = Utc::now();

        create_card_with(&conn, &new_card("Anna"), &mut StdRng::seed_from_u64(9), now).unwrap();
        let err = create_card_with(&conn, &new_card("Anna"), &mut StdRng::seed_from_u64(9), now)
            .unwrap_err();

        assert!(matches!(err, BingoError::DuplicateCode(_)));
        assert_eq!(count_cards(&conn).unwrap(), 1);
    }

    #[test]
    fn test_get_card_not_found_and_malformed() {
        let conn = test_db();

        assert!(matches!(
            get_card(&conn, "NOBODY-2026-ZZZZ"),
            Err(BingoError::NotFound(_))
        ));
        assert!(matches!(
            get_card(&conn, "not a code"),
            Err(BingoError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_card_settings() {
        let conn = test_db();
        let code = create(&conn, "Anna", 2);

        let update = CardSettingsUpdate {
            display_name: Some("Anna & Co".to_string()),
            theme: Some("ocean".to_string()),
            stamp_icon: None,
            stamp_color: Some("#4ECDC4".to_string()),
        };
        let card = update_card_settings(&conn, &code, &update).unwrap();

        assert_eq!(card.display_name, "Anna &amp; Co");
        assert_eq!(card.theme, Theme::Ocean);
        assert_eq!(card.stamp_icon, DEFAULT_STAMP_ICON);
        assert_eq!(card.stamp_color, "#4ECDC4");

        let stored = get_card(&conn, &code).unwrap().card;
        assert_eq!(stored, card);

        let bad = CardSettingsUpdate {
            theme: Some("neon".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            update_card_settings(&conn, &code, &bad),
            Err(BingoError::Validation(_))
        ));
        assert!(matches!(
            update_card_settings(&conn, "NOBODY-2026-ZZZZ", &update),
            Err(BingoError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_goal() {
        let conn = test_db();
        let code = create(&conn, "Anna", 3);
        let goal = get_goals(&conn, &code).unwrap()[0].clone();
        let today = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();

        let done = update_goal_on(
            &conn,
            goal.id,
            &GoalUpdate::complete(None, Some("Finally <3".to_string())),
            today,
        )
        .unwrap();
        assert!(done.is_completed);
        assert_eq!(done.completed_date, Some(today));
        assert_eq!(done.notes.as_deref(), Some("Finally &lt;3"));
        assert_eq!(get_goal(&conn, goal.id).unwrap(), done);

        let undone = update_goal(&conn, goal.id, &GoalUpdate::uncomplete()).unwrap();
        assert!(!undone.is_completed);
        assert_eq!(undone.completed_date, None);
        assert_eq!(undone.notes, None);

        assert!(matches!(
            update_goal(&conn, 9999, &GoalUpdate::uncomplete()),
            Err(BingoError::NotFound(_))
        ));
    }

    #[test]
    fn test_free_space_cannot_be_uncompleted() {
        let conn = test_db();
        let code = create(&conn, "Anna", 4);
        let free = get_goals(&conn, &code).unwrap()[FREE_SPACE_POSITION].clone();

        let err = update_goal(&conn, free.id, &GoalUpdate::uncomplete()).unwrap_err();
        assert!(matches!(err, BingoError::Validation(_)));
        assert!(get_goal(&conn, free.id).unwrap().is_completed);
    }

    #[test]
    fn test_bingo_uniqueness() {
        let conn = test_db();
        let code = create(&conn, "Anna", 5);
        let line = Line::diagonal(1).unwrap();

        let first = add_bingo(&conn, &code, line).unwrap();
        let second = add_bingo(&conn, &code, line).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(get_bingos(&conn, &code).unwrap().len(), 1);

        assert!(remove_bingo(&conn, &code, line).unwrap());
        assert!(!remove_bingo(&conn, &code, line).unwrap());
        assert!(get_bingos(&conn, &code).unwrap().is_empty());
    }

    #[test]
    fn test_bingo_for_unknown_card_fails() {
        let conn = test_db();
        let err = add_bingo(&conn, "NOBODY-2026-ZZZZ", Line::row(0).unwrap()).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_delete_card_cascades() {
        let conn = test_db();
        let code = create(&conn, "Anna", 6);
        let other = create(&conn, "Ben", 7);
        add_bingo(&conn, &code, Line::row(2).unwrap()).unwrap();
        add_bingo(&conn, &other, Line::row(2).unwrap()).unwrap();

        delete_card(&conn, &code, "Anna").unwrap();

        assert!(matches!(get_card(&conn, &code), Err(BingoError::NotFound(_))));
        assert!(get_goals(&conn, &code).unwrap().is_empty());
        assert!(get_bingos(&conn, &code).unwrap().is_empty());

        // Other cards untouched
        assert_eq!(get_card(&conn, &other).unwrap().bingos.len(), 1);
    }

    #[test]
    fn test_delete_card_requires_owner() {
        let conn = test_db();
        let code = create(&conn, "Anna", 8);

        let err = delete_card(&conn, &code, "anna").unwrap_err();
        assert!(matches!(err, BingoError::Forbidden(_)));
        assert!(get_card(&conn, &code).is_ok());

        assert!(matches!(
            delete_card(&conn, "NOBODY-2026-ZZZZ", "Anna"),
            Err(BingoError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_card_removes_history() {
        let conn = test_db();
        let code = create(&conn, "Anna", 12);
        add_bingo(&conn, &code, Line::row(0).unwrap()).unwrap();
        assert_eq!(get_card_events(&conn, &code).unwrap().len(), 2);

        delete_card(&conn, &code, "Anna").unwrap();

        assert!(matches!(
            get_card_events(&conn, &code),
            Err(BingoError::NotFound(_))
        ));
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM card_events WHERE card_code = ?1", [&code], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(left, 0);
    }

    fn refuse_history(conn: &Connection, event_type: &str) {
        conn.execute_batch(&format!(
            "CREATE TRIGGER refuse_{0} BEFORE INSERT ON card_events
             WHEN NEW.event_type = '{0}'
             BEGIN SELECT RAISE(ABORT, 'history unavailable'); END;",
            event_type
        ))
        .unwrap();
    }

    #[test]
    fn test_goal_update_is_atomic_with_history() {
        let conn = test_db();
        let code = create(&conn, "Anna", 13);
        let goal = get_goals(&conn, &code).unwrap()[0].clone();
        refuse_history(&conn, "goal_updated");

        let err = update_goal(&conn, goal.id, &GoalUpdate::complete(None, None)).unwrap_err();
        assert!(err.is_internal());

        assert_eq!(get_goal(&conn, goal.id).unwrap(), goal);
        assert_eq!(get_card_events(&conn, &code).unwrap().len(), 1);
    }

    #[test]
    fn test_bingo_writes_are_atomic_with_history() {
        let conn = test_db();
        let code = create(&conn, "Anna", 14);
        let line = Line::column(3).unwrap();

        refuse_history(&conn, "bingo_added");
        assert!(add_bingo(&conn, &code, line).is_err());
        assert!(get_bingos(&conn, &code).unwrap().is_empty());

        conn.execute_batch("DROP TRIGGER refuse_bingo_added").unwrap();
        add_bingo(&conn, &code, line).unwrap();

        refuse_history(&conn, "bingo_removed");
        assert!(remove_bingo(&conn, &code, line).is_err());
        assert_eq!(get_bingos(&conn, &code).unwrap().len(), 1);
    }

    #[test]
    fn test_file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.db");

        let code = {
            let conn = open_database(&path).unwrap();
            create(&conn, "Anna", 11)
        };

        let conn = open_database(&path).unwrap();
        let details = get_card(&conn, &code).unwrap();
        assert_eq!(details.goals.len(), 25);
        assert_eq!(count_cards(&conn).unwrap(), 1);
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();
        let code = create(&conn, "Anna", 10);
        add_bingo(&conn, &code, Line::column(2).unwrap()).unwrap();
        remove_bingo(&conn, &code, Line::column(2).unwrap()).unwrap();

        let events = get_card_events(&conn, &code).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();

        assert_eq!(types, vec!["bingo_removed", "bingo_added", "card_created"]);
        assert_eq!(events[0].data, serde_json::json!({"type": "column", "index": 2}));
        assert_eq!(events[0].actor, ACTOR_RECONCILER);
    }
}
