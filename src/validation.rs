// 📐 Input Validation - boundary checks run before anything is persisted
//
// Every validator collects all problems instead of stopping at the first,
// so a caller sees each offending field at once.

use crate::card::{CardSettingsUpdate, Goal, GoalUpdate, NewCard, Theme};
use crate::grid::CELL_COUNT;
use regex::Regex;
use std::sync::OnceLock;

pub const OWNER_NAME_MAX: usize = 50;
pub const DISPLAY_NAME_MAX: usize = 50;
pub const GOAL_TEXT_MAX: usize = 100;
pub const NOTES_MAX: usize = 500;
pub const STAMP_ICON_MAX: usize = 8;

// ============================================================================
// VALIDATION ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

fn finish(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// PATTERNS
// ============================================================================

fn card_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]+-[0-9]{4}-[A-Z0-9]{4}$").expect("card code pattern"))
}

fn hex_color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("hex color pattern"))
}

/// `NAME-YEAR-XXXX`, uppercase letters and digits only
pub fn is_valid_card_code(code: &str) -> bool {
    card_code_pattern().is_match(code)
}

/// `#RRGGBB`
pub fn is_valid_hex_color(color: &str) -> bool {
    hex_color_pattern().is_match(color)
}

/// Escape the five HTML-significant characters
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn check_length(
    errors: &mut Vec<ValidationError>,
    field: &str,
    value: &str,
    min: usize,
    max: usize,
) {
    let len = value.trim().chars().count();
    if len < min {
        errors.push(ValidationError::new(field, "must not be empty"));
    } else if len > max {
        errors.push(ValidationError::new(
            field,
            format!("must be at most {} characters (got {})", max, len),
        ));
    }
}

// ============================================================================
// VALIDATORS
// ============================================================================

pub fn validate_new_card(card: &NewCard) -> ValidationResult {
    let mut errors = Vec::new();

    check_length(&mut errors, "ownerName", &card.owner_name, 1, OWNER_NAME_MAX);

    if card.goals.len() != CELL_COUNT {
        errors.push(ValidationError::new(
            "goals",
            format!("exactly {} goals are required (got {})", CELL_COUNT, card.goals.len()),
        ));
    }
    for (i, goal) in card.goals.iter().enumerate() {
        check_length(&mut errors, &format!("goals[{}]", i), goal, 1, GOAL_TEXT_MAX);
    }

    if card.free_space_index < 0 || card.free_space_index >= CELL_COUNT as i64 {
        errors.push(ValidationError::new(
            "freeSpaceIndex",
            format!("must be between 0 and {} (got {})", CELL_COUNT - 1, card.free_space_index),
        ));
    }

    finish(errors)
}

pub fn validate_settings_update(update: &CardSettingsUpdate) -> ValidationResult {
    if update.is_empty() {
        return Err(vec![ValidationError::new("body", "no updates provided")]);
    }

    let mut errors = Vec::new();

    if let Some(name) = &update.display_name {
        check_length(&mut errors, "displayName", name, 1, DISPLAY_NAME_MAX);
    }
    if let Some(theme) = &update.theme {
        if let Err(crate::error::BingoError::Validation(mut theme_errors)) = theme.parse::<Theme>() {
            errors.append(&mut theme_errors);
        }
    }
    if let Some(icon) = &update.stamp_icon {
        check_length(&mut errors, "stampIcon", icon, 1, STAMP_ICON_MAX);
    }
    if let Some(color) = &update.stamp_color {
        if !is_valid_hex_color(color) {
            errors.push(ValidationError::new("stampColor", "must match #RRGGBB"));
        }
    }

    finish(errors)
}

/// Validate a goal update against the goal it applies to
pub fn validate_goal_update(update: &GoalUpdate, goal: &Goal) -> ValidationResult {
    if update.is_empty() {
        return Err(vec![ValidationError::new("body", "no updates provided")]);
    }

    let mut errors = Vec::new();
    let completing = update.is_completed == Some(true);

    if let Some(text) = &update.text {
        check_length(&mut errors, "text", text, 1, GOAL_TEXT_MAX);
    }

    if let Some(notes) = &update.notes {
        if !completing {
            errors.push(ValidationError::new(
                "notes",
                "only accepted together with isCompleted=true",
            ));
        } else if notes.chars().count() > NOTES_MAX {
            errors.push(ValidationError::new(
                "notes",
                format!("must be at most {} characters", NOTES_MAX),
            ));
        }
    }

    if update.completed_date.as_deref().is_some_and(|d| !d.trim().is_empty()) {
        if !completing {
            errors.push(ValidationError::new(
                "completedDate",
                "only accepted together with isCompleted=true",
            ));
        } else if let Err(crate::error::BingoError::Validation(mut date_errors)) =
            update.parsed_completed_date()
        {
            errors.append(&mut date_errors);
        }
    }

    if goal.is_free_space && update.is_completed == Some(false) {
        errors.push(ValidationError::new(
            "isCompleted",
            "the free space is always complete",
        ));
    }

    finish(errors)
}

// ============================================================================
// TESTS
// ============================================================================
