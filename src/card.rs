// 🃏 Card Model - cards, goals, bingo records and card creation helpers
//
// A card owns exactly 25 goals laid out on a 5×5 grid. The free-space goal
// always sits in the center (position 12); the other 24 are shuffled into
// the remaining cells when the card is created.

use crate::error::{BingoError, Result};
use crate::grid::{CELL_COUNT, FREE_SPACE_POSITION};
use crate::lines::Line;
use crate::validation::escape_html;
use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Characters used for the random card code suffix
pub const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const CODE_SUFFIX_LEN: usize = 4;
pub const CODE_NAME_MAX: usize = 10;

/// Prefix used when an owner name has no letters to derive one from
const FALLBACK_CODE_PREFIX: &str = "CARD";

pub const DEFAULT_STAMP_ICON: &str = "⭐";
pub const DEFAULT_STAMP_COLOR: &str = "#FFD700";

// ============================================================================
// THEME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Theme {
    #[default]
    Royal,
    Sunset,
    Ocean,
    Forest,
    Lavender,
    SunsetPink,
}

impl Theme {
    pub const ALL: [Theme; 6] = [
        Theme::Royal,
        Theme::Sunset,
        Theme::Ocean,
        Theme::Forest,
        Theme::Lavender,
        Theme::SunsetPink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Royal => "royal",
            Theme::Sunset => "sunset",
            Theme::Ocean => "ocean",
            Theme::Forest => "forest",
            Theme::Lavender => "lavender",
            Theme::SunsetPink => "sunset-pink",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = BingoError;

    fn from_str(s: &str) -> Result<Self> {
        Theme::ALL
            .into_iter()
            .find(|theme| theme.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Theme::ALL.iter().map(|t| t.as_str()).collect();
                BingoError::validation("theme", format!("must be one of {}", names.join(", ")))
            })
    }
}

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub code: String,
    /// Only used to authorize deletion, never sent to viewers
    #[serde(skip_serializing)]
    pub owner_name: String,
    pub display_name: String,
    pub theme: Theme,
    pub stamp_icon: String,
    pub stamp_color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: i64,
    pub card_code: String,
    pub position: usize,
    pub text: String,
    pub is_free_space: bool,
    pub is_completed: bool,
    pub completed_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl Goal {
    /// Apply an already validated update.
    ///
    /// Completing without a date keeps the existing completion date, or
    /// falls back to `today`. Un-completing clears date and notes.
    pub fn apply_update(&mut self, update: &GoalUpdate, today: NaiveDate) -> Result<()> {
        if let Some(text) = &update.text {
            self.text = text.clone();
        }

        match update.is_completed {
            Some(true) => {
                let previous = if self.is_completed { self.completed_date } else { None };
                self.completed_date = Some(update.parsed_completed_date()?.or(previous).unwrap_or(today));
                self.is_completed = true;

                if let Some(notes) = &update.notes {
                    self.notes = if notes.is_empty() { None } else { Some(notes.clone()) };
                }
            }
            Some(false) => {
                self.is_completed = false;
                self.completed_date = None;
                self.notes = None;
            }
            None => {}
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn for_test(id: i64, position: usize, is_completed: bool) -> Self {
        Goal {
            id,
            card_code: "TEST-2026-0000".to_string(),
            position,
            text: format!("Goal {}", position + 1),
            is_free_space: position == FREE_SPACE_POSITION,
            is_completed,
            completed_date: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bingo {
    pub id: i64,
    pub card_code: String,
    #[serde(flatten)]
    pub line: Line,
    pub completed_at: DateTime<Utc>,
}

/// Everything a viewer needs to render a card
#[derive(Debug, Clone, Serialize)]
pub struct CardDetails {
    pub card: Card,
    pub goals: Vec<Goal>,
    pub bingos: Vec<Bingo>,
}

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub owner_name: String,
    pub goals: Vec<String>,
    pub free_space_index: i64,
}

impl NewCard {
    pub fn sanitized(&self) -> NewCard {
        NewCard {
            owner_name: escape_html(self.owner_name.trim()),
            goals: self.goals.iter().map(|g| escape_html(g.trim())).collect(),
            free_space_index: self.free_space_index,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSettingsUpdate {
    pub display_name: Option<String>,
    pub theme: Option<String>,
    pub stamp_icon: Option<String>,
    pub stamp_color: Option<String>,
}

impl CardSettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.theme.is_none()
            && self.stamp_icon.is_none()
            && self.stamp_color.is_none()
    }

    pub fn sanitized(&self) -> CardSettingsUpdate {
        CardSettingsUpdate {
            display_name: self.display_name.as_deref().map(|s| escape_html(s.trim())),
            theme: self.theme.clone(),
            stamp_icon: self.stamp_icon.as_deref().map(|s| escape_html(s.trim())),
            stamp_color: self.stamp_color.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalUpdate {
    pub text: Option<String>,
    pub is_completed: Option<bool>,
    /// `YYYY-MM-DD`; empty means "not given"
    pub completed_date: Option<String>,
    pub notes: Option<String>,
}

impl GoalUpdate {
    pub fn complete(completed_date: Option<NaiveDate>, notes: Option<String>) -> Self {
        GoalUpdate {
            is_completed: Some(true),
            completed_date: completed_date.map(|d| d.format("%Y-%m-%d").to_string()),
            notes,
            ..Default::default()
        }
    }

    pub fn uncomplete() -> Self {
        GoalUpdate {
            is_completed: Some(false),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.is_completed.is_none()
            && self.completed_date.is_none()
            && self.notes.is_none()
    }

    pub fn parsed_completed_date(&self) -> Result<Option<NaiveDate>> {
        match self.completed_date.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| BingoError::validation("completedDate", "must be a date formatted YYYY-MM-DD")),
        }
    }

    pub fn sanitized(&self) -> GoalUpdate {
        GoalUpdate {
            text: self.text.as_deref().map(|s| escape_html(s.trim())),
            is_completed: self.is_completed,
            completed_date: self.completed_date.clone(),
            notes: self.notes.as_deref().map(|s| escape_html(s.trim())),
        }
    }
}

// ============================================================================
// CARD CREATION
// ============================================================================

/// Generate a shareable card code: `NAME-YEAR-XXXX`.
///
/// NAME is the uppercased letters of the owner name (at most 10). Codes are
/// not checked for collisions here; the store's primary key rejects them.
pub fn generate_card_code<R: Rng + ?Sized>(owner_name: &str, year: i32, rng: &mut R) -> String {
    let mut prefix: String = owner_name
        .chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_ascii_uppercase())
        .take(CODE_NAME_MAX)
        .collect();

    if prefix.is_empty() {
        prefix = FALLBACK_CODE_PREFIX.to_string();
    }

    let suffix: String = (0..CODE_SUFFIX_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();

    format!("{}-{:04}-{}", prefix, year, suffix)
}

/// A goal ready to be inserted at its grid position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalSeed {
    pub position: usize,
    pub text: String,
    pub is_free_space: bool,
}

/// Place the free-space text in the center and shuffle the other 24 texts
/// (Fisher-Yates) into the remaining positions.
pub fn layout_goals<R: Rng + ?Sized>(
    texts: &[String],
    free_space_index: usize,
    rng: &mut R,
) -> Result<Vec<GoalSeed>> {
    if texts.len() != CELL_COUNT || free_space_index >= CELL_COUNT {
        return Err(BingoError::Internal(format!(
            "cannot lay out {} goals with free space {}",
            texts.len(),
            free_space_index
        )));
    }

    let mut others: Vec<&String> = texts
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != free_space_index)
        .map(|(_, text)| text)
        .collect();
    others.shuffle(rng);

    let mut others = others.into_iter();
    let mut seeds = Vec::with_capacity(CELL_COUNT);

    for position in 0..CELL_COUNT {
        let (text, is_free_space) = if position == FREE_SPACE_POSITION {
            (&texts[free_space_index], true)
        } else {
            match others.next() {
                Some(text) => (text, false),
                None => return Err(BingoError::Internal("ran out of goals during layout".to_string())),
            }
        };

        seeds.push(GoalSeed {
            position,
            text: text.clone(),
            is_free_space,
        });
    }

    Ok(seeds)
}

// ============================================================================
// TESTS
// ============================================================================
