// Bingo Card Service - Core Library
// Exposes all modules for use in the CLI, the API server and tests

pub mod card;
pub mod config;
pub mod db;
pub mod error;
pub mod grid;
pub mod lines;
pub mod reconcile;
pub mod session;
pub mod validation;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use card::{
    Bingo, Card, CardDetails, CardSettingsUpdate, Goal, GoalUpdate, NewCard, Theme,
    generate_card_code, layout_goals,
};
pub use config::Config;
pub use db::{
    CardEvent,
    setup_database, open_database, create_card, get_card, update_card_settings,
    update_goal, get_goal, add_bingo, remove_bingo, delete_card, get_card_events,
};
pub use error::{BingoError, Result};
pub use grid::{Grid, FREE_SPACE_POSITION};
pub use lines::{detect_lines, Line, LineKind};
pub use reconcile::{reconcile, BingoStore, ReconcilePlan, ReconcileReport, Trigger};
pub use session::CardSession;
pub use validation::{ValidationError, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
