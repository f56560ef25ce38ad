// 🎯 Card Session - one card's state threaded through each operation
//
// Flow for every goal change:
//   update goal → rebuild grid → reconcile bingos → apply delta → new session
//
// The reconciler's delta is applied to the session directly instead of
// re-reading the bingo list from the store.

use crate::card::{Bingo, Card, CardDetails, Goal, GoalUpdate};
use crate::db;
use crate::error::{BingoError, Result};
use crate::grid::Grid;
use crate::lines::Line;
use crate::reconcile::{reconcile, ReconcileReport, Trigger};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct CardSession {
    pub card: Card,
    pub goals: Vec<Goal>,
    pub bingos: Vec<Bingo>,
}

impl From<CardDetails> for CardSession {
    fn from(details: CardDetails) -> Self {
        CardSession {
            card: details.card,
            goals: details.goals,
            bingos: details.bingos,
        }
    }
}

impl CardSession {
    pub fn load(conn: &Connection, code: &str) -> Result<Self> {
        Ok(db::get_card(conn, code)?.into())
    }

    pub fn code(&self) -> &str {
        &self.card.code
    }

    pub fn grid(&self) -> Result<Grid> {
        Grid::from_goals(&self.goals)
    }

    pub fn persisted_lines(&self) -> BTreeSet<Line> {
        self.bingos.iter().map(|b| b.line).collect()
    }

    pub fn completed_count(&self) -> usize {
        self.goals.iter().filter(|g| g.is_completed).count()
    }

    pub fn goal(&self, id: i64) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    pub fn goal_at(&self, position: usize) -> Option<&Goal> {
        self.goals.iter().find(|g| g.position == position)
    }

    /// Apply a goal update, then reconcile the card's bingos.
    ///
    /// A failed bingo write does not fail the update: the goal change is kept
    /// and the report says the pass did not converge.
    pub fn update_goal(
        self,
        conn: &Connection,
        goal_id: i64,
        update: &GoalUpdate,
    ) -> Result<(CardSession, ReconcileReport)> {
        self.update_goal_on(conn, goal_id, update, chrono::Utc::now().date_naive())
    }

    pub fn update_goal_on(
        mut self,
        conn: &Connection,
        goal_id: i64,
        update: &GoalUpdate,
        today: NaiveDate,
    ) -> Result<(CardSession, ReconcileReport)> {
        let slot = self
            .goals
            .iter()
            .position(|g| g.id == goal_id)
            .ok_or_else(|| BingoError::goal_not_found(goal_id))?;
        let was_completed = self.goals[slot].is_completed;

        let updated = db::update_goal_on(conn, goal_id, update, today)?;
        let trigger = Trigger::for_transition(was_completed, updated.is_completed);
        self.goals[slot] = updated;

        let report = self.reconcile(conn, trigger)?;
        Ok((self, report))
    }

    pub fn complete(
        self,
        conn: &Connection,
        goal_id: i64,
        date: Option<NaiveDate>,
        notes: Option<String>,
    ) -> Result<(CardSession, ReconcileReport)> {
        self.update_goal(conn, goal_id, &GoalUpdate::complete(date, notes))
    }

    pub fn uncomplete(self, conn: &Connection, goal_id: i64) -> Result<(CardSession, ReconcileReport)> {
        self.update_goal(conn, goal_id, &GoalUpdate::uncomplete())
    }

    /// Reconcile without a goal change, e.g. after an earlier failed pass
    pub fn recheck(mut self, conn: &Connection) -> Result<(CardSession, ReconcileReport)> {
        let report = self.reconcile(conn, Trigger::Recheck)?;
        Ok((self, report))
    }

    fn reconcile(&mut self, conn: &Connection, trigger: Trigger) -> Result<ReconcileReport> {
        let grid = self.grid()?;
        let report = reconcile(conn, &self.card.code, &grid, &self.persisted_lines(), trigger);

        self.bingos.retain(|b| !report.removed.contains(&b.line));
        for bingo in &report.added {
            if !self.bingos.iter().any(|b| b.line == bingo.line) {
                self.bingos.push(bingo.clone());
            }
        }
        self.bingos.sort_by_key(|b| b.line);

        if report.celebrate {
            info!(code = %self.card.code, new = report.added.len(), "new bingo");
        }

        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================
