// ⚖️ Bingo Reconciler - keeps persisted bingo records equal to complete lines
//
//   to_add    = detected - persisted
//   to_remove = persisted - detected
//
// The two sets are disjoint, so the order of operations does not matter.
// A pass that hits a store failure keeps going with the remaining lines and
// reports itself as not converged; the next pass picks up the difference.

use crate::card::Bingo;
use crate::error::Result;
use crate::grid::Grid;
use crate::lines::{detect_lines, Line};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

// ============================================================================
// STORE SEAM
// ============================================================================

/// The two writes the reconciler needs from a record store
pub trait BingoStore {
    /// Insert a bingo, or return the existing record for the same line
    fn add_bingo(&self, card_code: &str, line: Line) -> Result<Bingo>;

    /// Delete a bingo. Returns false if there was nothing to delete.
    fn remove_bingo(&self, card_code: &str, line: Line) -> Result<bool>;
}

// ============================================================================
// PLAN
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilePlan {
    pub to_add: BTreeSet<Line>,
    pub to_remove: BTreeSet<Line>,
}

impl ReconcilePlan {
    pub fn between(detected: &BTreeSet<Line>, persisted: &BTreeSet<Line>) -> Self {
        ReconcilePlan {
            to_add: detected.difference(persisted).copied().collect(),
            to_remove: persisted.difference(detected).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// What caused a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    /// A goal went from incomplete to complete
    GoalCompleted,
    GoalUncompleted,
    /// Text, notes or date changed without a completion transition
    GoalEdited,
    Recheck,
}

impl Trigger {
    pub fn for_transition(was_completed: bool, is_completed: bool) -> Self {
        match (was_completed, is_completed) {
            (false, true) => Trigger::GoalCompleted,
            (true, false) => Trigger::GoalUncompleted,
            _ => Trigger::GoalEdited,
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileFailure {
    pub line: Line,
    pub operation: Operation,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub trigger: Trigger,
    pub plan: ReconcilePlan,
    /// Records written by this pass
    pub added: Vec<Bingo>,
    /// Lines whose records were deleted (or were already gone)
    pub removed: Vec<Line>,
    pub failures: Vec<ReconcileFailure>,
    /// A goal was newly completed and at least one line became complete
    pub celebrate: bool,
}

impl ReconcileReport {
    /// Persisted set now equals the detected set
    pub fn is_converged(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

// ============================================================================
// RECONCILE
// ============================================================================

/// Recompute every complete line from `grid` and bring the store in line
/// with it. `persisted` is the set of lines the caller last saw stored.
pub fn reconcile<S: BingoStore + ?Sized>(
    store: &S,
    card_code: &str,
    grid: &Grid,
    persisted: &BTreeSet<Line>,
    trigger: Trigger,
) -> ReconcileReport {
    let detected = detect_lines(grid);
    let plan = ReconcilePlan::between(&detected, persisted);

    let mut removed = Vec::new();
    let mut added = Vec::new();
    let mut failures = Vec::new();

    for &line in &plan.to_remove {
        match store.remove_bingo(card_code, line) {
            Ok(_) => removed.push(line),
            Err(e) => {
                warn!(card = card_code, %line, error = %e, "failed to remove bingo");
                failures.push(ReconcileFailure {
                    line,
                    operation: Operation::Remove,
                    message: e.to_string(),
                });
            }
        }
    }

    for &line in &plan.to_add {
        match store.add_bingo(card_code, line) {
            Ok(bingo) => added.push(bingo),
            Err(e) => {
                warn!(card = card_code, %line, error = %e, "failed to add bingo");
                failures.push(ReconcileFailure {
                    line,
                    operation: Operation::Add,
                    message: e.to_string(),
                });
            }
        }
    }

    let celebrate = trigger == Trigger::GoalCompleted && !plan.to_add.is_empty();

    debug!(
        card = card_code,
        detected = detected.len(),
        added = added.len(),
        removed = removed.len(),
        failed = failures.len(),
        "reconciled bingos"
    );

    ReconcileReport {
        trigger,
        plan,
        added,
        removed,
        failures,
        celebrate,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BingoError;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;

    const CODE: &str = "TEST-2026-0000";

    /// In-memory store that can be told to fail writes
    #[derive(Default)]
    struct MemoryStore {
        bingos: RefCell<BTreeMap<Line, Bingo>>,
        next_id: Cell<i64>,
        fail_writes: Cell<bool>,
        insert_calls: Cell<usize>,
    }

    impl MemoryStore {
        fn lines(&self) -> BTreeSet<Line> {
            self.bingos.borrow().keys().copied().collect()
        }
    }

    impl BingoStore for MemoryStore {
        fn add_bingo(&self, card_code: &str, line: Line) -> Result<Bingo> {
            if self.fail_writes.get() {
                return Err(BingoError::Internal("disk full".to_string()));
            }
            self.insert_calls.set(self.insert_calls.get() + 1);

            let mut bingos = self.bingos.borrow_mut();
            let bingo = bingos.entry(line).or_insert_with(|| {
                self.next_id.set(self.next_id.get() + 1);
                Bingo {
                    id: self.next_id.get(),
                    card_code: card_code.to_string(),
                    line,
                    completed_at: Utc::now(),
                }
            });
            Ok(bingo.clone())
        }

        fn remove_bingo(&self, _card_code: &str, line: Line) -> Result<bool> {
            if self.fail_writes.get() {
                return Err(BingoError::Internal("disk full".to_string()));
            }
            Ok(self.bingos.borrow_mut().remove(&line).is_some())
        }
    }

    fn grid(positions: &[usize]) -> Grid {
        Grid::from_marked_positions(positions.iter().copied())
    }

    #[test]
    fn test_plan_is_set_difference() {
        let detected = BTreeSet::from([Line::row(0).unwrap(), Line::column(1).unwrap()]);
        let persisted = BTreeSet::from([Line::column(1).unwrap(), Line::diagonal(1).unwrap()]);

        let plan = ReconcilePlan::between(&detected, &persisted);

        assert_eq!(plan.to_add, BTreeSet::from([Line::row(0).unwrap()]));
        assert_eq!(plan.to_remove, BTreeSet::from([Line::diagonal(1).unwrap()]));
        assert!(plan.to_add.is_disjoint(&plan.to_remove));
    }

    #[test]
    fn test_row_zero_added_then_removed() {
        let store = MemoryStore::default();

        let mut marked = vec![0, 1, 2, 3, 4];
        let report = reconcile(&store, CODE, &grid(&marked), &store.lines(), Trigger::GoalCompleted);

        assert_eq!(report.added.len(), 1);
        assert_eq!(report.added[0].line, Line::row(0).unwrap());
        assert!(report.celebrate);
        assert_eq!(store.lines(), BTreeSet::from([Line::row(0).unwrap()]));

        marked.retain(|&p| p != 2);
        let report = reconcile(&store, CODE, &grid(&marked), &store.lines(), Trigger::GoalUncompleted);

        assert_eq!(report.removed, vec![Line::row(0).unwrap()]);
        assert!(!report.celebrate);
        assert!(store.lines().is_empty());
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let store = MemoryStore::default();
        let g = grid(&[0, 6, 12, 18, 24, 4, 8, 16, 20]);

        let first = reconcile(&store, CODE, &g, &store.lines(), Trigger::GoalCompleted);
        assert_eq!(first.added.len(), 2);

        let second = reconcile(&store, CODE, &g, &store.lines(), Trigger::GoalCompleted);
        assert!(second.plan.is_empty());
        assert!(!second.has_changes());
        assert!(!second.celebrate, "re-saving a completed goal must not celebrate");
    }

    #[test]
    fn test_celebrate_only_on_new_completion() {
        let g = grid(&[0, 1, 2, 3, 4]);

        for trigger in [Trigger::GoalEdited, Trigger::Recheck, Trigger::GoalUncompleted] {
            let store = MemoryStore::default();
            let report = reconcile(&store, CODE, &g, &BTreeSet::new(), trigger);
            assert_eq!(report.added.len(), 1);
            assert!(!report.celebrate, "{:?}", trigger);
        }
    }

    #[test]
    fn test_stale_persisted_view_does_not_duplicate() {
        // Caller's view lags behind the store (e.g. a second tab)
        let store = MemoryStore::default();
        let g = grid(&[0, 1, 2, 3, 4]);

        reconcile(&store, CODE, &g, &BTreeSet::new(), Trigger::GoalCompleted);
        reconcile(&store, CODE, &g, &BTreeSet::new(), Trigger::GoalCompleted);

        assert_eq!(store.bingos.borrow().len(), 1);
        assert_eq!(store.insert_calls.get(), 2);
    }

    #[test]
    fn test_failures_are_reported_and_next_pass_converges() {
        let store = MemoryStore::default();
        let g = grid(&[10, 11, 12, 13, 14]);

        store.fail_writes.set(true);
        let report = reconcile(&store, CODE, &g, &store.lines(), Trigger::GoalCompleted);

        assert!(!report.is_converged());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].operation, Operation::Add);
        assert!(store.lines().is_empty());

        store.fail_writes.set(false);
        let report = reconcile(&store, CODE, &g, &store.lines(), Trigger::Recheck);

        assert!(report.is_converged());
        assert_eq!(store.lines(), BTreeSet::from([Line::row(2).unwrap()]));
    }

    fn config() -> ProptestConfig {
        ProptestConfig {
            cases: std::env::var("PROPTEST_CASES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(128),
            failure_persistence: None,
            ..ProptestConfig::default()
        }
    }

    /// Complete lines worked out from row/column coordinates
    fn expected_lines(marked: &BTreeSet<usize>) -> BTreeSet<Line> {
        let at = |r: usize, c: usize| marked.contains(&(r * 5 + c));
        let mut lines = BTreeSet::new();

        for i in 0..5 {
            if (0..5).all(|c| at(i, c)) {
                lines.insert(Line::row(i as u8).unwrap());
            }
            if (0..5).all(|r| at(r, i)) {
                lines.insert(Line::column(i as u8).unwrap());
            }
        }
        if (0..5).all(|k| at(k, k)) {
            lines.insert(Line::diagonal(0).unwrap());
        }
        if (0..5).all(|k| at(k, 4 - k)) {
            lines.insert(Line::diagonal(1).unwrap());
        }

        lines
    }

    proptest! {
        #![proptest_config(config())]

        /// Each step toggles one cell (the center stays marked); some passes
        /// run against a failing store.
        #[test]
        fn prop_toggle_sequences_converge(
            steps in prop::collection::vec((0usize..25, prop::bool::weighted(0.2)), 1..150)
        ) {
            let store = MemoryStore::default();
            let mut marked = BTreeSet::from([12usize]);

            for (position, fail) in steps {
                let was = marked.contains(&position);
                if was && position != 12 {
                    marked.remove(&position);
                } else {
                    marked.insert(position);
                }
                let trigger = Trigger::for_transition(was, marked.contains(&position));
                let g = grid(&marked.iter().copied().collect::<Vec<_>>());
                let before = store.lines();

                store.fail_writes.set(fail);
                let report = reconcile(&store, CODE, &g, &before, trigger);
                store.fail_writes.set(false);

                prop_assert_eq!(
                    report.celebrate,
                    trigger == Trigger::GoalCompleted && !report.plan.to_add.is_empty()
                );
                prop_assert!(report.plan.to_add.is_disjoint(&before));

                let added: BTreeSet<Line> = report.added.iter().map(|b| b.line).collect();
                prop_assert_eq!(added.len(), report.added.len());

                if fail {
                    prop_assert_eq!(report.is_converged(), report.plan.is_empty());
                    prop_assert_eq!(store.lines(), before);
                } else {
                    prop_assert!(report.is_converged());
                    prop_assert_eq!(store.lines(), expected_lines(&marked));

                    let again = reconcile(&store, CODE, &g, &store.lines(), Trigger::Recheck);
                    prop_assert!(again.plan.is_empty());
                    prop_assert!(!again.celebrate);
                }
                prop_assert!(store.bingos.borrow().len() <= crate::lines::LINE_COUNT);
            }

            // One healthy pass repairs whatever the failed passes left behind
            let g = grid(&marked.iter().copied().collect::<Vec<_>>());
            let report = reconcile(&store, CODE, &g, &store.lines(), Trigger::Recheck);
            prop_assert!(report.is_converged());
            prop_assert_eq!(store.lines(), expected_lines(&marked));
        }

        /// Passes that start from an arbitrary, possibly wrong, view of the
        /// store leave at most one record per line, and the next pass with an
        /// accurate view converges.
        #[test]
        fn prop_wrong_views_recover(
            rounds in prop::collection::vec((0u32..(1 << 25), 0u16..(1 << 12)), 1..20)
        ) {
            let store = MemoryStore::default();

            for (mask, view_mask) in rounds {
                let marked: BTreeSet<usize> = (0..25).filter(|p| mask & (1 << p) != 0).collect();
                let g = grid(&marked.iter().copied().collect::<Vec<_>>());
                let view: BTreeSet<Line> = Line::all()
                    .enumerate()
                    .filter(|(i, _)| view_mask & (1 << i) != 0)
                    .map(|(_, line)| line)
                    .collect();

                reconcile(&store, CODE, &g, &view, Trigger::Recheck);
                prop_assert!(store.bingos.borrow().len() <= crate::lines::LINE_COUNT);

                let report = reconcile(&store, CODE, &g, &store.lines(), Trigger::Recheck);
                prop_assert!(report.is_converged());
                prop_assert_eq!(store.lines(), expected_lines(&marked));
            }
        }
    }

    #[test]
    fn test_trigger_for_transition() {
        assert_eq!(Trigger::for_transition(false, true), Trigger::GoalCompleted);
        assert_eq!(Trigger::for_transition(true, false), Trigger::GoalUncompleted);
        assert_eq!(Trigger::for_transition(true, true), Trigger::GoalEdited);
        assert_eq!(Trigger::for_transition(false, false), Trigger::GoalEdited);
    }
}
