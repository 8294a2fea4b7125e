//! Reconciler Service
//!
//! Pure domain logic for computing what the fleet must do to match the
//! provider. No I/O: the orchestrator feeds it sets and executes the plan.

use crate::domain::entities::{Binding, BindingSet};

/// Creates and deletes that move actual state to desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// `desired − actual`, sorted
    pub to_add: Vec<Binding>,
    /// `actual − desired`, sorted
    pub to_remove: Vec<Binding>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Set-difference reconciler.
///
/// The plan is always recomputed from scratch. Anything that failed to
/// apply last time simply shows up again in the next plan.
pub struct Reconciler;

impl Reconciler {
    /// Compute the plan for one cycle.
    ///
    /// Bindings present in both sets are never touched.
    pub fn plan(desired: &BindingSet, actual: &BindingSet) -> ReconcilePlan {
        let mut to_add: Vec<Binding> = desired.difference(actual).cloned().collect();
        let mut to_remove: Vec<Binding> = actual.difference(desired).cloned().collect();
        to_add.sort();
        to_remove.sort();

        ReconcilePlan { to_add, to_remove }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ===== Test Helpers =====

    fn binding(app: &str) -> Binding {
        Binding::new(app, format!("{}-host", app), format!("syslog-tls://{}.example.com:6514", app))
    }

    fn set(apps: &[&str]) -> BindingSet {
        apps.iter().map(|a| binding(a)).collect()
    }

    fn binding_set() -> impl Strategy<Value = BindingSet> {
        proptest::collection::hash_set((0u8..8, 0u8..3), 0..12).prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(app, drain)| {
                    Binding::new(
                        format!("app-{}", app),
                        "host",
                        format!("syslog-tls://drain-{}:6514", drain),
                    )
                })
                .collect()
        })
    }

    // ===== Plan Tests =====

    #[test]
    fn test_plan_adds_missing_and_removes_stale() {
        let desired = set(&["a", "b"]);
        let actual = set(&["b", "c"]);

        let plan = Reconciler::plan(&desired, &actual);

        assert_eq!(plan.to_add, vec![binding("a")]);
        assert_eq!(plan.to_remove, vec![binding("c")]);
    }

    #[test]
    fn test_plan_never_touches_shared_bindings() {
        let desired = set(&["a", "b"]);
        let actual = set(&["b", "c"]);

        let plan = Reconciler::plan(&desired, &actual);

        assert!(!plan.to_add.contains(&binding("b")));
        assert!(!plan.to_remove.contains(&binding("b")));
    }

    #[test]
    fn test_plan_converged_is_empty() {
        let desired = set(&["a", "b"]);
        let plan = Reconciler::plan(&desired, &desired.clone());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_from_empty_actual() {
        let plan = Reconciler::plan(&set(&["b", "a"]), &BindingSet::new());
        assert_eq!(plan.to_add, vec![binding("a"), binding("b")]);
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn test_plan_empty_desired_removes_everything() {
        let plan = Reconciler::plan(&BindingSet::new(), &set(&["a", "b"]));
        assert!(plan.to_add.is_empty());
        assert_eq!(plan.to_remove.len(), 2);
    }

    #[test]
    fn test_plan_changed_drain_is_delete_plus_add() {
        let old = Binding::new("app", "host", "syslog-tls://old.example.com:6514");
        let new = Binding::new("app", "host", "syslog-tls://new.example.com:6514");

        let desired: BindingSet = [new.clone()].into_iter().collect();
        let actual: BindingSet = [old.clone()].into_iter().collect();

        let plan = Reconciler::plan(&desired, &actual);
        assert_eq!(plan.to_add, vec![new]);
        assert_eq!(plan.to_remove, vec![old]);
    }

    proptest! {
        #[test]
        fn prop_plan_is_disjoint_and_converges(desired in binding_set(), actual in binding_set()) {
            let plan = Reconciler::plan(&desired, &actual);

            let adds: BindingSet = plan.to_add.iter().cloned().collect();
            let removes: BindingSet = plan.to_remove.iter().cloned().collect();
            prop_assert!(adds.is_disjoint(&removes));

            let mut converged: BindingSet = actual.union(&adds).cloned().collect();
            converged.retain(|b| !removes.contains(b));
            prop_assert_eq!(converged, desired);
        }
    }
}
