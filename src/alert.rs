//! Alert evaluation over post-filter detection counts.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::aggregate::ClassCounts;
use crate::detect::ClassSet;

/// Classes that should raise an alert when observed.
pub type WatchList = ClassSet;

/// When a watched class counts as triggered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum AlertPolicy {
    /// At least one surviving detection.
    #[default]
    AnyOccurrence,
    /// At least `n` surviving detections over the run.
    AtLeast(usize),
}

impl AlertPolicy {
    fn triggers(&self, count: usize) -> bool {
        match self {
            AlertPolicy::AnyOccurrence => count >= 1,
            AlertPolicy::AtLeast(n) => count >= (*n).max(1),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AlertEvaluator {
    watch_list: WatchList,
    policy: AlertPolicy,
}

impl AlertEvaluator {
    pub fn new(watch_list: WatchList) -> Self {
        Self {
            watch_list,
            policy: AlertPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AlertPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn watch_list(&self) -> &WatchList {
        &self.watch_list
    }

    /// Watched labels that triggered. Empty watch-list means no alerts.
    pub fn evaluate(&self, counts: &ClassCounts) -> BTreeSet<String> {
        self.watch_list
            .iter()
            .filter(|label| {
                counts
                    .get(*label)
                    .is_some_and(|count| self.policy.triggers(*count))
            })
            .map(str::to_string)
            .collect()
    }
}

/// Default policy: every watched label seen at least once.
pub fn evaluate(counts: &ClassCounts, watch_list: &WatchList) -> BTreeSet<String> {
    AlertEvaluator::new(watch_list.clone()).evaluate(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, usize)]) -> ClassCounts {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn triggers_only_watched_and_present_classes() {
        let watch: WatchList = ["person", "dog", "truck"].into_iter().collect();
        let alerts = evaluate(&counts(&[("person", 2), ("car", 1), ("dog", 1)]), &watch);
        assert_eq!(
            alerts.into_iter().collect::<Vec<_>>(),
            vec!["dog".to_string(), "person".to_string()]
        );
    }

    #[test]
    fn empty_watch_list_never_alerts() {
        let alerts = evaluate(&counts(&[("person", 5)]), &WatchList::new());
        assert!(alerts.is_empty());
    }

    #[test]
    fn zero_counts_do_not_trigger() {
        let watch: WatchList = ["cat"].into_iter().collect();
        assert!(evaluate(&counts(&[("cat", 0)]), &watch).is_empty());
    }

    #[test]
    fn at_least_policy_needs_enough_occurrences() {
        let watch: WatchList = ["car", "person"].into_iter().collect();
        let evaluator = AlertEvaluator::new(watch).with_policy(AlertPolicy::AtLeast(3));
        let alerts = evaluator.evaluate(&counts(&[("car", 3), ("person", 2)]));
        assert_eq!(alerts.len(), 1);
        assert!(alerts.contains("car"));
    }
}
