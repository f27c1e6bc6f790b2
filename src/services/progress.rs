use crate::models::Catalog;
use indexmap::IndexSet;
use std::collections::HashSet;

/// Regions selected for one run and the subset completed so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTarget {
    regions: IndexSet<String>,
    completed: HashSet<String>,
}

impl RunTarget {
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            regions: regions.into_iter().map(Into::into).collect(),
            completed: HashSet::new(),
        }
    }

    /// Mark a region complete. Names outside the target are ignored.
    pub fn mark_complete(&mut self, name: &str) -> bool {
        if self.regions.contains(name) {
            self.completed.insert(name.to_string())
        } else {
            false
        }
    }

    pub fn is_complete(&self, name: &str) -> bool {
        self.completed.contains(name)
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(String::as_str)
    }

    pub fn total(&self) -> usize {
        self.regions.len()
    }

    pub fn completed(&self) -> usize {
        self.completed.len()
    }
}

/// Point-in-time progress numbers for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
}

impl ProgressSnapshot {
    fn new(completed: usize, total: usize) -> Self {
        Self {
            completed,
            total,
            percent: ratio(completed, total) * 100.0,
        }
    }

    /// True when there is nothing to measure; displays render a neutral state.
    pub fn is_neutral(&self) -> bool {
        self.total == 0
    }
}

/// Derives completion from the current run target, or from the catalog when no
/// run is in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    target: Option<RunTarget>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_run(&mut self, target: RunTarget) {
        self.target = Some(target);
    }

    pub fn end_run(&mut self) {
        self.target = None;
    }

    pub fn target(&self) -> Option<&RunTarget> {
        self.target.as_ref()
    }

    pub fn mark_complete(&mut self, region: &str) -> bool {
        self.target
            .as_mut()
            .map(|t| t.mark_complete(region))
            .unwrap_or(false)
    }

    /// Progress of the current run target; `None` without a run.
    pub fn run_snapshot(&self) -> Option<ProgressSnapshot> {
        self.target
            .as_ref()
            .map(|t| ProgressSnapshot::new(t.completed(), t.total()))
    }

    /// Progress of the run target, falling back to catalog-wide query status.
    pub fn snapshot(&self, catalog: &Catalog) -> ProgressSnapshot {
        self.run_snapshot().unwrap_or_else(|| {
            ProgressSnapshot::new(catalog.queried_count(), catalog.total_regions())
        })
    }

    /// Completion in `[0, 1]`; an empty target yields `0`.
    pub fn completion_ratio(&self, catalog: &Catalog) -> f64 {
        let snapshot = self.snapshot(catalog);
        ratio(snapshot.completed, snapshot.total)
    }
}

fn ratio(completed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (completed as f64 / total as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Region {}", i)).collect()
    }

    #[test]
    fn test_ratio_for_run_target() {
        let mut tracker = ProgressTracker::new();
        tracker.begin_run(RunTarget::new(names(10)));
        for name in names(4) {
            assert!(tracker.mark_complete(&name));
        }

        let catalog = Catalog::new();
        assert_eq!(tracker.completion_ratio(&catalog), 0.4);
        let snapshot = tracker.snapshot(&catalog);
        assert_eq!(snapshot.completed, 4);
        assert_eq!(snapshot.total, 10);
        assert!((snapshot.percent - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_target_is_zero() {
        let mut tracker = ProgressTracker::new();
        tracker.begin_run(RunTarget::new(Vec::<String>::new()));

        let catalog = Catalog::new();
        assert_eq!(tracker.completion_ratio(&catalog), 0.0);
        assert!(tracker.snapshot(&catalog).is_neutral());
    }

    #[test]
    fn test_duplicate_and_foreign_marks_ignored() {
        let mut tracker = ProgressTracker::new();
        tracker.begin_run(RunTarget::new(["A", "B"]));

        assert!(tracker.mark_complete("A"));
        assert!(!tracker.mark_complete("A"));
        assert!(!tracker.mark_complete("Z"));
        assert_eq!(tracker.run_snapshot().unwrap().completed, 1);
    }

    #[test]
    fn test_falls_back_to_catalog() {
        let mut catalog = Catalog::new();
        catalog.insert_region("Ohio", "Columbus", "390100").unwrap();
        catalog.insert_region("Ohio", "Dayton", "390300").unwrap();
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        catalog.mark_queried("Dayton", now).unwrap();

        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.completion_ratio(&catalog), 0.5);

        tracker.begin_run(RunTarget::new(["Columbus"]));
        assert_eq!(tracker.completion_ratio(&catalog), 0.0);

        tracker.end_run();
        assert_eq!(tracker.completion_ratio(&catalog), 0.5);
    }

    proptest! {
        #[test]
        fn ratio_stays_in_unit_interval(total in 0usize..200, done in 0usize..200) {
            let regions = names(total);
            let mut tracker = ProgressTracker::new();
            tracker.begin_run(RunTarget::new(regions.clone()));
            for name in regions.iter().take(done) {
                tracker.mark_complete(name);
            }

            let r = tracker.completion_ratio(&Catalog::new());
            prop_assert!((0.0..=1.0).contains(&r));
            if total == 0 {
                prop_assert_eq!(r, 0.0);
            } else {
                prop_assert_eq!(r, done.min(total) as f64 / total as f64);
            }
        }
    }
}
