use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use anyhow::anyhow;
use crossbeam::thread;

use crate::testable::{TestResult, Testable, TestableGroup};

type BoxedTest = Box<dyn Testable + Sync + Send>;

/// Named set of tests. Tests of a group run on their own threads unless the
/// group is marked sequential, which suits tests that share cluster state
/// such as the file system's `max_mds`.
pub struct TestGroup {
    name: &'static str,
    parallel: bool,
    tests: BTreeMap<&'static str, BoxedTest>,
}

fn run_one(t: &BoxedTest) -> TestResult {
    if let Some(requirement) = t.unmet_requirement() {
        tracing::info!(test = t.get_name(), requirement, "skipping test");
        return TestResult::Skipped;
    }
    let start = Instant::now();
    tracing::info!(test = t.get_name(), "starting test");
    let res = panic::catch_unwind(AssertUnwindSafe(|| t.run()))
        .unwrap_or_else(|_| TestResult::Failed(anyhow!("test panicked")));
    tracing::info!(
        test = t.get_name(),
        elapsed = ?start.elapsed(),
        failed = res.is_failed(),
        "test finished"
    );
    res
}

impl TestGroup {
    pub fn new(name: &'static str) -> Self {
        TestGroup {
            name,
            parallel: true,
            tests: BTreeMap::new(),
        }
    }

    /// Runs the tests one after the other, and the group after all
    /// parallel groups.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn add(&mut self, tests: Vec<Box<impl Testable + Sync + Send + 'static>>) {
        for t in tests {
            self.tests.insert(t.get_name(), t);
        }
    }

    fn run_tests<'t>(&self, tests: impl Iterator<Item = &'t BoxedTest>) -> Vec<(&'static str, TestResult)> {
        if !self.parallel {
            return tests.map(|t| (t.get_name(), run_one(t))).collect();
        }
        let mut ret = Vec::new();
        let scoped = thread::scope(|s| {
            let handles: Vec<_> = tests
                .map(|t| (t.get_name(), s.spawn(move |_| run_one(t))))
                .collect();
            for (name, handle) in handles {
                let res = handle
                    .join()
                    .unwrap_or_else(|_| TestResult::Failed(anyhow!("test thread panicked")));
                ret.push((name, res));
            }
        });
        if scoped.is_err() {
            tracing::error!(group = self.name, "a test thread of the group panicked");
        }
        ret
    }
}

impl TestableGroup for TestGroup {
    fn get_name(&self) -> &'static str {
        self.name
    }

    fn parallel(&self) -> bool {
        self.parallel
    }

    fn run_all(&self) -> Vec<(&'static str, TestResult)> {
        self.run_tests(self.tests.values())
    }

    fn run_selected(&self, selected: &[&str]) -> Vec<(&'static str, TestResult)> {
        self.run_tests(
            self.tests
                .iter()
                .filter(|(name, _)| selected.contains(name))
                .map(|(_, t)| t),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Test;

    fn group(parallel: bool) -> TestGroup {
        let mut g = TestGroup::new("sample");
        if !parallel {
            g = g.sequential();
        }
        g.add(vec![
            Box::new(Test::new("passes", Box::new(|| TestResult::Passed))),
            Box::new(Test::new(
                "fails",
                Box::new(|| TestResult::from(Err::<(), _>(anyhow!("no mds")))),
            )),
            Box::new(Test::new("panics", Box::new(|| -> TestResult { panic!("boom") }))),
        ]);
        g.add(vec![Box::new(
            Test::checked("needs_iscsi", || Ok(())).requires("an iscsi gateway", || false),
        )]);
        g
    }

    fn outcome(results: &[(&'static str, TestResult)], name: &str) -> String {
        results
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, r)| r.to_string())
            .unwrap()
    }

    #[test]
    fn test_run_all() {
        for parallel in [true, false] {
            let g = group(parallel);
            let results = g.run_all();
            assert_eq!(results.len(), 4);
            // sorted by name
            assert_eq!(results[0].0, "fails");
            assert_eq!(outcome(&results, "passes"), "ok");
            assert_eq!(outcome(&results, "fails"), "not ok\n\tno mds");
            assert_eq!(outcome(&results, "needs_iscsi"), "skipped");
            assert!(results.iter().any(|(n, r)| *n == "panics" && r.is_failed()));
        }
    }

    #[test]
    fn test_run_selected() {
        let g = group(true);
        let results = g.run_selected(&["passes", "missing"]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "passes");
    }
}
