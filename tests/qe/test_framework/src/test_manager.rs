use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::{anyhow, Result};
use crossbeam::thread;

use crate::testable::{TestResult, TestableGroup};

type TestableGroupType = dyn TestableGroup + Sync + Send;
type GroupResults = Vec<(&'static str, TestResult)>;

/// Counts over every test the manager ran.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// `group::test` of each failed test
    pub failures: Vec<String>,
}

impl Summary {
    fn record(&mut self, group: &str, test: &str, res: &TestResult) {
        match res {
            TestResult::Passed => self.passed += 1,
            TestResult::Skipped => self.skipped += 1,
            TestResult::Failed(_) => {
                self.failed += 1;
                self.failures.push(format!("{group}::{test}"));
            }
        }
    }

    /// Process exit code: `0` when nothing failed.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failed > 0)
    }
}

/// Holds every test group and the cleanups that run once all groups finished.
pub struct TestManager {
    test_groups: BTreeMap<&'static str, Box<TestableGroupType>>,
    cleanup: Vec<Box<dyn Fn() -> Result<()>>>,
}

impl Default for TestManager {
    fn default() -> Self {
        Self::new()
    }
}

fn print_group(out: &mut impl Write, name: &str, res: &[(&'static str, TestResult)]) -> io::Result<()> {
    writeln!(out, "# Start group {name}")?;
    let len = res.len();
    for (idx, (test, res)) in res.iter().enumerate() {
        writeln!(out, "{} / {len} : {test} : {res}", idx + 1)?;
    }
    writeln!(out, "# End group {name}\n")
}

impl TestManager {
    pub fn new() -> Self {
        TestManager {
            test_groups: BTreeMap::new(),
            cleanup: Vec::new(),
        }
    }

    pub fn add_test_group(&mut self, tg: Box<TestableGroupType>) {
        self.test_groups.insert(tg.get_name(), tg);
    }

    pub fn add_cleanup(&mut self, cleaner: Box<dyn Fn() -> Result<()>>) {
        self.cleanup.push(cleaner)
    }

    fn report(&self, summary: &mut Summary, name: &str, res: &[(&'static str, TestResult)]) {
        for (test, r) in res {
            summary.record(name, test, r);
        }
        let stdout = io::stdout();
        if let Err(e) = print_group(&mut stdout.lock(), name, res) {
            tracing::error!(group = name, error = %e, "failed to print group results");
        }
    }

    fn run_cleanups(&self) {
        for cleaner in &self.cleanup {
            if let Err(e) = cleaner() {
                tracing::error!(error = ?e, "failed to clean up");
            }
        }
    }

    /// Parallel groups first, all at once, then the sequential ones in
    /// name order.
    fn run_groups<'g>(&self, selection: Vec<(&'g TestableGroupType, Option<&[&str]>)>) -> Summary {
        let run = |tg: &TestableGroupType, tests: Option<&[&str]>| match tests {
            None => tg.run_all(),
            Some(tests) => tg.run_selected(tests),
        };
        let mut summary = Summary::default();
        let scoped = thread::scope(|s| {
            let handles: Vec<_> = selection
                .iter()
                .filter(|(tg, _)| tg.parallel())
                .map(|(tg, tests)| (tg.get_name(), s.spawn(move |_| run(*tg, *tests))))
                .collect();
            for (name, handle) in handles {
                let res: GroupResults = handle
                    .join()
                    .unwrap_or_else(|_| vec![(name, TestResult::Failed(anyhow!("test group panicked")))]);
                self.report(&mut summary, name, &res);
            }
        });
        if scoped.is_err() {
            tracing::error!("a test group thread panicked");
        }
        for (tg, tests) in selection.iter().filter(|(tg, _)| !tg.parallel()) {
            self.report(&mut summary, tg.get_name(), &run(*tg, *tests));
        }
        self.run_cleanups();
        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "test run finished"
        );
        summary
    }

    pub fn run_all(&self) -> Summary {
        self.run_groups(self.test_groups.values().map(|tg| (tg.as_ref(), None)).collect())
    }

    /// Runs `(group, tests)` pairs, the whole group when `tests` is `None`.
    /// Unknown groups are reported and skipped.
    pub fn run_selected(&self, tests: &[(&str, Option<Vec<&str>>)]) -> Summary {
        let mut selection = Vec::with_capacity(tests.len());
        for (group, names) in tests {
            match self.test_groups.get(group) {
                Some(tg) => selection.push((tg.as_ref(), names.as_deref())),
                None => eprintln!("Error : Test Group {group} not found, skipping"),
            }
        }
        self.run_groups(selection)
    }

    pub fn tests_groups(&self) -> Vec<String> {
        self.test_groups.keys().map(|name| name.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::{Test, TestGroup};

    fn manager() -> TestManager {
        let mut tm = TestManager::new();
        let mut quick = TestGroup::new("quick");
        quick.add(vec![
            Box::new(Test::new("a", Box::new(|| TestResult::Passed))),
            Box::new(Test::new("b", Box::new(|| TestResult::Skipped))),
        ]);
        let mut mds = TestGroup::new("mds").sequential();
        mds.add(vec![Box::new(Test::new(
            "max_mds",
            Box::new(|| TestResult::Failed(anyhow!("max_mds not applied"))),
        ))]);
        tm.add_test_group(Box::new(quick));
        tm.add_test_group(Box::new(mds));
        tm
    }

    #[test]
    fn test_run_all_summary() {
        let mut tm = manager();
        let cleaned = Arc::new(AtomicUsize::new(0));
        let counter = cleaned.clone();
        tm.add_cleanup(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("cleanup failures are only logged"))
        }));

        let summary = tm.run_all();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures, vec!["mds::max_mds".to_string()]);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert_eq!(tm.tests_groups(), vec!["mds", "quick"]);
    }

    #[test]
    fn test_run_selected_summary() {
        let tm = manager();
        let summary = tm.run_selected(&[("quick", Some(vec!["a"])), ("missing", None)]);
        assert_eq!(
            summary,
            Summary {
                passed: 1,
                ..Default::default()
            }
        );
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_print_group() {
        let mut out = Vec::new();
        let res = vec![
            ("a", TestResult::Passed),
            ("b", TestResult::Failed(anyhow!("HEALTH_ERR"))),
        ];
        print_group(&mut out, "cephfs", &res).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "# Start group cephfs\n1 / 2 : a : ok\n2 / 2 : b : not ok\n\tHEALTH_ERR\n# End group cephfs\n\n"
        );
    }
}
