use crate::testable::{TestResult, Testable};

type TestFn = dyn Fn() -> TestResult + Sync + Send;
type CheckFn = dyn Fn() -> bool + Sync + Send;

/// Something the cluster must offer for a test to be meaningful, such as a
/// node with the `iscsi` role.
struct Requirement {
    what: &'static str,
    check: Box<CheckFn>,
}

/// A named test body plus the requirements it has on the cluster. A test
/// whose requirements are not met is reported as skipped.
pub struct Test {
    name: &'static str,
    test_fn: Box<TestFn>,
    requirements: Vec<Requirement>,
}

impl Test {
    pub fn new(name: &'static str, test_fn: Box<TestFn>) -> Self {
        Test {
            name,
            test_fn,
            requirements: Vec::new(),
        }
    }

    /// Test whose body reports failure through `anyhow`.
    pub fn checked<F>(name: &'static str, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Sync + Send + 'static,
    {
        Self::new(name, Box::new(move || TestResult::from(f())))
    }

    /// Adds a requirement, described by `what` in the skip message.
    pub fn requires<F>(mut self, what: &'static str, check: F) -> Self
    where
        F: Fn() -> bool + Sync + Send + 'static,
    {
        self.requirements.push(Requirement {
            what,
            check: Box::new(check),
        });
        self
    }
}

impl Testable for Test {
    fn get_name(&self) -> &'static str {
        self.name
    }

    fn unmet_requirement(&self) -> Option<&'static str> {
        self.requirements
            .iter()
            .find(|r| !(r.check)())
            .map(|r| r.what)
    }

    fn run(&self) -> TestResult {
        (self.test_fn)()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use anyhow::bail;

    use super::*;

    #[test]
    fn test_checked() {
        let ok = Test::checked("ok", || Ok(()));
        assert!(matches!(ok.run(), TestResult::Passed));
        let failing = Test::checked("failing", || bail!("mds not active"));
        assert_eq!(failing.run().to_string(), "not ok\n\tmds not active");
    }

    #[test]
    fn test_requirements() {
        let has_gateway = Arc::new(AtomicBool::new(true));
        let gateway = has_gateway.clone();
        let test = Test::checked("target", || Ok(()))
            .requires("a client node", || true)
            .requires("an iscsi gateway", move || gateway.load(Ordering::SeqCst));

        assert_eq!(test.unmet_requirement(), None);
        has_gateway.store(false, Ordering::SeqCst);
        assert_eq!(test.unmet_requirement(), Some("an iscsi gateway"));
        assert_eq!(Test::checked("plain", || Ok(())).unmet_requirement(), None);
    }
}
