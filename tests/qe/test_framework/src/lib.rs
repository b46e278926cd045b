//! Small harness for live-cluster tests.
//!
//! Tests are plain functions returning a [`TestResult`]. They are collected
//! into [`TestGroup`]s, which the [`TestManager`] runs and reports.
mod test;
mod test_group;
mod test_manager;

pub use test::Test;
pub use test_group::TestGroup;
pub use test_manager::{Summary, TestManager};
pub use testable::{TestResult, Testable, TestableGroup};
