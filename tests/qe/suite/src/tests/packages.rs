use anyhow::anyhow;
use libcephqe::cli::packages::{Package, Rpm};
use test_framework::{test_result, Test, TestGroup, TestResult};

use crate::utils::{client, context};

const CEPH_PACKAGES: [&str; 2] = ["ceph-common", "ceph-fuse"];

/// Client side ceph packages are installed and agree on their version.
fn ceph_client_packages() -> TestResult {
    let ctx = test_result!(context());
    let client = test_result!(client(ctx));
    let rpm = Rpm::new(client.as_ref());

    let mut versions = Vec::new();
    for pkg in CEPH_PACKAGES {
        if !test_result!(rpm.query(pkg)) {
            return TestResult::Failed(anyhow!("{pkg} is not installed on {}", client.hostname()));
        }
        versions.push(test_result!(rpm.version(pkg)));
    }
    versions.dedup();
    if versions.len() != 1 {
        return TestResult::Failed(anyhow!("ceph client packages disagree on version: {versions:?}"));
    }
    tracing::info!(host = client.hostname(), version = %versions[0], "ceph client packages");
    TestResult::Passed
}

/// Packages listed in the cephci config are installed on every node.
fn configured_packages() -> TestResult {
    let ctx = test_result!(context());
    let packages = ctx.config.packages();
    if packages.is_empty() {
        return TestResult::Skipped;
    }
    for node in ctx.cluster.get_nodes(None) {
        let rpm = Rpm::new(node.as_ref());
        for pkg in packages {
            if !test_result!(rpm.query(pkg)) {
                let info = Package::new(node.as_ref())
                    .info(pkg)
                    .map(|out| out.stdout)
                    .unwrap_or_default();
                tracing::debug!(host = node.hostname(), %pkg, %info, "package info");
                return TestResult::Failed(anyhow!("{pkg} is not installed on {}", node.hostname()));
            }
        }
    }
    TestResult::Passed
}

pub fn get_packages_test() -> TestGroup {
    let mut test_group = TestGroup::new("packages");
    let ceph = Test::new("ceph_client_packages", Box::new(ceph_client_packages));
    let configured = Test::new("configured_packages", Box::new(configured_packages));
    test_group.add(vec![Box::new(ceph), Box::new(configured)]);

    test_group
}
