//! # libcephqe
//! Building blocks for Ceph quality-engineering automation: node executors,
//! thin wrappers around the command line tools found on cluster nodes, the
//! CephFS helper used by the integration tests and the cluster bring-up flow.
pub mod cephfs;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod node;
pub mod parallel;
pub mod prereq;
pub mod utils;
pub mod waiter;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
