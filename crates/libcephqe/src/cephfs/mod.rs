//! CephFS helpers driven through the `ceph fs` command line.
//!
//! [`FsUtils`] issues a command on a client node and, unless validation is
//! turned off, re-lists the affected objects with `--format json` to make
//! sure the command did what it claimed. Operations are split by concern
//! across the submodules, all of them extending [`FsUtils`].
mod health;
mod mds;
mod mount;
mod nfs;
mod quota;
mod snapshot;
mod subvolume;
mod volume;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cluster::{Cluster, ClusterError};
use crate::config::{ConfigError, TestData};
use crate::node::{CmdOutput, ExecError, ExecOptions, Node};
use crate::parallel::ParallelError;

pub use health::fetch_value_from_json_output;
pub use mds::filter_daemons;
pub use mount::{fuse_fstab_entry, kernel_fstab_entry, nfs_fstab_entry, FuseMount, KernelMount, NfsMount};
pub use quota::{Quota, STAT_KEYS};
pub use snapshot::{CloneSpec, CloneStatus, CLONE_STATES};
pub use subvolume::{SubvolumeGroupOpts, SubvolumeInfo, SubvolumeOpts};
pub use volume::OsdPoolOpts;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("failed to parse output of `{cmd}`")]
    Json {
        cmd: String,
        source: serde_json::Error,
    },
    /// The command ran but the cluster does not reflect it.
    #[error("{0}")]
    Validation(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Parallel(#[from] ParallelError),
}

/// `ceph fs ls` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsLsEntry {
    pub name: String,
    pub metadata_pool: String,
    pub data_pools: Vec<String>,
}

/// Pools backing one file system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsInfo {
    pub fs_name: String,
    pub metadata_pool_name: String,
    pub data_pool_name: String,
}

/// `mdsmap` entry of `ceph fs status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdsStatus {
    pub name: String,
    pub state: String,
    pub rank: Option<i64>,
}

/// `pools` entry of `ceph fs status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolStatus {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub pool_type: String,
    pub used: u64,
    pub avail: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsStatus {
    pub mdsmap: Vec<MdsStatus>,
    pub pools: Vec<PoolStatus>,
}

/// `ceph orch ps` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonInfo {
    pub daemon_type: String,
    pub daemon_id: String,
    pub daemon_name: String,
    pub hostname: String,
    pub status_desc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Named {
    name: String,
}

/// Helper over the `ceph fs` family of commands.
#[derive(Debug, Clone, Copy)]
pub struct FsUtils<'c> {
    cluster: &'c Cluster,
    test_data: &'c TestData,
    check_ec: bool,
    validate: bool,
}

impl<'c> FsUtils<'c> {
    pub fn new(cluster: &'c Cluster, test_data: &'c TestData) -> Self {
        Self {
            cluster,
            test_data,
            check_ec: true,
            validate: true,
        }
    }

    /// With `false`, failing commands are returned instead of raised.
    pub fn check_ec(mut self, check_ec: bool) -> Self {
        self.check_ec = check_ec;
        self
    }

    /// With `false`, commands are not verified against the cluster.
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Cleanup mode: neither exit codes nor results are checked.
    pub fn relaxed(self) -> Self {
        self.check_ec(false).validate(false)
    }

    pub fn cluster(&self) -> &'c Cluster {
        self.cluster
    }

    pub fn test_data(&self) -> &'c TestData {
        self.test_data
    }

    fn opts(&self) -> ExecOptions {
        ExecOptions::root().check_ec(self.check_ec)
    }

    fn exec(&self, client: &dyn Node, cmd: &str) -> Result<CmdOutput, FsError> {
        Ok(client.exec(cmd, &self.opts())?)
    }

    /// Validation runs only when asked for and the command itself succeeded.
    fn should_validate(&self, out: &CmdOutput) -> bool {
        self.validate && out.success()
    }
}

/// Runs `cmd` as root and parses its stdout as JSON.
pub(crate) fn exec_json<T: DeserializeOwned>(client: &dyn Node, cmd: &str) -> Result<T, FsError> {
    let out = client.exec(cmd, &ExecOptions::root())?;
    parse_json(cmd, &out.stdout)
}

pub(crate) fn parse_json<T: DeserializeOwned>(cmd: &str, stdout: &str) -> Result<T, FsError> {
    serde_json::from_str(stdout).map_err(|source| FsError::Json {
        cmd: cmd.to_owned(),
        source,
    })
}

/// Names from a `[{"name": ..}, ..]` listing.
pub(crate) fn list_names(client: &dyn Node, cmd: &str) -> Result<Vec<String>, FsError> {
    let items: Vec<Named> = exec_json(client, cmd)?;
    Ok(items.into_iter().map(|n| n.name).collect())
}
