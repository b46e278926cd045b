use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{list_names, parse_json, FsError, FsUtils};
use crate::cli::CmdLine;
use crate::node::{shell_quote, CmdOutput, ExecOptions, Node};
use crate::waiter::WaitUntil;

/// States a clone may legitimately pass through.
pub const CLONE_STATES: [&str; 4] = ["in-progress", "complete", "pending", "canceled"];

const CLONE_TIMEOUT: Duration = Duration::from_secs(600);
const CLONE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Source snapshot and target of a `ceph fs subvolume snapshot clone`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneSpec {
    pub vol_name: String,
    pub subvol_name: String,
    pub snap_name: String,
    pub target_subvol_name: String,
    pub group_name: Option<String>,
    pub target_group_name: Option<String>,
    pub pool_layout: Option<String>,
}

impl CloneSpec {
    pub fn new(vol: &str, subvol: &str, snap: &str, target: &str) -> Self {
        Self {
            vol_name: vol.to_owned(),
            subvol_name: subvol.to_owned(),
            snap_name: snap.to_owned(),
            target_subvol_name: target.to_owned(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneStatus {
    pub state: String,
    pub source: Value,
    pub failure: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CloneStatusOutput {
    status: CloneStatus,
}

fn snapshot_cmd(action: &str, vol: &str, subvol: &str, snap: &str) -> CmdLine {
    CmdLine::new("ceph fs subvolume snapshot")
        .arg(action)
        .arg(vol)
        .arg(subvol)
        .arg(snap)
}

impl FsUtils<'_> {
    fn list_snapshots(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        group: Option<&str>,
    ) -> Result<Vec<String>, FsError> {
        let cmd = CmdLine::new("ceph fs subvolume snapshot ls")
            .arg(vol)
            .arg(subvol)
            .opt("--group_name", group)
            .arg("--format json");
        list_names(client, cmd.as_str())
    }

    pub fn create_snapshot(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        snap: &str,
        group: Option<&str>,
    ) -> Result<CmdOutput, FsError> {
        let cmd = snapshot_cmd("create", vol, subvol, snap).opt("--group_name", group);
        let out = self.exec(client, cmd.as_str())?;
        if self.should_validate(&out) && !self.list_snapshots(client, vol, subvol, group)?.iter().any(|s| s == snap) {
            return Err(FsError::Validation(format!("Creation of snapshot: {snap} failed")));
        }
        Ok(out)
    }

    pub fn remove_snapshot(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        snap: &str,
        group: Option<&str>,
        force: bool,
    ) -> Result<CmdOutput, FsError> {
        let cmd = snapshot_cmd("rm", vol, subvol, snap)
            .opt("--group_name", group)
            .flag("--force", force);
        let out = self.exec(client, cmd.as_str())?;
        if self.should_validate(&out) && self.list_snapshots(client, vol, subvol, group)?.iter().any(|s| s == snap) {
            return Err(FsError::Validation(format!("Remove of snapshot: {snap} failed")));
        }
        Ok(out)
    }

    pub fn get_snapshot_info(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        snap: &str,
        group: Option<&str>,
    ) -> Result<Value, FsError> {
        let cmd = snapshot_cmd("info", vol, subvol, snap)
            .opt("--group_name", group)
            .arg("--format json");
        let out = self.exec(client, cmd.as_str())?;
        parse_json(cmd.as_str(), &out.stdout)
    }

    /// Sets every `key value` pair of `metadata` on the snapshot.
    pub fn set_snapshot_metadata(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        snap: &str,
        metadata: &BTreeMap<String, String>,
        group: Option<&str>,
    ) -> Result<CmdOutput, FsError> {
        let mut cmd = snapshot_cmd("metadata set", vol, subvol, snap);
        for (k, v) in metadata {
            cmd = cmd.arg(shell_quote(k)).arg(shell_quote(v));
        }
        self.exec(client, cmd.opt("--group_name", group).as_str())
    }

    pub fn get_snapshot_metadata(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        snap: &str,
        key: &str,
        group: Option<&str>,
    ) -> Result<String, FsError> {
        let cmd = snapshot_cmd("metadata get", vol, subvol, snap)
            .arg(shell_quote(key))
            .opt("--group_name", group);
        Ok(self.exec(client, cmd.as_str())?.trimmed().to_owned())
    }

    pub fn remove_snapshot_metadata(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        snap: &str,
        keys: &[&str],
        group: Option<&str>,
    ) -> Result<CmdOutput, FsError> {
        let mut cmd = snapshot_cmd("metadata rm", vol, subvol, snap);
        for k in keys {
            cmd = cmd.arg(shell_quote(k));
        }
        self.exec(client, cmd.opt("--group_name", group).as_str())
    }

    /// All metadata of the snapshot as a map.
    pub fn list_snapshot_metadata(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        snap: &str,
        group: Option<&str>,
    ) -> Result<BTreeMap<String, String>, FsError> {
        let cmd = snapshot_cmd("metadata ls", vol, subvol, snap).opt("--group_name", group);
        let out = self.exec(client, cmd.as_str())?;
        if out.trimmed().is_empty() {
            return Ok(BTreeMap::new());
        }
        parse_json(cmd.as_str(), &out.stdout)
    }

    /// Starts the clone and, when validating, checks that the target shows
    /// up among the subvolumes of its group.
    pub fn create_clone(&self, client: &dyn Node, clone: &CloneSpec) -> Result<CmdOutput, FsError> {
        let cmd = CmdLine::new("ceph fs subvolume snapshot clone")
            .arg(&clone.vol_name)
            .arg(&clone.subvol_name)
            .arg(&clone.snap_name)
            .arg(&clone.target_subvol_name)
            .opt("--group_name", clone.group_name.as_deref())
            .opt("--target_group_name", clone.target_group_name.as_deref())
            .opt("--pool_layout", clone.pool_layout.as_deref());
        let out = client.exec(cmd.as_str(), &self.opts().timeout(CLONE_TIMEOUT))?;
        if self.should_validate(&out) {
            let subvols = self.list_subvolumes(client, &clone.vol_name, clone.target_group_name.as_deref())?;
            if !subvols.contains(&clone.target_subvol_name) {
                return Err(FsError::Validation(format!(
                    "Creation of clone: {} failed",
                    clone.target_subvol_name
                )));
            }
        }
        Ok(out)
    }

    pub fn get_clone_status(
        &self,
        client: &dyn Node,
        vol: &str,
        clone: &str,
        group: Option<&str>,
    ) -> Result<CloneStatus, FsError> {
        let cmd = CmdLine::new("ceph fs clone status")
            .arg(vol)
            .arg(clone)
            .opt("--group_name", group)
            .arg("--format json");
        let out = client.exec(cmd.as_str(), &ExecOptions::root())?;
        let parsed: CloneStatusOutput = parse_json(cmd.as_str(), &out.stdout)?;
        Ok(parsed.status)
    }

    pub fn clone_cancel(
        &self,
        client: &dyn Node,
        vol: &str,
        clone: &str,
        group: Option<&str>,
    ) -> Result<CmdOutput, FsError> {
        let cmd = CmdLine::new("ceph fs clone cancel")
            .arg(vol)
            .arg(clone)
            .opt("--group_name", group)
            .arg("--format json");
        self.exec(client, cmd.as_str())
    }

    /// Polls the clone until it reaches `expected` and returns the distinct
    /// states observed on the way. Any other state outside [`CLONE_STATES`]
    /// aborts the wait.
    pub fn validate_clone_state(
        &self,
        client: &dyn Node,
        clone: &CloneSpec,
        expected: &str,
        timeout: Duration,
    ) -> Result<Vec<String>, FsError> {
        self.validate_clone_state_with(client, clone, expected, timeout, CLONE_POLL_INTERVAL)
    }

    fn validate_clone_state_with(
        &self,
        client: &dyn Node,
        clone: &CloneSpec,
        expected: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Vec<String>, FsError> {
        let mut transitions: Vec<String> = Vec::new();
        let mut last = String::new();
        for _ in WaitUntil::new(timeout, interval) {
            let status = self.get_clone_status(
                client,
                &clone.vol_name,
                &clone.target_subvol_name,
                clone.target_group_name.as_deref(),
            )?;
            tracing::info!(clone = %clone.target_subvol_name, state = %status.state, "clone status");
            if !transitions.contains(&status.state) {
                transitions.push(status.state.clone());
            }
            if status.state == expected {
                return Ok(transitions);
            }
            if !CLONE_STATES.contains(&status.state.as_str()) {
                return Err(FsError::Validation(format!("{} is not valid status", status.state)));
            }
            last = status.state;
        }
        Err(FsError::Timeout(format!(
            "clone {} has not reached {expected} within {timeout:?}, current state is {last}",
            clone.target_subvol_name
        )))
    }
}
