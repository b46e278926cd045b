use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use super::{exec_json, parse_json, DaemonInfo, FsError, FsUtils};
use crate::node::{ExecOptions, Node};
use crate::waiter::{retry, WaitUntil};

/// `{hostname: daemon_name}` of the daemons of `daemon_type` whose id starts
/// with `id_prefix`.
pub fn filter_daemons(
    daemons: &[DaemonInfo],
    daemon_type: &str,
    id_prefix: &str,
) -> Vec<BTreeMap<String, String>> {
    daemons
        .iter()
        .filter(|d| d.daemon_type == daemon_type && d.daemon_id.starts_with(id_prefix))
        .map(|d| BTreeMap::from([(d.hostname.clone(), d.daemon_name.clone())]))
        .collect()
}

impl FsUtils<'_> {
    fn mds_in_state(&self, client: &dyn Node, fs: Option<&str>, state: &str) -> Result<Vec<String>, FsError> {
        Ok(self
            .get_fs_status(client, fs)?
            .mdsmap
            .into_iter()
            .filter(|m| m.state == state)
            .map(|m| m.name)
            .collect())
    }

    pub fn get_active_mdss(&self, client: &dyn Node, fs: &str) -> Result<Vec<String>, FsError> {
        self.mds_in_state(client, Some(fs), "active")
    }

    pub fn get_standby_replay_mdss(&self, client: &dyn Node, fs: &str) -> Result<Vec<String>, FsError> {
        self.mds_in_state(client, Some(fs), "standby-replay")
    }

    /// Names of the MDS daemons in `expected` state; fewer than `num` is an error.
    pub fn get_mds_status(
        &self,
        client: &dyn Node,
        num: usize,
        expected: &str,
        vol: Option<&str>,
    ) -> Result<Vec<String>, FsError> {
        let mds = self.mds_in_state(client, vol, expected)?;
        if mds.len() < num {
            return Err(FsError::Validation(format!(
                "expected {num} in {expected} status but only {} are in {expected}",
                mds.len()
            )));
        }
        Ok(mds)
    }

    /// Fails unless exactly `expected` ranks are active, retried while the
    /// MDS map settles.
    pub fn check_active_mds_count(&self, client: &dyn Node, fs: &str, expected: usize) -> Result<(), FsError> {
        self.check_active_mds_count_with(client, fs, expected, 3, Duration::from_secs(60))
    }

    fn check_active_mds_count_with(
        &self,
        client: &dyn Node,
        fs: &str,
        expected: usize,
        tries: u32,
        delay: Duration,
    ) -> Result<(), FsError> {
        retry(tries, delay, || {
            let active = self.get_active_mdss(client, fs)?.len();
            if active != expected {
                return Err(FsError::Validation(format!(
                    "MDS count {active} is not matching the expected {expected}"
                )));
            }
            Ok(())
        })
    }

    /// Sets `max_mds` and reads it back from `ceph fs get`.
    pub fn set_max_mds(&self, client: &dyn Node, fs: &str, max_mds: u32) -> Result<(), FsError> {
        self.exec(client, &format!("ceph fs set {fs} max_mds {max_mds}"))?;
        let cmd = format!("ceph fs get {fs} -f json");
        let out: Value = exec_json(client, &cmd)?;
        let current = out["mdsmap"]["max_mds"].as_u64();
        if current != Some(u64::from(max_mds)) {
            return Err(FsError::Validation(format!(
                "max_mds of {fs} is {current:?}, expected {max_mds}"
            )));
        }
        tracing::info!(fs, max_mds, "max_mds set");
        Ok(())
    }

    /// Raises `max_mds` to two and waits for the second rank to go active.
    pub fn activate_multiple_mdss(&self, client: &dyn Node, fs: &str) -> Result<(), FsError> {
        self.set_max_mds(client, fs, 2)?;
        self.check_active_mds_count(client, fs, 2)
    }

    pub fn get_daemons(&self, client: &dyn Node, daemon_type: &str) -> Result<Vec<DaemonInfo>, FsError> {
        let cmd = format!("ceph orch ps --daemon_type={daemon_type} --format json");
        let out = client.exec(&cmd, &ExecOptions::root().check_ec(false))?;
        if out.trimmed().is_empty() {
            return Ok(Vec::new());
        }
        parse_json(&cmd, &out.stdout)
    }

    /// Polls `ceph orch ps` until a daemon whose id contains `process` is in
    /// `desired_state` (`present`), or until none is left (`!present`).
    pub fn wait_for_daemon(
        &self,
        client: &dyn Node,
        daemon_type: &str,
        process: &str,
        present: bool,
        desired_state: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool, FsError> {
        for _ in WaitUntil::new(timeout, interval) {
            let daemons = self.get_daemons(client, daemon_type)?;
            let mut matching = daemons.iter().filter(|d| d.daemon_id.contains(process));
            let done = if present {
                matching.any(|d| d.status_desc == desired_state)
            } else {
                matching.next().is_none()
            };
            if done {
                return Ok(true);
            }
        }
        tracing::warn!(daemon_type, process, present, "daemon did not reach the wanted state");
        Ok(false)
    }

    pub fn wait_for_mds_process(
        &self,
        client: &dyn Node,
        process: &str,
        present: bool,
        desired_state: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool, FsError> {
        self.wait_for_daemon(client, "mds", process, present, desired_state, timeout, interval)
    }

    pub fn wait_for_nfs_process(
        &self,
        client: &dyn Node,
        process: &str,
        present: bool,
        desired_state: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool, FsError> {
        self.wait_for_daemon(client, "nfs", process, present, desired_state, timeout, interval)
    }

    /// Runs `systemctl <op>` on the first unit of `node` matching `service`
    /// and returns the unit name.
    pub fn daemon_op(&self, node: &dyn Node, service: &str, op: &str) -> Result<String, FsError> {
        let out = node.exec_command(&format!(
            "systemctl list-units --type=service | grep {service} | awk '{{print $1}}'"
        ))?;
        let unit = out
            .stdout
            .split_whitespace()
            .next()
            .ok_or_else(|| FsError::Validation(format!("no systemd unit for {service} on {}", node.hostname())))?
            .to_owned();
        node.exec_command(&format!("systemctl {op} {unit}"))?;
        Ok(unit)
    }
}
