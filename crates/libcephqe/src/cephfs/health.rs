use std::time::Duration;

use serde_json::Value;

use super::{exec_json, FsError, FsUtils};
use crate::node::{ExecOptions, Node};
use crate::waiter::{retry, wait_for};

const HEALTH_TRIES: u32 = 4;
const HEALTH_DELAY: Duration = Duration::from_secs(30);

/// Searches `search` (an object, or an array of them, at any depth) for the
/// first object whose `match_key` value contains `match_value` and returns
/// its `target_key`.
///
/// `fs_name` and `id` are also resolved from `ceph fs dump` style entries
/// whose `info` (or `mdsmap.info`) daemons match.
pub fn fetch_value_from_json_output<'v>(
    search: &'v Value,
    match_key: &str,
    match_value: &str,
    target_key: &str,
) -> Option<&'v Value> {
    let items: &[Value] = match search {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => std::slice::from_ref(search),
        _ => return None,
    };
    let matches = |v: &Value| v.get(match_key).and_then(Value::as_str).is_some_and(|s| s.contains(match_value));
    for item in items {
        let Value::Object(map) = item else {
            continue;
        };
        if matches(item) {
            return map.get(target_key);
        }
        let info = match target_key {
            "fs_name" => item.get("info"),
            "id" => item.get("mdsmap").and_then(|m| m.get("info")),
            _ => None,
        };
        if map.contains_key(target_key) {
            if let Some(Value::Object(daemons)) = info {
                if daemons.values().any(|d| matches(d)) {
                    return map.get(target_key);
                }
            }
        }
        for value in map.values() {
            if value.is_object() || value.is_array() {
                if let Some(found) = fetch_value_from_json_output(value, match_key, match_value, target_key) {
                    return Some(found);
                }
            }
        }
    }
    None
}

impl FsUtils<'_> {
    /// Current `health.status`, required to be one of `accepted`.
    pub fn get_ceph_health_status(&self, client: &dyn Node, accepted: &[&str]) -> Result<String, FsError> {
        self.get_ceph_health_status_with(client, accepted, HEALTH_TRIES, HEALTH_DELAY)
    }

    fn get_ceph_health_status_with(
        &self,
        client: &dyn Node,
        accepted: &[&str],
        tries: u32,
        delay: Duration,
    ) -> Result<String, FsError> {
        retry(tries, delay, || {
            let status: Value = exec_json(client, "ceph -s -f json")?;
            let health = status["health"]["status"].as_str().unwrap_or_default();
            if !accepted.contains(&health) {
                return Err(FsError::Validation(format!("Ceph cluster is in {health} state")));
            }
            tracing::info!(health, "ceph cluster is healthy");
            Ok(health.to_owned())
        })
    }

    /// Re-runs `cmd` until it exits zero. Returns whether it ever did.
    pub fn wait_for_cmd_to_succeed(
        &self,
        client: &dyn Node,
        cmd: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool, FsError> {
        wait_for(timeout, interval, || {
            let out = client.exec(cmd, &ExecOptions::root().check_ec(false))?;
            Ok::<_, FsError>(out.success())
        })
    }
}
