use std::time::Duration;

use serde_json::Value;

use super::{exec_json, list_names, FsError, FsInfo, FsLsEntry, FsStatus, FsUtils, PoolStatus};
use crate::cli::CmdLine;
use crate::node::{CmdOutput, Node};
use crate::waiter::{retry, wait_for};

/// Options of `ceph osd pool create`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsdPoolOpts {
    pub pg_num: Option<u32>,
    pub pgp_num: Option<u32>,
    pub erasure: bool,
    pub erasure_profile: Option<String>,
    pub crush_rule: Option<String>,
    pub expected_num_objects: Option<u64>,
    /// Only honoured for erasure coded pools
    pub autoscale_mode: Option<String>,
}

fn pool_pattern_count_cmd(vol: &str) -> String {
    format!("ceph osd lspools | grep -E 'cephfs.{vol}.data|cephfs.{vol}.meta' | wc -l")
}

impl FsUtils<'_> {
    pub fn get_fs_list(&self, client: &dyn Node) -> Result<Vec<FsLsEntry>, FsError> {
        exec_json(client, "ceph fs ls --format json-pretty")
    }

    /// Pools of `fs_name`, `None` when no such file system exists.
    pub fn get_fs_info(&self, client: &dyn Node, fs_name: &str) -> Result<Option<FsInfo>, FsError> {
        Ok(self
            .get_fs_list(client)?
            .into_iter()
            .find(|fs| fs.name == fs_name)
            .map(|fs| FsInfo {
                data_pool_name: fs.data_pools.first().cloned().unwrap_or_default(),
                metadata_pool_name: fs.metadata_pool,
                fs_name: fs.name,
            }))
    }

    pub fn get_fsid(&self, client: &dyn Node) -> Result<String, FsError> {
        let out: Value = exec_json(client, "ceph fsid -f json")?;
        out["fsid"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| FsError::Validation("fsid missing from ceph fsid".to_owned()))
    }

    pub fn get_pool_num(&self, client: &dyn Node, pool: &str) -> Result<Option<i64>, FsError> {
        let pools: Vec<Value> = exec_json(client, "ceph osd lspools --format json")?;
        Ok(pools
            .iter()
            .find(|p| p["poolname"] == pool)
            .and_then(|p| p["poolnum"].as_i64()))
    }

    pub fn get_fs_dump(&self, client: &dyn Node) -> Result<Value, FsError> {
        exec_json(client, "ceph fs dump --format json")
    }

    /// `ceph fs status`, for one volume or all of them.
    pub fn get_fs_status(&self, client: &dyn Node, vol: Option<&str>) -> Result<FsStatus, FsError> {
        let cmd = CmdLine::new("ceph fs status").maybe(vol).arg("--format json");
        exec_json(client, cmd.as_str())
    }

    /// Usage of `pool` as reported by `ceph fs status`.
    pub fn get_pool_df(
        &self,
        client: &dyn Node,
        pool: &str,
        vol: Option<&str>,
    ) -> Result<Option<PoolStatus>, FsError> {
        Ok(self
            .get_fs_status(client, vol)?
            .pools
            .into_iter()
            .find(|p| p.name == pool))
    }

    pub fn create_osd_pool(
        &self,
        client: &dyn Node,
        pool: &str,
        opts: &OsdPoolOpts,
    ) -> Result<CmdOutput, FsError> {
        let mut cmd = CmdLine::new("ceph osd pool create")
            .arg(pool)
            .maybe(opts.pg_num)
            .maybe(opts.pgp_num);
        if opts.erasure {
            cmd = cmd.arg("erasure").maybe(opts.erasure_profile.as_deref());
        } else {
            cmd = cmd.arg("replicated");
        }
        cmd = cmd
            .maybe(opts.crush_rule.as_deref())
            .maybe(opts.expected_num_objects);
        if opts.erasure {
            cmd = cmd.opt_eq("--autoscale-mode", opts.autoscale_mode.as_deref());
        }
        let out = self.exec(client, cmd.as_str())?;
        if self.should_validate(&out) {
            let pools: Vec<String> = exec_json(client, "ceph osd pool ls --format json")?;
            if !pools.iter().any(|p| p == pool) {
                return Err(FsError::Validation(format!("Creation of OSD pool: {pool} failed")));
            }
        }
        Ok(out)
    }

    /// Creates volume `vol`. With `erasure=true` in the test's custom config
    /// the data pool is erasure coded and the MDS is deployed explicitly.
    pub fn create_fs(
        &self,
        client: &dyn Node,
        vol: &str,
        placement: Option<&str>,
    ) -> Result<CmdOutput, FsError> {
        let erasure = self.test_data.flag("erasure");
        let data_ec = format!("cephfs.{vol}.data-ec");
        let meta = format!("cephfs.{vol}.meta");
        let fs_cmd = if erasure {
            let pg64 = OsdPoolOpts {
                pg_num: Some(64),
                ..Default::default()
            };
            self.create_osd_pool(
                client,
                &data_ec,
                &OsdPoolOpts {
                    erasure: true,
                    ..pg64.clone()
                },
            )?;
            self.create_osd_pool(client, &meta, &pg64)?;
            self.exec(
                client,
                &format!("ceph osd pool set {data_ec} allow_ec_overwrites true"),
            )?;
            format!("ceph fs new {vol} {meta} {data_ec} --force")
        } else {
            CmdLine::new("ceph fs volume create")
                .arg(vol)
                .opt_eq("--placement", placement.map(|p| format!("'{p}'")))
                .into()
        };

        let out = self.exec(client, &fs_cmd)?;
        if !out.success() {
            return Ok(out);
        }
        if self.validate {
            let names: Vec<String> = self.get_fs_list(client)?.into_iter().map(|f| f.name).collect();
            if !names.iter().any(|n| n == vol) {
                return Err(FsError::Validation(format!("Creation of filesystem: {vol} failed")));
            }
        }
        // the pool check does not depend on `validate`
        let pools = self.exec(client, &pool_pattern_count_cmd(vol))?;
        if pools.trimmed() != "2" {
            return Err(FsError::Validation(format!(
                "Creation of pools: {vol} failed. Actual Output: {}",
                pools.stdout
            )));
        }
        tracing::info!(vol, "pools created");

        if erasure && self.validate {
            let apply = CmdLine::new("ceph orch apply mds")
                .arg(vol)
                .opt_eq("--placement", placement.map(|p| format!("'{p}'")));
            self.exec(client, apply.as_str())?;
            retry(3, Duration::from_secs(30), || {
                self.get_mds_status(client, 1, "active", Some(vol))
            })?;
        }
        Ok(out)
    }

    pub fn remove_fs(&self, client: &dyn Node, vol: &str) -> Result<CmdOutput, FsError> {
        self.exec(client, "ceph config set mon mon_allow_pool_delete true")?;
        let out = self.exec(client, &format!("ceph fs volume rm {vol} --yes-i-really-mean-it"))?;
        if self.should_validate(&out) {
            let names = list_names(client, "ceph fs ls --format json")?;
            if names.iter().any(|n| n == vol) {
                return Err(FsError::Validation(format!("Deletion of filesystem: {vol} failed")));
            }
            let pools = self.exec(client, &pool_pattern_count_cmd(vol))?;
            if pools.trimmed() != "0" {
                return Err(FsError::Validation(format!(
                    "Deletion of pools for {vol} failed. Actual Output: {}",
                    pools.stdout
                )));
            }
        }
        Ok(out)
    }

    /// Renames `old` to `new`. The file system has to be failed and refuse
    /// client sessions while it is renamed; both are undone afterwards.
    pub fn rename_volume(&self, client: &dyn Node, old: &str, new: &str) -> Result<(), FsError> {
        self.exec(client, &format!("ceph fs fail {old} --yes-i-really-mean-it"))?;
        self.exec(client, &format!("ceph fs set {old} refuse_client_session true"))?;
        let out = self.exec(client, &format!("ceph fs rename {old} {new} --yes-i-really-mean-it"))?;
        if !out.stderr.contains("renamed.") {
            return Err(FsError::Validation(format!(
                "rename of {old} to {new} failed: {}",
                out.stderr.trim()
            )));
        }
        let ls = self.exec(client, "ceph fs ls")?;
        if !ls.stdout.contains(new) {
            return Err(FsError::Validation(format!("{new} not listed after rename")));
        }
        self.exec(client, &format!("ceph fs set {new} refuse_client_session false"))?;
        self.exec(client, &format!("ceph fs set {new} joinable true"))?;

        let status_cmd = format!("ceph fs status {new}");
        let active = wait_for(Duration::from_secs(50), Duration::from_secs(5), || {
            Ok::<_, FsError>(self.exec(client, &status_cmd)?.stdout.contains("active"))
        })?;
        if !active {
            return Err(FsError::Timeout(format!("{new} has no active MDS after rename")));
        }
        tracing::info!(old, new, "volume renamed");
        Ok(())
    }

    /// `ceph fs authorize <fs> client.<name> <dir> <perm> [extra]`, returns
    /// the generated keyring.
    pub fn fs_client_authorize(
        &self,
        client: &dyn Node,
        fs: &str,
        client_name: &str,
        dir: &str,
        perm: &str,
        extra: Option<&str>,
    ) -> Result<CmdOutput, FsError> {
        let cmd = CmdLine::new("ceph fs authorize")
            .arg(fs)
            .arg(format!("client.{client_name}"))
            .arg(dir)
            .arg(perm)
            .maybe(extra);
        self.exec(client, cmd.as_str())
    }
}
