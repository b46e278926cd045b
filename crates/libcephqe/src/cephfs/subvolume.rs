use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{exec_json, list_names, FsError, FsUtils};
use crate::cli::CmdLine;
use crate::node::{CmdOutput, Node};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubvolumeGroupOpts {
    pub pool_layout: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// octal, e.g. `755`
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubvolumeOpts {
    /// bytes
    pub size: Option<u64>,
    pub group_name: Option<String>,
    pub pool_layout: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: Option<String>,
    pub namespace_isolated: bool,
    /// `nfs` or `smb` prefixed scope
    pub earmark: Option<String>,
}

/// `ceph fs subvolume info`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubvolumeInfo {
    pub path: String,
    pub data_pool: String,
    pub pool_namespace: String,
    /// a byte count or `"infinite"`
    pub bytes_quota: Value,
    pub bytes_used: u64,
    pub state: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub features: Vec<String>,
    pub earmark: String,
}

fn group_opt(cmd: CmdLine, group: Option<&str>) -> CmdLine {
    cmd.opt("--group_name", group)
}

impl FsUtils<'_> {
    pub fn create_subvolumegroup(
        &self,
        client: &dyn Node,
        vol: &str,
        group: &str,
        opts: &SubvolumeGroupOpts,
    ) -> Result<CmdOutput, FsError> {
        let cmd = CmdLine::new("ceph fs subvolumegroup create")
            .arg(vol)
            .arg(group)
            .opt("--pool_layout", opts.pool_layout.as_deref())
            .opt("--uid", opts.uid)
            .opt("--gid", opts.gid)
            .opt("--mode", opts.mode.as_deref());
        let out = self.exec(client, cmd.as_str())?;
        if self.should_validate(&out) {
            let groups = list_names(client, &format!("ceph fs subvolumegroup ls {vol} --format json"))?;
            if !groups.iter().any(|g| g == group) {
                return Err(FsError::Validation(format!(
                    "Creation of subvolume group: {group} failed"
                )));
            }
        }
        Ok(out)
    }

    pub fn remove_subvolumegroup(
        &self,
        client: &dyn Node,
        vol: &str,
        group: &str,
        force: bool,
    ) -> Result<CmdOutput, FsError> {
        let cmd = CmdLine::new("ceph fs subvolumegroup rm")
            .arg(vol)
            .arg(group)
            .flag("--force", force);
        let out = self.exec(client, cmd.as_str())?;
        if self.should_validate(&out) {
            let groups = list_names(client, &format!("ceph fs subvolumegroup ls {vol} --format json"))?;
            if groups.iter().any(|g| g == group) {
                return Err(FsError::Validation(format!(
                    "Deletion of subvolume group: {group} failed"
                )));
            }
        }
        Ok(out)
    }

    /// Names of the subvolumes of `vol`, optionally within `group`.
    pub fn list_subvolumes(
        &self,
        client: &dyn Node,
        vol: &str,
        group: Option<&str>,
    ) -> Result<Vec<String>, FsError> {
        let cmd = group_opt(CmdLine::new("ceph fs subvolume ls").arg(vol), group).arg("--format json");
        list_names(client, cmd.as_str())
    }

    pub fn create_subvolume(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        opts: &SubvolumeOpts,
    ) -> Result<CmdOutput, FsError> {
        let group = opts.group_name.as_deref();
        let cmd = CmdLine::new("ceph fs subvolume create")
            .arg(vol)
            .arg(subvol)
            .opt("--size", opts.size);
        let cmd = group_opt(cmd, group)
            .opt("--pool_layout", opts.pool_layout.as_deref())
            .opt("--uid", opts.uid)
            .opt("--gid", opts.gid)
            .opt("--mode", opts.mode.as_deref())
            .flag("--namespace-isolated", opts.namespace_isolated)
            .opt("--earmark", opts.earmark.as_deref());
        let out = self.exec(client, cmd.as_str())?;
        if self.should_validate(&out) && !self.list_subvolumes(client, vol, group)?.iter().any(|s| s == subvol) {
            return Err(FsError::Validation(format!("Creation of subvolume: {subvol} failed")));
        }
        Ok(out)
    }

    pub fn remove_subvolume(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        group: Option<&str>,
        retain_snapshots: bool,
        force: bool,
    ) -> Result<CmdOutput, FsError> {
        let cmd = group_opt(CmdLine::new("ceph fs subvolume rm").arg(vol).arg(subvol), group)
            .flag("--retain-snapshots", retain_snapshots)
            .flag("--force", force);
        let out = self.exec(client, cmd.as_str())?;
        if self.should_validate(&out) && self.list_subvolumes(client, vol, group)?.iter().any(|s| s == subvol) {
            return Err(FsError::Validation(format!("Deletion of subvolume: {subvol} failed")));
        }
        Ok(out)
    }

    pub fn get_subvolume_info(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        group: Option<&str>,
    ) -> Result<SubvolumeInfo, FsError> {
        let cmd = group_opt(CmdLine::new("ceph fs subvolume info").arg(vol).arg(subvol), group);
        exec_json(client, cmd.as_str())
    }

    /// `ceph fs subvolume getpath`
    pub fn get_subvolume_path(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        group: Option<&str>,
    ) -> Result<String, FsError> {
        let cmd = group_opt(CmdLine::new("ceph fs subvolume getpath").arg(vol).arg(subvol), group);
        Ok(self.exec(client, cmd.as_str())?.trimmed().to_owned())
    }

    /// Subvolumes of every volume in `fs_list`, or of all volumes when empty.
    pub fn get_all_subvolumes(&self, client: &dyn Node, fs_list: &[String]) -> Result<Vec<String>, FsError> {
        let all;
        let volumes = if fs_list.is_empty() {
            all = list_names(client, "ceph fs ls --format json")?;
            &all[..]
        } else {
            fs_list
        };
        let mut subvolumes = Vec::new();
        for fs in volumes {
            subvolumes.extend(self.list_subvolumes(client, fs, None)?);
        }
        Ok(subvolumes)
    }

    /// Creates `client_name` with access to the subvolume and returns its key.
    pub fn subvolume_authorize(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        client_name: &str,
        extra: Option<&str>,
    ) -> Result<CmdOutput, FsError> {
        let cmd = CmdLine::new("ceph fs subvolume authorize")
            .arg(vol)
            .arg(subvol)
            .arg(client_name)
            .maybe(extra);
        self.exec(client, cmd.as_str())
    }

    fn earmark_cmd(action: &str, vol: &str, subvol: &str) -> CmdLine {
        CmdLine::new("ceph fs subvolume earmark")
            .arg(action)
            .arg(vol)
            .arg(subvol)
    }

    pub fn get_subvolume_earmark(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        group: Option<&str>,
    ) -> Result<String, FsError> {
        let cmd = Self::earmark_cmd("get", vol, subvol).opt_eq("--group_name", group);
        let out = self.exec(client, cmd.as_str())?;
        if out.stderr.contains("Error") {
            return Err(FsError::Validation(format!(
                "Failed to get earmark of {subvol}: {}",
                out.stderr.trim()
            )));
        }
        Ok(out.trimmed().to_owned())
    }

    /// Sets the earmark and reads it back.
    pub fn set_subvolume_earmark(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        earmark: &str,
        group: Option<&str>,
    ) -> Result<(), FsError> {
        let cmd = Self::earmark_cmd("set", vol, subvol)
            .opt("--earmark", Some(earmark))
            .opt_eq("--group_name", group);
        let out = self.exec(client, cmd.as_str())?;
        if out.stderr.contains("Error") {
            return Err(FsError::Validation(format!(
                "Failed to set earmark of {subvol}: {}",
                out.stderr.trim()
            )));
        }
        let current = self.get_subvolume_earmark(client, vol, subvol, group)?;
        if !current.contains(earmark) {
            return Err(FsError::Validation(format!(
                "Earmark of {subvol} is {current:?}, expected {earmark}"
            )));
        }
        tracing::info!(subvol, earmark, "earmark set");
        Ok(())
    }

    pub fn remove_subvolume_earmark(
        &self,
        client: &dyn Node,
        vol: &str,
        subvol: &str,
        group: Option<&str>,
    ) -> Result<(), FsError> {
        let cmd = Self::earmark_cmd("rm", vol, subvol).opt_eq("--group_name", group);
        let out = self.exec(client, cmd.as_str())?;
        if out.stderr.contains("Error") {
            return Err(FsError::Validation(format!(
                "Failed to remove earmark of {subvol}: {}",
                out.stderr.trim()
            )));
        }
        self.get_subvolume_earmark(client, vol, subvol, group)?;
        Ok(())
    }
}
