use std::time::Duration;

use serde_json::Value;

use super::mount::{add_fstab_entry, nfs_fstab_entry, NfsMount};
use super::{exec_json, FsError, FsUtils};
use crate::cli::CmdLine;
use crate::node::{CmdOutput, Node};
use crate::waiter::retry;

const NFS_RM_TRIES: u32 = 5;
const NFS_RM_DELAY: Duration = Duration::from_secs(60);

fn nfs_clusters(client: &dyn Node) -> Result<Vec<String>, FsError> {
    let out = client.exec_command("ceph nfs cluster ls")?;
    Ok(out.stdout.lines().map(|l| l.trim().to_owned()).collect())
}

/// Pseudo paths of the exports of `cluster`. Older releases list bare
/// strings, newer ones objects carrying a `pseudo` key.
fn export_bindings(client: &dyn Node, cluster: &str) -> Result<Vec<String>, FsError> {
    let exports: Vec<Value> = exec_json(client, &format!("ceph nfs export ls {cluster} --format json"))?;
    Ok(exports
        .iter()
        .filter_map(|e| e.as_str().or_else(|| e["pseudo"].as_str()))
        .map(str::to_owned)
        .collect())
}

impl FsUtils<'_> {
    pub fn create_nfs(&self, client: &dyn Node, name: &str, placement: Option<&str>) -> Result<CmdOutput, FsError> {
        let cmd = CmdLine::new("ceph nfs cluster create")
            .arg(name)
            .opt("--placement", placement.map(|p| format!("'{p}'")));
        let out = self.exec(client, cmd.as_str())?;
        if self.should_validate(&out) && !nfs_clusters(client)?.iter().any(|c| c == name) {
            return Err(FsError::Validation(format!("Creation of NFS cluster: {name} failed")));
        }
        Ok(out)
    }

    /// Removes the cluster, retrying while it is still listed.
    pub fn remove_nfs_cluster(&self, client: &dyn Node, name: &str) -> Result<CmdOutput, FsError> {
        self.remove_nfs_cluster_with(client, name, NFS_RM_TRIES, NFS_RM_DELAY)
    }

    fn remove_nfs_cluster_with(
        &self,
        client: &dyn Node,
        name: &str,
        tries: u32,
        delay: Duration,
    ) -> Result<CmdOutput, FsError> {
        retry(tries, delay, || {
            let out = self.exec(client, &format!("ceph nfs cluster rm {name}"))?;
            if self.should_validate(&out) && nfs_clusters(client)?.iter().any(|c| c == name) {
                return Err(FsError::Validation(format!("Deletion of NFS cluster: {name} failed")));
            }
            Ok(out)
        })
    }

    pub fn create_nfs_export(
        &self,
        client: &dyn Node,
        cluster: &str,
        binding: &str,
        fs_name: &str,
        path: Option<&str>,
        readonly: bool,
    ) -> Result<CmdOutput, FsError> {
        let cmd = CmdLine::new("ceph nfs export create cephfs")
            .arg(cluster)
            .arg(binding)
            .arg(fs_name)
            .opt_eq("--path", path)
            .flag("--readonly", readonly);
        let out = self.exec(client, cmd.as_str())?;
        if self.should_validate(&out) && !export_bindings(client, cluster)?.iter().any(|b| b == binding) {
            return Err(FsError::Validation(format!("Creation of export failed: {cmd}")));
        }
        Ok(out)
    }

    pub fn remove_nfs_export(&self, client: &dyn Node, cluster: &str, binding: &str) -> Result<CmdOutput, FsError> {
        let cmd = format!("ceph nfs export rm {cluster} {binding}");
        let out = self.exec(client, &cmd)?;
        if self.should_validate(&out) && export_bindings(client, cluster)?.iter().any(|b| b == binding) {
            return Err(FsError::Validation(format!("Removal of export failed: {cmd}")));
        }
        Ok(out)
    }

    /// Mounts `server:export` on `mount_dir` over NFS v4.
    pub fn cephfs_nfs_mount(
        &self,
        client: &dyn Node,
        server: &str,
        export: &str,
        mount_dir: &str,
        opts: &NfsMount,
    ) -> Result<(), FsError> {
        client.exec_command(&format!("mkdir -p {mount_dir}"))?;
        if opts.fstab {
            let entry = nfs_fstab_entry(server, export, mount_dir, opts.port(), opts.extra_params.as_deref());
            add_fstab_entry(client, &entry)?;
        }
        client.exec_command(&format!(
            "mount -t nfs -o port={} {server}:{export} {mount_dir}",
            opts.port()
        ))?;
        if !self.wait_until_mount_succeeds(client, mount_dir)? {
            return Err(FsError::Timeout(format!(
                "{mount_dir} did not appear in mount on {}",
                client.hostname()
            )));
        }
        Ok(())
    }
}
