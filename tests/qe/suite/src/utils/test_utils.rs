use std::fmt::Display;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use libcephqe::cephfs::{FsUtils, FuseMount, KernelMount};
use libcephqe::cluster::{Cluster, CLIENT_ROLE};
use libcephqe::config::TestData;
use libcephqe::node::Node;
use libcephqe::utils::unique_name;

use super::support::{context, Context};

const DEFAULT_FS: &str = "cephfs";

/// File system the tests work in, `fs_name` from the custom config or
/// `cephfs`.
pub fn fs_name(data: &TestData) -> String {
    match data.get_custom_config_value("fs_name") {
        Ok(Some(value)) => value.as_str().unwrap_or(DEFAULT_FS).to_owned(),
        _ => DEFAULT_FS.to_owned(),
    }
}

/// Requirement check that holds when the cluster under test has a node
/// with `role`.
pub fn has_role(role: &'static str) -> impl Fn() -> bool + Sync + Send + 'static {
    move || context().map_or(false, |ctx| cluster_has_role(&ctx.cluster, role))
}

fn cluster_has_role(cluster: &Cluster, role: &str) -> bool {
    !cluster.get_nodes(Some(role)).is_empty()
}

/// First node with the `client` role.
pub fn client(ctx: &Context) -> Result<Arc<dyn Node>> {
    ctx.cluster
        .require_role(CLIENT_ROLE)?
        .into_iter()
        .next()
        .context("no client node")
}

/// Cleanup steps never fail a test, they are only logged.
pub fn log_cleanup<T, E: Display>(step: &str, res: Result<T, E>) {
    if let Err(e) = res {
        tracing::warn!(step, error = %e, "cleanup step failed");
    }
}

/// A file system client authorized for the duration of a test, with its
/// mount points.
pub struct MountedClient<'c> {
    fs: FsUtils<'c>,
    node: Arc<dyn Node>,
    pub name: String,
    pub fuse_dir: String,
    pub kernel_dir: String,
}

impl<'c> MountedClient<'c> {
    /// Authorizes a fresh client on `vol` and mounts it with ceph-fuse and
    /// the kernel driver.
    pub fn mount(ctx: &'c Context, node: Arc<dyn Node>, vol: &str) -> Result<Self> {
        let fs = FsUtils::new(&ctx.cluster, &ctx.test_data);
        let suffix = unique_name("");
        let mounted = Self {
            fs,
            node,
            name: format!("qe_{suffix}"),
            fuse_dir: format!("/mnt/cephfs_fuse_{suffix}/"),
            kernel_dir: format!("/mnt/cephfs_kernel_{suffix}/"),
        };
        let node = mounted.node.as_ref();
        fs.fs_client_authorize(node, vol, &mounted.name, "/", "rw", None)?;
        let clients = [mounted.node.clone()];
        fs.fuse_mount(
            &clients,
            &mounted.fuse_dir,
            &FuseMount {
                new_client_hostname: Some(mounted.name.clone()),
                extra_params: Some(format!("--client_fs {vol}")),
                ..Default::default()
            },
        )?;
        let mon_ip = ctx.cluster.mon_ips().join(",");
        fs.kernel_mount(
            &clients,
            &mounted.kernel_dir,
            &mon_ip,
            &KernelMount {
                new_client_hostname: Some(mounted.name.clone()),
                extra_params: Some(format!(",fs={vol}")),
                ..Default::default()
            },
        )?;
        Ok(mounted)
    }

    pub fn node(&self) -> &dyn Node {
        self.node.as_ref()
    }
}

impl Drop for MountedClient<'_> {
    fn drop(&mut self) {
        let fs = self.fs.relaxed();
        let clients = [self.node.clone()];
        log_cleanup(
            "unmount fuse",
            fs.client_clean_up(&clients, &[], &self.fuse_dir, true, Some(&self.name)),
        );
        log_cleanup(
            "unmount kernel",
            fs.client_clean_up(&[], &clients, &self.kernel_dir, true, Some(&self.name)),
        );
    }
}

#[cfg(test)]
mod tests {
    use libcephqe::test_utils::TestNode;

    use super::*;

    #[test]
    fn test_fs_name() {
        assert_eq!(fs_name(&TestData::default()), "cephfs");
        assert_eq!(fs_name(&TestData::with_custom_config(&["fs_name=cephfs_ec"])), "cephfs_ec");
    }

    #[test]
    fn test_cluster_has_role() {
        let nodes: Vec<Arc<dyn Node>> = vec![Arc::new(TestNode::new("gw1").with_roles(&["iscsi"]))];
        let cluster = Cluster::new("ceph", nodes).unwrap();
        assert!(cluster_has_role(&cluster, "iscsi"));
        assert!(!cluster_has_role(&cluster, "nfs"));
    }
}
