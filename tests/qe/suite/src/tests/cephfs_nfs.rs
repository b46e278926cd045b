use std::time::Duration;

use anyhow::{ensure, Result};
use libcephqe::cephfs::{FsUtils, NfsMount};
use libcephqe::node::ExecOptions;
use libcephqe::utils::unique_name;
use scopeguard::defer;
use test_framework::{Test, TestGroup};

use crate::utils::{client, context, fs_name, log_cleanup};

/// Cluster, export and an NFS v4 mount of the export, torn down in reverse.
fn nfs_export_lifecycle() -> Result<()> {
    let ctx = context()?;
    let client = client(ctx)?;
    let fs = FsUtils::new(&ctx.cluster, &ctx.test_data);
    let vol = fs_name(&ctx.test_data);
    let nfs_node = ctx.cluster.installer()?;
    let nfs_name = unique_name("cephfs-nfs-");
    let binding = format!("/export_{}", unique_name(""));
    let mount_dir = format!("/mnt/nfs_{}", unique_name(""));

    fs.create_nfs(client.as_ref(), &nfs_name, Some(&format!("1 {}", nfs_node.hostname())))?;
    defer! {
        let fs = fs.relaxed();
        log_cleanup("unmount", client.exec(&format!("umount -l {mount_dir}"), &ExecOptions::root().check_ec(false)));
        log_cleanup("remove mount dir", client.exec(&format!("rm -rf {mount_dir}"), &ExecOptions::root().check_ec(false)));
        log_cleanup("remove export", fs.remove_nfs_export(client.as_ref(), &nfs_name, &binding));
        log_cleanup("remove nfs cluster", fs.remove_nfs_cluster(client.as_ref(), &nfs_name));
    }
    let running = fs.wait_for_nfs_process(
        client.as_ref(),
        &nfs_name,
        true,
        "running",
        Duration::from_secs(300),
        Duration::from_secs(10),
    )?;
    ensure!(running, "nfs daemon of {nfs_name} is not running");
    fs.create_nfs_export(client.as_ref(), &nfs_name, &binding, &vol, None, false)?;
    fs.cephfs_nfs_mount(client.as_ref(), nfs_node.hostname(), &binding, &mount_dir, &NfsMount::default())?;

    let file = format!("{mount_dir}/nfs_io_file");
    client.exec_command(&format!("dd if=/dev/zero of={file} bs=1M count=10"))?;
    let out = client.exec_command(&format!("stat -c %s {file}"))?;
    ensure!(out.trimmed() == "10485760", "unexpected size {} of {file}", out.trimmed());
    Ok(())
}

pub fn get_cephfs_nfs_test() -> TestGroup {
    let mut test_group = TestGroup::new("cephfs_nfs");
    let lifecycle = Test::checked("nfs_export_lifecycle", nfs_export_lifecycle);
    test_group.add(vec![Box::new(lifecycle)]);

    test_group
}
