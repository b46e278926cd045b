use anyhow::{ensure, Result};
use libcephqe::cephfs::{FsUtils, Quota, SubvolumeOpts};
use libcephqe::node::{ExecOptions, Node};
use libcephqe::utils::unique_name;
use scopeguard::defer;
use test_framework::{assert_result_eq, Test, TestGroup};

use crate::utils::{client, context, fs_name, log_cleanup, MountedClient};

const FILE_LIMIT: u64 = 10;
const BYTE_LIMIT: u64 = 100 << 20;

fn try_exec(node: &dyn Node, cmd: &str) -> Result<bool> {
    Ok(node.exec(cmd, &ExecOptions::root().check_ec(false))?.success())
}

/// Kernel client directory of a fresh subvolume.
fn quota_dir(mounted: &MountedClient, path: &str) -> String {
    format!("{}{}", mounted.kernel_dir, path.trim_start_matches('/'))
}

/// Creating more files than `ceph.quota.max_files` allows fails.
fn file_quota() -> Result<()> {
    let ctx = context()?;
    let client = client(ctx)?;
    let fs = FsUtils::new(&ctx.cluster, &ctx.test_data);
    let vol = fs_name(&ctx.test_data);
    let subvol = unique_name("subvol_quota_files_");

    fs.create_subvolume(client.as_ref(), &vol, &subvol, &SubvolumeOpts::default())?;
    defer! {
        log_cleanup("remove subvolume", fs.relaxed().remove_subvolume(client.as_ref(), &vol, &subvol, None, false, true));
    }
    let path = fs.get_subvolume_path(client.as_ref(), &vol, &subvol, None)?;
    let mounted = MountedClient::mount(ctx, client.clone(), &vol)?;
    let dir = quota_dir(&mounted, &path);

    fs.set_quota_attrs(mounted.node(), Some(FILE_LIMIT), None, &dir)?;
    assert_result_eq!(
        Quota {
            files: FILE_LIMIT,
            bytes: 0
        },
        fs.get_quota_attrs(mounted.node(), &dir)?
    )?;

    // the subvolume root counts against the limit
    for i in 1..FILE_LIMIT {
        mounted.node().exec_command(&format!("touch {dir}/file_{i}"))?;
    }
    // kernel clients learn about the quota asynchronously, give it a few tries
    let mut exceeded = false;
    for i in FILE_LIMIT..FILE_LIMIT + 10 {
        if !try_exec(mounted.node(), &format!("touch {dir}/file_{i}"))? {
            exceeded = true;
            break;
        }
    }
    ensure!(exceeded, "file quota of {FILE_LIMIT} on {dir} was not enforced");
    Ok(())
}

/// Writing past `ceph.quota.max_bytes` fails.
fn byte_quota() -> Result<()> {
    let ctx = context()?;
    let client = client(ctx)?;
    let fs = FsUtils::new(&ctx.cluster, &ctx.test_data);
    let vol = fs_name(&ctx.test_data);
    let subvol = unique_name("subvol_quota_bytes_");

    fs.create_subvolume(client.as_ref(), &vol, &subvol, &SubvolumeOpts::default())?;
    defer! {
        log_cleanup("remove subvolume", fs.relaxed().remove_subvolume(client.as_ref(), &vol, &subvol, None, false, true));
    }
    let path = fs.get_subvolume_path(client.as_ref(), &vol, &subvol, None)?;
    let mounted = MountedClient::mount(ctx, client.clone(), &vol)?;
    let dir = quota_dir(&mounted, &path);

    fs.set_quota_attrs(mounted.node(), None, Some(BYTE_LIMIT), &dir)?;
    assert_result_eq!(BYTE_LIMIT, fs.get_quota_attrs(mounted.node(), &dir)?.bytes, "max_bytes of {dir}")?;

    let limit_mib = BYTE_LIMIT >> 20;
    mounted
        .node()
        .exec_command(&format!("dd if=/dev/zero of={dir}/within bs=1M count={} status=none", limit_mib / 2))?;
    let written = try_exec(
        mounted.node(),
        &format!("dd if=/dev/zero of={dir}/beyond bs=1M count={} oflag=direct status=none", limit_mib * 2),
    )?;
    ensure!(!written, "byte quota of {BYTE_LIMIT} on {dir} was not enforced");
    Ok(())
}

pub fn get_cephfs_quota_test() -> TestGroup {
    let mut test_group = TestGroup::new("cephfs_quota");
    let files = Test::checked("file_quota", file_quota);
    let bytes = Test::checked("byte_quota", byte_quota);
    test_group.add(vec![Box::new(files), Box::new(bytes)]);

    test_group
}
