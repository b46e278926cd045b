use anyhow::{ensure, Result};
use libcephqe::cephfs::FsUtils;
use libcephqe::node::{ExecOptions, Node};
use libcephqe::parallel::{all_ok, parallel};
use libcephqe::utils::unique_name;
use rand::Rng;
use test_framework::{Test, TestGroup};

use crate::utils::{client, context, fs_name, MountedClient};

const FILES_PER_MOUNT: u32 = 5;

/// Writes `sizes` MiB files under `dir` and returns their checksums.
fn write_and_sum(node: &dyn Node, dir: &str, sizes: &[u32]) -> Result<Vec<String>> {
    node.exec_command(&format!("mkdir -p {dir}"))?;
    let mut sums = Vec::with_capacity(sizes.len());
    for (i, size) in sizes.iter().enumerate() {
        let file = format!("{dir}/io_{i}");
        node.exec(
            &format!("dd if=/dev/urandom of={file} bs=1M count={size} status=none"),
            &ExecOptions::root().long_running(true),
        )?;
        let out = node.exec_command(&format!("md5sum {file} | cut -d ' ' -f 1"))?;
        sums.push(out.trimmed().to_owned());
    }
    Ok(sums)
}

fn read_sums(node: &dyn Node, dir: &str, count: usize) -> Result<Vec<String>> {
    (0..count)
        .map(|i| {
            let out = node.exec_command(&format!("md5sum {dir}/io_{i} | cut -d ' ' -f 1"))?;
            Ok(out.trimmed().to_owned())
        })
        .collect()
}

/// Data written concurrently through the fuse and kernel mounts reads back
/// the same through the other mount.
fn parallel_io() -> Result<()> {
    let ctx = context()?;
    let client = client(ctx)?;
    let vol = fs_name(&ctx.test_data);
    let mounted = MountedClient::mount(ctx, client.clone(), &vol)?;
    let node = mounted.node();

    let mut rng = rand::thread_rng();
    let sizes: Vec<u32> = (0..FILES_PER_MOUNT).map(|_| rng.gen_range(1..=16)).collect();
    let dir = unique_name("io_");
    let fuse_dir = format!("{}{dir}_fuse", mounted.fuse_dir);
    let kernel_dir = format!("{}{dir}_kernel", mounted.kernel_dir);

    let (fuse, kernel, file_sizes) = (fuse_dir.as_str(), kernel_dir.as_str(), sizes.as_slice());
    let written = all_ok::<_, anyhow::Error>(parallel(|p| {
        p.spawn(move || write_and_sum(node, fuse, file_sizes));
        p.spawn(move || write_and_sum(node, kernel, file_sizes));
    }))?;
    let (fuse_sums, kernel_sums) = (&written[0], &written[1]);

    let crossed_fuse = read_sums(node, &format!("{}{dir}_fuse", mounted.kernel_dir), sizes.len())?;
    let crossed_kernel = read_sums(node, &format!("{}{dir}_kernel", mounted.fuse_dir), sizes.len())?;
    ensure!(
        *fuse_sums == crossed_fuse,
        "fuse written data differs through the kernel mount: {fuse_sums:?} != {crossed_fuse:?}"
    );
    ensure!(
        *kernel_sums == crossed_kernel,
        "kernel written data differs through the fuse mount: {kernel_sums:?} != {crossed_kernel:?}"
    );

    node.exec(
        &format!("rm -rf {fuse_dir} {kernel_dir}"),
        &ExecOptions::root().check_ec(false),
    )?;
    Ok(())
}

/// File size, ownership and mode of a new file as seen by `stat`.
fn file_stats() -> Result<()> {
    let ctx = context()?;
    let client = client(ctx)?;
    let fs = FsUtils::new(&ctx.cluster, &ctx.test_data);
    let vol = fs_name(&ctx.test_data);
    let mounted = MountedClient::mount(ctx, client.clone(), &vol)?;
    let file = format!("{}{}", mounted.fuse_dir, unique_name("stat_"));

    mounted
        .node()
        .exec_command(&format!("dd if=/dev/zero of={file} bs=4k count=1 status=none && chmod 640 {file}"))?;
    let stats = fs.get_stats(mounted.node(), &file)?;
    mounted.node().exec(&format!("rm -f {file}"), &ExecOptions::root().check_ec(false))?;

    let get = |key: &str| stats.get(key).map(String::as_str).unwrap_or_default();
    ensure!(get("Size") == "4096", "unexpected size of {file}: {stats:?}");
    ensure!(get("Octal_Permission") == "640", "unexpected mode of {file}: {stats:?}");
    ensure!(get("Uid") == "0", "unexpected owner of {file}: {stats:?}");
    Ok(())
}

pub fn get_cephfs_mount_io_test() -> TestGroup {
    let mut test_group = TestGroup::new("cephfs_mount_io");
    let io = Test::checked("parallel_io", parallel_io);
    let stats = Test::checked("file_stats", file_stats);
    test_group.add(vec![Box::new(io), Box::new(stats)]);

    test_group
}
