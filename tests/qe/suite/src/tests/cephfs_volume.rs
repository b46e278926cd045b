use anyhow::{bail, Result};
use libcephqe::cephfs::FsUtils;
use libcephqe::utils::unique_name;
use scopeguard::defer;
use test_framework::{Test, TestGroup};

use crate::utils::{client, context, log_cleanup};

/// A volume gets its own pools, which go away with it.
fn create_remove_volume() -> Result<()> {
    let ctx = context()?;
    let client = client(ctx)?;
    let fs = FsUtils::new(&ctx.cluster, &ctx.test_data);
    let vol = unique_name("cephfs_vol_");

    fs.create_fs(client.as_ref(), &vol, None)?;
    defer! {
        log_cleanup("remove volume", fs.relaxed().remove_fs(client.as_ref(), &vol));
    }
    let Some(info) = fs.get_fs_info(client.as_ref(), &vol)? else {
        bail!("{vol} is not listed after creation");
    };
    if info.metadata_pool_name != format!("cephfs.{vol}.meta") {
        bail!("unexpected metadata pool {} of {vol}", info.metadata_pool_name);
    }
    fs.get_ceph_health_status(client.as_ref(), &["HEALTH_OK", "HEALTH_WARN"])?;
    fs.remove_fs(client.as_ref(), &vol)?;
    Ok(())
}

fn rename_volume() -> Result<()> {
    let ctx = context()?;
    let client = client(ctx)?;
    let fs = FsUtils::new(&ctx.cluster, &ctx.test_data);
    let vol = unique_name("cephfs_rename_");
    let renamed = format!("{vol}_new");

    fs.create_fs(client.as_ref(), &vol, None)?;
    defer! {
        let fs = fs.relaxed();
        log_cleanup("remove volume", fs.remove_fs(client.as_ref(), &vol));
        log_cleanup("remove renamed volume", fs.remove_fs(client.as_ref(), &renamed));
    }
    fs.rename_volume(client.as_ref(), &vol, &renamed)?;
    if fs.get_fs_info(client.as_ref(), &vol)?.is_some() {
        bail!("{vol} is still listed after the rename");
    }
    if fs.get_fs_info(client.as_ref(), &renamed)?.is_none() {
        bail!("{renamed} is not listed after the rename");
    }
    Ok(())
}

pub fn get_cephfs_volume_test() -> TestGroup {
    let mut test_group = TestGroup::new("cephfs_volume");
    let create_remove = Test::checked("create_remove_volume", create_remove_volume);
    let rename = Test::checked("rename_volume", rename_volume);
    test_group.add(vec![Box::new(create_remove), Box::new(rename)]);

    test_group
}
