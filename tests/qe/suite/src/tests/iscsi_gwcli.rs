use anyhow::Result;
use libcephqe::cli::gwcli::{generate_iqn, validate_gwcli_configuration, Gwcli, HostConfig, TargetConfig};
use libcephqe::cluster::ISCSI_ROLE;
use libcephqe::config::TestData;
use libcephqe::utils::unique_name;
use scopeguard::defer;
use test_framework::{Test, TestGroup};

use crate::utils::{context, has_role, log_cleanup};

const DEFAULT_POOL: &str = "rbd";
const DISK_SIZE: &str = "1G";

fn rbd_pool(data: &TestData) -> String {
    match data.get_custom_config_value("rbd_pool") {
        Ok(Some(value)) => value.as_str().unwrap_or(DEFAULT_POOL).to_owned(),
        _ => DEFAULT_POOL.to_owned(),
    }
}

/// Target with every iscsi node as gateway, one host and one disk mapped to
/// it, checked against `gwcli export`.
fn target_configuration() -> Result<()> {
    let ctx = context()?;
    let gateways = ctx.cluster.require_role(ISCSI_ROLE)?;
    let gw_node = gateways[0].as_ref();
    let gwcli = Gwcli::new(gw_node);
    let iqn = generate_iqn(None, None);
    let client_iqn = generate_iqn(None, Some(&unique_name("client-")));
    let disk = format!("{}/{}", rbd_pool(&ctx.test_data), unique_name("disk_"));
    let target = gwcli.iscsi_targets().target(&iqn);

    gwcli.iscsi_targets().create(&iqn)?;
    defer! {
        log_cleanup("unmap disk", target.hosts().client(&client_iqn).disk_remove(&disk));
        log_cleanup("remove host", target.hosts().delete(&client_iqn));
        log_cleanup("remove target disk", target.disks().delete(&disk));
        log_cleanup("remove disk", gwcli.disks().delete(&disk));
        log_cleanup("remove target", gwcli.iscsi_targets().delete(&iqn));
    }
    for gw in &gateways {
        target.gateways().create(gw.hostname(), gw.ip_address(), true)?;
    }
    let (pool, image) = disk.split_once('/').unwrap_or((DEFAULT_POOL, disk.as_str()));
    gwcli.disks().create(pool, image, DISK_SIZE)?;
    target.disks().add(&disk)?;
    target.hosts().create(&client_iqn)?;
    target.hosts().client(&client_iqn).disk_add(&disk, None)?;

    let config = TargetConfig {
        iqn: iqn.clone(),
        gateways: gateways.iter().map(|gw| gw.hostname().to_owned()).collect(),
        hosts: vec![HostConfig {
            client_iqn: client_iqn.clone(),
            disks: vec![disk.clone()],
        }],
    };
    validate_gwcli_configuration(&gwcli.export()?, &config)?;
    Ok(())
}

pub fn get_iscsi_gwcli_test() -> TestGroup {
    let mut test_group = TestGroup::new("iscsi_gwcli");
    let target = Test::checked("target_configuration", target_configuration)
        .requires("a node with the iscsi role", has_role(ISCSI_ROLE));
    test_group.add(vec![Box::new(target)]);

    test_group
}
