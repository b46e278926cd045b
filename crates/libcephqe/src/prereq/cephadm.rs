use std::collections::BTreeMap;
use std::sync::Arc;

use super::{setup_ssh_keys, PrereqError};
use crate::cli::ansible::{Ansible, CEPHADM_ANSIBLE_DIR};
use crate::cli::packages::{Package, Repos};
use crate::node::{root_shell, shell_quote, CmdOutput, Node};

pub const CEPHADM_ANSIBLE: &str = "cephadm-ansible";
pub const CEPHADM_PREFLIGHT_PLAYBOOK: &str = "cephadm-preflight.yml";

const IBM_LICENCE: &str = "ibm-storage-ceph-license";
const RELEASED_BUILDS: [&str; 3] = ["live", "cdn", "released"];

/// How the installer node gets its cephadm tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallerSetup {
    /// Compose URL used when the build is not released on CDN
    pub tools_repo: Option<String>,
    /// `live`, `cdn` and `released` use the CDN tools repo
    pub build_type: String,
    pub ibm_build: bool,
    /// Install cephadm-ansible and run the preflight playbook instead of
    /// installing cephadm alone.
    pub ansible_preflight: bool,
}

impl InstallerSetup {
    fn released(&self) -> bool {
        RELEASED_BUILDS.contains(&self.build_type.as_str())
    }
}

/// CDN tools repo of a ceph release on `platform` (`rhel-8`, `rhel-9`).
pub fn tools_repo_for(ceph_version: &str, platform: &str) -> Result<&'static str, PrereqError> {
    let repo = match (ceph_version.split('.').next().unwrap_or_default(), platform) {
        ("7", "rhel-9") => Some("rhceph-7-tools-for-rhel-9-x86_64-rpms"),
        ("6", "rhel-9") => Some("rhceph-6-tools-for-rhel-9-x86_64-rpms"),
        ("5", "rhel-8") => Some("rhceph-5-tools-for-rhel-8-x86_64-rpms"),
        ("5", "rhel-9") => Some("rhceph-5-tools-for-rhel-9-x86_64-rpms"),
        _ => None,
    };
    repo.ok_or_else(|| PrereqError::UnsupportedVersion(format!("{ceph_version} on {platform}")))
}

pub fn enable_ceph_tools_repo(node: &dyn Node, ceph_version: &str, platform: &str) -> Result<(), PrereqError> {
    Repos::new(node).enable(&[tools_repo_for(ceph_version, platform)?])?;
    Ok(())
}

/// Adds a downstream compose. URLs not pointing at a `.repo` file are
/// taken as compose roots.
pub fn add_ceph_repo(node: &dyn Node, repo: &str) -> Result<(), PrereqError> {
    let repo = if repo.ends_with("repo") {
        repo.to_owned()
    } else {
        format!("{repo}/compose/Tools/x86_64/os")
    };
    Package::new(node).add_repo(&repo)?;
    Ok(())
}

/// Installs the IBM Storage Ceph licence package and checks the EULA was
/// accepted.
pub fn setup_ibm_licence(node: &dyn Node) -> Result<CmdOutput, PrereqError> {
    Package::new(node).install(IBM_LICENCE, false, &[("ACCEPT_EULA", "Y")])?;
    Ok(node.exec_command(&format!("cat /usr/share/{IBM_LICENCE}/accept"))?)
}

/// Makes the tools repo available and returns whether gpg checks must be
/// skipped for packages from it.
fn prepare_tools_repo(
    node: &dyn Node,
    ceph_version: &str,
    platform: &str,
    setup: &InstallerSetup,
) -> Result<bool, PrereqError> {
    if setup.released() {
        enable_ceph_tools_repo(node, ceph_version, platform)?;
    } else if let Some(repo) = &setup.tools_repo {
        add_ceph_repo(node, repo)?;
    } else {
        return Err(PrereqError::MissingToolsRepo);
    }
    if setup.ibm_build {
        setup_ibm_licence(node)?;
    }
    Ok(!setup.released())
}

pub fn install_cephadm(
    node: &dyn Node,
    ceph_version: &str,
    platform: &str,
    setup: &InstallerSetup,
) -> Result<(), PrereqError> {
    let nogpgcheck = prepare_tools_repo(node, ceph_version, platform, setup)?;
    Package::new(node).install("cephadm", nogpgcheck, &[])?;
    Ok(())
}

pub fn install_cephadm_ansible(
    installer: &dyn Node,
    ceph_version: &str,
    platform: &str,
    setup: &InstallerSetup,
) -> Result<(), PrereqError> {
    let nogpgcheck = prepare_tools_repo(installer, ceph_version, platform, setup)?;
    Package::new(installer).install(CEPHADM_ANSIBLE, nogpgcheck, &[])?;
    Ok(())
}

/// Writes the cephadm-ansible inventory: every node, plus the installer in
/// the `admin` group.
pub fn configure_cephadm_ansible_inventory(installer: &dyn Node, nodes: &[Arc<dyn Node>]) -> Result<(), PrereqError> {
    let mut inventory: String = nodes
        .iter()
        .filter(|n| n.hostname() != installer.hostname())
        .map(|n| format!("{}\n", n.hostname()))
        .collect();
    inventory.push_str(&format!("\n[admin]\n{}\n", installer.hostname()));
    let write = format!("printf %s {} > {CEPHADM_ANSIBLE_DIR}/hosts", shell_quote(&inventory));
    installer.exec_command(&root_shell(&write))?;
    Ok(())
}

/// Runs `cephadm-preflight.yml`, against the CDN build or a custom repo.
pub fn exec_cephadm_preflight(installer: &dyn Node, build: &str, ceph_repo: Option<&str>) -> Result<(), PrereqError> {
    if build == "ibm" {
        setup_ibm_licence(installer)?;
    }
    let extra_vars: BTreeMap<String, String> = match ceph_repo {
        Some(repo) => BTreeMap::from([
            ("ceph_origin".to_owned(), "custom".to_owned()),
            ("gpgcheck".to_owned(), "no".to_owned()),
            ("custom_repo_url".to_owned(), repo.to_owned()),
        ]),
        None => BTreeMap::from([("ceph_origin".to_owned(), build.to_owned())]),
    };
    Ansible::new(installer)
        .run_playbook(CEPHADM_PREFLIGHT_PLAYBOOK, None, &extra_vars, None)
        .map_err(PrereqError::Preflight)?;
    tracing::info!(installer = installer.hostname(), "cephadm preflight finished");
    Ok(())
}

/// Prepares the installer for `rhbuild` (`<ceph version>-<platform>`, e.g.
/// `7.1-rhel-9`).
pub fn setup_installer_node(
    installer: &dyn Node,
    nodes: &[Arc<dyn Node>],
    rhbuild: &str,
    setup: &InstallerSetup,
) -> Result<(), PrereqError> {
    let (ceph_version, platform) = rhbuild
        .split_once('-')
        .ok_or_else(|| PrereqError::UnsupportedVersion(rhbuild.to_owned()))?;
    setup_ssh_keys(installer, nodes)?;
    if !setup.ansible_preflight {
        return install_cephadm(installer, ceph_version, platform, setup);
    }
    install_cephadm_ansible(installer, ceph_version, platform, setup)?;
    configure_cephadm_ansible_inventory(installer, nodes)?;
    exec_cephadm_preflight(installer, &setup.build_type, setup.tools_repo.as_deref())
}
