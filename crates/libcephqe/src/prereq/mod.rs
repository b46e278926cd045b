//! Cluster bring-up: everything that has to happen on freshly provisioned
//! nodes before cephadm can deploy onto them.
mod cephadm;
mod registry;
mod ssh;

use std::sync::Arc;
use std::time::Duration;

use crate::cli::ansible::AnsiblePlaybookError;
use crate::cli::containers::{ContainerError, ContainerRegistryError, Registry};
use crate::cli::packages::{
    Package, PackageError, RegisterArgs, ReposError, Rpm, RpmError, SubscriptionManager,
    SubscriptionManagerError,
};
use crate::cluster::{Cluster, ClusterError};
use crate::config::{CephciConfig, ConfigError};
use crate::node::{ExecError, Node};
use crate::utils::os_major_version;
use crate::waiter::WaitUntil;

pub use cephadm::{
    add_ceph_repo, configure_cephadm_ansible_inventory, enable_ceph_tools_repo, exec_cephadm_preflight,
    install_cephadm, install_cephadm_ansible, setup_ibm_licence, setup_installer_node, tools_repo_for,
    InstallerSetup, CEPHADM_ANSIBLE, CEPHADM_PREFLIGHT_PLAYBOOK,
};
pub use registry::{
    add_cert_to_trusted_list, add_images_to_private_registry, copy_cert_to_secondary_node,
    create_link_to_domain_cert, create_registry_directories, create_self_signed_certificate,
    generate_skopeo_copy_cmd, get_private_registry_image, set_registry_credentials,
    setup_private_container_registry, start_local_private_registry, update_ca_trust, validate_trusted_list,
    PrivateRegistry, SkopeoCopy,
};
pub use ssh::setup_ssh_keys;

#[derive(Debug, thiserror::Error)]
pub enum PrereqError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Repos(#[from] ReposError),
    #[error(transparent)]
    Subscription(#[from] SubscriptionManagerError),
    #[error(transparent)]
    Rpm(#[from] RpmError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Registry(#[from] ContainerRegistryError),
    #[error("failed to execute cephadm preflight playbook")]
    Preflight(#[source] AnsiblePlaybookError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("failed to parse output of `{cmd}`")]
    Json {
        cmd: String,
        source: serde_json::Error,
    },
    /// The node is in a state the bring-up cannot continue from.
    #[error("{0}")]
    NodeConfig(String),
    #[error("unsupported ceph version {0}")]
    UnsupportedVersion(String),
    #[error("ceph tools repo is required for installing cephadm")]
    MissingToolsRepo,
    #[error("private registry setup failed: {0}")]
    PrivateRegistry(String),
}

/// What [`prereq`] should do beyond the per node basics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrereqArgs {
    /// `rh` or `ibm`
    pub build: String,
    /// `cdn`, `stage` or `skip`
    pub subscription: String,
    /// Registry server key of the config, or `skip`
    pub registry: String,
    pub setup_ssh_keys: bool,
    pub cephadm_ansible: bool,
    pub cephadm_preflight: bool,
    pub ceph_repo: Option<String>,
    pub private_registry: Option<PrivateRegistry>,
}

impl Default for PrereqArgs {
    fn default() -> Self {
        Self {
            build: "rh".to_owned(),
            subscription: "skip".to_owned(),
            registry: "skip".to_owned(),
            setup_ssh_keys: false,
            cephadm_ansible: false,
            cephadm_preflight: false,
            ceph_repo: None,
            private_registry: None,
        }
    }
}

/// Registers the node with the subscription `server`, retrying until the
/// configured timeout. Returns whether registration succeeded.
pub fn setup_subscription_manager(node: &dyn Node, config: &CephciConfig, server: &str) -> Result<bool, PrereqError> {
    let creds = config.subscription_credentials(server)?;
    let timeout = Duration::from_secs(creds.timeout);
    let interval = Duration::from_secs(creds.timeout / creds.retry.max(1));
    let args = RegisterArgs {
        username: creds.username.clone(),
        password: creds.password.clone(),
        serverurl: creds.serverurl.clone(),
        baseurl: creds.baseurl.clone(),
        force: true,
    };
    let sm = SubscriptionManager::new(node);
    let mut wait = WaitUntil::new(timeout, interval);
    for _ in wait.by_ref() {
        match sm.register(&args) {
            Ok(_) => {
                tracing::info!(host = node.hostname(), server, "subscribed");
                return Ok(true);
            }
            Err(SubscriptionManagerError::Register { .. }) => {
                tracing::warn!(host = node.hostname(), server, "failed to subscribe, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    tracing::error!(host = node.hostname(), server, attempts = wait.attempts(), "failed to subscribe");
    Ok(false)
}

/// The `Overall Status` reported by `subscription-manager status`.
pub fn subscription_manager_status(node: &dyn Node) -> Result<String, PrereqError> {
    Ok(SubscriptionManager::new(node).overall_status()?)
}

/// Adds the configured `local` repos of `distro` with `yum-config-manager`.
pub fn setup_local_repos(node: &dyn Node, config: &CephciConfig, distro: &str) -> Result<(), PrereqError> {
    let package = Package::new(node);
    for repo in config.repos("local", distro)? {
        package.add_repo(repo)?;
    }
    tracing::info!(host = node.hostname(), distro, "added local repos");
    Ok(())
}

/// Enables the `server` repos of `distro` through subscription-manager.
pub fn enable_rhel_repos(node: &dyn Node, config: &CephciConfig, server: &str, distro: &str) -> Result<(), PrereqError> {
    let repos = config.repos(server, distro)?;
    SubscriptionManager::new(node).repos().enable(repos)?;
    tracing::info!(host = node.hostname(), server, distro, "enabled repos");
    Ok(())
}

pub fn registry_login(node: &dyn Node, config: &CephciConfig, server: &str, build: &str) -> Result<(), PrereqError> {
    let creds = config.registry_credentials(server, build)?;
    Registry::new(node).login(&creds.registry, &creds.username, &creds.password)?;
    Ok(())
}

fn prepare_node(node: &dyn Node, config: &CephciConfig, args: &PrereqArgs) -> Result<(), PrereqError> {
    let distro = format!("rhel-{}", os_major_version(node)?);
    match args.subscription.as_str() {
        "skip" => setup_local_repos(node, config, &distro)?,
        server => {
            setup_subscription_manager(node, config, server)?;
            let status = subscription_manager_status(node)?;
            if status == "Unknown" {
                return Err(PrereqError::NodeConfig(format!(
                    "subscription manager on {} is in '{status}' status",
                    node.hostname()
                )));
            }
            enable_rhel_repos(node, config, server, &distro)?;
        }
    }
    let packages = config.packages().join(" ");
    if !packages.is_empty() {
        Package::new(node).install(&packages, false, &[])?;
    }
    if args.registry != "skip" {
        registry_login(node, config, &args.registry, &args.build)?;
    }
    Ok(())
}

/// Prepares every node of `cluster` as `args` asks.
pub fn prereq(cluster: &Cluster, config: &CephciConfig, args: &PrereqArgs) -> Result<(), PrereqError> {
    let nodes: Vec<Arc<dyn Node>> = cluster.get_nodes(None);
    let installer = cluster.installer()?;
    for node in &nodes {
        tracing::info!(host = node.hostname(), cluster = cluster.name(), "preparing node");
        prepare_node(node.as_ref(), config, args)?;
    }

    // preflight needs both passwordless ssh and cephadm-ansible
    if args.setup_ssh_keys || args.cephadm_preflight {
        setup_ssh_keys(installer.as_ref(), &nodes)?;
    }
    if (args.cephadm_ansible || args.cephadm_preflight) && !Rpm::new(installer.as_ref()).query(CEPHADM_ANSIBLE)? {
        Package::new(installer.as_ref()).install(CEPHADM_ANSIBLE, true, &[])?;
    }
    if args.cephadm_preflight {
        exec_cephadm_preflight(installer.as_ref(), &args.build, args.ceph_repo.as_deref())?;
    }
    if let Some(private) = &args.private_registry {
        let creds = config.registry_credentials(&args.registry, &args.build)?;
        setup_private_container_registry(installer.as_ref(), &nodes, creds, private)?;
        registry_login(installer.as_ref(), config, &args.registry, &args.build)?;
    }
    tracing::info!(cluster = cluster.name(), "prerequisites configured");
    Ok(())
}
