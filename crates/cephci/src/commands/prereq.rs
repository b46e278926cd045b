//! Prepares the nodes of a cluster for a cephadm deployment.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libcephqe::config::{self, CephciConfig};
use libcephqe::prereq::{self as setup, PrereqArgs, PrivateRegistry};

use super::ClusterArgs;

/// Configure repos, registries and cephadm prerequisites on every node
#[derive(Parser, Debug)]
pub struct Prereq {
    #[clap(flatten)]
    pub cluster: ClusterArgs,
    /// cephci configuration, `$CEPHCI_CONFIG` or `~/.cephci.yaml` when unset
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Build type the registry credentials are picked for
    #[clap(long, default_value = "rh", value_parser = ["rh", "ibm"])]
    pub build: String,
    /// Subscription server, `skip` adds the configured local repos instead
    #[clap(long, default_value = "skip", value_parser = ["cdn", "stage", "skip"])]
    pub subscription: String,
    /// Registry server to log in to, as keyed in the config
    #[clap(long, default_value = "skip")]
    pub registry: String,
    /// Distribute the installer's ssh key to every node
    #[clap(long)]
    pub setup_ssh_keys: bool,
    /// Install cephadm-ansible on the installer
    #[clap(long)]
    pub cephadm_ansible: bool,
    /// Run the cephadm-ansible preflight playbook
    #[clap(long)]
    pub cephadm_preflight: bool,
    /// Ceph repo handed to the preflight playbook
    #[clap(long)]
    pub ceph_repo: Option<String>,
    /// Stand up a private registry on the installer running this image
    #[clap(long)]
    pub private_registry_image: Option<String>,
    #[clap(long, default_value = "myregistryusername", requires = "private_registry_image")]
    pub private_registry_user: String,
    #[clap(long, default_value = "myregistrypassword1", requires = "private_registry_image")]
    pub private_registry_password: String,
    /// Image to mirror into the private registry, repeatable
    #[clap(long = "mirror-image", requires = "private_registry_image")]
    pub mirror_images: Vec<String>,
}

impl Prereq {
    fn to_args(&self) -> PrereqArgs {
        let private_registry = self.private_registry_image.as_ref().map(|image| PrivateRegistry {
            username: self.private_registry_user.clone(),
            password: self.private_registry_password.clone(),
            registry_image: image.clone(),
            images: self.mirror_images.clone(),
        });
        PrereqArgs {
            build: self.build.clone(),
            subscription: self.subscription.clone(),
            registry: self.registry.clone(),
            setup_ssh_keys: self.setup_ssh_keys,
            cephadm_ansible: self.cephadm_ansible,
            cephadm_preflight: self.cephadm_preflight,
            ceph_repo: self.ceph_repo.clone(),
            private_registry,
        }
    }
}

pub fn prereq(args: Prereq) -> Result<()> {
    let cluster = args.cluster.load()?;
    let config_path = args.config.clone().unwrap_or_else(config::default_path);
    let config = CephciConfig::load(&config_path)
        .with_context(|| format!("failed to load cephci config {config_path:?}"))?;

    let prereq_args = args.to_args();
    tracing::info!(
        cluster = cluster.name(),
        build = %prereq_args.build,
        subscription = %prereq_args.subscription,
        registry = %prereq_args.registry,
        private_registry = prereq_args.private_registry.is_some(),
        "configuring prerequisites"
    );
    setup::prereq(&cluster, &config, &prereq_args)
        .with_context(|| format!("failed to configure prerequisites on {}", cluster.name()))?;
    println!("prerequisites configured on {}", cluster.name());
    Ok(())
}
