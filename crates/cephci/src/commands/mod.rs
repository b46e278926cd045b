use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use libcephqe::cluster::{load_clusters, Cluster};

pub mod exec;
pub mod nodes;
pub mod prereq;

/// Selects the cluster a command works on.
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Cluster file describing the nodes
    #[clap(long)]
    pub cluster: PathBuf,
    /// Cluster to use when the file describes several, the first one otherwise
    #[clap(long)]
    pub cluster_name: Option<String>,
}

pub fn load_cluster(path: &Path, name: Option<&str>) -> Result<Cluster> {
    let mut clusters = load_clusters(path).with_context(|| format!("failed to load {path:?}"))?;
    match name {
        Some(name) => clusters
            .remove(name)
            .with_context(|| format!("cluster {name} not found in {path:?}")),
        None => clusters
            .into_values()
            .next()
            .with_context(|| format!("no cluster in {path:?}")),
    }
}

impl ClusterArgs {
    pub fn load(&self) -> Result<Cluster> {
        load_cluster(&self.cluster, self.cluster_name.as_deref())
    }
}
