//! Cluster topology shared between CI stages.
//!
//! The cluster file is YAML, keyed by cluster name:
//!
//! ```yaml
//! ceph:
//!   nodes:
//!     - hostname: ceph-node1.example.com
//!       ip_address: 10.0.0.11
//!       password: passwd
//!       root_password: passwd
//!       roles: [installer, mon, mgr, osd]
//!     - hostname: ceph-client1.example.com
//!       ip_address: 10.0.0.21
//!       roles: [client]
//! ```
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::node::{LocalNode, Node, NodeInfo, SshNode};

pub const INSTALLER_ROLE: &str = "installer";
pub const CLIENT_ROLE: &str = "client";
pub const MON_ROLE: &str = "mon";
pub const ISCSI_ROLE: &str = "iscsi";

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("failed to read cluster file {path:?}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse cluster file {path:?}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("cluster {0} has no nodes")]
    Empty(String),
    #[error("cluster {cluster} has no node with role {role}")]
    MissingRole { cluster: String, role: String },
    #[error("cluster {0} not found in cluster file")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Ssh,
    Local,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    #[serde(default)]
    pub transport: Transport,
    pub nodes: Vec<NodeInfo>,
}

pub type ClusterFile = BTreeMap<String, ClusterSpec>;

pub fn parse_cluster_file(content: &str, path: &Path) -> Result<ClusterFile, ClusterError> {
    serde_yaml::from_str(content).map_err(|source| ClusterError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Loads every cluster described in `path`.
pub fn load_clusters(path: &Path) -> Result<BTreeMap<String, Cluster>, ClusterError> {
    let content = fs::read_to_string(path).map_err(|source| ClusterError::Read {
        path: path.to_owned(),
        source,
    })?;
    parse_cluster_file(&content, path)?
        .into_iter()
        .map(|(name, spec)| Cluster::from_spec(&name, spec).map(|c| (name, c)))
        .collect()
}

#[derive(Clone)]
pub struct Cluster {
    name: String,
    nodes: Vec<Arc<dyn Node>>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.name)
            .field(
                "nodes",
                &self.nodes.iter().map(|n| n.hostname()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Cluster {
    pub fn new(name: &str, nodes: Vec<Arc<dyn Node>>) -> Result<Self, ClusterError> {
        if nodes.is_empty() {
            return Err(ClusterError::Empty(name.to_owned()));
        }
        Ok(Self {
            name: name.to_owned(),
            nodes,
        })
    }

    pub fn from_spec(name: &str, spec: ClusterSpec) -> Result<Self, ClusterError> {
        let nodes = spec
            .nodes
            .into_iter()
            .map(|mut info| -> Arc<dyn Node> {
                if info.shortname.is_empty() {
                    info.shortname = info.hostname.split('.').next().unwrap_or_default().to_owned();
                }
                match spec.transport {
                    Transport::Ssh => Arc::new(SshNode::new(info)),
                    Transport::Local => Arc::new(LocalNode::new(info)),
                }
            })
            .collect();
        Self::new(name, nodes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes carrying `role`, or every node when `role` is `None`.
    pub fn get_nodes(&self, role: Option<&str>) -> Vec<Arc<dyn Node>> {
        self.nodes
            .iter()
            .filter(|n| role.map_or(true, |r| n.has_role(r)))
            .cloned()
            .collect()
    }

    pub fn get_node_by_hostname(&self, hostname: &str) -> Option<Arc<dyn Node>> {
        self.nodes
            .iter()
            .find(|n| n.hostname() == hostname || n.shortname() == hostname)
            .cloned()
    }

    pub fn require_role(&self, role: &str) -> Result<Vec<Arc<dyn Node>>, ClusterError> {
        let nodes = self.get_nodes(Some(role));
        if nodes.is_empty() {
            return Err(ClusterError::MissingRole {
                cluster: self.name.clone(),
                role: role.to_owned(),
            });
        }
        Ok(nodes)
    }

    pub fn installer(&self) -> Result<Arc<dyn Node>, ClusterError> {
        Ok(self.require_role(INSTALLER_ROLE)?.remove(0))
    }

    pub fn clients(&self) -> Vec<Arc<dyn Node>> {
        self.get_nodes(Some(CLIENT_ROLE))
    }

    /// Addresses of the monitor nodes, in cluster file order.
    pub fn mon_ips(&self) -> Vec<String> {
        self.get_nodes(Some(MON_ROLE))
            .iter()
            .map(|n| n.ip_address().to_owned())
            .collect()
    }
}
