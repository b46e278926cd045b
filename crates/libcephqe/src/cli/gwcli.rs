//! iSCSI gateway configuration through `gwcli`.
//!
//! gwcli addresses objects by path (`/iscsi-targets/<iqn>/hosts/<client>`).
//! Each level of that tree has its own builder which renders the path and
//! hands out the builders of the levels below it.
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Cli;
use crate::node::{shell_quote, CmdOutput, ExecError, ExecOptions, Node};
use crate::utils::generate_unique_id;

pub const DEFAULT_IQN_DOMAIN: &str = "com.rh-ibm.iscsi-gw";

#[derive(Debug, thiserror::Error)]
pub enum GwcliError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("failed to parse gwcli export")]
    Parse(#[from] serde_json::Error),
    /// The exported configuration does not hold what was configured.
    #[error("[{iqn}]: {reason}")]
    Config { iqn: String, reason: String },
}

/// `key=value` pairs in gwcli's argument syntax; unset values are dropped.
fn kv_args(args: &[(&str, Option<String>)]) -> String {
    args.iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| format!(" {k}={}", shell_quote(v))))
        .collect()
}

#[derive(Debug, Clone)]
struct GwcliPath<'a> {
    cli: Cli<'a>,
    path: String,
}

impl<'a> GwcliPath<'a> {
    fn child(&self, name: &str) -> Self {
        Self {
            cli: self.cli,
            path: format!("{}/{name}", self.path.trim_end_matches('/')),
        }
    }

    fn exec(&self, action: &str, args: &str) -> Result<CmdOutput, GwcliError> {
        self.exec_with(action, args, &ExecOptions::root())
    }

    fn exec_with(&self, action: &str, args: &str, opts: &ExecOptions) -> Result<CmdOutput, GwcliError> {
        let cmd = self.cli.command(&format!("{} {action}{args}", self.path));
        Ok(self.cli.execute(&cmd, opts)?)
    }
}

/// Root of the gwcli tree.
#[derive(Debug, Clone)]
pub struct Gwcli<'a> {
    root: GwcliPath<'a>,
}

impl<'a> Gwcli<'a> {
    pub fn new(node: &'a dyn Node) -> Self {
        Self {
            root: GwcliPath {
                cli: Cli::new(node, "gwcli"),
                path: "/".to_owned(),
            },
        }
    }

    pub fn ls(&self) -> Result<CmdOutput, GwcliError> {
        self.root.exec("ls", "")
    }

    /// Current configuration as exported by `gwcli export copy`.
    pub fn export(&self) -> Result<Value, GwcliError> {
        let out = self.root.exec("export", " copy")?;
        Ok(serde_json::from_str(&out.stdout)?)
    }

    pub fn iscsi_targets(&self) -> IscsiTargets<'a> {
        IscsiTargets {
            path: self.root.child("iscsi-targets"),
        }
    }

    pub fn disks(&self) -> Disks<'a> {
        Disks {
            path: self.root.child("disks"),
        }
    }
}

/// `/iscsi-targets`
#[derive(Debug, Clone)]
pub struct IscsiTargets<'a> {
    path: GwcliPath<'a>,
}

impl<'a> IscsiTargets<'a> {
    pub fn create(&self, iqn: &str) -> Result<CmdOutput, GwcliError> {
        self.path.exec("create", &format!(" {iqn}"))
    }

    pub fn delete(&self, iqn: &str) -> Result<CmdOutput, GwcliError> {
        self.path.exec("delete", &kv_args(&[("target_iqn", Some(iqn.to_owned()))]))
    }

    pub fn target(&self, iqn: &str) -> Target<'a> {
        Target {
            path: self.path.child(iqn),
        }
    }
}

/// `/iscsi-targets/<iqn>`
#[derive(Debug, Clone)]
pub struct Target<'a> {
    path: GwcliPath<'a>,
}

impl<'a> Target<'a> {
    pub fn gateways(&self) -> Gateways<'a> {
        Gateways {
            path: self.path.child("gateways"),
        }
    }

    pub fn hosts(&self) -> Hosts<'a> {
        Hosts {
            path: self.path.child("hosts"),
        }
    }

    pub fn disks(&self) -> TargetDisks<'a> {
        TargetDisks {
            path: self.path.child("disks"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gateways<'a> {
    path: GwcliPath<'a>,
}

impl Gateways<'_> {
    pub fn create(&self, name: &str, ip: &str, skipchecks: bool) -> Result<CmdOutput, GwcliError> {
        let args = kv_args(&[
            ("gateway_name", Some(name.to_owned())),
            ("ip_addresses", Some(ip.to_owned())),
            ("skipchecks", skipchecks.then(|| "true".to_owned())),
        ]);
        self.path.exec("create", &args)
    }

    pub fn delete(&self, name: &str, confirm: bool) -> Result<CmdOutput, GwcliError> {
        let args = kv_args(&[
            ("gateway_name", Some(name.to_owned())),
            ("confirm", confirm.then(|| "true".to_owned())),
        ]);
        self.path.exec("delete", &args)
    }
}

#[derive(Debug, Clone)]
pub struct Hosts<'a> {
    path: GwcliPath<'a>,
}

impl<'a> Hosts<'a> {
    pub fn create(&self, client_iqn: &str) -> Result<CmdOutput, GwcliError> {
        self.path
            .exec("create", &kv_args(&[("client_iqn", Some(client_iqn.to_owned()))]))
    }

    pub fn delete(&self, client_iqn: &str) -> Result<CmdOutput, GwcliError> {
        self.path
            .exec("delete", &kv_args(&[("client_iqn", Some(client_iqn.to_owned()))]))
    }

    pub fn client(&self, client_iqn: &str) -> Client<'a> {
        Client {
            path: self.path.child(client_iqn),
        }
    }
}

/// `/iscsi-targets/<iqn>/hosts/<client_iqn>`
#[derive(Debug, Clone)]
pub struct Client<'a> {
    path: GwcliPath<'a>,
}

impl Client<'_> {
    pub fn auth(&self, username: &str, password: &str) -> Result<CmdOutput, GwcliError> {
        let args = kv_args(&[
            ("username", Some(username.to_owned())),
            ("password", Some(password.to_owned())),
        ]);
        self.path.exec_with("auth", &args, &ExecOptions::root().secret(password))
    }

    /// Maps `pool/image` to the client, optionally at `lun`.
    pub fn disk_add(&self, disk: &str, lun: Option<u32>) -> Result<CmdOutput, GwcliError> {
        let args = format!(" add {disk}{}", kv_args(&[("lun_id", lun.map(|l| l.to_string()))]));
        self.path.exec("disk", &args)
    }

    pub fn disk_remove(&self, disk: &str) -> Result<CmdOutput, GwcliError> {
        self.path.exec("disk", &format!(" remove {disk}"))
    }
}

/// `/iscsi-targets/<iqn>/disks`
#[derive(Debug, Clone)]
pub struct TargetDisks<'a> {
    path: GwcliPath<'a>,
}

impl TargetDisks<'_> {
    pub fn add(&self, disk: &str) -> Result<CmdOutput, GwcliError> {
        self.path.exec("add", &format!(" {disk}"))
    }

    pub fn delete(&self, disk: &str) -> Result<CmdOutput, GwcliError> {
        self.path.exec("delete", &format!(" {disk}"))
    }
}

/// `/disks`, the RBD images known to the gateways.
#[derive(Debug, Clone)]
pub struct Disks<'a> {
    path: GwcliPath<'a>,
}

impl Disks<'_> {
    pub fn create(&self, pool: &str, image: &str, size: &str) -> Result<CmdOutput, GwcliError> {
        let args = kv_args(&[
            ("pool", Some(pool.to_owned())),
            ("image", Some(image.to_owned())),
            ("size", Some(size.to_owned())),
        ]);
        self.path.exec("create", &args)
    }

    pub fn delete(&self, disk: &str) -> Result<CmdOutput, GwcliError> {
        self.path.exec("delete", &kv_args(&[("image_id", Some(disk.to_owned()))]))
    }

    pub fn resize(&self, disk: &str, size: &str) -> Result<CmdOutput, GwcliError> {
        let args = kv_args(&[
            ("image_id", Some(disk.to_owned())),
            ("size", Some(size.to_owned())),
        ]);
        self.path.exec("resize", &args)
    }
}

/// `iqn.<yyyy-mm>.<unix time>.<domain>:<target>`
pub fn generate_iqn(domain: Option<&str>, target: Option<&str>) -> String {
    let target = target.map_or_else(|| format!("target-{}", generate_unique_id(3)), str::to_owned);
    let domain = domain.unwrap_or(DEFAULT_IQN_DOMAIN);
    let date = Local::now().format("%Y-%m");
    format!("iqn.{date}.{}.{domain}:{target}", Utc::now().timestamp()).to_lowercase()
}

/// A client of a target and the disks mapped to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub client_iqn: String,
    #[serde(default)]
    pub disks: Vec<String>,
}

/// What a target is expected to look like after configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub iqn: String,
    /// gateway hostnames
    #[serde(default)]
    pub gateways: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

fn lun_names(luns: &Value) -> Vec<String> {
    let mut names: Vec<String> = match luns {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    };
    names.sort();
    names
}

/// Checks `export` (from [`Gwcli::export`]) against `config`.
pub fn validate_gwcli_configuration(export: &Value, config: &TargetConfig) -> Result<(), GwcliError> {
    let iqn = &config.iqn;
    let fail = |reason: String| GwcliError::Config {
        iqn: iqn.clone(),
        reason,
    };

    let target = export["targets"]
        .get(iqn)
        .ok_or_else(|| fail("Target Not found".to_owned()))?;
    tracing::info!(%iqn, "target exists");

    for gw in &config.gateways {
        if target["portals"].get(gw).is_none() {
            return Err(fail(format!("{gw} Host not found in target")));
        }
        tracing::info!(%iqn, gateway = %gw, "gateway exists");
    }

    for host in &config.hosts {
        let client = target["clients"]
            .get(&host.client_iqn)
            .ok_or_else(|| fail(format!("{} Host not found in target", host.client_iqn)))?;
        tracing::info!(%iqn, client = %host.client_iqn, "host exists");

        if host.disks.is_empty() {
            continue;
        }
        let mut expected = host.disks.clone();
        expected.sort();
        let luns = lun_names(&client["luns"]);
        if expected != luns {
            return Err(fail(format!("Disks didn't match {luns:?} - {:?}", host.disks)));
        }
        tracing::info!(%iqn, ?luns, "luns exist");
    }
    Ok(())
}
