//! Package, repository and subscription management on RHEL nodes.
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Cli, CmdLine};
use crate::node::{shell_quote, CmdOutput, ExecError, ExecOptions, Node};

static OVERALL_STATUS: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"Overall Status:\s*(.*)"));
const INSTALL_TIMEOUT: Duration = Duration::from_secs(1800);

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("failed to install {pkgs}: {output}")]
    Install { pkgs: String, output: String },
    #[error("failed to add repo {repo}: {output}")]
    AddRepo { repo: String, output: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ReposError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("repos {repos:?} not {action}: {output}")]
    Unexpected {
        repos: Vec<String>,
        action: &'static str,
        output: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionManagerError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("failed to register {host}: {output}")]
    Register { host: String, output: String },
    #[error("unable to find subscription status on {host}")]
    Status { host: String },
    #[error("invalid status regex")]
    Regex(#[source] regex::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RpmError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("package {0} is not installed")]
    NotInstalled(String),
}

/// `yum` front end.
#[derive(Debug)]
pub struct Package<'a> {
    cli: Cli<'a>,
}

impl<'a> Package<'a> {
    pub fn new(node: &'a dyn Node) -> Self {
        Self {
            cli: Cli::new(node, "yum"),
        }
    }

    /// Installs the space separated `pkgs`. `env_vars` are exported for the
    /// transaction only (e.g. `ACCEPT_EULA=Y`).
    pub fn install(
        &self,
        pkgs: &str,
        nogpgcheck: bool,
        env_vars: &[(&str, &str)],
    ) -> Result<CmdOutput, PackageError> {
        let cmd = CmdLine::new(&self.cli.command("install -y"))
            .flag("--nogpgcheck", nogpgcheck)
            .arg(pkgs);
        let opts = env_vars.iter().fold(
            ExecOptions::root()
                .long_running(true)
                .timeout(INSTALL_TIMEOUT),
            |opts, (k, v)| opts.env(k, v),
        );
        let out = self.cli.execute(cmd.as_str(), &opts)?;
        let text = out.to_string();
        if !(text.contains("Complete!") || text.contains("Nothing to do")) {
            return Err(PackageError::Install {
                pkgs: pkgs.to_owned(),
                output: text,
            });
        }
        tracing::info!(host = self.cli.node().hostname(), pkgs, "packages installed");
        Ok(out)
    }

    pub fn remove(&self, pkgs: &str) -> Result<CmdOutput, PackageError> {
        Ok(self.cli.run(&format!("remove -y {pkgs}"))?)
    }

    /// `yum list <pkg>`, installed and available versions.
    pub fn list(&self, pkg: &str) -> Result<CmdOutput, PackageError> {
        Ok(self.cli.run(&format!("list {pkg}"))?)
    }

    pub fn info(&self, pkg: &str) -> Result<CmdOutput, PackageError> {
        Ok(self.cli.run(&format!("info {pkg}"))?)
    }

    pub fn clean(&self) -> Result<CmdOutput, PackageError> {
        Ok(self.cli.run("clean all")?)
    }

    pub fn add_repo(&self, repo: &str) -> Result<CmdOutput, PackageError> {
        let out = self.cli.execute(
            &format!("yum-config-manager --add-repo {repo}"),
            &ExecOptions::root(),
        )?;
        let text = out.to_string();
        if !text.contains("Adding repo from") {
            return Err(PackageError::AddRepo {
                repo: repo.to_owned(),
                output: text,
            });
        }
        Ok(out)
    }
}

/// `subscription-manager repos`
#[derive(Debug)]
pub struct Repos<'a> {
    cli: Cli<'a>,
}

impl<'a> Repos<'a> {
    pub fn new(node: &'a dyn Node) -> Self {
        Self {
            cli: Cli::new(node, "subscription-manager repos"),
        }
    }

    pub fn enable<S: AsRef<str>>(&self, repos: &[S]) -> Result<CmdOutput, ReposError> {
        self.toggle(repos, "--enable", "enabled")
    }

    pub fn disable<S: AsRef<str>>(&self, repos: &[S]) -> Result<CmdOutput, ReposError> {
        self.toggle(repos, "--disable", "disabled")
    }

    fn toggle<S: AsRef<str>>(
        &self,
        repos: &[S],
        flag: &str,
        action: &'static str,
    ) -> Result<CmdOutput, ReposError> {
        let cmd = repos
            .iter()
            .fold(CmdLine::new(self.cli.base_cmd()), |cmd, r| {
                cmd.opt_eq(flag, Some(r.as_ref()))
            });
        let out = self.cli.execute(cmd.as_str(), &ExecOptions::root())?;
        let missing = repos
            .iter()
            .any(|r| !out.stdout.contains(&format!("Repository '{}' is {action}", r.as_ref())));
        if missing {
            return Err(ReposError::Unexpected {
                repos: repos.iter().map(|r| r.as_ref().to_owned()).collect(),
                action,
                output: out.to_string(),
            });
        }
        Ok(out)
    }

    /// IDs of the repositories currently enabled.
    pub fn list_enabled(&self) -> Result<Vec<String>, ReposError> {
        let out = self.cli.run("--list-enabled")?;
        Ok(out
            .stdout
            .lines()
            .filter_map(|l| l.trim().strip_prefix("Repo ID:"))
            .map(|id| id.trim().to_owned())
            .collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterArgs {
    pub username: String,
    pub password: String,
    pub serverurl: Option<String>,
    pub baseurl: Option<String>,
    pub force: bool,
}

#[derive(Debug)]
pub struct SubscriptionManager<'a> {
    cli: Cli<'a>,
}

impl<'a> SubscriptionManager<'a> {
    pub fn new(node: &'a dyn Node) -> Self {
        Self {
            cli: Cli::new(node, "subscription-manager"),
        }
    }

    pub fn repos(&self) -> Repos<'a> {
        Repos::new(self.cli.node())
    }

    pub fn register(&self, args: &RegisterArgs) -> Result<CmdOutput, SubscriptionManagerError> {
        let cmd = CmdLine::new(&self.cli.command("register"))
            .opt_eq("--username", Some(shell_quote(&args.username)))
            .opt_eq("--password", Some(shell_quote(&args.password)))
            .opt_eq("--serverurl", args.serverurl.as_ref())
            .opt_eq("--baseurl", args.baseurl.as_ref())
            .flag("--force", args.force);
        let out = self
            .cli
            .execute(cmd.as_str(), &ExecOptions::root().check_ec(false).secret(&args.password))?;
        if !out.stdout.contains("The system has been registered") {
            return Err(SubscriptionManagerError::Register {
                host: self.cli.node().hostname().to_owned(),
                output: out.to_string(),
            });
        }
        Ok(out)
    }

    pub fn unregister(&self) -> Result<CmdOutput, SubscriptionManagerError> {
        Ok(self
            .cli
            .execute(&self.cli.command("unregister"), &ExecOptions::root().check_ec(false))?)
    }

    /// Raw `subscription-manager status`; the tool exits non-zero for an
    /// unknown status so the exit code is not checked.
    pub fn status(&self) -> Result<CmdOutput, SubscriptionManagerError> {
        Ok(self
            .cli
            .execute(&self.cli.command("status"), &ExecOptions::root().check_ec(false))?)
    }

    /// Value of the `Overall Status:` line.
    pub fn overall_status(&self) -> Result<String, SubscriptionManagerError> {
        let out = self.status()?;
        let re = OVERALL_STATUS
            .as_ref()
            .map_err(|e| SubscriptionManagerError::Regex(e.clone()))?;
        re.captures(&out.stdout)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_owned())
            .ok_or_else(|| SubscriptionManagerError::Status {
                host: self.cli.node().hostname().to_owned(),
            })
    }

    /// Attaches `pool`, or auto-attaches when `None`.
    pub fn attach(&self, pool: Option<&str>) -> Result<CmdOutput, SubscriptionManagerError> {
        let cmd = match pool {
            Some(p) => self.cli.command(&format!("attach --pool={p}")),
            None => self.cli.command("attach --auto"),
        };
        Ok(self.cli.execute(&cmd, &ExecOptions::root())?)
    }
}

#[derive(Debug)]
pub struct Rpm<'a> {
    cli: Cli<'a>,
}

impl<'a> Rpm<'a> {
    pub fn new(node: &'a dyn Node) -> Self {
        Self {
            cli: Cli::new(node, "rpm"),
        }
    }

    /// True when `pkg` is installed.
    pub fn query(&self, pkg: &str) -> Result<bool, RpmError> {
        let out = self
            .cli
            .execute(&self.cli.command(&format!("-qa {pkg}")), &ExecOptions::root().check_ec(false))?;
        Ok(!out.trimmed().is_empty())
    }

    /// Installed `version-release` of `pkg`.
    pub fn version(&self, pkg: &str) -> Result<String, RpmError> {
        let out = self.cli.execute(
            &self
                .cli
                .command(&format!("-q --queryformat '%{{VERSION}}-%{{RELEASE}}' {pkg}")),
            &ExecOptions::root().check_ec(false),
        )?;
        if !out.success() {
            return Err(RpmError::NotInstalled(pkg.to_owned()));
        }
        Ok(out.trimmed().to_owned())
    }

    pub fn import_key(&self, url: &str) -> Result<CmdOutput, RpmError> {
        Ok(self.cli.run(&format!("--import {url}"))?)
    }
}
