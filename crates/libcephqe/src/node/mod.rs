//! Command execution on cluster nodes.
//!
//! Everything above this module talks to a [`Node`]. Production code uses
//! [`SshNode`] (or [`LocalNode`] when the tooling runs on the node itself),
//! unit tests use the recording `TestNode` from [`crate::test_utils`].
mod local;
mod process;
mod ssh;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use local::LocalNode;
pub use ssh::SshNode;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn `{cmd}` on {host}")]
    Spawn {
        host: String,
        cmd: String,
        source: std::io::Error,
    },
    #[error("failed to collect output of `{cmd}` on {host}")]
    Io {
        host: String,
        cmd: String,
        source: std::io::Error,
    },
    #[error("`{cmd}` on {host} exited with {exit_code}: {stderr}")]
    Failed {
        host: String,
        cmd: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("`{cmd}` on {host} did not finish within {timeout:?}")]
    Timeout {
        host: String,
        cmd: String,
        timeout: Duration,
    },
}

/// Login user of a node that does not name one.
pub const DEFAULT_USERNAME: &str = "cephuser";

/// Static description of a cluster node, as found in the cluster file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    pub hostname: String,
    pub shortname: String,
    pub ip_address: String,
    pub username: String,
    pub password: String,
    pub root_password: String,
    pub roles: Vec<String>,
    pub ssh_key: Option<PathBuf>,
}

impl Default for NodeInfo {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            shortname: String::new(),
            ip_address: String::new(),
            username: DEFAULT_USERNAME.to_owned(),
            password: String::new(),
            root_password: String::new(),
            roles: Vec::new(),
            ssh_key: None,
        }
    }
}

impl NodeInfo {
    pub fn new(hostname: &str, ip_address: &str) -> Self {
        Self {
            hostname: hostname.to_owned(),
            shortname: hostname.split('.').next().unwrap_or(hostname).to_owned(),
            ip_address: ip_address.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }
}

/// How a single command should be run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    pub sudo: bool,
    /// A non-zero exit status is turned into [`ExecError::Failed`]
    pub check_ec: bool,
    /// Output is streamed into the log while the command runs
    pub long_running: bool,
    pub timeout: Option<Duration>,
    pub env: Vec<(String, String)>,
    /// Values masked wherever the command line is logged or reported
    pub secrets: Vec<String>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            sudo: false,
            check_ec: true,
            long_running: false,
            timeout: None,
            env: Vec::new(),
            secrets: Vec::new(),
        }
    }
}

impl ExecOptions {
    /// The most common case: run as root and fail on a non-zero exit status.
    pub fn root() -> Self {
        Self::default().sudo(true)
    }

    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn check_ec(mut self, check_ec: bool) -> Self {
        self.check_ec = check_ec;
        self
    }

    pub fn long_running(mut self, long_running: bool) -> Self {
        self.long_running = long_running;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_owned(), value.to_owned()));
        self
    }

    pub fn secret(mut self, value: &str) -> Self {
        if !value.is_empty() {
            self.secrets.push(value.to_owned());
        }
        self
    }

    /// `line` with every secret, bare or shell quoted, replaced by `****`.
    pub fn redact(&self, line: &str) -> String {
        let mut shown = line.to_owned();
        for secret in &self.secrets {
            shown = shown.replace(&shell_quote(secret), REDACTED).replace(secret.as_str(), REDACTED);
        }
        shown
    }
}

const REDACTED: &str = "****";

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CmdOutput {
    pub fn new(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        Self {
            stdout: stdout.to_owned(),
            stderr: stderr.to_owned(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout with surrounding whitespace removed
    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

impl fmt::Display for CmdOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stdout)?;
        if !self.stderr.is_empty() {
            write!(f, "{}", self.stderr)?;
        }
        Ok(())
    }
}

/// A host that commands can be executed on.
pub trait Node: Send + Sync {
    fn info(&self) -> &NodeInfo;

    /// Runs `cmd` through a shell on the node.
    fn exec(&self, cmd: &str, opts: &ExecOptions) -> Result<CmdOutput, ExecError>;

    fn hostname(&self) -> &str {
        &self.info().hostname
    }

    fn shortname(&self) -> &str {
        &self.info().shortname
    }

    fn ip_address(&self) -> &str {
        &self.info().ip_address
    }

    fn roles(&self) -> &[String] {
        &self.info().roles
    }

    fn has_role(&self, role: &str) -> bool {
        self.roles().iter().any(|r| r == role)
    }

    /// Shorthand for `exec(cmd, &ExecOptions::root())`.
    fn exec_command(&self, cmd: &str) -> Result<CmdOutput, ExecError> {
        self.exec(cmd, &ExecOptions::root())
    }
}

/// Turns a command and its options into the line handed to the shell.
pub fn render_command(cmd: &str, opts: &ExecOptions) -> String {
    let mut line = String::new();
    if opts.sudo {
        line.push_str("sudo ");
    }
    for (key, value) in &opts.env {
        line.push_str(&format!("{key}={} ", shell_quote(value)));
    }
    line.push_str(cmd);
    line
}

/// `sh -c '<cmd>'`, so that redirects and `~` in `cmd` are handled by a
/// shell that runs under sudo too.
pub fn root_shell(cmd: &str) -> String {
    format!("sh -c {}", shell_quote(cmd))
}

/// Single quotes `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c))
    {
        return s.to_owned();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Converts a finished command into a result, honouring `check_ec`.
pub(crate) fn check_output(
    host: &str,
    cmd: &str,
    opts: &ExecOptions,
    output: CmdOutput,
) -> Result<CmdOutput, ExecError> {
    let cmd = opts.redact(cmd);
    tracing::debug!(host, %cmd, exit_code = output.exit_code, "command finished");
    if opts.check_ec && !output.success() {
        tracing::error!(host, %cmd, stderr = %output.stderr.trim(), "command failed");
        return Err(ExecError::Failed {
            host: host.to_owned(),
            cmd,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    Ok(output)
}
