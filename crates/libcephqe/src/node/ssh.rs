use std::process::Command;

use super::{process, render_command, CmdOutput, ExecError, ExecOptions, Node, NodeInfo};

const SSH_OPTIONS: &[&str] = &[
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "BatchMode=yes",
    "-o",
    "LogLevel=ERROR",
];

/// Runs commands on a remote node through the system `ssh` client.
#[derive(Debug, Clone)]
pub struct SshNode {
    info: NodeInfo,
}

impl SshNode {
    pub fn new(info: NodeInfo) -> Self {
        Self { info }
    }

    /// `user@address` the ssh client connects to.
    fn destination(&self) -> String {
        let address = if self.info.ip_address.is_empty() {
            &self.info.hostname
        } else {
            &self.info.ip_address
        };
        if self.info.username.is_empty() {
            address.to_owned()
        } else {
            format!("{}@{}", self.info.username, address)
        }
    }

    fn command(&self, line: &str) -> Command {
        let mut command = Command::new("ssh");
        command.args(SSH_OPTIONS);
        if let Some(key) = &self.info.ssh_key {
            command.arg("-i").arg(key);
        }
        command.arg(self.destination()).arg(line);
        command
    }
}

impl Node for SshNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn exec(&self, cmd: &str, opts: &ExecOptions) -> Result<CmdOutput, ExecError> {
        let line = render_command(cmd, opts);
        let shown = opts.redact(&line);
        tracing::debug!(host = %self.info.hostname, cmd = %shown, "executing over ssh");
        let output = process::run(&self.info.hostname, &shown, self.command(&line), opts)?;
        super::check_output(&self.info.hostname, &line, opts, output)
    }
}
