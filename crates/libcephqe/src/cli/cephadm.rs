//! `cephadm shell` for running ceph commands on nodes without a client
//! keyring.
use super::{Cli, CmdLine};
use crate::node::{CmdOutput, ExecError, ExecOptions, Node};

#[derive(Debug)]
pub struct CephAdm<'a> {
    cli: Cli<'a>,
}

impl<'a> CephAdm<'a> {
    pub fn new(node: &'a dyn Node) -> Self {
        Self::with_prefix(node, "cephadm")
    }

    /// `prefix` replaces the plain `cephadm` binary, e.g. `cephadm --image <img>`.
    pub fn with_prefix(node: &'a dyn Node, prefix: &'a str) -> Self {
        Self {
            cli: Cli::new(node, prefix),
        }
    }

    /// `cephadm shell [-v host:container]... -- <cmd>`
    pub fn shell(&self, cmd: &str, mounts: &[&str]) -> Result<CmdOutput, ExecError> {
        self.shell_with(cmd, mounts, &ExecOptions::root())
    }

    pub fn shell_with(
        &self,
        cmd: &str,
        mounts: &[&str],
        opts: &ExecOptions,
    ) -> Result<CmdOutput, ExecError> {
        let line = mounts
            .iter()
            .fold(CmdLine::new(&self.cli.command("shell")), |line, m| {
                line.opt("-v", Some(m))
            })
            .arg("--")
            .arg(cmd);
        self.cli.execute(line.as_str(), opts)
    }

    /// `ceph <args>` inside the shell.
    pub fn ceph(&self, args: &str) -> Result<CmdOutput, ExecError> {
        self.shell(&format!("ceph {args}"), &[])
    }
}
