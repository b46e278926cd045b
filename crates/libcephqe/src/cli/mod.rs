//! Thin wrappers over the command line tools found on cluster nodes.
//!
//! Every wrapper owns a [`Cli`] which pairs the node with the base command of
//! the tool. Wrappers build the full command line, run it and turn output that
//! does not look like success into the wrapper's own error type.
pub mod ansible;
pub mod args;
pub mod cephadm;
pub mod containers;
pub mod gwcli;
pub mod packages;
pub mod rbd;
pub mod smb;

use crate::node::{CmdOutput, ExecError, ExecOptions, Node};

pub use args::{build_cmd_args, format_command_options, ArgValue, CmdLine};

#[derive(Clone, Copy)]
pub struct Cli<'a> {
    node: &'a dyn Node,
    base_cmd: &'a str,
}

impl<'a> Cli<'a> {
    pub fn new(node: &'a dyn Node, base_cmd: &'a str) -> Self {
        Self { node, base_cmd }
    }

    pub fn node(&self) -> &'a dyn Node {
        self.node
    }

    pub fn base_cmd(&self) -> &str {
        self.base_cmd
    }

    /// `<base_cmd> <sub>`
    pub fn command(&self, sub: &str) -> String {
        if self.base_cmd.is_empty() {
            return sub.to_owned();
        }
        format!("{} {}", self.base_cmd, sub)
    }

    pub fn execute(&self, cmd: &str, opts: &ExecOptions) -> Result<CmdOutput, ExecError> {
        tracing::debug!(host = self.node.hostname(), cmd = %opts.redact(cmd), "executing");
        self.node.exec(cmd, opts)
    }

    /// Runs `<base_cmd> <sub>` as root.
    pub fn run(&self, sub: &str) -> Result<CmdOutput, ExecError> {
        self.execute(&self.command(sub), &ExecOptions::root())
    }
}

impl std::fmt::Debug for Cli<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cli")
            .field("host", &self.node.hostname())
            .field("base_cmd", &self.base_cmd)
            .finish()
    }
}
