use std::process::Command;

use super::{process, render_command, CmdOutput, ExecError, ExecOptions, Node, NodeInfo};

/// Runs commands on the machine the tooling itself runs on.
#[derive(Debug, Clone)]
pub struct LocalNode {
    info: NodeInfo,
}

impl LocalNode {
    pub fn new(info: NodeInfo) -> Self {
        Self { info }
    }
}

impl Default for LocalNode {
    fn default() -> Self {
        Self::new(NodeInfo::new("localhost", "127.0.0.1"))
    }
}

impl Node for LocalNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn exec(&self, cmd: &str, opts: &ExecOptions) -> Result<CmdOutput, ExecError> {
        let line = render_command(cmd, opts);
        let shown = opts.redact(&line);
        tracing::debug!(host = %self.info.hostname, cmd = %shown, "executing");
        let mut command = Command::new("sh");
        command.arg("-c").arg(&line);
        let output = process::run(&self.info.hostname, &shown, command, opts)?;
        super::check_output(&self.info.hostname, &line, opts, output)
    }
}
