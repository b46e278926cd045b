//! A scripted [`Node`] for unit tests.
//!
//! Commands are matched by substring against the registered rules in
//! registration order. A rule holding several responses hands them out one
//! by one and keeps repeating the last one.
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::node::{check_output, render_command, CmdOutput, ExecError, ExecOptions, Node, NodeInfo};

struct Rule {
    pattern: String,
    responses: VecDeque<CmdOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub cmd: String,
    pub opts: ExecOptions,
}

impl ExecCall {
    /// The line the node would hand to its shell.
    pub fn rendered(&self) -> String {
        render_command(&self.cmd, &self.opts)
    }
}

pub struct TestNode {
    info: NodeInfo,
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<ExecCall>>,
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new("test-node")
    }
}

impl TestNode {
    pub fn new(hostname: &str) -> Self {
        Self::with_info(NodeInfo::new(hostname, "10.0.0.10"))
    }

    pub fn with_info(info: NodeInfo) -> Self {
        Self {
            info,
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_roles(self, roles: &[&str]) -> Self {
        let info = self.info.clone().with_roles(roles);
        Self { info, ..self }
    }

    /// Queues a successful response for commands containing `pattern`.
    pub fn respond(&self, pattern: &str, stdout: &str) -> &Self {
        self.respond_with(pattern, CmdOutput::new(stdout, "", 0))
    }

    /// Queues a failing response for commands containing `pattern`.
    pub fn fail(&self, pattern: &str, exit_code: i32, stderr: &str) -> &Self {
        self.respond_with(pattern, CmdOutput::new("", stderr, exit_code))
    }

    pub fn respond_with(&self, pattern: &str, output: CmdOutput) -> &Self {
        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|r| r.pattern == pattern) {
            Some(rule) => rule.responses.push_back(output),
            None => rules.push(Rule {
                pattern: pattern.to_owned(),
                responses: VecDeque::from([output]),
            }),
        }
        self
    }

    pub fn get_calls(&self) -> Vec<ExecCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.get_calls().into_iter().map(|c| c.cmd).collect()
    }

    /// True if any executed command contains `needle`.
    pub fn ran(&self, needle: &str) -> bool {
        self.get_commands().iter().any(|c| c.contains(needle))
    }

    pub fn count(&self, needle: &str) -> usize {
        self.get_commands()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }

    fn next_response(&self, cmd: &str) -> CmdOutput {
        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|r| cmd.contains(&r.pattern)) {
            Some(rule) if rule.responses.len() > 1 => rule.responses.pop_front().unwrap(),
            Some(rule) => rule.responses.front().cloned().unwrap_or_default(),
            None => CmdOutput::default(),
        }
    }
}

impl Node for TestNode {
    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn exec(&self, cmd: &str, opts: &ExecOptions) -> Result<CmdOutput, ExecError> {
        self.calls.lock().unwrap().push(ExecCall {
            cmd: cmd.to_owned(),
            opts: opts.clone(),
        });
        let output = self.next_response(cmd);
        check_output(&self.info.hostname, cmd, opts, output)
    }
}
