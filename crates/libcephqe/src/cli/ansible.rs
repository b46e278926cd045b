//! `ansible-playbook` runs from the cephadm-ansible checkout.
use std::collections::BTreeMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Cli, CmdLine};
use crate::node::{shell_quote, CmdOutput, ExecError, ExecOptions, Node};

pub const CEPHADM_ANSIBLE_DIR: &str = "/usr/share/cephadm-ansible";
const DEFAULT_INVENTORY: &str = "hosts";
const PLAYBOOK_TIMEOUT: Duration = Duration::from_secs(3600);

static PLAY_RECAP_FAILURE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(failed|unreachable)=[1-9]"));

#[derive(Debug, thiserror::Error)]
pub enum AnsiblePlaybookError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("failed to serialize extra vars")]
    ExtraVars(#[from] serde_json::Error),
    #[error("playbook {playbook} reported failed tasks")]
    Failed { playbook: String, output: String },
    #[error("invalid play recap regex")]
    Regex(#[source] regex::Error),
}

#[derive(Debug)]
pub struct Ansible<'a> {
    cli: Cli<'a>,
    dir: &'a str,
}

impl<'a> Ansible<'a> {
    pub fn new(node: &'a dyn Node) -> Self {
        Self::with_dir(node, CEPHADM_ANSIBLE_DIR)
    }

    pub fn with_dir(node: &'a dyn Node, dir: &'a str) -> Self {
        Self {
            cli: Cli::new(node, "ansible-playbook"),
            dir,
        }
    }

    pub fn run_playbook(
        &self,
        playbook: &str,
        inventory: Option<&str>,
        extra_vars: &BTreeMap<String, String>,
        extra_args: Option<&str>,
    ) -> Result<CmdOutput, AnsiblePlaybookError> {
        let mut cmd = CmdLine::new(&format!("cd {};", self.dir))
            .arg(self.cli.base_cmd())
            .arg("-vvv")
            .opt("-i", Some(inventory.unwrap_or(DEFAULT_INVENTORY)))
            .arg(playbook);
        if !extra_vars.is_empty() {
            let vars = serde_json::to_string(extra_vars)?;
            cmd = cmd.opt("--extra-vars", Some(shell_quote(&vars)));
        }
        if let Some(args) = extra_args {
            cmd = cmd.arg(args);
        }

        let opts = ExecOptions::default()
            .long_running(true)
            .timeout(PLAYBOOK_TIMEOUT);
        let out = self.cli.execute(cmd.as_str(), &opts)?;
        let re = PLAY_RECAP_FAILURE
            .as_ref()
            .map_err(|e| AnsiblePlaybookError::Regex(e.clone()))?;
        if re.is_match(&out.stdout) {
            return Err(AnsiblePlaybookError::Failed {
                playbook: playbook.to_owned(),
                output: out.to_string(),
            });
        }
        Ok(out)
    }
}
