//! Runs one command on every node of a role at once.
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use libcephqe::node::{CmdOutput, ExecOptions, Node};
use libcephqe::parallel::parallel;

use super::ClusterArgs;

/// Execute a command on the nodes of a cluster
#[derive(Parser, Debug)]
pub struct Exec {
    #[clap(flatten)]
    pub cluster: ClusterArgs,
    /// Only nodes with this role, every node otherwise
    #[clap(long)]
    pub role: Option<String>,
    /// Run without sudo
    #[clap(long)]
    pub no_sudo: bool,
    /// Seconds after which the command is abandoned
    #[clap(long)]
    pub timeout: Option<u64>,
    /// Command to run, after `--`
    #[clap(required = true, last = true)]
    pub command: Vec<String>,
}

pub fn exec(args: Exec) -> Result<()> {
    let cluster = args.cluster.load()?;
    let nodes = cluster.get_nodes(args.role.as_deref());
    if nodes.is_empty() {
        bail!("no node in {} matches role {:?}", cluster.name(), args.role);
    }

    let mut opts = ExecOptions::default().sudo(!args.no_sudo).check_ec(false);
    if let Some(secs) = args.timeout {
        opts = opts.timeout(Duration::from_secs(secs));
    }
    let cmd = args.command.join(" ");
    let results = run_on_nodes(&nodes, &cmd, &opts);

    let failed = write_results(io::stdout(), &results)?;
    if failed > 0 {
        bail!("`{cmd}` failed on {failed} of {} nodes", results.len());
    }
    Ok(())
}

/// Per host outcome, in node order.
fn run_on_nodes(nodes: &[Arc<dyn Node>], cmd: &str, opts: &ExecOptions) -> Vec<(String, Result<CmdOutput>)> {
    let outcomes = parallel(|p| {
        for node in nodes {
            p.spawn(move || node.exec(cmd, opts));
        }
    });
    nodes
        .iter()
        .zip(outcomes)
        .map(|(node, outcome)| {
            let res = match outcome {
                Ok(Ok(out)) => Ok(out),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            };
            (node.hostname().to_owned(), res)
        })
        .collect()
}

/// Prints every host's output under a header and returns how many failed.
fn write_results<W: Write>(mut out: W, results: &[(String, Result<CmdOutput>)]) -> Result<usize> {
    let mut failed = 0;
    for (host, res) in results {
        match res {
            Ok(output) => {
                writeln!(out, "==> {host} (exit code {})", output.exit_code)?;
                write!(out, "{output}")?;
                if !output.success() {
                    failed += 1;
                }
            }
            Err(e) => {
                writeln!(out, "==> {host} (error)")?;
                writeln!(out, "{e:#}")?;
                failed += 1;
            }
        }
    }
    out.flush()?;
    Ok(failed)
}
