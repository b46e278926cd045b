//! # cephci
//! Operator command line around libcephqe: prepares freshly provisioned
//! nodes for a Ceph deployment and runs ad-hoc commands across a cluster.
mod commands;
mod observability;

use std::path::PathBuf;

use anyhow::Result;
use clap::{crate_version, Parser};

#[derive(Parser, Debug)]
pub struct GlobalOpts {
    /// Enable debug logging
    #[clap(long, global = true)]
    pub debug: bool,
    /// Write logs to this file instead of stderr
    #[clap(long, global = true)]
    pub log: Option<PathBuf>,
    /// Log format, `text` or `json`
    #[clap(long, global = true)]
    pub log_format: Option<String>,
    /// One of error, warn, info, debug or trace; overrides --debug
    #[clap(long, global = true)]
    pub log_level: Option<String>,
    /// Also keep a debug log of this run in a timestamped file here
    #[clap(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[clap(version = crate_version!(), author = env!("CARGO_PKG_AUTHORS"))]
struct Opts {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
enum SubCommand {
    Prereq(commands::prereq::Prereq),
    Exec(commands::exec::Exec),
    Nodes(commands::nodes::Nodes),
}

impl SubCommand {
    fn name(&self) -> &'static str {
        match self {
            SubCommand::Prereq(_) => "prereq",
            SubCommand::Exec(_) => "exec",
            SubCommand::Nodes(_) => "nodes",
        }
    }
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    match observability::init(&opts) {
        Ok(Some(run_log)) => tracing::info!(path = %run_log.display(), "logging this run"),
        Ok(None) => {}
        Err(e) => eprintln!("log init failed: {e:?}"),
    }
    tracing::debug!(args = ?std::env::args_os().collect::<Vec<_>>(), "started");

    match opts.subcmd {
        SubCommand::Prereq(prereq) => commands::prereq::prereq(prereq),
        SubCommand::Exec(exec) => commands::exec::exec(exec),
        SubCommand::Nodes(nodes) => commands::nodes::nodes(nodes),
    }
}
