//! Lists the nodes of a cluster.
use std::io::{self, Write};

use anyhow::Result;
use clap::Parser;
use libcephqe::cluster::Cluster;
use tabwriter::TabWriter;

use super::ClusterArgs;

/// Show the nodes of a cluster and their roles
#[derive(Parser, Debug)]
pub struct Nodes {
    #[clap(flatten)]
    pub cluster: ClusterArgs,
    /// Only nodes with this role
    #[clap(long)]
    pub role: Option<String>,
    /// Print the node descriptions as JSON
    #[clap(long)]
    pub json: bool,
}

pub fn nodes(args: Nodes) -> Result<()> {
    let cluster = args.cluster.load()?;
    write_nodes(io::stdout(), &cluster, args.role.as_deref(), args.json)
}

fn write_nodes<W: Write>(out: W, cluster: &Cluster, role: Option<&str>, json: bool) -> Result<()> {
    let nodes = cluster.get_nodes(role);
    if json {
        let infos: Vec<_> = nodes.iter().map(|n| n.info()).collect();
        serde_json::to_writer_pretty(out, &infos)?;
        return Ok(());
    }

    let mut tab_writer = TabWriter::new(out);
    writeln!(&mut tab_writer, "HOSTNAME\tSHORTNAME\tIP\tROLES")?;
    for node in &nodes {
        writeln!(
            &mut tab_writer,
            "{}\t{}\t{}\t{}",
            node.hostname(),
            node.shortname(),
            node.ip_address(),
            node.roles().join(",")
        )?;
    }
    tab_writer.flush()?;

    Ok(())
}
