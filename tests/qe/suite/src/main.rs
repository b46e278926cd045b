mod logger;
mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libcephqe::cluster::load_clusters;
use libcephqe::config::{self, CephciConfig, TestData};
use test_framework::TestManager;

use crate::tests::cephfs_mds::get_cephfs_mds_test;
use crate::tests::cephfs_mount_io::get_cephfs_mount_io_test;
use crate::tests::cephfs_nfs::get_cephfs_nfs_test;
use crate::tests::cephfs_quota::get_cephfs_quota_test;
use crate::tests::cephfs_snapshot_clone::get_cephfs_snapshot_clone_test;
use crate::tests::cephfs_subvolume::get_cephfs_subvolume_test;
use crate::tests::cephfs_volume::get_cephfs_volume_test;
use crate::tests::iscsi_gwcli::get_iscsi_gwcli_test;
use crate::tests::packages::get_packages_test;
use crate::utils::support::{set_context, Context as SuiteContext};

#[derive(Parser, Debug)]
#[clap(version = "0.1.0", author = "cephqe team")]
struct Opts {
    /// Enables debug output
    #[clap(short, long)]
    debug: bool,

    #[clap(subcommand)]
    command: SubCommand,
}

#[derive(Parser, Debug)]
enum SubCommand {
    /// run the integration tests against a live cluster
    Run(Run),
    /// list available test groups
    List,
}

#[derive(Parser, Debug)]
struct Run {
    /// Cluster file describing the nodes under test
    #[clap(long)]
    cluster: PathBuf,
    /// Cluster to use when the file describes several
    #[clap(long)]
    cluster_name: Option<String>,
    /// cephci configuration, `$CEPHCI_CONFIG` or `~/.cephci.yaml` when unset
    #[clap(long)]
    config: Option<PathBuf>,
    /// YAML file with test data, e.g. a `custom-config` list
    #[clap(long)]
    test_data: Option<PathBuf>,
    /// Additional `key=value` custom config entries
    #[clap(long = "custom-config")]
    custom_config: Vec<String>,
    /// Selected tests to be run, format should be
    /// space separated groups, eg
    /// -t group1::test1,test3 group2 group3::test5
    #[clap(short, long, num_args(1..), value_delimiter = ' ')]
    tests: Option<Vec<String>>,
}

// parse test string given in commandline option as pair of testgroup name and tests belonging to that
fn parse_tests(tests: &[String]) -> Vec<(&str, Option<Vec<&str>>)> {
    tests
        .iter()
        .map(|test| match test.split_once("::") {
            Some((group, names)) => (group, Some(names.split(',').collect())),
            None => (test.as_str(), None),
        })
        .collect()
}

fn test_manager() -> TestManager {
    let mut tm = TestManager::new();
    tm.add_test_group(Box::new(get_cephfs_volume_test()));
    tm.add_test_group(Box::new(get_cephfs_subvolume_test()));
    tm.add_test_group(Box::new(get_cephfs_snapshot_clone_test()));
    tm.add_test_group(Box::new(get_cephfs_nfs_test()));
    tm.add_test_group(Box::new(get_cephfs_quota_test()));
    tm.add_test_group(Box::new(get_cephfs_mds_test()));
    tm.add_test_group(Box::new(get_cephfs_mount_io_test()));
    tm.add_test_group(Box::new(get_packages_test()));
    tm.add_test_group(Box::new(get_iscsi_gwcli_test()));
    tm
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();

    if let Err(e) = logger::init(opts.debug) {
        eprintln!("logger could not be initialized: {e:?}");
    }

    let tm = test_manager();
    match opts.command {
        SubCommand::Run(args) => {
            let code = run(args, &tm).context("run tests")?;
            std::process::exit(code);
        }
        SubCommand::List => list(&tm),
    }
    Ok(())
}

fn load_context(opts: &Run) -> Result<SuiteContext> {
    let mut clusters = load_clusters(&opts.cluster)?;
    let cluster = match &opts.cluster_name {
        Some(name) => clusters
            .remove(name)
            .with_context(|| format!("cluster {name} not found in {:?}", opts.cluster))?,
        None => clusters
            .into_values()
            .next()
            .with_context(|| format!("no cluster in {:?}", opts.cluster))?,
    };

    let config_path = opts.config.clone().unwrap_or_else(config::default_path);
    // Tests only need the config for registry and repo details.
    let config = if config_path.exists() {
        CephciConfig::load(&config_path)?
    } else {
        tracing::warn!(path = ?config_path, "cephci config not found, using defaults");
        CephciConfig::default()
    };

    let mut test_data = match &opts.test_data {
        Some(path) => {
            let content =
                std::fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
            serde_yaml::from_str(&content).with_context(|| format!("failed to parse {path:?}"))?
        }
        None => TestData::default(),
    };
    test_data.custom_config.extend(opts.custom_config.iter().cloned());

    Ok(SuiteContext {
        cluster,
        config,
        test_data,
    })
}

fn run(opts: Run, test_manager: &TestManager) -> Result<i32> {
    let ctx = load_context(&opts)?;
    tracing::info!(cluster = ctx.cluster.name(), "running tests");
    set_context(ctx)?;

    let summary = match &opts.tests {
        Some(tests) => test_manager.run_selected(&parse_tests(tests)),
        None => test_manager.run_all(),
    };
    println!(
        "passed: {}, failed: {}, skipped: {}",
        summary.passed, summary.failed, summary.skipped
    );
    for failure in &summary.failures {
        println!("failed: {failure}");
    }
    Ok(summary.exit_code())
}

fn list(test_manager: &TestManager) {
    for test_group in test_manager.tests_groups() {
        println!("{test_group}");
    }
}

#[cfg(test)]
mod opts_tests {
    use super::*;

    #[test]
    fn test_parse_tests() {
        let input = vec![
            "cephfs_quota::file_quota,byte_quota".to_string(),
            "packages".to_string(),
        ];
        assert_eq!(
            parse_tests(&input),
            vec![
                ("cephfs_quota", Some(vec!["file_quota", "byte_quota"])),
                ("packages", None),
            ]
        );
    }

    #[test]
    fn test_all_groups_registered() {
        let groups = test_manager().tests_groups();
        for group in [
            "cephfs_volume",
            "cephfs_subvolume",
            "cephfs_snapshot_clone",
            "cephfs_nfs",
            "cephfs_quota",
            "cephfs_mds",
            "cephfs_mount_io",
            "packages",
            "iscsi_gwcli",
        ] {
            assert!(groups.iter().any(|g| g == group), "{group} not registered");
        }
    }

    #[test]
    fn test_opts_parse() {
        let opts = Opts::try_parse_from([
            "qe-suite",
            "run",
            "--cluster",
            "cluster.yaml",
            "--custom-config",
            "erasure=true",
            "-t",
            "cephfs_nfs packages",
        ])
        .unwrap();
        let SubCommand::Run(run) = opts.command else {
            panic!("expected run");
        };
        assert_eq!(run.custom_config, vec!["erasure=true"]);
        assert_eq!(run.tests.unwrap(), vec!["cephfs_nfs", "packages"]);
    }

    #[test]
    fn test_load_context() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cluster = dir.path().join("cluster.yaml");
        std::fs::write(
            &cluster,
            "lab:\n  transport: local\n  nodes:\n    - hostname: localhost\n      ip_address: 127.0.0.1\n      roles: [client]\n",
        )?;
        let test_data = dir.path().join("test_data.yaml");
        std::fs::write(&test_data, "custom-config:\n  - fs_name=cephfs_ec\n")?;

        let ctx = load_context(&Run {
            cluster,
            cluster_name: Some("lab".into()),
            config: Some(dir.path().join("missing.yaml")),
            test_data: Some(test_data),
            custom_config: vec!["erasure=true".into()],
            tests: None,
        })?;
        assert_eq!(ctx.cluster.name(), "lab");
        assert_eq!(ctx.config, CephciConfig::default());
        assert_eq!(ctx.test_data.custom_config, vec!["fs_name=cephfs_ec", "erasure=true"]);
        assert!(ctx.test_data.flag("erasure"));
        Ok(())
    }

    #[test]
    fn test_load_context_unknown_cluster() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cluster = dir.path().join("cluster.yaml");
        std::fs::write(&cluster, "lab:\n  nodes:\n    - hostname: node1\n      ip_address: 10.0.0.1\n")?;
        let res = load_context(&Run {
            cluster,
            cluster_name: Some("other".into()),
            config: Some(dir.path().join("missing.yaml")),
            test_data: None,
            custom_config: Vec::new(),
            tests: None,
        });
        assert!(res.is_err());
        Ok(())
    }
}
