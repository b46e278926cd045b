use anyhow::{anyhow, Context as _, Result};
use libcephqe::cluster::Cluster;
use libcephqe::config::{CephciConfig, TestData};
use once_cell::sync::OnceCell;

/// Everything a test needs to know about the cluster it runs against.
#[derive(Debug)]
pub struct Context {
    pub cluster: Cluster,
    pub config: CephciConfig,
    pub test_data: TestData,
}

static CONTEXT: OnceCell<Context> = OnceCell::new();

pub fn set_context(ctx: Context) -> Result<()> {
    CONTEXT
        .set(ctx)
        .map_err(|_| anyhow!("test context is already set"))
}

pub fn context() -> Result<&'static Context> {
    CONTEXT.get().context("test context is not set")
}
