//! `rbd` block device images, their snapshots and the trash.
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{build_cmd_args, ArgValue, Cli, CmdLine};
use crate::node::{CmdOutput, ExecError, ExecOptions, Node};

pub const DEFAULT_POOL: &str = "rbd";

#[derive(Debug, thiserror::Error)]
pub enum RbdError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("failed to parse output of `{cmd}`")]
    Json {
        cmd: String,
        source: serde_json::Error,
    },
}

/// `<pool>[/<namespace>]/<image>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub pool: String,
    pub namespace: Option<String>,
    pub image: String,
}

impl ImageSpec {
    pub fn new(pool: &str, image: &str) -> Self {
        Self {
            pool: pool.to_owned(),
            namespace: None,
            image: image.to_owned(),
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_owned());
        self
    }

    /// `<image spec>@<snap>`
    pub fn snap(&self, snap: &str) -> String {
        format!("{self}@{snap}")
    }

    /// `<pool>[/<namespace>]`
    fn pool_spec(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{ns}", self.pool),
            None => self.pool.clone(),
        }
    }
}

impl fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pool_spec(), self.image)
    }
}

/// Fields of `rbd info --format json` the tests look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImageInfo {
    pub name: String,
    pub id: String,
    pub size: u64,
    pub objects: u64,
    pub order: u32,
    pub object_size: u64,
    pub block_name_prefix: String,
    pub format: u32,
    pub features: Vec<String>,
    pub op_features: Vec<String>,
    pub flags: Vec<String>,
    pub parent: Option<ParentInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParentInfo {
    pub pool: String,
    pub pool_namespace: String,
    pub image: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SnapInfo {
    pub id: u64,
    pub name: String,
    pub size: u64,
    /// rbd reports `"true"` or `"false"`
    pub protected: String,
}

impl SnapInfo {
    pub fn is_protected(&self) -> bool {
        self.protected == "true"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrashEntry {
    pub id: String,
    pub name: String,
    pub source: String,
}

/// Options of `rbd create` beyond the size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOpts {
    pub data_pool: Option<String>,
    pub object_size: Option<String>,
    pub image_feature: Vec<String>,
    pub thick_provision: bool,
}

fn parse<T: DeserializeOwned>(cmd: &str, out: &CmdOutput) -> Result<T, RbdError> {
    serde_json::from_str(&out.stdout).map_err(|source| RbdError::Json {
        cmd: cmd.to_owned(),
        source,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct Rbd<'a> {
    cli: Cli<'a>,
}

impl<'a> Rbd<'a> {
    pub fn new(node: &'a dyn Node) -> Self {
        Self {
            cli: Cli::new(node, "rbd"),
        }
    }

    pub fn snap(&self) -> Snap<'a> {
        Snap { cli: self.cli }
    }

    pub fn trash(&self) -> Trash<'a> {
        Trash { cli: self.cli }
    }

    fn json<T: DeserializeOwned>(&self, sub: CmdLine) -> Result<T, RbdError> {
        let cmd = self.cli.command(sub.arg("--format json").as_str());
        let out = self.cli.execute(&cmd, &ExecOptions::root())?;
        parse(&cmd, &out)
    }

    /// `size` takes rbd's units, `1G`, `512M` or a plain number of MiB.
    pub fn create(&self, image: &ImageSpec, size: &str, opts: &CreateOpts) -> Result<CmdOutput, RbdError> {
        let options = build_cmd_args(
            "--",
            &[
                ("data-pool", opts.data_pool.clone().into()),
                ("object-size", opts.object_size.clone().into()),
                ("image-feature", opts.image_feature.clone().into()),
                ("thick-provision", opts.thick_provision.into()),
            ],
        );
        let cmd = CmdLine::new("create").arg(image).opt("--size", Some(size)).raw(&options);
        let out = self.cli.run(cmd.as_str())?;
        tracing::info!(host = self.cli.node().hostname(), %image, size, "image created");
        Ok(out)
    }

    /// Image names in `pool`, the default pool when `None`.
    pub fn ls(&self, pool: Option<&str>) -> Result<Vec<String>, RbdError> {
        self.json(CmdLine::new("ls").arg(pool.unwrap_or(DEFAULT_POOL)))
    }

    pub fn info(&self, image: &ImageSpec) -> Result<ImageInfo, RbdError> {
        self.json(CmdLine::new("info").arg(image))
    }

    pub fn status(&self, image: &ImageSpec) -> Result<CmdOutput, RbdError> {
        Ok(self.cli.run(&format!("status {image}"))?)
    }

    /// Shrinking needs `allow_shrink`. The exit code is not checked so that
    /// tests can assert on refusals.
    pub fn resize(&self, image: &ImageSpec, size: &str, allow_shrink: bool) -> Result<CmdOutput, RbdError> {
        let cmd = CmdLine::new(&self.cli.command("resize"))
            .arg(image)
            .opt("--size", Some(size))
            .flag("--allow-shrink", allow_shrink);
        Ok(self.cli.execute(cmd.as_str(), &ExecOptions::root().check_ec(false))?)
    }

    pub fn rm(&self, image: &ImageSpec) -> Result<CmdOutput, RbdError> {
        Ok(self.cli.run(&format!("rm {image} --no-progress"))?)
    }

    pub fn flatten(&self, image: &ImageSpec) -> Result<CmdOutput, RbdError> {
        let cmd = self.cli.command(&format!("flatten {image} --no-progress"));
        Ok(self.cli.execute(&cmd, &ExecOptions::root().long_running(true))?)
    }

    /// Clones `parent@snap` into `child`. The snapshot must be protected
    /// unless the cluster runs clone v2.
    pub fn clone_image(&self, parent: &ImageSpec, snap: &str, child: &ImageSpec) -> Result<CmdOutput, RbdError> {
        Ok(self.cli.run(&format!("clone {} {child}", parent.snap(snap)))?)
    }

    /// Clones of `image@snap`, as image specs.
    pub fn children(&self, image: &ImageSpec, snap: &str) -> Result<Vec<String>, RbdError> {
        #[derive(Deserialize)]
        struct Child {
            pool: String,
            #[serde(default)]
            pool_namespace: String,
            image: String,
        }
        let children: Vec<Child> = self.json(CmdLine::new("children").arg(image.snap(snap)))?;
        Ok(children
            .into_iter()
            .map(|c| {
                let spec = ImageSpec {
                    pool: c.pool,
                    namespace: (!c.pool_namespace.is_empty()).then_some(c.pool_namespace),
                    image: c.image,
                };
                spec.to_string()
            })
            .collect())
    }

    /// Maps the image through krbd and returns the device, e.g. `/dev/rbd0`.
    pub fn map(&self, image: &ImageSpec, options: &[(&str, ArgValue)]) -> Result<String, RbdError> {
        let cmd = CmdLine::new("map").arg(image).raw(&build_cmd_args("--", options));
        let out = self.cli.run(cmd.as_str())?;
        Ok(out.trimmed().to_owned())
    }

    pub fn unmap(&self, device: &str) -> Result<CmdOutput, RbdError> {
        Ok(self.cli.run(&format!("unmap {device}"))?)
    }

    /// Runs `rbd bench` with `io_type` read, write or readwrite.
    pub fn bench(
        &self,
        image: &ImageSpec,
        io_type: &str,
        options: &[(&str, ArgValue)],
    ) -> Result<CmdOutput, RbdError> {
        let cmd = CmdLine::new(&self.cli.command("bench"))
            .arg(image)
            .opt("--io-type", Some(io_type))
            .raw(&build_cmd_args("--", options));
        Ok(self.cli.execute(cmd.as_str(), &ExecOptions::root().long_running(true))?)
    }
}

/// `rbd snap`
#[derive(Debug, Clone, Copy)]
pub struct Snap<'a> {
    cli: Cli<'a>,
}

impl Snap<'_> {
    fn run(&self, action: &str, target: &str) -> Result<CmdOutput, RbdError> {
        Ok(self.cli.run(&format!("snap {action} {target}"))?)
    }

    pub fn create(&self, image: &ImageSpec, snap: &str) -> Result<CmdOutput, RbdError> {
        self.run("create", &image.snap(snap))
    }

    pub fn ls(&self, image: &ImageSpec) -> Result<Vec<SnapInfo>, RbdError> {
        let cmd = self.cli.command(&format!("snap ls {image} --format json"));
        let out = self.cli.execute(&cmd, &ExecOptions::root())?;
        parse(&cmd, &out)
    }

    pub fn rm(&self, image: &ImageSpec, snap: &str) -> Result<CmdOutput, RbdError> {
        self.run("rm", &format!("{} --no-progress", image.snap(snap)))
    }

    /// Removes every unprotected snapshot of the image.
    pub fn purge(&self, image: &ImageSpec) -> Result<CmdOutput, RbdError> {
        self.run("purge", &format!("{image} --no-progress"))
    }

    pub fn protect(&self, image: &ImageSpec, snap: &str) -> Result<CmdOutput, RbdError> {
        self.run("protect", &image.snap(snap))
    }

    pub fn unprotect(&self, image: &ImageSpec, snap: &str) -> Result<CmdOutput, RbdError> {
        self.run("unprotect", &image.snap(snap))
    }

    pub fn rollback(&self, image: &ImageSpec, snap: &str) -> Result<CmdOutput, RbdError> {
        let cmd = self.cli.command(&format!("snap rollback {} --no-progress", image.snap(snap)));
        Ok(self.cli.execute(&cmd, &ExecOptions::root().long_running(true))?)
    }

    pub fn rename(&self, image: &ImageSpec, from: &str, to: &str) -> Result<CmdOutput, RbdError> {
        self.run("rename", &format!("{} {}", image.snap(from), image.snap(to)))
    }
}

/// `rbd trash`
#[derive(Debug, Clone, Copy)]
pub struct Trash<'a> {
    cli: Cli<'a>,
}

impl Trash<'_> {
    /// Moves the image to the trash, kept until `expires_at` when given.
    pub fn mv(&self, image: &ImageSpec, expires_at: Option<&str>) -> Result<CmdOutput, RbdError> {
        let cmd = CmdLine::new("trash mv").arg(image).opt("--expires-at", expires_at);
        Ok(self.cli.run(cmd.as_str())?)
    }

    pub fn ls(&self, pool: &str) -> Result<Vec<TrashEntry>, RbdError> {
        let cmd = self.cli.command(&format!("trash ls {pool} --format json"));
        let out = self.cli.execute(&cmd, &ExecOptions::root())?;
        parse(&cmd, &out)
    }

    /// Id of the trashed image called `name` in `pool`.
    pub fn image_id(&self, pool: &str, name: &str) -> Result<Option<String>, RbdError> {
        Ok(self.ls(pool)?.into_iter().find(|e| e.name == name).map(|e| e.id))
    }

    pub fn restore(&self, pool: &str, image_id: &str) -> Result<CmdOutput, RbdError> {
        Ok(self.cli.run(&format!("trash restore {pool}/{image_id}"))?)
    }

    pub fn rm(&self, pool: &str, image_id: &str, force: bool) -> Result<CmdOutput, RbdError> {
        let cmd = CmdLine::new("trash rm")
            .arg(format!("{pool}/{image_id}"))
            .flag("--force", force)
            .arg("--no-progress");
        Ok(self.cli.run(cmd.as_str())?)
    }

    /// Removes every expired image of `pool` from the trash.
    pub fn purge(&self, pool: &str) -> Result<CmdOutput, RbdError> {
        Ok(self.cli.run(&format!("trash purge {pool} --no-progress"))?)
    }
}
