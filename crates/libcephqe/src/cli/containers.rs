//! podman containers and registries.
use super::{build_cmd_args, ArgValue, Cli, CmdLine};
use crate::node::{shell_quote, CmdOutput, ExecError, ExecOptions, Node};

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("failed to parse podman output")]
    Parse(#[from] serde_json::Error),
    #[error("container run needs an image")]
    MissingImage,
}

#[derive(Debug, thiserror::Error)]
pub enum ContainerRegistryError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("failed to login to {registry}: {output}")]
    Login { registry: String, output: String },
}

/// Options of `podman run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    pub name: Option<String>,
    pub image: String,
    pub volume: Vec<String>,
    pub env: Vec<String>,
    /// `host:container`
    pub ports: Option<String>,
    pub restart: Option<String>,
    pub detach: bool,
    pub rm: bool,
    pub entry_point: Option<String>,
    /// Command run inside the container
    pub cmd: Option<String>,
    pub long_running: bool,
}

#[derive(Debug)]
pub struct Container<'a> {
    cli: Cli<'a>,
}

impl<'a> Container<'a> {
    pub fn new(node: &'a dyn Node) -> Self {
        Self {
            cli: Cli::new(node, "podman"),
        }
    }

    pub fn run(&self, args: &RunArgs) -> Result<CmdOutput, ContainerError> {
        if args.image.is_empty() {
            return Err(ContainerError::MissingImage);
        }
        let options = build_cmd_args(
            "--",
            &[
                ("name", args.name.clone().into()),
                ("volume", args.volume.clone().into()),
                ("env", args.env.clone().into()),
                ("publish", args.ports.clone().into()),
                ("restart", args.restart.clone().into()),
                ("detach", args.detach.into()),
                ("rm", args.rm.into()),
                ("entrypoint", args.entry_point.clone().into()),
            ],
        );
        let mut cmd = CmdLine::new(&self.cli.command("run"))
            .raw(&options)
            .arg(&args.image);
        if let Some(inner) = &args.cmd {
            cmd = cmd.arg(inner);
        }
        let opts = ExecOptions::root().long_running(args.long_running);
        Ok(self.cli.execute(cmd.as_str(), &opts)?)
    }

    pub fn ps(
        &self,
        all: bool,
        filter: Option<&str>,
        format: Option<&str>,
    ) -> Result<CmdOutput, ContainerError> {
        let options = build_cmd_args(
            "--",
            &[
                ("all", all.into()),
                ("filter", filter.into()),
                ("format", format.into()),
            ],
        );
        Ok(self.cli.run(&format!("ps{options}"))?)
    }

    pub fn exec(
        &self,
        container: &str,
        cmd: &str,
        interactive: bool,
    ) -> Result<CmdOutput, ContainerError> {
        let line = CmdLine::new("exec")
            .flag("-it", interactive)
            .arg(container)
            .arg(cmd);
        Ok(self.cli.run(line.as_str())?)
    }

    pub fn rm(&self, container: &str, force: bool) -> Result<CmdOutput, ContainerError> {
        let line = CmdLine::new("rm").flag("--force", force).arg(container);
        Ok(self.cli.run(line.as_str())?)
    }

    pub fn pull(&self, image: &str) -> Result<CmdOutput, ContainerError> {
        Ok(self.cli.execute(
            &self.cli.command(&format!("pull {image}")),
            &ExecOptions::root().long_running(true),
        )?)
    }

    pub fn inspect(&self, target: &str) -> Result<serde_json::Value, ContainerError> {
        let out = self.cli.run(&format!("inspect {target}"))?;
        Ok(serde_json::from_str(&out.stdout)?)
    }

    pub fn logs(&self, container: &str) -> Result<CmdOutput, ContainerError> {
        Ok(self.cli.run(&format!("logs {container}"))?)
    }
}

#[derive(Debug)]
pub struct Registry<'a> {
    cli: Cli<'a>,
}

impl<'a> Registry<'a> {
    pub fn new(node: &'a dyn Node) -> Self {
        Self {
            cli: Cli::new(node, "podman"),
        }
    }

    pub fn login(
        &self,
        registry: &str,
        username: &str,
        password: &str,
    ) -> Result<CmdOutput, ContainerRegistryError> {
        let cmd = self.cli.command(&format!(
            "login -u {} -p {} {}",
            shell_quote(username),
            shell_quote(password),
            shell_quote(registry)
        ));
        let out = self.cli.execute(&cmd, &ExecOptions::root().secret(password))?;
        if !out.to_string().contains("Login Succeeded") {
            return Err(ContainerRegistryError::Login {
                registry: registry.to_owned(),
                output: out.to_string(),
            });
        }
        tracing::info!(host = self.cli.node().hostname(), registry, "logged in to registry");
        Ok(out)
    }

    pub fn logout(&self, registry: &str) -> Result<CmdOutput, ContainerRegistryError> {
        Ok(self.cli.run(&format!("logout {registry}"))?)
    }
}
