//! `smbclient` share access checks.
use super::Cli;
use crate::node::{shell_quote, CmdOutput, ExecError, ExecOptions, Node};

#[derive(Debug, thiserror::Error)]
pub enum SmbError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("access to //{server}/{share} failed: {status}")]
    Status {
        server: String,
        share: String,
        status: String,
    },
}

/// How the client authenticates against the share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmbAuth {
    User,
    /// Active directory, users are prefixed with the realm's first label
    ActiveDirectory { realm: String },
}

#[derive(Debug)]
pub struct Smbclient<'a> {
    cli: Cli<'a>,
    server: &'a str,
    auth: SmbAuth,
}

impl<'a> Smbclient<'a> {
    pub fn new(client: &'a dyn Node, server: &'a str, auth: SmbAuth) -> Self {
        Self {
            cli: Cli::new(client, "smbclient"),
            // public addresses come as CIDR
            server: server.split('/').next().unwrap_or(server),
            auth,
        }
    }

    fn credentials(&self, user: &str, password: &str) -> String {
        match &self.auth {
            SmbAuth::User => shell_quote(&format!("{user}%{password}")),
            SmbAuth::ActiveDirectory { realm } => {
                let domain = realm.split('.').next().unwrap_or(realm).to_uppercase();
                shell_quote(&format!("{domain}\\{user}%{password}"))
            }
        }
    }

    pub fn run(
        &self,
        share: &str,
        user: &str,
        password: &str,
        command: &str,
    ) -> Result<CmdOutput, SmbError> {
        let cmd = self.cli.command(&format!(
            "-U {} //{}/{share} -c {}",
            self.credentials(user, password),
            self.server,
            shell_quote(command)
        ));
        let opts = ExecOptions::root().check_ec(false).secret(password);
        let out = self.cli.execute(&cmd, &opts)?;
        let text = out.to_string();
        if let Some(status) = text.split_whitespace().find(|w| w.starts_with("NT_STATUS_")) {
            return Err(SmbError::Status {
                server: self.server.to_owned(),
                share: share.to_owned(),
                status: status.to_owned(),
            });
        }
        if !out.success() {
            return Err(SmbError::Status {
                server: self.server.to_owned(),
                share: share.to_owned(),
                status: format!("exit code {}", out.exit_code),
            });
        }
        Ok(out)
    }

    pub fn ls(&self, share: &str, user: &str, password: &str) -> Result<CmdOutput, SmbError> {
        self.run(share, user, password, "ls")
    }

    pub fn mkdir(
        &self,
        share: &str,
        user: &str,
        password: &str,
        dir: &str,
    ) -> Result<CmdOutput, SmbError> {
        self.run(share, user, password, &format!("mkdir {dir}"))
    }

    pub fn put(
        &self,
        share: &str,
        user: &str,
        password: &str,
        local: &str,
        remote: &str,
    ) -> Result<CmdOutput, SmbError> {
        self.run(share, user, password, &format!("put {local} {remote}"))
    }
}
