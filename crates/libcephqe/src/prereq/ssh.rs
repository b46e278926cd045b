use std::sync::Arc;

use super::PrereqError;
use crate::cli::packages::Package;
use crate::node::{root_shell, shell_quote, ExecOptions, Node};

const ETC_HOSTS: &str = "/etc/hosts";

/// ssh directory of the login user, or of root. `~` is not used for root
/// since sudo may keep the caller's `HOME`.
fn ssh_dir(sudo: bool) -> &'static str {
    if sudo {
        "/root/.ssh"
    } else {
        "~/.ssh"
    }
}

/// `cmd` as handed to the node: wrapped in a shell for root so that its
/// redirects run under sudo as well.
fn as_user(cmd: String, sudo: bool) -> String {
    if sudo {
        root_shell(&cmd)
    } else {
        cmd
    }
}

fn ssh_keygen(sudo: bool) -> String {
    format!("ssh-keygen -b 2048 -f {}/id_rsa -t rsa -q -N ''", ssh_dir(sudo))
}

fn ssh_copy_id(password: &str, user: &str, host: &str, sudo: bool) -> String {
    format!(
        "sshpass -p {} ssh-copy-id -f -i {}/id_rsa.pub {user}@{host}",
        shell_quote(password),
        ssh_dir(sudo)
    )
}

/// Sets up passwordless ssh from the installer to every node, for both the
/// login user and root.
///
/// Each node gets fresh keys; the installer additionally gets `/etc/hosts`
/// entries, an ssh config that skips host key checking, and the public key
/// of every node in its known hosts.
pub fn setup_ssh_keys(installer: &dyn Node, nodes: &[Arc<dyn Node>]) -> Result<(), PrereqError> {
    let user = ExecOptions::default();
    let mut hosts = String::new();
    let mut config = String::from("Host *\n\tStrictHostKeyChecking no\n\tServerAliveInterval 2400\n");

    for node in nodes {
        config.push_str(&format!(
            "\nHost {}\n\tHostname {}\n\tUser root",
            node.ip_address(),
            node.hostname()
        ));
        hosts.push_str(&format!(
            "\n{}\t{}\t{}",
            node.ip_address(),
            node.hostname(),
            node.shortname()
        ));
        for sudo in [false, true] {
            let opts = ExecOptions::default().sudo(sudo);
            node.exec(&format!("rm -rf {}", ssh_dir(sudo)), &opts.clone().check_ec(false))?;
            node.exec(&ssh_keygen(sudo), &opts)?;
        }
    }

    installer.exec(
        &root_shell(&format!("echo -e {} >> {ETC_HOSTS}", shell_quote(&hosts))),
        &ExecOptions::root(),
    )?;
    let config_file = format!("{}/config", ssh_dir(false));
    installer.exec(
        &format!("touch {config_file} && echo -e {} > {config_file}", shell_quote(&config)),
        &user,
    )?;
    installer.exec(&format!("chmod 600 {config_file}"), &user)?;
    Package::new(installer).install("sshpass", false, &[])?;

    for node in nodes {
        let info = node.info();
        for sudo in [false, true] {
            let opts = ExecOptions::default().sudo(sudo);
            let keyscan = format!("ssh-keyscan {} >> {}/known_hosts", node.hostname(), ssh_dir(sudo));
            installer.exec(&as_user(keyscan, sudo), &opts)?;
        }
        let copy_user = ssh_copy_id(&info.password, &info.username, node.hostname(), false);
        installer.exec(&copy_user, &user.clone().secret(&info.password))?;
        for sudo in [false, true] {
            let copy_root = ssh_copy_id(&info.root_password, "root", node.hostname(), sudo);
            let opts = ExecOptions::default().sudo(sudo).secret(&info.root_password);
            installer.exec(&copy_root, &opts)?;
        }
    }
    tracing::info!(installer = installer.hostname(), nodes = nodes.len(), "ssh keys distributed");
    Ok(())
}
