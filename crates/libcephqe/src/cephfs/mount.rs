use std::sync::Arc;
use std::time::Duration;

use super::{FsError, FsUtils};
use crate::node::{root_shell, shell_quote, ExecOptions, Node};
use crate::waiter::{retry, wait_for};

const MOUNT_TIMEOUT: Duration = Duration::from_secs(180);
const MOUNT_INTERVAL: Duration = Duration::from_secs(5);
const MOUNT_RETRY_DELAY: Duration = Duration::from_secs(60);
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(3600);

/// Options of [`FsUtils::fuse_mount`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuseMount {
    /// Mount as this client instead of the node's hostname. Its keyring is
    /// fetched before mounting.
    pub new_client_hostname: Option<String>,
    /// Appended verbatim to `ceph-fuse`, e.g. `--client_fs cephfs1 -r /dir`
    pub extra_params: Option<String>,
    pub fstab: bool,
}

/// Options of [`FsUtils::kernel_mount`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelMount {
    pub new_client_hostname: Option<String>,
    /// Directory of the file system to mount, `/` by default
    pub sub_dir: Option<String>,
    /// Appended to the `-o` option list, must start with a comma
    pub extra_params: Option<String>,
    pub validate: bool,
    pub fstab: bool,
}

impl Default for KernelMount {
    fn default() -> Self {
        Self {
            new_client_hostname: None,
            sub_dir: None,
            extra_params: None,
            validate: true,
            fstab: false,
        }
    }
}

/// Options of [`FsUtils::cephfs_nfs_mount`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NfsMount {
    /// 2049 when unset
    pub port: Option<u16>,
    /// Appended to the fstab options, must start with a comma
    pub extra_params: Option<String>,
    pub fstab: bool,
}

impl NfsMount {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(2049)
    }
}

/// Value following `name` in a whitespace separated argument list, in
/// either `name value` or `name=value` form.
fn arg_value<'a>(args: &'a str, name: &str) -> Option<&'a str> {
    let mut tokens = args.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == name {
            return tokens.next();
        }
        if let Some(value) = token.strip_prefix(name).and_then(|rest| rest.strip_prefix('=')) {
            return Some(value);
        }
    }
    None
}

pub fn fuse_fstab_entry(mon_ips: &[String], mount_point: &str, client_name: &str, extra_params: Option<&str>) -> String {
    let mut entry = format!(
        "{}    {mount_point}    fuse.ceph    ceph.name=client.{client_name},",
        mon_ips.join(",")
    );
    if let Some(extra) = extra_params {
        if let Some(fs) = arg_value(extra, "--client_fs") {
            entry.push_str(&format!("ceph.client_fs={fs},"));
        }
        if let Some(root) = arg_value(extra, "-r") {
            entry.push_str(&format!("ceph.client_mountpoint={root},"));
        }
        if let Some(id) = arg_value(extra, "--id") {
            entry.push_str(&format!("ceph.id={id},"));
        }
    }
    entry.push_str("_netdev,defaults      0       0");
    entry
}

pub fn kernel_fstab_entry(
    mon_ip: &str,
    sub_dir: &str,
    mount_point: &str,
    client_name: &str,
    extra_params: Option<&str>,
) -> String {
    format!(
        "{mon_ip}:{sub_dir}    {mount_point}    ceph    name={client_name},secretfile=/etc/ceph/{client_name}.secret{},_netdev,noatime      0       0",
        extra_params.unwrap_or_default()
    )
}

pub fn nfs_fstab_entry(server: &str, export: &str, mount_dir: &str, port: u16, extra_params: Option<&str>) -> String {
    format!(
        "{server}:{export}    {mount_dir}    nfs4    port={port},defaults,seclabel,vers=4.2,proto=tcp{}      0       0",
        extra_params.unwrap_or_default()
    )
}

/// Keeps a pristine copy of `/etc/fstab` before the first entry is added.
fn backup_fstab(client: &dyn Node) -> Result<(), FsError> {
    let out = client.exec("ls -lrt /etc/fstab.backup", &ExecOptions::root().check_ec(false))?;
    if !out.success() {
        client.exec_command("cp /etc/fstab /etc/fstab.backup")?;
    }
    Ok(())
}

pub(super) fn add_fstab_entry(client: &dyn Node, entry: &str) -> Result<(), FsError> {
    backup_fstab(client)?;
    let append = format!("echo {} >> /etc/fstab", shell_quote(entry));
    client.exec_command(&root_shell(&append))?;
    tracing::info!(host = client.hostname(), entry, "fstab entry added");
    Ok(())
}

fn client_name<'a>(client: &'a dyn Node, new_client_hostname: Option<&'a str>) -> &'a str {
    new_client_hostname.unwrap_or_else(|| client.hostname())
}

impl FsUtils<'_> {
    /// Waits for `mount_point` to show up in the output of `mount`.
    pub fn wait_until_mount_succeeds(&self, client: &dyn Node, mount_point: &str) -> Result<bool, FsError> {
        self.wait_until_mount_succeeds_with(client, mount_point, MOUNT_TIMEOUT, MOUNT_INTERVAL)
    }

    pub fn wait_until_mount_succeeds_with(
        &self,
        client: &dyn Node,
        mount_point: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool, FsError> {
        let wanted = mount_point.trim_end_matches('/');
        wait_for(timeout, interval, || {
            let out = client.exec("mount", &ExecOptions::root().check_ec(false))?;
            Ok::<_, FsError>(out.stdout.split_whitespace().any(|t| t == wanted))
        })
    }

    fn fuse_mount_one(&self, client: &dyn Node, mount_point: &str, opts: &FuseMount) -> Result<(), FsError> {
        let name = client_name(client, opts.new_client_hostname.as_deref());
        client.exec_command(&format!("mkdir -p {mount_point}"))?;
        if let Some(new) = &opts.new_client_hostname {
            client.exec_command(&format!(
                "ceph auth get client.{new} -o /etc/ceph/ceph.client.{new}.keyring"
            ))?;
        }
        tracing::info!(host = client.hostname(), mount_point, "mounting with ceph-fuse");
        let mut cmd = format!("ceph-fuse -n client.{name} {mount_point}");
        if let Some(extra) = &opts.extra_params {
            cmd.push_str(&format!(" {extra}"));
        }
        client.exec(&cmd, &ExecOptions::root().long_running(true))?;
        if !self.wait_until_mount_succeeds(client, mount_point)? {
            return Err(FsError::Timeout(format!(
                "{mount_point} did not appear in mount on {}",
                client.hostname()
            )));
        }
        if opts.fstab {
            let entry = fuse_fstab_entry(&self.cluster.mon_ips(), mount_point, name, opts.extra_params.as_deref());
            add_fstab_entry(client, &entry)?;
        }
        Ok(())
    }

    /// Mounts the file system with `ceph-fuse` on every client.
    pub fn fuse_mount(&self, clients: &[Arc<dyn Node>], mount_point: &str, opts: &FuseMount) -> Result<(), FsError> {
        for client in clients {
            retry(3, MOUNT_RETRY_DELAY, || self.fuse_mount_one(client.as_ref(), mount_point, opts))?;
        }
        Ok(())
    }

    fn kernel_mount_one(
        &self,
        client: &dyn Node,
        mount_point: &str,
        mon_ip: &str,
        opts: &KernelMount,
    ) -> Result<(), FsError> {
        let name = client_name(client, opts.new_client_hostname.as_deref());
        let sub_dir = opts.sub_dir.as_deref().unwrap_or("/");
        let extra = opts.extra_params.as_deref().unwrap_or_default();
        client.exec_command(&format!("mkdir -p {mount_point}"))?;
        client.exec_command(&format!(
            "ceph auth get-key client.{name} -o /etc/ceph/{name}.secret"
        ))?;
        tracing::info!(host = client.hostname(), mount_point, mon_ip, "kernel mount");
        let cmd = format!(
            "mount -t ceph {mon_ip}:{sub_dir} {mount_point} -o name={name},secretfile=/etc/ceph/{name}.secret{extra}"
        );
        client.exec(&cmd, &ExecOptions::root().long_running(true).check_ec(opts.validate))?;
        if opts.validate && !self.wait_until_mount_succeeds(client, mount_point)? {
            return Err(FsError::Timeout(format!(
                "{mount_point} did not appear in mount on {}",
                client.hostname()
            )));
        }
        if opts.fstab {
            let entry = kernel_fstab_entry(mon_ip, sub_dir, mount_point, name, opts.extra_params.as_deref());
            add_fstab_entry(client, &entry)?;
        }
        Ok(())
    }

    /// Mounts the file system with the kernel driver on every client.
    pub fn kernel_mount(
        &self,
        clients: &[Arc<dyn Node>],
        mount_point: &str,
        mon_ip: &str,
        opts: &KernelMount,
    ) -> Result<(), FsError> {
        for client in clients {
            retry(3, MOUNT_RETRY_DELAY, || {
                self.kernel_mount_one(client.as_ref(), mount_point, mon_ip, opts)
            })?;
        }
        Ok(())
    }

    /// Empties `mounting_dir` on every client and, with `umount`, unmounts it
    /// and drops the client's keyring and auth entity.
    pub fn client_clean_up(
        &self,
        fuse_clients: &[Arc<dyn Node>],
        kernel_clients: &[Arc<dyn Node>],
        mounting_dir: &str,
        umount: bool,
        client_name: Option<&str>,
    ) -> Result<(), FsError> {
        let clients = fuse_clients
            .iter()
            .map(|c| (c, true))
            .chain(kernel_clients.iter().map(|c| (c, false)));
        for (client, fuse) in clients {
            client.exec(
                &format!("rm -rf {mounting_dir}*"),
                &ExecOptions::root().long_running(true).timeout(CLEANUP_TIMEOUT),
            )?;
            if !umount {
                continue;
            }
            let unmount = if fuse {
                format!("fusermount -u {mounting_dir} -z")
            } else {
                format!("umount {mounting_dir} -l")
            };
            client.exec_command(&unmount)?;
            client.exec_command(&format!("rmdir {mounting_dir}"))?;
            let name = client_name.unwrap_or_else(|| client.hostname());
            client.exec_command(&format!("rm -rf /etc/ceph/ceph.client.{name}.keyring"))?;
            client.exec_command(&format!("ceph auth del client.{name}"))?;
            client.exec("iptables -F", &ExecOptions::root().check_ec(false))?;
            tracing::info!(host = client.hostname(), mounting_dir, "client cleaned up");
        }
        Ok(())
    }
}
