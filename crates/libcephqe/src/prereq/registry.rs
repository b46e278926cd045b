//! Local secure registry on the installer, for disconnected installs.
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::PrereqError;
use crate::cli::containers::{Container, Registry, RunArgs};
use crate::cli::packages::Package;
use crate::config::RegistryCredentials;
use crate::node::{shell_quote, CmdOutput, ExecOptions, Node};

const REGISTRY_PATH: &str = "/opt/registry";
const CA_TRUST_ANCHORS_PATH: &str = "/etc/pki/ca-trust/source/anchors/";
const SKOPEO_IMAGE: &str = "registry.redhat.io/rhel8/skopeo:8.5-8";
const PRIVATE_REGISTRY_NAME: &str = "myprivateregistry";
const PRIVATE_REGISTRY_PORT: &str = "5000:5000";
const SCP_TIMEOUT: Duration = Duration::from_secs(800);

fn domain_key() -> String {
    format!("{REGISTRY_PATH}/certs/domain.key")
}

fn domain_crt() -> String {
    format!("{REGISTRY_PATH}/certs/domain.crt")
}

fn domain_cert() -> String {
    format!("{REGISTRY_PATH}/certs/domain.cert")
}

/// Private registry to stand up on the installer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivateRegistry {
    pub username: String,
    pub password: String,
    /// Image the registry itself runs from, e.g. `docker.io/library/registry:2`
    pub registry_image: String,
    /// Images mirrored from the source registry
    pub images: Vec<String>,
}

/// `skopeo copy` between two registries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkopeoCopy {
    pub src_image: String,
    pub dst_image: String,
    pub src_creds: Option<String>,
    pub dst_cert_dir: Option<String>,
    pub dest_creds: Option<String>,
    pub remove_signatures: bool,
}

pub fn generate_skopeo_copy_cmd(copy: &SkopeoCopy) -> String {
    let mut cmd = String::from("skopeo copy");
    if copy.remove_signatures {
        cmd.push_str(" --remove-signatures");
    }
    if let Some(creds) = &copy.src_creds {
        cmd.push_str(&format!(" --src-creds {creds}"));
    }
    if let Some(dir) = &copy.dst_cert_dir {
        cmd.push_str(&format!(" --dest-cert-dir={dir}"));
    }
    if let Some(creds) = &copy.dest_creds {
        cmd.push_str(&format!(" --dest-creds {creds}"));
    }
    cmd.push_str(&format!(" docker://{} docker://{}", copy.src_image, copy.dst_image));
    cmd
}

/// Runs a command expected to print nothing on success.
fn quiet(node: &dyn Node, cmd: &str, what: &str) -> Result<CmdOutput, PrereqError> {
    quiet_with(node, cmd, &ExecOptions::root(), what)
}

fn quiet_with(node: &dyn Node, cmd: &str, opts: &ExecOptions, what: &str) -> Result<CmdOutput, PrereqError> {
    let out = node.exec(cmd, opts)?;
    if !out.trimmed().is_empty() {
        return Err(PrereqError::PrivateRegistry(format!(
            "{what} on {}: {}",
            node.hostname(),
            out.trimmed()
        )));
    }
    Ok(out)
}

pub fn create_registry_directories(node: &dyn Node) -> Result<(), PrereqError> {
    quiet(
        node,
        &format!("mkdir -p {REGISTRY_PATH}/{{auth,certs,data}}"),
        "failed to create registry directories",
    )?;
    Ok(())
}

/// htpasswd credentials for the private registry.
pub fn set_registry_credentials(node: &dyn Node, username: &str, password: &str) -> Result<(), PrereqError> {
    Package::new(node).install("httpd-tools", false, &[])?;
    quiet_with(
        node,
        &format!(
            "htpasswd -bBc {REGISTRY_PATH}/auth/htpasswd {} {}",
            shell_quote(username),
            shell_quote(password)
        ),
        &ExecOptions::root().secret(password),
        "failed to create registry credentials",
    )?;
    Ok(())
}

/// Self signed certificate with the node's hostname as subject alt name.
pub fn create_self_signed_certificate(node: &dyn Node) -> Result<(), PrereqError> {
    Package::new(node).install("openssl", false, &[])?;
    let host = node.hostname();
    let cmd = format!(
        "openssl req -newkey rsa:4096 -nodes -sha256 -keyout {} -x509 -days 365 -out {} \
         -addext \"subjectAltName = DNS:{host}\" -subj \"/C=IN/ST=ST/L=XYZ/O=ORG/CN={host}\"",
        domain_key(),
        domain_crt()
    );
    quiet(node, &cmd, "failed to create a self-signed certificate")?;
    Ok(())
}

/// skopeo looks for certificates with the `.cert` extension.
pub fn create_link_to_domain_cert(node: &dyn Node) -> Result<(), PrereqError> {
    let out = node.exec(
        &format!("ln -s {} {}", domain_crt(), domain_cert()),
        &ExecOptions::root().check_ec(false),
    )?;
    let text = out.to_string();
    if !out.success() && !text.contains("File exists") {
        return Err(PrereqError::PrivateRegistry(format!(
            "failed to link the domain certificate on {}: {}",
            node.hostname(),
            text.trim()
        )));
    }
    Ok(())
}

pub fn update_ca_trust(node: &dyn Node) -> Result<(), PrereqError> {
    quiet(node, "update-ca-trust", "failed to update the ca trust")?;
    Ok(())
}

pub fn add_cert_to_trusted_list(node: &dyn Node) -> Result<(), PrereqError> {
    quiet(
        node,
        &format!("cp {} {CA_TRUST_ANCHORS_PATH}", domain_crt()),
        "failed to add the certificate to the trusted list",
    )?;
    update_ca_trust(node)
}

/// Checks that `node` trusts the certificate of `registry_node`.
pub fn validate_trusted_list(registry_node: &dyn Node, node: &dyn Node) -> Result<(), PrereqError> {
    let host = registry_node.hostname();
    let out = node.exec(
        &format!("trust list | grep -i {host}"),
        &ExecOptions::root().check_ec(false),
    )?;
    if !out.stdout.contains(host) {
        return Err(PrereqError::PrivateRegistry(format!(
            "trust list of {} does not contain {host}",
            node.hostname()
        )));
    }
    Ok(())
}

/// Distributes the registry certificate to `nodes` and makes them trust it.
pub fn copy_cert_to_secondary_node(registry_node: &dyn Node, nodes: &[Arc<dyn Node>]) -> Result<(), PrereqError> {
    for node in nodes {
        let cmd = format!(
            "scp {} root@{}:{CA_TRUST_ANCHORS_PATH}",
            domain_crt(),
            node.hostname()
        );
        let out = registry_node.exec(&cmd, &ExecOptions::root().timeout(SCP_TIMEOUT))?;
        if !out.trimmed().is_empty() {
            return Err(PrereqError::PrivateRegistry(format!(
                "failed to copy the certificate to {}",
                node.hostname()
            )));
        }
        update_ca_trust(node.as_ref())?;
        validate_trusted_list(registry_node, node.as_ref())?;
    }
    Ok(())
}

pub fn start_local_private_registry(node: &dyn Node, image: &str) -> Result<(), PrereqError> {
    let args = RunArgs {
        name: Some(PRIVATE_REGISTRY_NAME.to_owned()),
        image: image.to_owned(),
        volume: vec![
            format!("{REGISTRY_PATH}/data:/var/lib/registry:z"),
            format!("{REGISTRY_PATH}/auth:/auth:z"),
            format!("{REGISTRY_PATH}/certs:/certs:z"),
        ],
        env: [
            "\"REGISTRY_AUTH=htpasswd\"",
            "\"REGISTRY_AUTH_HTPASSWD_REALM=Registry Realm\"",
            "REGISTRY_AUTH_HTPASSWD_PATH=/auth/htpasswd",
            "\"REGISTRY_HTTP_TLS_CERTIFICATE=/certs/domain.crt\"",
            "\"REGISTRY_HTTP_TLS_KEY=/certs/domain.key\"",
            "REGISTRY_COMPATIBILITY_SCHEMA1_ENABLED=true",
        ]
        .map(str::to_owned)
        .to_vec(),
        ports: Some(PRIVATE_REGISTRY_PORT.to_owned()),
        restart: Some("always".to_owned()),
        detach: true,
        ..Default::default()
    };
    Container::new(node).run(&args)?;
    tracing::info!(host = node.hostname(), image, "private registry started");
    Ok(())
}

/// Where `image` of `registry` is pulled from and the path it gets in the
/// private registry.
fn mirror_paths(registry: &str, image: &str) -> (String, String) {
    let path = image.replace(&format!("{registry}/"), "");
    let src = if path.contains(registry) {
        path.clone()
    } else {
        format!("{registry}/{path}")
    };
    (src, path)
}

/// Mirrors `images` from `source` into the private registry on `node`,
/// running skopeo in a throwaway container.
pub fn add_images_to_private_registry(
    node: &dyn Node,
    source: &RegistryCredentials,
    private: &PrivateRegistry,
) -> Result<(), PrereqError> {
    let container = Container::new(node);
    for image in &private.images {
        let (src_image, path) = mirror_paths(&source.registry, image);
        let copy = SkopeoCopy {
            src_image,
            dst_image: format!("{}:5000/{path}", node.hostname()),
            src_creds: Some(format!("{}:{}", source.username, source.password)),
            dst_cert_dir: Some("./certs/".to_owned()),
            dest_creds: Some(format!("{}:{}", private.username, private.password)),
            remove_signatures: true,
        };
        let args = RunArgs {
            image: SKOPEO_IMAGE.to_owned(),
            volume: vec![
                format!("{REGISTRY_PATH}/certs:/certs:Z"),
                format!("{}:/certs/domain.cert:Z", domain_cert()),
            ],
            rm: true,
            cmd: Some(generate_skopeo_copy_cmd(&copy)),
            ..Default::default()
        };
        container.run(&args)?;
        tracing::info!(image = %image, "image mirrored");
    }
    Ok(())
}

/// `_catalog` of the private registry on `node`.
pub fn get_private_registry_image(node: &dyn Node, username: &str, password: &str) -> Result<Value, PrereqError> {
    let cmd = format!(
        "curl -u {} https://{}:5000/v2/_catalog",
        shell_quote(&format!("{username}:{password}")),
        node.hostname()
    );
    let opts = ExecOptions::root().secret(password);
    let out = node.exec(&cmd, &opts)?;
    let cmd = opts.redact(&cmd);
    serde_json::from_str(&out.stdout).map_err(|source| PrereqError::Json { cmd, source })
}

/// Full disconnected install preparation: registry on `installer`, trusted
/// by every node, filled with the images of `source`.
pub fn setup_private_container_registry(
    installer: &dyn Node,
    nodes: &[Arc<dyn Node>],
    source: &RegistryCredentials,
    private: &PrivateRegistry,
) -> Result<Value, PrereqError> {
    create_registry_directories(installer)?;
    set_registry_credentials(installer, &private.username, &private.password)?;
    create_self_signed_certificate(installer)?;
    create_link_to_domain_cert(installer)?;
    add_cert_to_trusted_list(installer)?;
    validate_trusted_list(installer, installer)?;
    copy_cert_to_secondary_node(installer, nodes)?;
    for node in nodes {
        Registry::new(node.as_ref()).login(&source.registry, &source.username, &source.password)?;
    }
    start_local_private_registry(installer, &private.registry_image)?;
    add_images_to_private_registry(installer, source, private)?;
    let catalog = get_private_registry_image(installer, &private.username, &private.password)?;
    tracing::info!(installer = installer.hostname(), %catalog, "private registry ready");
    Ok(catalog)
}
