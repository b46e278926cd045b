//! Utility functionality
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::node::{ExecError, ExecOptions, Node};

const LOWER_DIGITS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random string of lowercase letters and digits, used to keep names of
/// volumes, mount points and clients unique per run.
pub fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| LOWER_DIGITS[rng.gen_range(0..LOWER_DIGITS.len())] as char)
        .collect()
}

/// Random alphanumeric identifier (mixed case).
pub fn generate_unique_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `prefix` followed by ten random characters.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}{}", random_string(10))
}

/// Major version of the OS on `node`, read from `/etc/os-release`.
pub fn os_major_version(node: &dyn Node) -> Result<String, ExecError> {
    let out = node.exec(
        ". /etc/os-release && echo $VERSION_ID",
        &ExecOptions::default(),
    )?;
    Ok(major_version(out.trimmed()).to_owned())
}

/// "9.2" -> "9"
pub fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}
