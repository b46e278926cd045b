use std::collections::BTreeMap;

use super::{FsError, FsUtils};
use crate::node::{CmdOutput, Node};

/// Keys of the map returned by [`FsUtils::get_stats`], in `--printf` order.
pub const STAT_KEYS: [&str; 10] = [
    "File",
    "Octal_Permission",
    "Permission",
    "Blocks",
    "Birth",
    "Access",
    "Uid",
    "Gid",
    "Size",
    "Links",
];

const STAT_FORMAT: &str = "--printf='%n,%a,%A,%b,%w,%x,%u,%g,%s,%h'";

const MAX_FILES: &str = "ceph.quota.max_files";
const MAX_BYTES: &str = "ceph.quota.max_bytes";

/// CephFS directory quota, `0` meaning unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quota {
    pub files: u64,
    pub bytes: u64,
}

impl FsUtils<'_> {
    pub fn set_xattrs(&self, client: &dyn Node, dir: &str, key: &str, value: &str) -> Result<CmdOutput, FsError> {
        self.exec(client, &format!("setfattr -n {key} -v {value} {dir}"))
    }

    pub fn get_xattrs(&self, client: &dyn Node, dir: &str, key: &str) -> Result<String, FsError> {
        let out = self.exec(client, &format!("getfattr --only-values -n {key} {dir}"))?;
        Ok(out.trimmed().to_owned())
    }

    pub fn rm_xattrs(&self, client: &dyn Node, dir: &str, key: &str) -> Result<CmdOutput, FsError> {
        self.exec(client, &format!("setfattr -x {key} {dir}"))
    }

    /// Sets the limits that are given, leaving the others untouched.
    pub fn set_quota_attrs(
        &self,
        client: &dyn Node,
        files: Option<u64>,
        bytes: Option<u64>,
        dir: &str,
    ) -> Result<(), FsError> {
        if let Some(files) = files {
            self.set_xattrs(client, dir, MAX_FILES, &files.to_string())?;
        }
        if let Some(bytes) = bytes {
            self.set_xattrs(client, dir, MAX_BYTES, &bytes.to_string())?;
        }
        Ok(())
    }

    pub fn get_quota_attrs(&self, client: &dyn Node, dir: &str) -> Result<Quota, FsError> {
        let read = |key: &str| -> Result<u64, FsError> {
            let value = self.get_xattrs(client, dir, key)?;
            if value.is_empty() {
                return Ok(0);
            }
            value
                .parse()
                .map_err(|_| FsError::Validation(format!("{key} of {dir} is not a number: {value}")))
        };
        Ok(Quota {
            files: read(MAX_FILES)?,
            bytes: read(MAX_BYTES)?,
        })
    }

    /// `stat` of `path` keyed by [`STAT_KEYS`].
    pub fn get_stats(&self, client: &dyn Node, path: &str) -> Result<BTreeMap<String, String>, FsError> {
        let out = self.exec(client, &format!("stat {path} {STAT_FORMAT}"))?;
        let stats: BTreeMap<String, String> = STAT_KEYS
            .iter()
            .zip(out.trimmed().split(','))
            .map(|(k, v)| ((*k).to_owned(), v.to_owned()))
            .collect();
        tracing::debug!(path, ?stats, "stat");
        Ok(stats)
    }

    /// `stat` of `path` with a caller supplied `--printf` format.
    pub fn get_stats_formatted(&self, client: &dyn Node, path: &str, format: &str) -> Result<String, FsError> {
        let out = self.exec(client, &format!("stat {path} --printf {format}"))?;
        Ok(out.stdout)
    }
}
