//! Rendering of command line options.
use std::fmt;

/// Value of a single command line option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// `true` renders the bare option, `false` drops it
    Flag(bool),
    Value(String),
    /// The option repeated once per value
    List(Vec<String>),
    None,
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Flag(b)
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Value(s.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Value(s)
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(v: Vec<String>) -> Self {
        ArgValue::List(v)
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ArgValue::None, Into::into)
    }
}

/// Renders `kw` in order as ` <separator><key>[ <value>]`.
pub fn build_cmd_args(separator: &str, kw: &[(&str, ArgValue)]) -> String {
    let mut out = String::new();
    for (key, value) in kw {
        match value {
            ArgValue::Flag(true) => out.push_str(&format!(" {separator}{key}")),
            ArgValue::Flag(false) | ArgValue::None => {}
            ArgValue::Value(v) => out.push_str(&format!(" {separator}{key} {v}")),
            ArgValue::List(vs) => {
                for v in vs {
                    out.push_str(&format!(" {separator}{key} {v}"));
                }
            }
        }
    }
    out
}

/// [`build_cmd_args`] with the `--` separator.
pub fn format_command_options(kw: &[(&str, ArgValue)]) -> String {
    build_cmd_args("--", kw)
}

/// Incremental builder for a single command line.
///
/// ```
/// use libcephqe::cli::CmdLine;
///
/// let cmd = CmdLine::new("ceph fs subvolume create")
///     .arg("cephfs")
///     .arg("sv1")
///     .opt("--group_name", Some("g1"))
///     .opt("--size", None::<u64>)
///     .flag("--namespace-isolated", true);
/// assert_eq!(
///     cmd.to_string(),
///     "ceph fs subvolume create cephfs sv1 --group_name g1 --namespace-isolated"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdLine(String);

impl CmdLine {
    pub fn new(base: &str) -> Self {
        Self(base.to_owned())
    }

    pub fn arg(mut self, arg: impl fmt::Display) -> Self {
        self.0.push_str(&format!(" {arg}"));
        self
    }

    /// Positional argument, dropped when `None`.
    pub fn maybe<T: fmt::Display>(self, arg: Option<T>) -> Self {
        match arg {
            Some(a) => self.arg(a),
            None => self,
        }
    }

    /// ` <flag> <value>` when `value` is set.
    pub fn opt<T: fmt::Display>(mut self, flag: &str, value: Option<T>) -> Self {
        if let Some(v) = value {
            self.0.push_str(&format!(" {flag} {v}"));
        }
        self
    }

    /// ` <flag>=<value>` when `value` is set.
    pub fn opt_eq<T: fmt::Display>(mut self, flag: &str, value: Option<T>) -> Self {
        if let Some(v) = value {
            self.0.push_str(&format!(" {flag}={v}"));
        }
        self
    }

    pub fn flag(mut self, flag: &str, enabled: bool) -> Self {
        if enabled {
            self.0.push_str(&format!(" {flag}"));
        }
        self
    }

    /// Appends `s` verbatim, without a separating space.
    pub fn raw(mut self, s: &str) -> Self {
        self.0.push_str(s);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CmdLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CmdLine> for String {
    fn from(c: CmdLine) -> Self {
        c.0
    }
}
