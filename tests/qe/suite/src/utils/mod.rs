pub mod support;
pub mod test_utils;
pub use support::context;
pub use test_utils::{client, fs_name, has_role, log_cleanup, MountedClient};
