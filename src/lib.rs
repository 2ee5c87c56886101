pub mod config;
pub mod error;
pub mod metadata;
pub mod registry;
pub mod shell;
pub mod shells;
pub mod target;
pub mod test_utils;

pub use error::{ResidueError, Result};
pub use metadata::ShellMetadata;
pub use registry::ShellRegistry;
pub use shell::Shell;

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
