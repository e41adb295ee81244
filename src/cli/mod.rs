//! CLI command implementations

pub mod anchors;
pub mod error;
pub mod harvest;
pub mod status;

pub use anchors::AnchorsCommand;
pub use error::CliError;
pub use harvest::{Cli, Commands, HarvestArgs};
pub use status::StatusCommand;
