//! Anchors command implementation

use crate::catalog::{read_anchor_cache, AnchorCatalog};
use crate::harvester::Harvester;
use crate::shutdown::SharedShutdown;
use clap::Args;
use tracing::info;

use super::{Cli, CliError};

/// Show or refresh the anchor list cache
#[derive(Args, Debug)]
pub struct AnchorsCommand {
    /// Fetch the anchor list even if a cache exists
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    /// Print one line per anchor
    #[arg(long, default_value_t = false)]
    pub list: bool,
}

impl AnchorsCommand {
    /// Execute the anchors command
    pub async fn execute(
        &self,
        cli: &Cli,
        shutdown: SharedShutdown,
    ) -> Result<AnchorCatalog, CliError> {
        let config = cli.base_config();

        let catalog = if self.refresh || !config.anchor_cache.exists() {
            info!(path = %config.anchor_cache.display(), "Refreshing anchor cache");
            Harvester::new(config.clone())
                .with_shutdown(shutdown)
                .refresh_anchors()
                .await?
        } else {
            AnchorCatalog::new(read_anchor_cache(&config.anchor_cache)?)
        };

        if self.list {
            for anchor in &catalog.anchors {
                println!(
                    "{:>6} {:>7} {:<15} AS{:<7} {:>9.4} {:>9.4} {} {}",
                    anchor.aid,
                    anchor.pid,
                    anchor.address_v4,
                    anchor.asn_v4,
                    anchor.latitude,
                    anchor.longitude,
                    anchor.country_code,
                    anchor.city
                );
            }
        }
        println!(
            "{} anchors in {}",
            catalog.len(),
            config.anchor_cache.display()
        );
        Ok(catalog)
    }
}
