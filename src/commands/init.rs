//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::ChartDb;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResult {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    /// False when an existing config was kept
    pub config_written: bool,
}

/// Write the default configuration and create the database schema.
///
/// An existing config file is kept unless `force` is set; the schema is
/// created either way.
pub async fn cmd_init(config_path: &Path, force: bool) -> Result<InitResult> {
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_base_dir);

    let (config, config_written) = if config_path.exists() && !force {
        info!("Keeping existing config at {:?}", config_path);
        (Config::load(config_path)?, false)
    } else {
        let mut config = Config::default();
        config.init_paths(Some(base_dir));
        config.paths.config_file = config_path.to_path_buf();
        config.save()?;
        (config, true)
    };

    let db = ChartDb::connect(&config).await?;
    db.init_schema().await?;
    if !db.is_initialized().await? {
        return Err(Error::NotInitialized);
    }
    info!("Database ready at {:?}", config.paths.db_file);

    Ok(InitResult {
        config_path: config.paths.config_file.clone(),
        db_path: config.paths.db_file.clone(),
        config_written,
    })
}
