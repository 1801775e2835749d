use crate::infra::{ConnectionBuilder, load_fixture_config};
use crate::services::FixtureManager;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

pub fn pull(config_path: &Path) -> Result<()> {
    let config = load_fixture_config(config_path)?;
    let group = config.image_group()?;
    let engine = ConnectionBuilder::new(config.connection.clone()).build()?;
    let manager = FixtureManager::new(Arc::new(engine), group);

    let pulled = manager.pull_images().context("baixando imagens");
    manager.close()?;
    pulled?;

    println!("✅ Imagens prontas");
    Ok(())
}
