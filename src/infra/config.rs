use crate::domain::{ConnectionConfig, ImageSpec, ImageSpecGroup};
use crate::error::{FixtureError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_FIXTURE_FILE: &str = "fixturebox.toml";

/// Fixture file: connection parameters, images and lifecycle flags.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct FixtureConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Start containers once for the whole group instead of per test
    #[serde(default)]
    pub single_instance: bool,
    /// Pull every image before the first start
    #[serde(default)]
    pub pull_on_start: bool,
    #[serde(default)]
    pub images: Vec<ImageSpec>,
}

impl FixtureConfig {
    /// Validated image group; fails when no image is declared.
    pub fn image_group(&self) -> Result<ImageSpecGroup> {
        ImageSpecGroup::new(self.images.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Yaml,
}

fn format_of(path: &Path) -> Result<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Ok(Format::Toml),
        Some("yml") | Some("yaml") => Ok(Format::Yaml),
        _ => Err(FixtureError::Config(format!(
            "extensão de {:?} não suportada (use .toml, .yml ou .yaml)",
            path
        ))),
    }
}

/// Expands `~` and `$VAR` in a user-supplied path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw.trim())
        .map_err(|e| FixtureError::Config(format!("expandindo {raw:?}: {e}")))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

pub fn load_fixture_config(path: &Path) -> Result<FixtureConfig> {
    if !path.exists() {
        return Err(FixtureError::Config(format!(
            "arquivo de fixtures não encontrado em {:?}",
            path
        )));
    }

    let format = format_of(path)?;
    let content = fs::read_to_string(path)?;
    let config = parse_fixture_config(&content, format, path)?;

    info!(
        "  Carregadas {} imagem(ns) de {:?}",
        config.images.len(),
        path
    );
    Ok(config)
}

fn parse_fixture_config(content: &str, format: Format, path: &Path) -> Result<FixtureConfig> {
    if content.trim().is_empty() {
        debug!("{:?} vazio, usando configuração padrão", path);
        return Ok(FixtureConfig::default());
    }

    let parse_error = |reason: String| FixtureError::Parse {
        path: path.to_path_buf(),
        reason,
    };

    let config: FixtureConfig = match format {
        Format::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string()))?,
        Format::Yaml => serde_yml::from_str(content).map_err(|e| parse_error(e.to_string()))?,
    };

    for image in &config.images {
        image.validate()?;
    }

    Ok(config)
}
