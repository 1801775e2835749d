use crate::infra::connection_builder::DOCKER_HOST_ENV;
use crate::infra::{ConnectionBuilder, load_fixture_config};
use anyhow::{Context, Result};
use std::path::Path;

/// Validates the fixture file and shows what would be started.
pub fn check(config_path: &Path) -> Result<()> {
    let config = load_fixture_config(config_path)?;
    let group = config
        .image_group()
        .with_context(|| format!("validando imagens de {:?}", config_path))?;

    let docker_host = std::env::var(DOCKER_HOST_ENV).ok();
    let mode = ConnectionBuilder::new(config.connection.clone())
        .resolve(docker_host.as_deref())
        .context("resolvendo conexão com o engine")?;

    println!("🔌 Conexão: {} via '{}'", mode, config.connection.runtime_bin);
    println!(
        "🔁 Ciclo: {}",
        if config.single_instance {
            "instância única"
        } else {
            "por teste"
        }
    );
    println!("📦 Imagens:");
    for image in group.iter() {
        let ports: Vec<String> = image.ports.iter().map(|p| p.to_string()).collect();
        println!(
            "- {:<30} | portas [{}] | {} init cmd(s) | delay {}ms",
            image.name,
            ports.join(", "),
            image.init_cmds.len(),
            image.init_delay_ms
        );
    }

    Ok(())
}
