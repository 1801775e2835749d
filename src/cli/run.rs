use crate::infra::load_fixture_config;
use crate::services::{FixtureLifecycle, FixtureManager};
use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process::{Command, ExitStatus};
use tracing::warn;

/// Comma-separated ids of the running fixture containers, set for the child.
pub const CONTAINERS_ENV: &str = "FIXTUREBOX_CONTAINERS";

/// Starts the fixtures, runs `command` against them and always tears down.
/// Returns the command's exit code.
pub fn run(config_path: &Path, command: &[String]) -> Result<i32> {
    let Some((program, args)) = command.split_first() else {
        bail!("nenhum comando informado. Uso: fixturebox run -- <comando> [args...]");
    };

    let config = load_fixture_config(config_path)?;
    let guard = FixtureLifecycle::from_config(&config)?
        .start()
        .context("iniciando fixtures")?;

    let status = guard.run_test(|manager| {
        print_bindings(manager);
        spawn(program, args, manager)
    });

    // teardown problems are reported but never replace the command's result
    if let Err(e) = guard.finish() {
        warn!("  Limpeza das fixtures falhou: {}", e);
    }

    let status = status?.with_context(|| format!("executando {program}"))?;
    Ok(status.code().unwrap_or(1))
}

fn spawn(program: &str, args: &[String], manager: &FixtureManager) -> std::io::Result<ExitStatus> {
    Command::new(program)
        .args(args)
        .env(CONTAINERS_ENV, manager.container_ids().join(","))
        .status()
}

fn print_bindings(manager: &FixtureManager) {
    println!("🚀 Fixtures rodando:");
    for container in manager.running_containers() {
        let ports: Vec<String> = container
            .ports
            .iter()
            .map(|(port, host)| {
                let host: Vec<String> = host.iter().map(u16::to_string).collect();
                format!("{port} -> {}", host.join("/"))
            })
            .collect();
        println!(
            "- {:<30} | {} | {}",
            container.image,
            short_id(&container.id),
            ports.join(", ")
        );
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
