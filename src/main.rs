use anyhow::Result;
use clap::{Parser, Subcommand};
use fixturebox::cli;
use fixturebox::infra::config::DEFAULT_FIXTURE_FILE;
use fixturebox::logging::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fixturebox",
    about = "Containers descartáveis para testes de integração"
)]
struct Cli {
    /// Arquivo de fixtures (.toml, .yml ou .yaml)
    #[arg(long, short, env = "FIXTUREBOX_CONFIG", default_value = DEFAULT_FIXTURE_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Valida o arquivo de fixtures e mostra a conexão resolvida
    Check,
    /// Baixa todas as imagens declaradas
    Pull,
    /// Sobe as fixtures, executa o comando e remove os containers ao final
    Run {
        /// Comando a executar (ex: fixturebox run -- cargo test)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

fn main() -> Result<()> {
    init_logging();
    let args = Cli::parse();

    match args.command {
        Commands::Check => cli::check(&args.config),
        Commands::Pull => cli::pull(&args.config),
        Commands::Run { command } => {
            let code = cli::run(&args.config, &command)?;
            std::process::exit(code);
        }
    }
}
