//! Error types for fixture provisioning.

use std::path::PathBuf;

/// Result type alias for fixture operations.
pub type Result<T> = std::result::Result<T, FixtureError>;

/// Errors raised while building a connection or driving fixture containers.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Connection or fixture configuration is unusable.
    #[error("configuração inválida: {0}")]
    Config(String),

    /// Certificate directory (or a file inside it) does not exist.
    #[error("caminho de certificado não definido ou inexistente: {}", .path.display())]
    MissingCertPath { path: PathBuf },

    /// Port token is not `<port>[/proto]`.
    #[error("porta inválida '{token}': {reason}")]
    InvalidPort { token: String, reason: String },

    /// Image spec or group violates an invariant.
    #[error("especificação inválida: {0}")]
    InvalidSpec(String),

    /// Fixture file could not be parsed.
    #[error("falha ao interpretar {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    // =========================================================================
    // Engine Errors
    // =========================================================================
    /// Image is not present locally; recoverable by pulling.
    #[error("imagem não encontrada localmente: {image}")]
    ImageNotFound { image: String },

    /// Image still missing after a pull-and-retry cycle.
    #[error("imagem '{image}' continua indisponível após {retries} pull(s)")]
    ImageUnavailable { image: String, retries: u32 },

    /// Container id unknown to the engine.
    #[error("container não encontrado: {id}")]
    ContainerNotFound { id: String },

    /// Engine call failed (daemon unreachable, bad request, exec failure).
    #[error("falha em {operation}: {reason}")]
    Engine { operation: String, reason: String },

    /// Engine connection was already closed.
    #[error("conexão com o engine já foi encerrada")]
    Closed,

    // =========================================================================
    // Cleanup Errors
    // =========================================================================
    /// One or more containers could not be removed during teardown.
    #[error("falha ao remover {} container(s): {}", .failures.len(), summarize(.failures))]
    Cleanup { failures: Vec<CleanupFailure> },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A container that survived teardown, with the engine's reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub container_id: String,
    pub reason: String,
}

fn summarize(failures: &[CleanupFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.container_id, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

impl FixtureError {
    pub(crate) fn engine(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Engine {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// True for configuration problems detected before any engine call.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::MissingCertPath { .. }
                | Self::InvalidPort { .. }
                | Self::InvalidSpec(_)
                | Self::Parse { .. }
        )
    }
}
