use crate::domain::{
    ConnectionConfig, ConnectionMode, ExplicitConnection, RegistryAuth, TlsMaterial,
};
use crate::error::{FixtureError, Result};
use crate::infra::DockerCliAdapter;
use crate::infra::config::expand_path;
use std::path::PathBuf;
use tracing::{debug, info};

/// Environment variable that forces ambient connection mode.
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

const CA_FILE: &str = "ca.pem";
const CERT_FILE: &str = "cert.pem";
const KEY_FILE: &str = "key.pem";

/// Resolves a [`ConnectionConfig`] into an engine client.
#[derive(Debug, Clone, Default)]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Builds the client, reading `DOCKER_HOST` from the process environment.
    pub fn build(&self) -> Result<DockerCliAdapter> {
        let docker_host = std::env::var(DOCKER_HOST_ENV).ok();
        self.build_with_docker_host(docker_host.as_deref())
    }

    pub fn build_with_docker_host(&self, docker_host: Option<&str>) -> Result<DockerCliAdapter> {
        let mode = self.resolve(docker_host)?;
        info!(" Conectando ao engine '{}' em modo {}", self.config.runtime_bin, mode);
        Ok(DockerCliAdapter::new(self.config.runtime_bin.clone(), mode))
    }

    /// Picks the connection mode without opening anything.
    ///
    /// Ambient mode wins when `docker_host` is set or the config is empty.
    /// Otherwise the certificate directory must exist and hold the TLS files.
    pub fn resolve(&self, docker_host: Option<&str>) -> Result<ConnectionMode> {
        if docker_host.is_some() || self.config.is_empty() {
            debug!(
                "Modo ambiente selecionado (DOCKER_HOST={:?}, config vazia={})",
                docker_host,
                self.config.is_empty()
            );
            return Ok(ConnectionMode::Ambient);
        }

        let tls = self.load_tls_material()?;

        Ok(ConnectionMode::Explicit(ExplicitConnection {
            host: daemon_host(&self.config.server_address),
            tls,
            auth: self.registry_auth(),
        }))
    }

    fn load_tls_material(&self) -> Result<TlsMaterial> {
        if self.config.cert_path.trim().is_empty() {
            return Err(FixtureError::MissingCertPath {
                path: self.config.cert_path.clone().into(),
            });
        }

        let dir = expand_path(&self.config.cert_path)?;
        if !dir.exists() {
            return Err(FixtureError::MissingCertPath { path: dir });
        }

        let file = |name: &str| -> Result<PathBuf> {
            let path = dir.join(name);
            if !path.is_file() {
                return Err(FixtureError::MissingCertPath { path });
            }
            Ok(path)
        };

        Ok(TlsMaterial {
            ca: file(CA_FILE)?,
            cert: file(CERT_FILE)?,
            key: file(KEY_FILE)?,
        })
    }

    fn registry_auth(&self) -> RegistryAuth {
        let server_address = if self.config.server_address.is_empty() {
            None
        } else {
            Some(self.config.server_address.clone())
        };

        RegistryAuth {
            email: self.config.email.clone(),
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            server_address,
        }
    }
}

/// Daemon address in the form the CLI accepts; http(s) becomes tcp.
pub fn daemon_host(server_address: &str) -> String {
    let trimmed = server_address.trim();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = trimmed.strip_prefix(scheme) {
            return format!("tcp://{}", rest.trim_end_matches('/'));
        }
    }
    trimmed.to_string()
}
