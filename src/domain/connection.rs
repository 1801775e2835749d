use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_RUNTIME_BIN: &str = "docker";

fn default_runtime_bin() -> String {
    DEFAULT_RUNTIME_BIN.to_string()
}

/// Daemon / registry connection parameters. Empty strings mean "unset".
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub server_address: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub cert_path: String,
    /// Engine CLI binary (`docker` or `podman`)
    #[serde(default = "default_runtime_bin")]
    pub runtime_bin: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            email: String::new(),
            username: String::new(),
            password: String::new(),
            cert_path: String::new(),
            runtime_bin: default_runtime_bin(),
        }
    }
}

impl ConnectionConfig {
    /// True when no address, credential or certificate field is set.
    pub fn is_empty(&self) -> bool {
        self.server_address.is_empty()
            && self.email.is_empty()
            && self.username.is_empty()
            && self.password.is_empty()
            && self.cert_path.is_empty()
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("server_address", &self.server_address)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("cert_path", &self.cert_path)
            .field("runtime_bin", &self.runtime_bin)
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "***" }
}

/// Registry credential used before pulls in explicit mode.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub email: String,
    pub username: String,
    pub password: String,
    /// Only set when the config carried a non-empty server address
    pub server_address: Option<String>,
}

impl RegistryAuth {
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("server_address", &self.server_address)
            .finish()
    }
}

/// Mutual-TLS material found in a docker cert directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitConnection {
    /// Daemon address as the CLI expects it (`tcp://host:port`, `unix://...`)
    pub host: String,
    pub tls: TlsMaterial,
    pub auth: RegistryAuth,
}

/// How the engine CLI reaches its daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Inherit DOCKER_HOST and friends from the environment
    Ambient,
    Explicit(ExplicitConnection),
}

impl ConnectionMode {
    pub fn is_ambient(&self) -> bool {
        matches!(self, Self::Ambient)
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ambient => write!(f, "ambiente"),
            Self::Explicit(conn) => write!(f, "explícito ({})", conn.host),
        }
    }
}
