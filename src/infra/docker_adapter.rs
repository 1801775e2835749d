use crate::domain::{
    ConnectionMode, ContainerConfig, ContainerEngine, ContainerInfo, ExecOutput,
    ExplicitConnection, PortSpec,
};
use crate::error::{FixtureError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

static AUTH_DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Engine client that drives the `docker` CLI (or a compatible binary).
pub struct DockerCliAdapter {
    runtime_bin: String,
    mode: ConnectionMode,
    closed: AtomicBool,
    /// Private client config holding registry credentials, created on first pull
    auth_dir: Mutex<Option<PathBuf>>,
}

impl DockerCliAdapter {
    pub fn new(runtime_bin: impl Into<String>, mode: ConnectionMode) -> Self {
        Self {
            runtime_bin: runtime_bin.into(),
            mode,
            closed: AtomicBool::new(false),
            auth_dir: Mutex::new(None),
        }
    }

    pub fn ambient(runtime_bin: impl Into<String>) -> Self {
        Self::new(runtime_bin, ConnectionMode::Ambient)
    }

    pub fn mode(&self) -> &ConnectionMode {
        &self.mode
    }

    pub fn runtime_bin(&self) -> &str {
        &self.runtime_bin
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flags placed before the subcommand on every invocation.
    pub fn global_args(&self) -> Vec<String> {
        match &self.mode {
            ConnectionMode::Ambient => Vec::new(),
            ConnectionMode::Explicit(conn) => explicit_args(conn),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(FixtureError::Closed);
        }
        Ok(())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.runtime_bin);
        cmd.args(self.global_args());
        cmd
    }

    fn run<I, S>(&self, args: I, operation: &str) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.ensure_open()?;
        let mut cmd = self.command();
        cmd.args(args);
        self.output(cmd, operation)
    }

    fn output(&self, mut cmd: Command, operation: &str) -> Result<Output> {
        debug!("{operation}: {:?}", cmd);
        cmd.output().map_err(|e| self.spawn_error(operation, e))
    }

    fn spawn_error(&self, operation: &str, e: std::io::Error) -> FixtureError {
        if e.kind() == ErrorKind::NotFound {
            FixtureError::engine(
                operation,
                format!("binário '{}' não encontrado no PATH", self.runtime_bin),
            )
        } else {
            FixtureError::engine(operation, e.to_string())
        }
    }

    fn explicit_auth(&self) -> Option<&ExplicitConnection> {
        match &self.mode {
            ConnectionMode::Explicit(conn) if conn.auth.has_credentials() => Some(conn),
            _ => None,
        }
    }

    /// Logs into the registry once, into a private config directory so the
    /// user's own credential store is left untouched.
    fn ensure_login(&self) -> Result<Option<PathBuf>> {
        let Some(conn) = self.explicit_auth() else {
            return Ok(None);
        };

        let mut guard = self
            .auth_dir
            .lock()
            .map_err(|_| FixtureError::engine("login", "lock de credenciais envenenado"))?;
        if let Some(dir) = guard.as_ref() {
            return Ok(Some(dir.clone()));
        }

        let dir = std::env::temp_dir().join(format!(
            "fixturebox-auth-{}-{}",
            std::process::id(),
            AUTH_DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir)?;

        if let Err(e) = self.login(conn, &dir) {
            if let Err(rm) = std::fs::remove_dir_all(&dir) {
                warn!("Falha ao remover credenciais temporárias {:?}: {}", dir, rm);
            }
            return Err(e);
        }

        *guard = Some(dir.clone());
        Ok(Some(dir))
    }

    /// `login --password-stdin` with the client config pointed at `dir`.
    /// The child is always waited on, so its stderr explains a failure even
    /// when it exits before reading the password.
    fn login(&self, conn: &ExplicitConnection, dir: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.envs(auth_env(dir));
        cmd.arg("login");
        if let Some(server) = &conn.auth.server_address {
            cmd.arg(server);
        }
        cmd.args(["--username", &conn.auth.username, "--password-stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(" Autenticando no registry como {}", conn.auth.username);
        let mut child = cmd.spawn().map_err(|e| self.spawn_error("login", e))?;

        // the pipe closes when `stdin` drops, so the child sees EOF
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(conn.auth.password.as_bytes()),
            None => Ok(()),
        };
        let output = child
            .wait_with_output()
            .map_err(|e| self.spawn_error("login", e))?;

        if !output.status.success() {
            return Err(FixtureError::engine("login", stderr_of(&output)));
        }
        if let Err(e) = written {
            return Err(FixtureError::engine(
                "login",
                format!("senha não entregue ao engine: {e}"),
            ));
        }

        debug!("Login concluído, credenciais em {:?}", dir);
        Ok(())
    }
}

impl fmt::Debug for DockerCliAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerCliAdapter")
            .field("runtime_bin", &self.runtime_bin)
            .field("mode", &self.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ContainerEngine for DockerCliAdapter {
    fn pull_image(&self, image: &str) -> Result<()> {
        self.ensure_open()?;
        let auth_dir = self.ensure_login()?;

        let mut cmd = self.command();
        if let Some(dir) = &auth_dir {
            cmd.envs(auth_env(dir));
        }
        cmd.args(["pull", "--quiet", image]);

        let output = self.output(cmd, &format!("pull de {image}"))?;
        ensure_success(&output, &format!("pull de {image}"))
    }

    fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        let output = self.run(create_args(config), &format!("criando container de {}", config.image))?;

        if !output.status.success() {
            let stderr = stderr_of(&output);
            if is_missing_image(&stderr) {
                return Err(FixtureError::ImageNotFound {
                    image: config.image.clone(),
                });
            }
            return Err(FixtureError::engine(
                format!("criando container de {}", config.image),
                stderr,
            ));
        }

        let id = String::from_utf8_lossy(&output.stdout)
            .lines()
            .last()
            .unwrap_or_default()
            .trim()
            .to_string();
        if id.is_empty() {
            return Err(FixtureError::engine(
                "criando container",
                "engine não retornou o id do container",
            ));
        }

        Ok(id)
    }

    fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        let operation = format!("inspecionando container {id}");
        let output = self.run(["container", "inspect", id], &operation)?;
        check_container_output(&output, id, &operation)?;
        parse_inspect(&String::from_utf8_lossy(&output.stdout))
    }

    fn start_container(&self, id: &str) -> Result<()> {
        let operation = format!("iniciando container {id}");
        let output = self.run(["start", id], &operation)?;
        check_container_output(&output, id, &operation)
    }

    fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput> {
        let operation = format!("exec em {id}");
        let mut args = vec!["exec".to_string(), id.to_string()];
        args.extend(cmd.iter().cloned());

        let output = self.run(args, &operation)?;
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() && is_missing_container(&stderr) {
            return Err(FixtureError::ContainerNotFound { id: id.to_string() });
        }

        Ok(ExecOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
        })
    }

    fn kill_container(&self, id: &str) -> Result<()> {
        let operation = format!("matando container {id}");
        let output = self.run(["kill", id], &operation)?;
        check_container_output(&output, id, &operation)
    }

    fn remove_container(&self, id: &str) -> Result<()> {
        let operation = format!("removendo container {id}");
        let output = self.run(["rm", "--force", "--volumes", id], &operation)?;
        check_container_output(&output, id, &operation)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(FixtureError::Closed);
        }

        if let Ok(mut guard) = self.auth_dir.lock() {
            if let Some(dir) = guard.take() {
                if let Err(e) = std::fs::remove_dir_all(&dir) {
                    warn!("Falha ao remover credenciais temporárias {:?}: {}", dir, e);
                }
            }
        }

        debug!("Conexão com {} encerrada", self.runtime_bin);
        Ok(())
    }
}

fn explicit_args(conn: &ExplicitConnection) -> Vec<String> {
    let mut args = Vec::new();
    if !conn.host.is_empty() {
        args.push("--host".to_string());
        args.push(conn.host.clone());
    }
    args.push("--tlsverify".to_string());
    for (flag, path) in [
        ("--tlscacert", &conn.tls.ca),
        ("--tlscert", &conn.tls.cert),
        ("--tlskey", &conn.tls.key),
    ] {
        args.push(flag.to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    args
}

fn auth_env(dir: &Path) -> [(&'static str, PathBuf); 2] {
    [
        ("DOCKER_CONFIG", dir.to_path_buf()),
        ("REGISTRY_AUTH_FILE", dir.join("auth.json")),
    ]
}

/// Arguments for `<bin> create ...`, excluding global flags.
pub fn create_args(config: &ContainerConfig) -> Vec<String> {
    let mut args: Vec<String> = vec!["create".into(), "--pull".into(), "never".into()];

    for port in &config.exposed_ports {
        args.push("--expose".into());
        args.push(port.to_string());
    }

    for (container_port, binding) in &config.port_bindings {
        let host_port = binding
            .host_port
            .map(|p| p.to_string())
            .unwrap_or_default();
        args.push("--publish".into());
        args.push(format!("{}:{}:{}", binding.host_ip, host_port, container_port));
    }

    args.push(config.image.clone());
    args.extend(config.cmd.iter().cloned());
    args
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn ensure_success(output: &Output, context: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(FixtureError::engine(context, stderr_of(output)))
}

fn check_container_output(output: &Output, id: &str, operation: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = stderr_of(output);
    if is_missing_container(&stderr) {
        return Err(FixtureError::ContainerNotFound { id: id.to_string() });
    }
    Err(FixtureError::engine(operation, stderr))
}

pub fn is_missing_image(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such image")
        || lower.contains("unable to find image")
        || lower.contains("image not known")
}

pub fn is_missing_container(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container") || lower.contains("no container with name or id")
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectDocument {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    config: Option<InspectConfig>,
    #[serde(default)]
    state: Option<InspectState>,
    #[serde(default)]
    network_settings: Option<InspectNetwork>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    image: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectNetwork {
    #[serde(default)]
    ports: Option<HashMap<String, Option<Vec<InspectBinding>>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectBinding {
    #[serde(default)]
    host_port: String,
}

/// Parses `container inspect` JSON (an array with one document).
pub fn parse_inspect(json: &str) -> Result<ContainerInfo> {
    let docs: Vec<InspectDocument> = serde_json::from_str(json)
        .map_err(|e| FixtureError::engine("inspect", format!("JSON inválido: {e}")))?;
    let doc = docs
        .into_iter()
        .next()
        .ok_or_else(|| FixtureError::engine("inspect", "saída vazia"))?;

    let mut ports: BTreeMap<PortSpec, Vec<u16>> = BTreeMap::new();
    let published = doc
        .network_settings
        .and_then(|n| n.ports)
        .unwrap_or_default();
    for (key, bindings) in published {
        let Ok(spec) = key.parse::<PortSpec>() else {
            continue;
        };
        let entry = ports.entry(spec).or_default();
        for binding in bindings.unwrap_or_default() {
            if let Ok(port) = binding.host_port.parse::<u16>() {
                if !entry.contains(&port) {
                    entry.push(port);
                }
            }
        }
    }

    Ok(ContainerInfo {
        id: doc.id,
        name: doc.name.trim_start_matches('/').to_string(),
        image: doc.config.map(|c| c.image).unwrap_or_default(),
        status: doc.state.map(|s| s.status).unwrap_or_default(),
        ports,
    })
}
