use crate::error::{FixtureError, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Sctp => "sctp",
        }
    }
}

/// A container port token, `<port>[/proto]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct PortSpec {
    pub port: u16,
    pub protocol: Protocol,
}

impl PortSpec {
    pub const fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }
}

impl FromStr for PortSpec {
    type Err = FixtureError;

    fn from_str(token: &str) -> Result<Self> {
        let invalid = |reason: &str| FixtureError::InvalidPort {
            token: token.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = token.trim();
        let (port, proto) = match trimmed.split_once('/') {
            Some((port, proto)) => (port, Some(proto)),
            None => (trimmed, None),
        };

        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("esperado <porta>[/protocolo]"));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| invalid("porta fora do intervalo 1-65535"))?;
        if port == 0 {
            return Err(invalid("porta fora do intervalo 1-65535"));
        }

        let protocol = match proto.map(str::to_ascii_lowercase).as_deref() {
            None | Some("tcp") => Protocol::Tcp,
            Some("udp") => Protocol::Udp,
            Some("sctp") => Protocol::Sctp,
            Some(_) => return Err(invalid("protocolo deve ser tcp, udp ou sctp")),
        };

        Ok(Self { port, protocol })
    }
}

impl TryFrom<String> for PortSpec {
    type Error = FixtureError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol.as_str())
    }
}

/// Command executed inside a running container after start.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InitCommand {
    pub cmd: Vec<String>,
}

impl InitCommand {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
        }
    }
}

/// Declarative description of one fixture container.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageSpec {
    /// Image reference, e.g. `couchbase:latest`
    pub name: String,
    /// Run command handed to the container
    #[serde(default)]
    pub config_cmds: Vec<String>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub init_cmds: Vec<InitCommand>,
    /// Delay after start and after every init command
    #[serde(default)]
    pub init_delay_ms: u64,
}

impl ImageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_cmds: Vec::new(),
            ports: Vec::new(),
            init_cmds: Vec::new(),
            init_delay_ms: 0,
        }
    }

    pub fn with_config_cmds<I, S>(mut self, cmds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config_cmds = cmds.into_iter().map(Into::into).collect();
        self
    }

    /// Parses and adds port tokens; fails on the first malformed one.
    pub fn with_ports<I, S>(mut self, ports: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in ports {
            self.ports.push(token.as_ref().parse()?);
        }
        Ok(self)
    }

    pub fn with_init_cmd(mut self, cmd: InitCommand) -> Self {
        self.init_cmds.push(cmd);
        self
    }

    pub fn with_init_delay_ms(mut self, delay: u64) -> Self {
        self.init_delay_ms = delay;
        self
    }

    pub fn init_delay(&self) -> Duration {
        Duration::from_millis(self.init_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FixtureError::InvalidSpec(
                "imagem sem campo 'name'".to_string(),
            ));
        }

        if self.name.chars().any(char::is_whitespace) {
            return Err(FixtureError::InvalidSpec(format!(
                "referência de imagem '{}' contém espaços",
                self.name
            )));
        }

        for (idx, init) in self.init_cmds.iter().enumerate() {
            if init.cmd.is_empty() {
                return Err(FixtureError::InvalidSpec(format!(
                    "init_cmds[{idx}] da imagem '{}' está vazio",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

/// Ordered, non-empty set of images started and torn down together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpecGroup {
    images: Vec<ImageSpec>,
}

impl ImageSpecGroup {
    pub fn new(images: Vec<ImageSpec>) -> Result<Self> {
        if images.is_empty() {
            return Err(FixtureError::InvalidSpec(
                "grupo de imagens vazio".to_string(),
            ));
        }

        for image in &images {
            image.validate()?;
        }

        Ok(Self { images })
    }

    pub fn images(&self) -> &[ImageSpec] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageSpec> {
        self.images.iter()
    }
}

impl<'a> IntoIterator for &'a ImageSpecGroup {
    type Item = &'a ImageSpec;
    type IntoIter = std::slice::Iter<'a, ImageSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}
