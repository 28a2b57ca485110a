//! Server configuration
//!
//! Built from command line flags, with a `PORT` environment override.

use std::time::Duration;

use crate::error::ChatError;
use crate::idle::DEFAULT_IDLE_TIMEOUT;

/// Default listen port
pub const DEFAULT_PORT: u16 = 4000;

/// Default listen host (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Inactivity limit per session
    pub idle_timeout: Duration,
    /// Confirm routed DMs back to the sender
    pub dm_echo: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            dm_echo: false,
        }
    }
}

impl ServerConfig {
    /// Read the process arguments and `PORT`
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_args(std::env::args().skip(1), std::env::var("PORT").ok())
    }

    /// Parse flags, then apply the environment port
    ///
    /// Flags: `--port <n>`, `--host <addr>`, `--idle-timeout <secs>`,
    /// `--dm-echo`. A valid `env_port` overrides `--port`; an invalid
    /// one is ignored.
    pub fn from_args<I>(args: I, env_port: Option<String>) -> Result<Self, ChatError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();

        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--port" => {
                    let value = args.next().ok_or(ChatError::MissingFlagValue(flag))?;
                    config.port = parse_port(&value)?;
                }
                "--host" => {
                    config.host = args.next().ok_or(ChatError::MissingFlagValue(flag))?;
                }
                "--idle-timeout" => {
                    let value = args.next().ok_or(ChatError::MissingFlagValue(flag))?;
                    config.idle_timeout = parse_timeout(&value)?;
                }
                "--dm-echo" => config.dm_echo = true,
                _ => return Err(ChatError::UnknownFlag(flag)),
            }
        }

        if let Some(port) = env_port.as_deref().and_then(|p| parse_port(p).ok()) {
            config.port = port;
        }

        Ok(config)
    }

    /// `host:port` for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a port number in 1..=65535
pub fn parse_port(value: &str) -> Result<u16, ChatError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ChatError::InvalidPort(value.to_string())),
    }
}

/// Parse a positive number of seconds
pub fn parse_timeout(value: &str) -> Result<Duration, ChatError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ChatError::InvalidTimeout(value.to_string())),
    }
}
