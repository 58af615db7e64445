//! Configuration management

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Bot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server to connect to
    pub server: ServerConfig,
    /// Who the bot is on the network
    pub identity: IdentityConfig,
    /// Behaviour once connected
    #[serde(default)]
    pub bot: BotConfig,
    /// Connection tuning
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Server address and transport security
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname or IP address
    pub host: String,
    /// Port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect over TLS
    #[serde(default)]
    pub tls: bool,
    /// Verify the server certificate. Only meaningful with `tls`.
    #[serde(default = "default_true")]
    pub tls_verify: bool,
}

/// Registration identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Nickname to register with
    pub nick: String,
    /// Username (ident)
    pub user: String,
    /// Real name
    pub name: String,
    /// Server password, sent with PASS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Bot behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Text that marks a PRIVMSG as a command
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Capabilities to request before registering
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Raw lines sent once registration completes
    #[serde(default)]
    pub commands: Vec<String>,
    /// Modules to load, by name
    #[serde(default = "default_modules")]
    pub modules: Vec<String>,
}

/// Connection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Largest unterminated line kept in the receive buffer, in bytes
    #[serde(default = "default_recv_queue_size")]
    pub recv_queue_size: usize,
    /// Seconds allowed to reach registration. 0 disables the limit.
    #[serde(default = "default_registration_timeout")]
    pub registration_timeout: u64,
}

fn default_port() -> u16 {
    6667
}

fn default_true() -> bool {
    true
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_modules() -> Vec<String> {
    vec!["help".to_string(), "welcome".to_string()]
}

fn default_recv_queue_size() -> usize {
    65536
}

fn default_registration_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_port(),
            tls: false,
            tls_verify: true,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            nick: "seabird".to_string(),
            user: "seabird".to_string(),
            name: "Seabird Bot".to_string(),
            password: None,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            capabilities: Vec::new(),
            commands: Vec::new(),
            modules: default_modules(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            recv_queue_size: default_recv_queue_size(),
            registration_timeout: default_registration_timeout(),
        }
    }
}

impl ConnectionConfig {
    /// Registration deadline, if one is configured
    pub fn registration_timeout(&self) -> Option<Duration> {
        (self.registration_timeout > 0).then(|| Duration::from_secs(self.registration_timeout))
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        tracing::debug!("Loaded configuration from {:?}", path.as_ref());
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(Error::Config("Server host cannot be empty".to_string()));
        }

        if self.server.port == 0 {
            return Err(Error::Config("Port cannot be 0".to_string()));
        }

        if self.identity.nick.is_empty() || self.identity.nick.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "Invalid nickname {:?}",
                self.identity.nick
            )));
        }

        if self.identity.user.is_empty() || self.identity.user.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "Invalid username {:?}",
                self.identity.user
            )));
        }

        if self.bot.command_prefix.is_empty() {
            return Err(Error::Config("Command prefix cannot be empty".to_string()));
        }

        if let Some(cap) = self
            .bot
            .capabilities
            .iter()
            .find(|c| c.is_empty() || c.contains(char::is_whitespace))
        {
            return Err(Error::Config(format!("Invalid capability name {:?}", cap)));
        }

        if let Some(line) = self
            .bot
            .commands
            .iter()
            .find(|l| crate::message::has_line_break(l))
        {
            return Err(Error::Config(format!("Invalid command line {:?}", line)));
        }

        if self.connection.recv_queue_size < crate::message::MAX_LINE_LENGTH {
            return Err(Error::Config(format!(
                "recv_queue_size must be at least {} bytes",
                crate::message::MAX_LINE_LENGTH
            )));
        }

        if !self.server.tls_verify && !self.server.tls {
            tracing::warn!("tls_verify has no effect without tls");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bot.command_prefix, "!");
        assert_eq!(config.connection.recv_queue_size, 65536);
    }

    #[test]
    fn test_minimal_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            host = "irc.example.com"

            [identity]
            nick = "seabird"
            user = "seabird"
            name = "Seabird Bot"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 6667);
        assert!(!config.server.tls);
        assert!(config.server.tls_verify);
        assert_eq!(config.identity.password, None);
        assert_eq!(config.bot.modules, vec!["help", "welcome"]);
        assert_eq!(
            config.connection.registration_timeout(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.identity.nick = "sea bird".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bot.command_prefix.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bot.capabilities.push("multi prefix".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bot.commands.push("JOIN #a\r\nQUIT".to_string());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_timeout_disables() {
        let mut config = Config::default();
        config.connection.registration_timeout = 0;
        assert_eq!(config.connection.registration_timeout(), None);
    }
}
