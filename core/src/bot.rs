//! The bot: configuration plus loaded modules, run over one connection

use crate::connection::{self, Connection};
use crate::module::{Module, ModuleManager};
use crate::{Config, Error, Result};
use tokio::io::{AsyncRead, AsyncWrite};

pub struct Bot {
    config: Config,
    modules: ModuleManager,
}

impl Bot {
    /// Create a bot from a validated configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let modules = ModuleManager::new(&config.bot.command_prefix);
        Ok(Self { config, modules })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn modules(&self) -> &ModuleManager {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut ModuleManager {
        &mut self.modules
    }

    /// Load a module. Must happen before connecting.
    pub fn load_module<M: Module>(&mut self, module: M) -> Result<()> {
        self.modules.load_module(module)
    }

    /// Ask for a capability on every future connection
    pub fn request_capability(&mut self, cap: &str) -> Result<()> {
        if cap.is_empty() || cap.contains(char::is_whitespace) {
            return Err(Error::Usage(format!("Invalid capability name {:?}", cap)));
        }
        if !self.config.bot.capabilities.iter().any(|c| c == cap) {
            self.config.bot.capabilities.push(cap.to_string());
        }
        Ok(())
    }

    /// Connect to the configured server and run until disconnected
    pub async fn run(&mut self) -> Result<()> {
        let stream = connection::connect(&self.config.server).await?;
        self.run_with_stream(stream).await
    }

    /// Run one connection over an already established stream
    pub async fn run_with_stream<S>(&mut self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let connection = Connection::new(stream, &self.config);
        tracing::info!(
            "Session {} starting as {}",
            connection.id(),
            self.config.identity.nick
        );
        connection.run(&mut self.modules).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates() {
        let mut config = Config::default();
        config.server.host.clear();
        assert!(matches!(Bot::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_request_capability() {
        let mut bot = Bot::new(Config::default()).unwrap();
        bot.request_capability("multi-prefix").unwrap();
        bot.request_capability("multi-prefix").unwrap();
        assert_eq!(bot.config().bot.capabilities, vec!["multi-prefix"]);
        assert!(matches!(bot.request_capability("a b"), Err(Error::Usage(_))));
    }
}
