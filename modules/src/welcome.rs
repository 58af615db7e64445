//! Welcome Module
//!
//! Logs when the server confirms registration.

use seabird_core::numeric::RPL_WELCOME;
use seabird_core::{Context, Message, Module, Registrar, Result};

#[derive(Debug, Default)]
pub struct WelcomeModule {
    /// Registrations seen across reconnects
    registrations: usize,
}

impl WelcomeModule {
    pub fn new() -> Self {
        Self::default()
    }

    fn welcome(&mut self, ctx: &Context<'_>, message: &Message) -> Result<()> {
        self.registrations += 1;
        let server = message.source().map(|s| s.raw()).unwrap_or("server");
        tracing::info!(
            "Welcome! Registered with {} as {} (registration #{})",
            server,
            ctx.current_nick(),
            self.registrations
        );
        Ok(())
    }
}

impl Module for WelcomeModule {
    fn name(&self) -> &str {
        "welcome"
    }

    fn description(&self) -> &str {
        "Logs successful registration"
    }

    fn register(registrar: &mut Registrar<Self>) -> Result<()> {
        registrar.event(&[RPL_WELCOME], WelcomeModule::welcome);
        Ok(())
    }

    fn disconnected(&mut self) {
        tracing::info!("Disconnected after {} registrations", self.registrations);
    }
}
