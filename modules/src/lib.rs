//! Seabird Modules
//!
//! Built-in modules for the seabird IRC bot.

pub mod help;
pub mod welcome;

pub use help::HelpModule;
pub use welcome::WelcomeModule;

use seabird_core::{Error, ModuleManager, Result};

/// Names of the modules this crate provides
pub const AVAILABLE: &[&str] = &["help", "welcome"];

/// Load a built-in module by name
pub fn load_by_name(manager: &mut ModuleManager, name: &str) -> Result<()> {
    match name {
        "help" => manager.load_module(HelpModule::new()),
        "welcome" => manager.load_module(WelcomeModule::new()),
        other => Err(Error::Config(format!(
            "Unknown module {:?}, available modules: {}",
            other,
            AVAILABLE.join(", ")
        ))),
    }
}
