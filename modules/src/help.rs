//! Help Module
//!
//! Answers `help` with the list of registered commands, or with the help
//! text of a single command.

use seabird_core::{CommandInfo, Context, Message, Module, Registrar, Result};

/// Command listing built from the help text modules register
#[derive(Debug, Default)]
pub struct HelpModule;

impl HelpModule {
    pub fn new() -> Self {
        Self
    }

    fn help(&mut self, ctx: &Context<'_>, message: &Message) -> Result<()> {
        let topic = message.last_param().unwrap_or_default().trim();
        let prefix = ctx.command_prefix();

        if topic.is_empty() {
            let names: Vec<String> = ctx
                .commands()
                .iter()
                .map(|c| format!("{}{}", prefix, c.name))
                .collect();
            return ctx.mention_reply(message, &format!("Available commands: {}", names.join(" ")));
        }

        let name = topic.strip_prefix(prefix).unwrap_or(topic).to_lowercase();
        match ctx.commands().iter().find(|c| c.name == name) {
            Some(info) => {
                for line in describe(prefix, info) {
                    ctx.mention_reply(message, &line)?;
                }
                Ok(())
            }
            None => ctx.mention_reply(message, &format!("Unknown command \"{}\"", name)),
        }
    }
}

/// Lines describing one command
fn describe(prefix: &str, info: &CommandInfo) -> Vec<String> {
    let mut lines = match &info.short_help {
        Some(short) => vec![format!("{}{}: {}", prefix, info.name, short)],
        None => Vec::new(),
    };
    if let Some(long) = &info.long_help {
        lines.push(long.clone());
    }
    if lines.is_empty() {
        lines.push(format!("There is no help available for {}{}", prefix, info.name));
    }
    lines
}

impl Module for HelpModule {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "Lists commands and shows their help text"
    }

    fn register(registrar: &mut Registrar<Self>) -> Result<()> {
        registrar.command(
            "help",
            "List commands, or show help for one\n\nUsage: help [command]",
            HelpModule::help,
        )?;
        Ok(())
    }
}
