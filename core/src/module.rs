//! Module system: handler registration and two-stage dispatch
//!
//! A module declares its handlers once, when it is loaded, through a
//! [`Registrar`]. Raw-event handlers subscribe to one or more verbs; command
//! handlers claim a command name. For every message the [`ModuleManager`]
//! first updates the [`Tracker`], then runs matching event handlers, then
//! looks for a command invocation in PRIVMSG text.

use crate::context::Context;
use crate::numeric::PRIVMSG;
use crate::session::Session;
use crate::tracker::Tracker;
use crate::{Client, Error, Message, Result};
use std::collections::HashMap;

/// Signature shared by event and command handlers
pub type Handler<M> = fn(&mut M, &Context<'_>, &Message) -> Result<()>;

/// Module trait that all modules must implement
pub trait Module: Send + 'static {
    /// Module name
    fn name(&self) -> &str;

    /// Module description
    fn description(&self) -> &str {
        ""
    }

    /// Declare this module's handlers
    fn register(registrar: &mut Registrar<Self>) -> Result<()>
    where
        Self: Sized;

    /// Called after the connection has been torn down
    fn disconnected(&mut self) {}
}

/// Name and help text for a registered command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    /// Lowercased command name
    pub name: String,
    /// Module the command belongs to
    pub module: String,
    pub short_help: Option<String>,
    pub long_help: Option<String>,
}

impl CommandInfo {
    /// Build command metadata, pulling help text out of a doc string.
    ///
    /// A single line is the short help. A first line followed by a blank
    /// line gives short help plus long help from the rest. Anything else is
    /// all long help.
    pub fn from_doc(name: &str, doc: &str) -> Self {
        let lines: Vec<&str> = doc.trim().lines().map(str::trim).collect();

        let (short_help, long_help) = match lines.as_slice() {
            [] | [""] => (None, None),
            [only] => (Some(only.to_string()), None),
            [first, "", rest @ ..] => {
                let long = rest.join(" ");
                (Some(first.to_string()), (!long.is_empty()).then_some(long))
            }
            all => (None, Some(all.join(" "))),
        };

        Self::with_help(name, short_help.as_deref(), long_help.as_deref())
    }

    /// Build command metadata with explicit help text
    pub fn with_help(name: &str, short_help: Option<&str>, long_help: Option<&str>) -> Self {
        Self {
            name: name.to_lowercase(),
            module: String::new(),
            short_help: short_help.map(str::to_string),
            long_help: long_help.map(str::to_string),
        }
    }
}

/// Collects a module's handlers at load time
pub struct Registrar<M> {
    events: Vec<(Vec<String>, Handler<M>)>,
    commands: Vec<(CommandInfo, Handler<M>)>,
}

impl<M> Registrar<M> {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Subscribe `handler` to every message whose verb is in `verbs`
    pub fn event(&mut self, verbs: &[&str], handler: Handler<M>) -> &mut Self {
        let verbs = verbs.iter().map(|v| v.to_ascii_uppercase()).collect();
        self.events.push((verbs, handler));
        self
    }

    /// Register a command whose help text comes from `doc`
    pub fn command(&mut self, name: &str, doc: &str, handler: Handler<M>) -> Result<&mut Self> {
        self.add_command(CommandInfo::from_doc(name, doc), handler)
    }

    /// Register a command with explicit help text
    pub fn command_with_help(
        &mut self,
        name: &str,
        short_help: Option<&str>,
        long_help: Option<&str>,
        handler: Handler<M>,
    ) -> Result<&mut Self> {
        self.add_command(CommandInfo::with_help(name, short_help, long_help), handler)
    }

    fn add_command(&mut self, info: CommandInfo, handler: Handler<M>) -> Result<&mut Self> {
        if info.name.is_empty() || info.name.contains(char::is_whitespace) {
            return Err(Error::Usage(format!("Invalid command name {:?}", info.name)));
        }
        if self.commands.iter().any(|(existing, _)| existing.name == info.name) {
            return Err(Error::Usage(format!("Command {} registered twice", info.name)));
        }
        self.commands.push((info, handler));
        Ok(self)
    }
}

/// A loaded module with its handler table, behind a type-erased interface
trait LoadedModule: Send {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn dispatch_event(&mut self, ctx: &Context<'_>, message: &Message) -> Result<()>;
    fn dispatch_command(&mut self, command: &str, ctx: &Context<'_>, message: &Message) -> Result<()>;
    fn disconnected(&mut self);
}

struct Loaded<M> {
    module: M,
    events: Vec<(Vec<String>, Handler<M>)>,
    commands: HashMap<String, Handler<M>>,
}

impl<M: Module> LoadedModule for Loaded<M> {
    fn name(&self) -> &str {
        self.module.name()
    }

    fn description(&self) -> &str {
        self.module.description()
    }

    fn dispatch_event(&mut self, ctx: &Context<'_>, message: &Message) -> Result<()> {
        for (verbs, handler) in &self.events {
            if verbs.iter().any(|v| v == message.verb()) {
                let result = handler(&mut self.module, ctx, message);
                check(self.module.name(), message.verb(), result)?;
            }
        }
        Ok(())
    }

    fn dispatch_command(&mut self, command: &str, ctx: &Context<'_>, message: &Message) -> Result<()> {
        match self.commands.get(command) {
            Some(handler) => {
                let result = handler(&mut self.module, ctx, message);
                check(self.module.name(), command, result)
            }
            None => Ok(()),
        }
    }

    fn disconnected(&mut self) {
        self.module.disconnected();
    }
}

/// Log a handler failure. Only fatal errors are passed on.
fn check(module: &str, what: &str, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::error!("Module {} failed handling {}: {}", module, what, e);
            Ok(())
        }
    }
}

/// Module manager: owns every loaded module and routes messages to them
pub struct ModuleManager {
    modules: Vec<Box<dyn LoadedModule>>,
    commands: Vec<CommandInfo>,
    /// Command name -> index into `modules`
    command_owners: HashMap<String, usize>,
    command_prefix: String,
}

impl ModuleManager {
    pub fn new(command_prefix: &str) -> Self {
        Self {
            modules: Vec::new(),
            commands: Vec::new(),
            command_owners: HashMap::new(),
            command_prefix: command_prefix.to_string(),
        }
    }

    /// Load a module, collecting its handlers.
    ///
    /// Fails without loading anything if the module claims a command name
    /// that is already taken.
    pub fn load_module<M: Module>(&mut self, module: M) -> Result<()> {
        let mut registrar = Registrar::new();
        M::register(&mut registrar)?;

        let name = module.name().to_string();
        if self.modules.iter().any(|m| m.name() == name) {
            return Err(Error::Usage(format!("Module {} is already loaded", name)));
        }
        for (info, _) in &registrar.commands {
            if let Some(&owner) = self.command_owners.get(&info.name) {
                return Err(Error::Usage(format!(
                    "Command {} from module {} is already provided by {}",
                    info.name,
                    name,
                    self.modules[owner].name()
                )));
            }
        }

        let index = self.modules.len();
        let mut commands = HashMap::new();
        for (mut info, handler) in registrar.commands {
            info.module = name.clone();
            self.command_owners.insert(info.name.clone(), index);
            commands.insert(info.name.clone(), handler);
            self.commands.push(info);
        }

        tracing::info!(
            "Loaded module {} ({} event handlers, {} commands)",
            name,
            registrar.events.len(),
            commands.len()
        );

        self.modules.push(Box::new(Loaded {
            module,
            events: registrar.events,
            commands,
        }));
        Ok(())
    }

    pub fn get_loaded_modules(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// (name, description) for every loaded module
    pub fn describe_modules(&self) -> Vec<(&str, &str)> {
        self.modules.iter().map(|m| (m.name(), m.description())).collect()
    }

    pub fn commands(&self) -> &[CommandInfo] {
        &self.commands
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    /// Route one message: tracker, then event handlers, then commands.
    ///
    /// Handler errors are logged and dispatch carries on. Fatal errors, from
    /// the tracker or a handler, stop dispatch and are returned.
    pub fn dispatch(
        &mut self,
        session: &Session,
        tracker: &mut Tracker,
        client: &Client,
        message: &Message,
    ) -> Result<()> {
        if let Err(e) = tracker.handle_message(message, session.current_nick()) {
            if e.is_fatal() {
                return Err(e);
            }
            tracing::warn!("Tracker dropped {}: {}", message.raw(), e);
        }

        let ctx = Context::new(session, tracker, client, &self.commands, &self.command_prefix);

        for module in self.modules.iter_mut() {
            module.dispatch_event(&ctx, message)?;
        }

        if let Some(command) = parse_command(message, &self.command_prefix) {
            if let Some(&owner) = self.command_owners.get(command.verb()) {
                tracing::debug!("Dispatching command {} to {}", command.verb(), self.modules[owner].name());
                self.modules[owner].dispatch_command(command.verb(), &ctx, &command)?;
            }
        }

        Ok(())
    }

    /// Tell every module the connection is gone
    pub fn disconnected(&mut self) {
        for module in self.modules.iter_mut() {
            module.disconnected();
        }
    }
}

/// Derive a command invocation from a PRIVMSG whose text starts with `prefix`.
///
/// The verb becomes the lowercased command name and the last argument is
/// replaced with whatever followed it.
pub fn parse_command(message: &Message, prefix: &str) -> Option<Message> {
    if message.verb() != PRIVMSG || prefix.is_empty() {
        return None;
    }

    let text = message.last_param()?.strip_prefix(prefix)?;
    let (name, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    if name.is_empty() {
        return None;
    }

    let mut params = message.params().to_vec();
    params.pop();
    params.push(rest.to_string());
    Some(message.derive(name.to_lowercase(), params))
}
