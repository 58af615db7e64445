//! What a module sees while handling a message

use crate::isupport::ISupport;
use crate::module::CommandInfo;
use crate::numeric::PRIVMSG;
use crate::session::Session;
use crate::tracker::Tracker;
use crate::{Client, Error, Message, Result};
use std::collections::BTreeSet;

/// Read-only view of the connection plus a way to send
pub struct Context<'a> {
    session: &'a Session,
    tracker: &'a Tracker,
    client: &'a Client,
    commands: &'a [CommandInfo],
    command_prefix: &'a str,
}

impl<'a> Context<'a> {
    pub fn new(
        session: &'a Session,
        tracker: &'a Tracker,
        client: &'a Client,
        commands: &'a [CommandInfo],
        command_prefix: &'a str,
    ) -> Self {
        Self {
            session,
            tracker,
            client,
            commands,
            command_prefix,
        }
    }

    pub fn current_nick(&self) -> &str {
        self.session.current_nick()
    }

    /// Capabilities the server acknowledged
    pub fn acked_caps(&self) -> &BTreeSet<String> {
        self.session.acked_caps()
    }

    pub fn isupport(&self) -> &ISupport {
        self.tracker.isupport()
    }

    pub fn tracker(&self) -> &Tracker {
        self.tracker
    }

    /// Every registered command, in load order
    pub fn commands(&self) -> &[CommandInfo] {
        self.commands
    }

    pub fn command_prefix(&self) -> &str {
        self.command_prefix
    }

    /// An owned handle for sending from spawned tasks
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn send<S: AsRef<str>>(&self, verb: &str, args: &[S]) -> Result<()> {
        self.client.send(verb, args)
    }

    pub fn send_raw(&self, line: &str) -> Result<()> {
        self.client.send_raw(line)
    }

    /// A message came from a channel unless it was addressed to our nick
    pub fn from_channel(&self, message: &Message) -> bool {
        match message.param(0) {
            Some(target) => !target.eq_ignore_ascii_case(self.current_nick()),
            None => false,
        }
    }

    /// Where a reply to `message` should go: the channel, or the sender
    pub fn reply_target<'m>(&self, message: &'m Message) -> Result<&'m str> {
        match message.param(0) {
            Some(target) if !target.is_empty() => {}
            _ => {
                return Err(Error::Usage(format!(
                    "Cannot reply to a message without a target: {}",
                    message.raw()
                )))
            }
        }

        if self.from_channel(message) {
            return Ok(message.param(0).unwrap_or_default());
        }

        message
            .nick()
            .ok_or_else(|| Error::Usage(format!("Cannot reply to a message without a sender: {}", message.raw())))
    }

    /// Reply in the same context the message arrived in
    pub fn reply(&self, message: &Message, text: &str) -> Result<()> {
        let target = self.reply_target(message)?;
        self.send(PRIVMSG, &[target, text])
    }

    /// Reply, prefixing the sender's nick when answering in a channel
    pub fn mention_reply(&self, message: &Message, text: &str) -> Result<()> {
        match message.nick() {
            Some(nick) if self.from_channel(message) => {
                self.reply(message, &format!("{}: {}", nick, text))
            }
            _ => self.reply(message, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn setup() -> (Session, Tracker, Client, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let mut config = Config::default();
        config.identity.nick = "seabird".to_string();
        let (client, rx) = Client::new();
        (Session::new(&config), Tracker::new(), client, rx)
    }

    #[test]
    fn test_reply_in_channel_and_private() {
        let (session, tracker, client, mut rx) = setup();
        let ctx = Context::new(&session, &tracker, &client, &[], "!");

        let channel = Message::parse(":alice!a@h PRIVMSG #seabird :hi").unwrap();
        assert!(ctx.from_channel(&channel));
        ctx.reply(&channel, "hello").unwrap();
        ctx.mention_reply(&channel, "hello").unwrap();

        let private = Message::parse(":alice!a@h PRIVMSG SeaBird :hi").unwrap();
        assert!(!ctx.from_channel(&private));
        ctx.reply(&private, "hello").unwrap();
        ctx.mention_reply(&private, "hello").unwrap();

        assert_eq!(rx.try_recv().unwrap(), "PRIVMSG #seabird hello");
        assert_eq!(rx.try_recv().unwrap(), "PRIVMSG #seabird :alice: hello");
        assert_eq!(rx.try_recv().unwrap(), "PRIVMSG alice hello");
        assert_eq!(rx.try_recv().unwrap(), "PRIVMSG alice hello");
    }

    #[test]
    fn test_reply_without_target_is_usage_error() {
        let (session, tracker, client, _rx) = setup();
        let ctx = Context::new(&session, &tracker, &client, &[], "!");

        let bare = Message::parse(":alice!a@h PING").unwrap();
        assert!(matches!(ctx.reply(&bare, "x"), Err(Error::Usage(_))));

        let empty = Message::new("PRIVMSG", vec![String::new(), "text".to_string()]);
        assert!(matches!(ctx.reply(&empty, "x"), Err(Error::Usage(_))));
    }
}
