//! Per-connection handshake state machine
//!
//! A [`Session`] is created for every physical connection and discarded with
//! it. It never touches the socket: bytes are pushed in, lines to send are
//! queued, and the connection drains that queue.
//!
//! ```text
//! Connecting -> AwaitingCapAck -> Registering -> Ready -> Closed
//!          \__________________________^
//! ```

use crate::buffer::{RecvQueue, SendQueue};
use crate::message::{has_line_break, serialize, truncate_line};
use crate::numeric::{self, CAP, NICK, PASS, PING, PONG, RPL_WELCOME, USER};
use crate::{Config, Error, Message, Result};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Suffix appended to the nickname each time the server rejects it
pub const NICK_RETRY_SUFFIX: char = '_';

/// Handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not yet established
    Connecting,
    /// Capabilities requested, waiting for the server to acknowledge them
    AwaitingCapAck,
    /// NICK/USER sent, waiting for RPL_WELCOME
    Registering,
    /// Registration complete
    Ready,
    /// Transport gone; the session is finished
    Closed,
}

/// Connection-scoped protocol state
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    state: SessionState,
    current_nick: String,
    user: String,
    realname: String,
    password: Option<String>,
    requested_caps: BTreeSet<String>,
    acked_caps: BTreeSet<String>,
    registration_sent: bool,
    on_ready: Vec<String>,
    recv: RecvQueue,
    send: SendQueue,
}

impl Session {
    /// Create a session for one connection attempt
    pub fn new(config: &Config) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Connecting,
            current_nick: config.identity.nick.clone(),
            user: config.identity.user.clone(),
            realname: config.identity.name.clone(),
            password: config.identity.password.clone(),
            requested_caps: config.bot.capabilities.iter().cloned().collect(),
            acked_caps: BTreeSet::new(),
            registration_sent: false,
            on_ready: config.bot.commands.clone(),
            recv: RecvQueue::new(config.connection.recv_queue_size),
            send: SendQueue::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// The nickname we currently hold, or are trying to register with
    pub fn current_nick(&self) -> &str {
        &self.current_nick
    }

    pub fn requested_caps(&self) -> &BTreeSet<String> {
        &self.requested_caps
    }

    /// Capabilities the server has acknowledged
    pub fn acked_caps(&self) -> &BTreeSet<String> {
        &self.acked_caps
    }

    /// Whether `nick` is us
    pub fn is_self(&self, nick: &str) -> bool {
        nick.eq_ignore_ascii_case(&self.current_nick)
    }

    /// Ask for a capability. Only valid until registration completes.
    pub fn request_capability(&mut self, cap: &str) -> Result<()> {
        match self.state {
            SessionState::Ready | SessionState::Closed => {
                return Err(Error::Usage(format!(
                    "Capability {} requested after registration",
                    cap
                )));
            }
            SessionState::Connecting => {}
            SessionState::AwaitingCapAck => self.queue(CAP, &["REQ", cap]),
            SessionState::Registering => {
                self.queue(CAP, &["REQ", cap]);
                self.state = SessionState::AwaitingCapAck;
            }
        }

        self.requested_caps.insert(cap.to_string());
        Ok(())
    }

    /// The transport is up: start the handshake
    pub fn on_connect(&mut self) {
        if self.state != SessionState::Connecting {
            tracing::warn!("Session {} connected twice, ignoring", self.id);
            return;
        }

        if let Some(password) = self.password.clone() {
            self.queue(PASS, &[password.as_str()]);
        }

        if self.requested_caps.is_empty() {
            self.begin_registration();
            return;
        }

        let caps: Vec<String> = self.requested_caps.iter().cloned().collect();
        for cap in caps {
            self.queue(CAP, &["REQ", cap.as_str()]);
        }
        self.state = SessionState::AwaitingCapAck;
        tracing::debug!("Session {} awaiting capability acknowledgement", self.id);
    }

    fn begin_registration(&mut self) {
        self.state = SessionState::Registering;
        if self.registration_sent {
            return;
        }
        self.registration_sent = true;

        let nick = self.current_nick.clone();
        let user = self.user.clone();
        let realname = self.realname.clone();
        self.queue(NICK, &[nick.as_str()]);
        self.queue(USER, &[user.as_str(), "0.0.0.0", "0.0.0.0", realname.as_str()]);
    }

    /// NICK/USER are out and the server has not welcomed us yet. A late
    /// capability request can put us back in `AwaitingCapAck` meanwhile.
    fn is_registering(&self) -> bool {
        self.registration_sent
            && matches!(
                self.state,
                SessionState::AwaitingCapAck | SessionState::Registering
            )
    }

    /// Feed raw bytes from the transport, returning every complete line
    pub fn receive(&mut self, data: &[u8]) -> Vec<String> {
        self.recv.push(data)
    }

    /// Apply the engine's own bookkeeping for an incoming message.
    ///
    /// Never consumes the message; the caller dispatches it afterwards either way.
    pub fn handle_message(&mut self, message: &Message) -> Result<()> {
        match message.verb() {
            PING => self.queue(PONG, message.params()),
            CAP => self.handle_cap(message)?,
            RPL_WELCOME => self.handle_welcome(message),
            NICK => {
                if let (Some(old), Some(new)) = (message.nick(), message.param(0)) {
                    if self.is_self(old) {
                        tracing::info!("Nick changed from {} to {}", old, new);
                        self.current_nick = new.to_string();
                    }
                }
            }
            verb if numeric::is_nick_rejection(verb) => {
                if self.is_registering() {
                    self.current_nick.push(NICK_RETRY_SUFFIX);
                    tracing::info!("Nickname rejected ({}), retrying as {}", verb, self.current_nick);
                    let nick = self.current_nick.clone();
                    self.queue(NICK, &[nick.as_str()]);
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn handle_cap(&mut self, message: &Message) -> Result<()> {
        let subcommand = message.param(1).unwrap_or_default().to_ascii_uppercase();
        let caps: Vec<&str> = if message.params().len() > 2 {
            message.last_param().unwrap_or_default().split_whitespace().collect()
        } else {
            Vec::new()
        };

        match subcommand.as_str() {
            "ACK" => {
                for cap in caps {
                    match cap.strip_prefix('-') {
                        Some(disabled) => {
                            self.acked_caps.remove(disabled);
                        }
                        None => {
                            tracing::info!("Capability {} acknowledged", cap);
                            self.acked_caps.insert(cap.to_string());
                        }
                    }
                }

                if self.state == SessionState::AwaitingCapAck
                    && self.requested_caps.is_subset(&self.acked_caps)
                {
                    self.queue(CAP, &["END"]);
                    self.begin_registration();
                }
            }
            "NAK" => {
                let rejected: Vec<&str> = caps
                    .into_iter()
                    .filter(|cap| self.requested_caps.contains(*cap))
                    .collect();
                if !rejected.is_empty() {
                    return Err(Error::ProtocolViolation(format!(
                        "Server rejected required capabilities: {}",
                        rejected.join(" ")
                    )));
                }
                tracing::warn!("Ignoring CAP NAK for capabilities we never requested");
            }
            "DEL" => {
                for cap in caps {
                    if self.acked_caps.remove(cap) {
                        tracing::warn!("Server withdrew capability {}", cap);
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn handle_welcome(&mut self, message: &Message) {
        if let Some(nick) = message.param(0) {
            self.current_nick = nick.to_string();
        }
        self.state = SessionState::Ready;
        tracing::info!("Session {} registered as {}", self.id, self.current_nick);

        for line in std::mem::take(&mut self.on_ready) {
            self.queue_raw(line);
        }
    }

    /// Queue a serialized line for sending
    pub fn queue<S: AsRef<str>>(&mut self, verb: &str, args: &[S]) {
        self.send.push(serialize(verb, args));
    }

    /// Queue an already formatted line, enforcing the length limit.
    /// Lines that would split on the wire are dropped.
    pub fn queue_raw(&mut self, mut line: String) {
        if has_line_break(&line) {
            tracing::warn!("Dropping raw line {:?} containing a line break", line);
            return;
        }
        truncate_line(&mut line);
        self.send.push(line);
    }

    /// Take every line waiting to be written
    pub fn take_outgoing(&mut self) -> Vec<String> {
        self.send.drain()
    }

    /// The transport is gone
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            tracing::info!("Session {} closed", self.id);
            self.state = SessionState::Closed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(caps: &[&str]) -> Config {
        let mut config = Config::default();
        config.identity.nick = "seabird".to_string();
        config.identity.user = "seabird".to_string();
        config.identity.name = "Seabird Bot".to_string();
        config.bot.capabilities = caps.iter().map(|c| c.to_string()).collect();
        config
    }

    fn feed(session: &mut Session, line: &str) -> Result<()> {
        let message = Message::parse(line).unwrap();
        session.handle_message(&message)
    }

    #[test]
    fn test_connect_without_caps_registers_immediately() {
        let mut session = Session::new(&config(&[]));
        session.on_connect();
        assert_eq!(session.state(), SessionState::Registering);
        assert_eq!(
            session.take_outgoing(),
            vec!["NICK seabird", "USER seabird 0.0.0.0 0.0.0.0 :Seabird Bot"]
        );
    }

    #[test]
    fn test_password_is_sent_first() {
        let mut config = config(&[]);
        config.identity.password = Some("hunter2".to_string());
        let mut session = Session::new(&config);
        session.on_connect();
        assert_eq!(session.take_outgoing()[0], "PASS hunter2");
    }

    #[test]
    fn test_cap_negotiation_then_welcome() {
        let mut session = Session::new(&config(&["multi-prefix"]));
        session.on_connect();
        assert_eq!(session.state(), SessionState::AwaitingCapAck);
        assert_eq!(session.take_outgoing(), vec!["CAP REQ multi-prefix"]);

        feed(&mut session, ":irc.example.com CAP * ACK :multi-prefix").unwrap();
        assert_eq!(session.state(), SessionState::Registering);
        assert!(session.acked_caps().contains("multi-prefix"));
        assert_eq!(
            session.take_outgoing(),
            vec!["CAP END", "NICK seabird", "USER seabird 0.0.0.0 0.0.0.0 :Seabird Bot"]
        );

        feed(&mut session, ":irc.example.com 001 seabird :Welcome").unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.current_nick(), "seabird");
    }

    #[test]
    fn test_waits_for_every_requested_cap() {
        let mut session = Session::new(&config(&["multi-prefix", "server-time"]));
        session.on_connect();
        assert_eq!(session.take_outgoing().len(), 2);

        feed(&mut session, "CAP * ACK :server-time").unwrap();
        assert_eq!(session.state(), SessionState::AwaitingCapAck);
        assert!(session.take_outgoing().is_empty());

        feed(&mut session, "CAP * ACK :multi-prefix").unwrap();
        assert_eq!(session.state(), SessionState::Registering);
    }

    #[test]
    fn test_cap_nak_is_fatal() {
        let mut session = Session::new(&config(&["multi-prefix"]));
        session.on_connect();
        let err = feed(&mut session, "CAP * NAK :multi-prefix").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_request_capability_after_ready_is_usage_error() {
        let mut session = Session::new(&config(&[]));
        session.request_capability("away-notify").unwrap();
        assert!(session.requested_caps().contains("away-notify"));

        session.on_connect();
        feed(&mut session, "CAP * ACK :away-notify").unwrap();
        feed(&mut session, "001 seabird :Welcome").unwrap();
        assert!(matches!(
            session.request_capability("multi-prefix"),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn test_late_request_does_not_resend_registration() {
        let mut session = Session::new(&config(&[]));
        session.on_connect();
        session.take_outgoing();

        session.request_capability("multi-prefix").unwrap();
        assert_eq!(session.state(), SessionState::AwaitingCapAck);
        assert_eq!(session.take_outgoing(), vec!["CAP REQ multi-prefix"]);

        feed(&mut session, "CAP * ACK :multi-prefix").unwrap();
        assert_eq!(session.take_outgoing(), vec!["CAP END"]);
        assert_eq!(session.state(), SessionState::Registering);
    }

    #[test]
    fn test_nick_collision_retries() {
        let mut session = Session::new(&config(&[]));
        session.on_connect();

        feed(&mut session, ":srv 433 * seabird :Nickname is already in use").unwrap();
        feed(&mut session, ":srv 433 * seabird_ :Nickname is already in use").unwrap();

        let nicks: Vec<String> = session
            .take_outgoing()
            .into_iter()
            .filter(|l| l.starts_with("NICK "))
            .collect();
        assert_eq!(nicks, vec!["NICK seabird", "NICK seabird_", "NICK seabird__"]);
        assert_eq!(session.current_nick(), "seabird__");
    }

    #[test]
    fn test_nick_collision_while_awaiting_late_cap() {
        let mut session = Session::new(&config(&[]));
        session.on_connect();
        session.request_capability("multi-prefix").unwrap();
        session.take_outgoing();

        feed(&mut session, ":srv 433 * seabird :Nickname is already in use").unwrap();
        assert_eq!(session.state(), SessionState::AwaitingCapAck);
        assert_eq!(session.take_outgoing(), vec!["NICK seabird_"]);
    }

    #[test]
    fn test_nick_rejection_before_registration_is_ignored() {
        let mut session = Session::new(&config(&["multi-prefix"]));
        session.on_connect();
        session.take_outgoing();

        feed(&mut session, ":srv 433 * seabird :Nickname is already in use").unwrap();
        assert!(session.take_outgoing().is_empty());
        assert_eq!(session.current_nick(), "seabird");
    }

    #[test]
    fn test_nick_rejection_after_ready_is_ignored() {
        let mut session = Session::new(&config(&[]));
        session.on_connect();
        feed(&mut session, "001 seabird :Welcome").unwrap();
        session.take_outgoing();

        feed(&mut session, ":srv 433 seabird other :Nickname is already in use").unwrap();
        assert!(session.take_outgoing().is_empty());
        assert_eq!(session.current_nick(), "seabird");
    }

    #[test]
    fn test_ping_and_nick_tracking() {
        let mut session = Session::new(&config(&[]));
        session.on_connect();
        feed(&mut session, "001 seabird :Welcome").unwrap();
        session.take_outgoing();

        feed(&mut session, "PING :irc.example.com").unwrap();
        feed(&mut session, "PING :two words").unwrap();
        assert_eq!(
            session.take_outgoing(),
            vec!["PONG irc.example.com", "PONG :two words"]
        );

        feed(&mut session, ":someone!u@h NICK :other").unwrap();
        assert_eq!(session.current_nick(), "seabird");

        feed(&mut session, ":seabird!u@h NICK :seagull").unwrap();
        assert_eq!(session.current_nick(), "seagull");
    }

    #[test]
    fn test_on_ready_commands() {
        let mut config = config(&[]);
        config.bot.commands = vec!["JOIN #seabird".to_string(), "MODE seabird +B".to_string()];
        let mut session = Session::new(&config);
        session.on_connect();
        session.take_outgoing();

        feed(&mut session, "001 seabird :Welcome").unwrap();
        assert_eq!(session.take_outgoing(), vec!["JOIN #seabird", "MODE seabird +B"]);
    }

    #[test]
    fn test_on_ready_line_with_break_is_dropped() {
        let mut config = config(&[]);
        config.bot.commands = vec!["JOIN #a\r\nQUIT".to_string(), "JOIN #b".to_string()];
        let mut session = Session::new(&config);
        session.on_connect();
        session.take_outgoing();

        feed(&mut session, "001 seabird :Welcome").unwrap();
        assert_eq!(session.take_outgoing(), vec!["JOIN #b"]);
    }

    #[test]
    fn test_receive_buffers_partial_lines() {
        let mut session = Session::new(&config(&[]));
        assert!(session.receive(b"PING :a").is_empty());
        assert_eq!(session.receive(b"bc\r\n"), vec!["PING :abc".to_string()]);
    }
}
