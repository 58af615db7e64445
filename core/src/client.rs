//! Outbound handle for the current connection
//!
//! Every line written to the server goes through a [`Client`]. The handle is
//! cheap to clone, so a module can move one into a spawned task and send the
//! result of slow work later without holding up the read loop.

use crate::message::{has_line_break, serialize, truncate_line};
use crate::{Error, Result};
use tokio::sync::mpsc;

/// Sending half of a connection's write queue
#[derive(Debug, Clone)]
pub struct Client {
    sender: mpsc::UnboundedSender<String>,
}

impl Client {
    /// Create a handle and the receiver the connection's writer drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Serialize and queue a line
    pub fn send<S: AsRef<str>>(&self, verb: &str, args: &[S]) -> Result<()> {
        self.push(serialize(verb, args))
    }

    /// Queue a preformatted line. It is cut to the protocol limit but
    /// otherwise written as is.
    ///
    /// A trailing CRLF is dropped. Any other CR, LF or NUL is a usage error.
    pub fn send_raw(&self, line: &str) -> Result<()> {
        let mut line = line.trim_end_matches(&['\r', '\n'][..]).to_string();
        if has_line_break(&line) {
            return Err(Error::Usage(format!("Raw line {:?} contains a line break", line)));
        }
        truncate_line(&mut line);
        self.push(line)
    }

    pub fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.send(crate::numeric::PRIVMSG, &[target, text])
    }

    pub fn notice(&self, target: &str, text: &str) -> Result<()> {
        self.send(crate::numeric::NOTICE, &[target, text])
    }

    /// Whether the connection this handle writes to is gone
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn push(&self, line: String) -> Result<()> {
        self.sender
            .send(line)
            .map_err(|_| Error::Connection("Connection is closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_serializes() {
        let (client, mut rx) = Client::new();
        client.send("JOIN", &["#seabird"]).unwrap();
        client.privmsg("#seabird", "hello there").unwrap();
        client.send_raw("MODE seabird +B\r\n").unwrap();

        assert_eq!(rx.try_recv().unwrap(), "JOIN #seabird");
        assert_eq!(rx.try_recv().unwrap(), "PRIVMSG #seabird :hello there");
        assert_eq!(rx.try_recv().unwrap(), "MODE seabird +B");
    }

    #[test]
    fn test_send_after_close_fails() {
        let (client, rx) = Client::new();
        drop(rx);
        assert!(client.is_closed());
        assert!(matches!(client.send_raw("QUIT"), Err(Error::Connection(_))));
    }

    #[test]
    fn test_send_rejects_embedded_lines() {
        let (client, mut rx) = Client::new();
        assert!(matches!(
            client.send_raw("PRIVMSG #c :a\r\nQUIT :pwned"),
            Err(Error::Usage(_))
        ));
        assert!(matches!(client.send_raw("PRIVMSG #c :a\0"), Err(Error::Usage(_))));
        assert!(rx.try_recv().is_err());

        client.privmsg("#c", "a\r\nQUIT :pwned").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "PRIVMSG #c :aQUIT :pwned");
    }

    #[test]
    fn test_send_raw_truncates() {
        let (client, mut rx) = Client::new();
        client.send_raw(&"x".repeat(600)).unwrap();
        assert_eq!(rx.try_recv().unwrap().len(), crate::message::MAX_LINE_LENGTH);
    }
}
