//! Verbs and numeric replies the engine and tracker act on
//!
//! Verbs are kept as strings since every parsed [`Message`](crate::Message)
//! carries its verb uppercased; numerics are their three digit form.

// Commands
pub const CAP: &str = "CAP";
pub const JOIN: &str = "JOIN";
pub const KICK: &str = "KICK";
pub const MODE: &str = "MODE";
pub const NICK: &str = "NICK";
pub const NOTICE: &str = "NOTICE";
pub const PART: &str = "PART";
pub const PASS: &str = "PASS";
pub const PING: &str = "PING";
pub const PONG: &str = "PONG";
pub const PRIVMSG: &str = "PRIVMSG";
pub const QUIT: &str = "QUIT";
pub const USER: &str = "USER";

// Registration
pub const RPL_WELCOME: &str = "001";
pub const RPL_ISUPPORT: &str = "005";

// Channel membership
pub const RPL_NAMREPLY: &str = "353";
pub const RPL_ENDOFNAMES: &str = "366";

// Nickname rejection
pub const ERR_ERRONEUSNICKNAME: &str = "432";
pub const ERR_NICKNAMEINUSE: &str = "433";
pub const ERR_NICKCOLLISION: &str = "436";
pub const ERR_UNAVAILRESOURCE: &str = "437";

/// Numerics that reject the nickname we are trying to register with
pub fn is_nick_rejection(verb: &str) -> bool {
    matches!(
        verb,
        ERR_ERRONEUSNICKNAME | ERR_NICKNAMEINUSE | ERR_NICKCOLLISION | ERR_UNAVAILRESOURCE
    )
}
