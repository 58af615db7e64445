//! Live model of users, channel memberships and status modes
//!
//! The tracker sees every message before any module does. It owns the
//! connection's ISUPPORT set since mode and name-list decoding depend on it.

use crate::isupport::ISupport;
use crate::modes::{parse_mode_changes, ModeKind};
use crate::numeric::{JOIN, KICK, MODE, NICK, PART, QUIT, RPL_ISUPPORT, RPL_NAMREPLY, RPL_WELCOME};
use crate::user::User;
use crate::{Error, Message, Result};
use std::collections::{BTreeSet, HashMap};

/// Per-connection user table
#[derive(Debug, Default)]
pub struct Tracker {
    users: HashMap<String, User>,
    isupport: ISupport,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isupport(&self) -> &ISupport {
        &self.isupport
    }

    pub fn user(&self, nick: &str) -> Option<&User> {
        self.users.get(nick)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Users the tracker believes are in `channel`
    pub fn channel_members(&self, channel: &str) -> Vec<&User> {
        self.users.values().filter(|u| u.is_in(channel)).collect()
    }

    /// Apply one message. `current_nick` is the session's own nickname.
    ///
    /// Lookup misses are logged and ignored. A nick change for an unknown
    /// user is a [`Error::ProtocolViolation`].
    pub fn handle_message(&mut self, message: &Message, current_nick: &str) -> Result<()> {
        match message.verb() {
            RPL_WELCOME => {
                let nick = message.param(0).unwrap_or(current_nick);
                self.ensure_user(nick);
            }
            RPL_ISUPPORT => self.isupport.merge_numeric(message.params())?,
            RPL_NAMREPLY => self.handle_names(message),
            JOIN => match (message.nick(), message.param(0)) {
                (Some(nick), Some(channel)) => {
                    tracing::debug!("{} joined {}", nick, channel);
                    self.ensure_user(nick).set_channel(channel, BTreeSet::new());
                }
                _ => tracing::warn!("Ignoring malformed JOIN: {}", message.raw()),
            },
            NICK => self.handle_nick(message)?,
            PART => match (message.nick(), message.param(0)) {
                (Some(nick), Some(channel)) => self.leave(nick, channel, current_nick),
                _ => tracing::warn!("Ignoring malformed PART: {}", message.raw()),
            },
            KICK => match (message.param(0), message.param(1)) {
                (Some(channel), Some(target)) => self.leave(target, channel, current_nick),
                _ => tracing::warn!("Ignoring malformed KICK: {}", message.raw()),
            },
            MODE => self.handle_mode(message)?,
            QUIT => {
                if let Some(nick) = message.nick() {
                    tracing::debug!("{} quit", nick);
                    self.users.remove(nick);
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn ensure_user(&mut self, nick: &str) -> &mut User {
        self.users
            .entry(nick.to_string())
            .or_insert_with(|| User::new(nick))
    }

    // :server 353 <me> <symbol> <channel> :[prefix]nick[!user@host] ...
    fn handle_names(&mut self, message: &Message) {
        let params = message.params();
        if params.len() < 4 {
            tracing::warn!("Ignoring short RPL_NAMREPLY: {}", message.raw());
            return;
        }

        let channel = params[params.len() - 2].clone();
        let entries: Vec<(BTreeSet<char>, String)> = params[params.len() - 1]
            .split_whitespace()
            .map(|token| {
                let (modes, rest) = self.isupport.prefix_table().decode_status_prefixes(token);
                let nick = rest.split('!').next().unwrap_or(rest);
                (modes, nick.to_string())
            })
            .filter(|(_, nick)| !nick.is_empty())
            .collect();

        for (modes, nick) in entries {
            self.ensure_user(&nick).set_channel(&channel, modes);
        }
    }

    fn handle_nick(&mut self, message: &Message) -> Result<()> {
        let (old, new) = match (message.nick(), message.param(0)) {
            (Some(old), Some(new)) => (old, new),
            _ => {
                tracing::warn!("Ignoring malformed NICK: {}", message.raw());
                return Ok(());
            }
        };

        let mut user = self.users.remove(old).ok_or_else(|| {
            Error::ProtocolViolation(format!("Nick change from untracked user {} to {}", old, new))
        })?;
        user.set_nick(new);
        self.users.insert(new.to_string(), user);
        Ok(())
    }

    fn handle_mode(&mut self, message: &Message) -> Result<()> {
        let params = message.params();
        let (target, mode_string) = match (params.first(), params.get(1)) {
            (Some(target), Some(modes)) => (target, modes),
            _ => return Ok(()),
        };

        // User modes don't affect channel state
        if !self.isupport.is_channel(target) {
            return Ok(());
        }

        let changes = parse_mode_changes(
            mode_string,
            &params[2..],
            self.isupport.channel_modes(),
            self.isupport.prefix_table(),
        )?;

        for change in changes {
            if change.kind != ModeKind::Status {
                continue;
            }
            let Some(nick) = change.param.as_deref() else {
                continue;
            };

            let updated = self
                .users
                .get_mut(nick)
                .map(|user| user.update_mode(target, change.mode, change.adding))
                .unwrap_or(false);
            if !updated {
                tracing::warn!("MODE {} for {} who is not tracked in {}", change.mode, nick, target);
            }
        }

        Ok(())
    }

    fn leave(&mut self, nick: &str, channel: &str, current_nick: &str) {
        let Some(user) = self.users.get_mut(nick) else {
            tracing::warn!("{} left {} but was never tracked", nick, channel);
            return;
        };

        if !user.remove_channel(channel) {
            tracing::warn!("{} left {} without being tracked there", nick, channel);
            return;
        }
        let now_empty = user.channels().is_empty();

        if nick.eq_ignore_ascii_case(current_nick) {
            tracing::info!("Left {}, forgetting its members", channel);
            for user in self.users.values_mut() {
                user.remove_channel(channel);
            }
            self.users
                .retain(|key, user| !user.channels().is_empty() || key.eq_ignore_ascii_case(current_nick));
        } else if now_empty {
            tracing::debug!("Forgetting {}, no shared channels left", nick);
            self.users.remove(nick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "seabird";

    fn apply(tracker: &mut Tracker, line: &str) -> Result<()> {
        tracker.handle_message(&Message::parse(line).unwrap(), ME)
    }

    fn modes(tracker: &Tracker, nick: &str, channel: &str) -> Vec<char> {
        tracker
            .user(nick)
            .and_then(|u| u.modes_in(channel))
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_welcome_creates_self() {
        let mut tracker = Tracker::new();
        apply(&mut tracker, ":srv 001 seabird :Welcome").unwrap();
        assert!(tracker.user("seabird").is_some());
    }

    #[test]
    fn test_join_mode_part_forgets_user() {
        let mut tracker = Tracker::new();
        apply(&mut tracker, ":bob!b@h JOIN #x").unwrap();
        apply(&mut tracker, ":op!o@h MODE #x +o bob").unwrap();
        assert_eq!(modes(&tracker, "bob", "#x"), vec!['o']);

        apply(&mut tracker, ":bob!b@h PART #x :bye").unwrap();
        assert!(tracker.user("bob").is_none());
    }

    #[test]
    fn test_part_keeps_user_with_other_channels() {
        let mut tracker = Tracker::new();
        apply(&mut tracker, ":bob!b@h JOIN #x").unwrap();
        apply(&mut tracker, ":bob!b@h JOIN #y").unwrap();
        apply(&mut tracker, ":bob!b@h PART #x").unwrap();

        let bob = tracker.user("bob").unwrap();
        assert!(!bob.is_in("#x"));
        assert!(bob.is_in("#y"));
    }

    #[test]
    fn test_names_replace_modes() {
        let mut tracker = Tracker::new();
        apply(&mut tracker, ":srv 353 seabird = #x :@+alice bob!b@host +carol").unwrap();
        assert_eq!(modes(&tracker, "alice", "#x"), vec!['o', 'v']);
        assert!(tracker.user("bob").unwrap().is_in("#x"));
        assert_eq!(modes(&tracker, "carol", "#x"), vec!['v']);

        apply(&mut tracker, ":srv 353 seabird = #x :alice").unwrap();
        assert!(modes(&tracker, "alice", "#x").is_empty());
        assert_eq!(tracker.channel_members("#x").len(), 3);
    }

    #[test]
    fn test_names_use_advertised_prefixes() {
        let mut tracker = Tracker::new();
        apply(&mut tracker, ":srv 005 seabird PREFIX=(qaohv)~&@%+ :are supported by this server").unwrap();
        apply(&mut tracker, ":srv 353 seabird = #x :~dave %erin").unwrap();
        assert_eq!(modes(&tracker, "dave", "#x"), vec!['q']);
        assert_eq!(modes(&tracker, "erin", "#x"), vec!['h']);

        apply(&mut tracker, ":dave!d@h MODE #x +h-q erin dave").unwrap();
        assert_eq!(modes(&tracker, "erin", "#x"), vec!['h']);
        assert!(modes(&tracker, "dave", "#x").is_empty());
    }

    #[test]
    fn test_self_kick_clears_channel() {
        let mut tracker = Tracker::new();
        apply(&mut tracker, ":srv 001 seabird :Welcome").unwrap();
        apply(&mut tracker, ":seabird!s@h JOIN #x").unwrap();
        apply(&mut tracker, ":srv 353 seabird = #x :seabird alice bob").unwrap();
        apply(&mut tracker, ":bob!b@h JOIN #y").unwrap();

        apply(&mut tracker, ":alice!a@h KICK #x seabird :out").unwrap();

        assert!(tracker.user("alice").is_none());
        assert!(tracker.user("bob").unwrap().is_in("#y"));
        assert!(!tracker.user("bob").unwrap().is_in("#x"));
        let me = tracker.user("seabird").unwrap();
        assert!(me.channels().is_empty());
        assert!(tracker.channel_members("#x").is_empty());
    }

    #[test]
    fn test_self_part_clears_channel() {
        let mut tracker = Tracker::new();
        apply(&mut tracker, ":srv 001 seabird :Welcome").unwrap();
        apply(&mut tracker, ":seabird!s@h JOIN #x").unwrap();
        apply(&mut tracker, ":seabird!s@h JOIN #y").unwrap();
        apply(&mut tracker, ":srv 353 seabird = #x :@seabird alice +bob").unwrap();
        apply(&mut tracker, ":bob!b@h JOIN #y").unwrap();

        apply(&mut tracker, ":seabird!s@h PART #x :later").unwrap();

        assert!(tracker.user("alice").is_none());
        let bob = tracker.user("bob").unwrap();
        assert!(!bob.is_in("#x"));
        assert!(bob.is_in("#y"));
        let me = tracker.user("seabird").unwrap();
        assert!(!me.is_in("#x"));
        assert!(me.is_in("#y"));
        assert!(tracker.channel_members("#x").is_empty());
    }

    #[test]
    fn test_nick_change_rekeys() {
        let mut tracker = Tracker::new();
        apply(&mut tracker, ":alice!a@h JOIN #x").unwrap();
        apply(&mut tracker, ":alice!a@h NICK :alicia").unwrap();
        assert!(tracker.user("alice").is_none());
        let alicia = tracker.user("alicia").unwrap();
        assert_eq!(alicia.nick(), "alicia");
        assert!(alicia.is_in("#x"));
    }

    #[test]
    fn test_nick_change_from_unknown_is_fatal() {
        let mut tracker = Tracker::new();
        let err = apply(&mut tracker, ":ghost!g@h NICK :spooky").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_lookup_misses_are_ignored() {
        let mut tracker = Tracker::new();
        apply(&mut tracker, ":ghost!g@h PART #x").unwrap();
        apply(&mut tracker, ":op!o@h KICK #x ghost").unwrap();
        apply(&mut tracker, ":op!o@h MODE #x +o ghost").unwrap();
        apply(&mut tracker, ":bob!b@h JOIN #y").unwrap();
        apply(&mut tracker, ":bob!b@h PART #x").unwrap();
        assert!(tracker.user("bob").unwrap().is_in("#y"));
    }

    #[test]
    fn test_non_status_modes_ignored() {
        let mut tracker = Tracker::new();
        apply(&mut tracker, ":bob!b@h JOIN #x").unwrap();
        apply(&mut tracker, ":op!o@h MODE #x +bnl *!*@spam 10").unwrap();
        assert!(modes(&tracker, "bob", "#x").is_empty());
        apply(&mut tracker, ":seabird MODE seabird +i").unwrap();
    }

    #[test]
    fn test_malformed_mode_is_format_error() {
        let mut tracker = Tracker::new();
        let err = apply(&mut tracker, ":op!o@h MODE #x +o").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_quit_forgets() {
        let mut tracker = Tracker::new();
        apply(&mut tracker, ":bob!b@h JOIN #x").unwrap();
        apply(&mut tracker, ":bob!b@h JOIN #y").unwrap();
        apply(&mut tracker, ":bob!b@h QUIT :gone").unwrap();
        assert!(tracker.user("bob").is_none());
        assert_eq!(tracker.user_count(), 0);
    }
}
