//! Tracked users and their channel memberships

use std::collections::{BTreeMap, BTreeSet};

/// A user the tracker currently knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Current nickname
    nick: String,
    /// Channel name -> status mode letters held there
    channels: BTreeMap<String, BTreeSet<char>>,
}

impl User {
    pub fn new(nick: &str) -> Self {
        Self {
            nick: nick.to_string(),
            channels: BTreeMap::new(),
        }
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn channels(&self) -> &BTreeMap<String, BTreeSet<char>> {
        &self.channels
    }

    /// Whether the user is in `channel`
    pub fn is_in(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Status modes held in `channel`, if the user is there at all
    pub fn modes_in(&self, channel: &str) -> Option<&BTreeSet<char>> {
        self.channels.get(channel)
    }

    /// Whether the user holds status mode `mode` in `channel`
    pub fn has_mode(&self, channel: &str, mode: char) -> bool {
        self.channels
            .get(channel)
            .map(|modes| modes.contains(&mode))
            .unwrap_or(false)
    }

    pub(crate) fn set_nick(&mut self, nick: &str) {
        self.nick = nick.to_string();
    }

    /// Record membership, replacing whatever modes were known for the channel
    pub(crate) fn set_channel(&mut self, channel: &str, modes: BTreeSet<char>) {
        self.channels.insert(channel.to_string(), modes);
    }

    /// Returns false if the user was not in the channel
    pub(crate) fn remove_channel(&mut self, channel: &str) -> bool {
        self.channels.remove(channel).is_some()
    }

    /// Add or remove a status mode. Returns false if the user is not in the channel.
    pub(crate) fn update_mode(&mut self, channel: &str, mode: char, adding: bool) -> bool {
        match self.channels.get_mut(channel) {
            Some(modes) => {
                if adding {
                    modes.insert(mode);
                } else {
                    modes.remove(&mode);
                }
                true
            }
            None => false,
        }
    }
}
