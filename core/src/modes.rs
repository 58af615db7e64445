//! Channel mode grammar (CHANMODES) and MODE change decoding

use crate::isupport::PrefixTable;
use crate::{Error, Result};
use std::collections::BTreeSet;

/// How a channel mode letter consumes parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    /// Type A: list modes (bans, exceptions). Always take a parameter.
    List,
    /// Type B: always take a parameter (key)
    AlwaysParam,
    /// Type C: take a parameter only when being set (limit)
    SetParam,
    /// Type D: never take a parameter
    Flag,
    /// Status modes from PREFIX. Always take a nick.
    Status,
}

impl ModeKind {
    fn takes_param(self, adding: bool) -> bool {
        match self {
            ModeKind::List | ModeKind::AlwaysParam | ModeKind::Status => true,
            ModeKind::SetParam => adding,
            ModeKind::Flag => false,
        }
    }
}

/// The four CHANMODES groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelModes {
    list: BTreeSet<char>,
    always_param: BTreeSet<char>,
    set_param: BTreeSet<char>,
    flag: BTreeSet<char>,
}

impl ChannelModes {
    /// Build from the comma separated CHANMODES groups.
    ///
    /// Groups past the fourth are reserved for future use and ignored.
    pub fn from_groups<S: AsRef<str>>(groups: &[S]) -> Result<Self> {
        if groups.is_empty() {
            return Err(Error::Format("CHANMODES has no groups".to_string()));
        }

        let group = |i: usize| -> BTreeSet<char> {
            groups
                .get(i)
                .map(|g| g.as_ref().chars().collect())
                .unwrap_or_default()
        };

        Ok(Self {
            list: group(0),
            always_param: group(1),
            set_param: group(2),
            flag: group(3),
        })
    }

    pub fn kind_of(&self, mode: char) -> Option<ModeKind> {
        if self.list.contains(&mode) {
            Some(ModeKind::List)
        } else if self.always_param.contains(&mode) {
            Some(ModeKind::AlwaysParam)
        } else if self.set_param.contains(&mode) {
            Some(ModeKind::SetParam)
        } else if self.flag.contains(&mode) {
            Some(ModeKind::Flag)
        } else {
            None
        }
    }
}

impl Default for ChannelModes {
    fn default() -> Self {
        Self {
            list: BTreeSet::from(['b']),
            always_param: BTreeSet::from(['k']),
            set_param: BTreeSet::from(['l']),
            flag: "imnstp".chars().collect(),
        }
    }
}

/// One decoded mode change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub mode: char,
    pub param: Option<String>,
    pub adding: bool,
    pub kind: ModeKind,
}

/// Decode a MODE string like `+ov-b` against its parameters.
///
/// Status modes are looked up in the prefix table first, then the CHANMODES
/// groups. A mode string without a leading sign is treated as adding.
pub fn parse_mode_changes<S: AsRef<str>>(
    mode_string: &str,
    params: &[S],
    groups: &ChannelModes,
    prefix: &PrefixTable,
) -> Result<Vec<ModeChange>> {
    let mut changes = Vec::new();
    let mut params = params.iter();
    let mut adding = true;

    for c in mode_string.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            mode => {
                let kind = if prefix.is_status_mode(mode) {
                    ModeKind::Status
                } else {
                    groups.kind_of(mode).ok_or_else(|| {
                        Error::Format(format!("Unknown channel mode {:?} in {:?}", mode, mode_string))
                    })?
                };

                let param = if kind.takes_param(adding) {
                    let param: &str = params.next().ok_or_else(|| {
                        Error::Format(format!(
                            "Mode {}{} in {:?} is missing its parameter",
                            if adding { '+' } else { '-' },
                            mode,
                            mode_string
                        ))
                    })?.as_ref();
                    Some(param.to_string())
                } else {
                    None
                };

                changes.push(ModeChange {
                    mode,
                    param,
                    adding,
                    kind,
                });
            }
        }
    }

    Ok(changes)
}
