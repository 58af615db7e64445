//! Server feature advertisement (RPL_ISUPPORT)
//!
//! The server describes its limits and grammar as a list of `KEY[=VALUE]`
//! tokens, possibly spread across several 005 numerics. [`ISupport`] keeps the
//! merged result along with the two derived tables the rest of the engine
//! needs: the [`PrefixTable`] and the [`ChannelModes`] groups.

use crate::modes::ChannelModes;
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Value of a single ISUPPORT key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ISupportValue {
    /// Key given without a value, e.g. `EXCEPTS`
    Flag,
    /// Exactly one plain value, e.g. `NETWORK=Libera.Chat`
    Value(String),
    /// Several comma separated values, e.g. `CHANMODES=b,k,l,imnst`
    List(Vec<String>),
    /// Comma separated `key:value` pairs, e.g. `TARGMAX=PRIVMSG:4,JOIN:`
    Map(BTreeMap<String, Option<String>>),
}

impl ISupportValue {
    /// The value as a single string, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ISupportValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a list; a single value is treated as a one element list
    pub fn to_list(&self) -> Vec<String> {
        match self {
            ISupportValue::Value(v) => vec![v.clone()],
            ISupportValue::List(items) => items.clone(),
            _ => Vec::new(),
        }
    }
}

/// Parse one ISUPPORT token.
///
/// Returns the key and its value, or `None` for the value when the token
/// negates a previously advertised key (`-KEY`).
pub fn parse_token(token: &str) -> Result<(String, Option<ISupportValue>)> {
    if let Some(negated) = token.strip_prefix('-') {
        if negated.is_empty() {
            return Err(Error::Format("Empty negated ISUPPORT key".to_string()));
        }
        return Ok((negated.to_string(), None));
    }

    let (key, value) = match token.split_once('=') {
        Some((key, value)) => (key, value),
        None => (token, ""),
    };

    if key.is_empty() {
        return Err(Error::Format(format!("ISUPPORT token {:?} has no key", token)));
    }

    if value.is_empty() {
        return Ok((key.to_string(), Some(ISupportValue::Flag)));
    }

    let mut map = BTreeMap::new();
    let mut list = Vec::new();
    for segment in value.split(',') {
        match segment.rsplit_once(':') {
            Some((k, v)) => {
                let v = if v.is_empty() { None } else { Some(v.to_string()) };
                map.insert(k.to_string(), v);
            }
            None => list.push(segment.to_string()),
        }
    }

    if !map.is_empty() && !list.is_empty() {
        return Err(Error::Format(format!(
            "ISUPPORT key {} mixes list and map values",
            key
        )));
    }

    let value = if !map.is_empty() {
        ISupportValue::Map(map)
    } else if list.len() == 1 {
        ISupportValue::Value(list.remove(0))
    } else {
        ISupportValue::List(list)
    };

    Ok((key.to_string(), Some(value)))
}

/// Bidirectional mapping between channel status mode letters and the prefix
/// characters shown in front of nicks (`o` <-> `@`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTable {
    /// Pairs in the server's rank order, highest first
    pairs: Vec<(char, char)>,
    to_prefix: HashMap<char, char>,
    to_mode: HashMap<char, char>,
}

impl PrefixTable {
    /// Parse a PREFIX value of the form `(modes)prefixes`
    pub fn parse(value: &str) -> Result<Self> {
        let inner = value
            .strip_prefix('(')
            .ok_or_else(|| Error::Format(format!("PREFIX {:?} must start with '('", value)))?;
        let (modes, prefixes) = inner
            .split_once(')')
            .ok_or_else(|| Error::Format(format!("PREFIX {:?} is missing ')'", value)))?;

        let modes: Vec<char> = modes.chars().collect();
        let prefixes: Vec<char> = prefixes.chars().collect();
        if modes.len() != prefixes.len() {
            return Err(Error::Format(format!(
                "PREFIX {:?} pairs {} modes with {} prefixes",
                value,
                modes.len(),
                prefixes.len()
            )));
        }

        let pairs: Vec<(char, char)> = modes.into_iter().zip(prefixes).collect();
        Ok(Self::from_pairs(pairs))
    }

    fn from_pairs(pairs: Vec<(char, char)>) -> Self {
        let to_prefix = pairs.iter().copied().collect();
        let to_mode = pairs.iter().map(|&(m, p)| (p, m)).collect();
        Self {
            pairs,
            to_prefix,
            to_mode,
        }
    }

    pub fn prefix_for(&self, mode: char) -> Option<char> {
        self.to_prefix.get(&mode).copied()
    }

    pub fn mode_for(&self, prefix: char) -> Option<char> {
        self.to_mode.get(&prefix).copied()
    }

    pub fn is_status_mode(&self, mode: char) -> bool {
        self.to_prefix.contains_key(&mode)
    }

    /// `(mode, prefix)` pairs, highest rank first
    pub fn pairs(&self) -> &[(char, char)] {
        &self.pairs
    }

    /// Strip leading status prefixes from a name list entry.
    ///
    /// Returns the mode letters those prefixes stand for and the rest of the
    /// token.
    pub fn decode_status_prefixes<'a>(&self, token: &'a str) -> (BTreeSet<char>, &'a str) {
        let mut modes = BTreeSet::new();
        let mut rest = token;

        while let Some(c) = rest.chars().next() {
            match self.mode_for(c) {
                Some(mode) => {
                    modes.insert(mode);
                    rest = &rest[c.len_utf8()..];
                }
                None => break,
            }
        }

        (modes, rest)
    }
}

impl Default for PrefixTable {
    fn default() -> Self {
        Self::from_pairs(vec![('o', '@'), ('v', '+')])
    }
}

/// Merged ISUPPORT state for one connection
#[derive(Debug, Clone)]
pub struct ISupport {
    values: HashMap<String, ISupportValue>,
    prefix: PrefixTable,
    chanmodes: ChannelModes,
}

impl ISupport {
    /// Create the set with defaults that hold until the server says otherwise
    pub fn new() -> Self {
        let mut values = HashMap::new();
        values.insert("PREFIX".to_string(), ISupportValue::Value("(ov)@+".to_string()));
        values.insert("CHANTYPES".to_string(), ISupportValue::Value("#&!+".to_string()));
        values.insert("NICKLEN".to_string(), ISupportValue::Value("8".to_string()));
        values.insert("CASEMAPPING".to_string(), ISupportValue::Value("rfc1459".to_string()));
        values.insert(
            "CHANMODES".to_string(),
            ISupportValue::List(vec![
                "b".to_string(),
                "k".to_string(),
                "l".to_string(),
                "imnstp".to_string(),
            ]),
        );

        Self {
            values,
            prefix: PrefixTable::default(),
            chanmodes: ChannelModes::default(),
        }
    }

    /// Merge a batch of tokens into the set.
    ///
    /// Keys in the batch replace existing keys of the same name; everything
    /// else is kept. Malformed tokens are skipped, the valid ones are still
    /// applied, and the skipped ones are reported in the returned error.
    pub fn merge<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<()> {
        let mut rejected = Vec::new();

        for token in tokens {
            let token = token.as_ref();
            match parse_token(token) {
                Ok((key, Some(value))) => {
                    tracing::debug!("ISUPPORT {} = {:?}", key, value);
                    self.values.insert(key, value);
                }
                Ok((key, None)) => {
                    tracing::debug!("ISUPPORT {} removed", key);
                    self.values.remove(&key);
                }
                Err(e) => rejected.push(e.to_string()),
            }
        }

        self.rebuild_derived();

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(Error::Format(rejected.join("; ")))
        }
    }

    /// Handle an RPL_ISUPPORT numeric: `<nick> <tokens...> :are supported by this server`
    pub fn merge_numeric(&mut self, params: &[String]) -> Result<()> {
        if params.len() < 2 {
            return Err(Error::Format("RPL_ISUPPORT without any tokens".to_string()));
        }

        let trailer = &params[params.len() - 1];
        if !trailer.contains(' ') {
            tracing::warn!("RPL_ISUPPORT trailer {:?} looks unusual, treating it as text", trailer);
        }

        self.merge(&params[1..params.len() - 1])
    }

    fn rebuild_derived(&mut self) {
        match self.values.get("PREFIX") {
            Some(ISupportValue::Value(v)) => match PrefixTable::parse(v) {
                Ok(table) => self.prefix = table,
                Err(e) => tracing::warn!("Keeping previous prefix table: {}", e),
            },
            // An empty PREFIX= means the server has no status modes
            Some(ISupportValue::Flag) => self.prefix = PrefixTable::from_pairs(Vec::new()),
            Some(other) => tracing::warn!("Ignoring unexpected PREFIX value {:?}", other),
            None => self.prefix = PrefixTable::default(),
        }

        match self.values.get("CHANMODES") {
            Some(value) => match ChannelModes::from_groups(&value.to_list()) {
                Ok(groups) => self.chanmodes = groups,
                Err(e) => tracing::warn!("Keeping previous channel modes: {}", e),
            },
            None => self.chanmodes = ChannelModes::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ISupportValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn prefix_table(&self) -> &PrefixTable {
        &self.prefix
    }

    pub fn channel_modes(&self) -> &ChannelModes {
        &self.chanmodes
    }

    /// Characters that start a channel name
    pub fn channel_types(&self) -> &str {
        self.values
            .get("CHANTYPES")
            .and_then(ISupportValue::as_str)
            .unwrap_or("#&")
    }

    pub fn is_channel(&self, target: &str) -> bool {
        target
            .chars()
            .next()
            .map(|c| self.channel_types().contains(c))
            .unwrap_or(false)
    }
}

impl Default for ISupport {
    fn default() -> Self {
        Self::new()
    }
}
