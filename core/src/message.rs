//! IRC message parsing and serialization
//!
//! This module implements the RFC 1459 line format as seen from a client,
//! extended with IRCv3 message tags. A [`Message`] is built once from a line
//! and never mutated afterwards.

use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// Longest line allowed on the wire, excluding the CRLF terminator
pub const MAX_LINE_LENGTH: usize = 510;

const LINE_BREAKS: [char; 3] = ['\r', '\n', '\0'];

/// Source of a message, decomposed from `nick!user@host`
///
/// Servers send bare names as sources, so every component is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    raw: String,
    nick: Option<String>,
    user: Option<String>,
    host: Option<String>,
}

impl Identity {
    /// Decompose a raw source string. Never fails; components that cannot be
    /// split out are left absent.
    pub fn parse(raw: &str) -> Self {
        let (user_part, host) = match raw.split_once('@') {
            Some((left, right)) => (left, non_empty(right)),
            None => (raw, None),
        };

        let (nick, user) = match user_part.split_once('!') {
            Some((left, right)) => (non_empty(left), non_empty(right)),
            None => (non_empty(user_part), None),
        };

        Self {
            raw: raw.to_string(),
            nick,
            user,
            host,
        }
    }

    /// Nickname (or server name for bare sources)
    pub fn nick(&self) -> Option<&str> {
        self.nick.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The source exactly as it appeared on the wire
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Decode an IRCv3 tag value.
///
/// Escapes are resolved in a single left-to-right pass so an escaped
/// backslash can never start another escape. Unknown escapes decode to the
/// escaped character and a lone trailing backslash is dropped.
pub fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}

/// Encode a tag value; the inverse of [`unescape_tag_value`]
pub fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// IRC message as received from (or sent to) the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    raw: String,
    tags: HashMap<String, Option<String>>,
    source: Option<Identity>,
    verb: String,
    params: Vec<String>,
}

impl Message {
    /// Create an outbound message with no tags or source
    pub fn new(verb: &str, params: Vec<String>) -> Self {
        let mut message = Self {
            raw: String::new(),
            tags: HashMap::new(),
            source: None,
            verb: verb.to_ascii_uppercase(),
            params,
        };
        message.raw = message.to_line();
        message
    }

    /// Parse a single line. The line terminator is optional.
    pub fn parse(line: &str) -> Result<Self> {
        let raw = line.trim_end_matches(&['\r', '\n'][..]);
        let mut rest = raw;

        let mut tags = HashMap::new();
        if let Some(tagged) = rest.strip_prefix('@') {
            let (tag_section, remainder) = tagged.split_once(' ').unwrap_or((tagged, ""));
            for tag in tag_section.split(';').filter(|t| !t.is_empty()) {
                match tag.split_once('=') {
                    Some((key, value)) => {
                        tags.insert(key.to_string(), Some(unescape_tag_value(value)));
                    }
                    None => {
                        tags.insert(tag.to_string(), None);
                    }
                }
            }
            rest = remainder.trim_start_matches(' ');
        }

        let mut source = None;
        if let Some(sourced) = rest.strip_prefix(':') {
            let (src, remainder) = sourced.split_once(' ').unwrap_or((sourced, ""));
            source = Some(Identity::parse(src));
            rest = remainder.trim_start_matches(' ');
        }

        // The first " :" always starts the trailing argument since middle
        // parameters may not begin with a colon.
        let (middle, trailing) = match rest.split_once(" :") {
            Some((middle, trailing)) => (middle, Some(trailing)),
            None => (rest, None),
        };

        let mut tokens = middle.split(' ').filter(|t| !t.is_empty());
        let verb = tokens
            .next()
            .ok_or_else(|| Error::MessageParse(format!("No command found in {:?}", raw)))?
            .to_ascii_uppercase();

        let mut params: Vec<String> = tokens.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Ok(Self {
            raw: raw.to_string(),
            tags,
            source,
            verb,
            params,
        })
    }

    /// Attach a tag to an outbound message
    pub fn with_tag(mut self, key: &str, value: Option<&str>) -> Self {
        self.tags.insert(key.to_string(), value.map(str::to_string));
        self.raw = self.to_line();
        self
    }

    /// Attach a source to an outbound message
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(Identity::parse(source));
        self.raw = self.to_line();
        self
    }

    /// Build a message that shares this one's tags and source but carries a
    /// different verb and parameters. Used to derive command invocations.
    pub(crate) fn derive(&self, verb: String, params: Vec<String>) -> Self {
        Self {
            raw: self.raw.clone(),
            tags: self.tags.clone(),
            source: self.source.clone(),
            verb,
            params,
        }
    }

    /// The line this message was parsed from (or would be written as)
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tags(&self) -> &HashMap<String, Option<String>> {
        &self.tags
    }

    /// Look up a tag. The outer option is presence, the inner one the value.
    pub fn tag(&self, key: &str) -> Option<Option<&str>> {
        self.tags.get(key).map(|v| v.as_deref())
    }

    pub fn source(&self) -> Option<&Identity> {
        self.source.as_ref()
    }

    /// Nickname of the source, if there is one
    pub fn nick(&self) -> Option<&str> {
        self.source.as_ref().and_then(Identity::nick)
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The final argument, which is the trailing one when a trailing was sent
    pub fn last_param(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Render this message as a wire line, without the terminator.
    ///
    /// The 510 byte limit applies to everything after the tag section.
    pub fn to_line(&self) -> String {
        let mut body = String::new();

        if let Some(ref source) = self.source {
            body.push(':');
            body.push_str(source.raw());
            body.push(' ');
        }

        body.push_str(&self.verb);
        write_params(&mut body, &self.params);
        truncate_line(&mut body);

        if self.tags.is_empty() {
            return body;
        }

        let mut keys: Vec<&String> = self.tags.keys().collect();
        keys.sort();

        let mut line = String::from("@");
        for (i, key) in keys.into_iter().enumerate() {
            if i > 0 {
                line.push(';');
            }
            line.push_str(key);
            if let Some(Some(value)) = self.tags.get(key) {
                line.push('=');
                line.push_str(&escape_tag_value(value));
            }
        }
        line.push(' ');
        line.push_str(&body);
        line
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line())
    }
}

/// Serialize a verb and its arguments into a wire line, without the terminator.
///
/// The last argument is written as a trailing argument when it is empty,
/// contains a space or starts with a colon. The result is cut to
/// [`MAX_LINE_LENGTH`] bytes.
pub fn serialize<S: AsRef<str>>(verb: &str, args: &[S]) -> String {
    let mut line = strip_line_breaks(verb);
    write_params(&mut line, args);
    truncate_line(&mut line);
    line
}

fn write_params<S: AsRef<str>>(line: &mut String, params: &[S]) {
    for (i, param) in params.iter().enumerate() {
        let param = strip_line_breaks(param.as_ref());
        line.push(' ');
        if i == params.len() - 1 && needs_trailing(&param) {
            line.push(':');
        }
        line.push_str(&param);
    }
}

/// Whether `text` holds a character that would end or corrupt a line
pub fn has_line_break(text: &str) -> bool {
    text.contains(LINE_BREAKS)
}

/// Drop CR, LF and NUL so an argument cannot split the line it is written into
fn strip_line_breaks(text: &str) -> String {
    text.chars().filter(|c| !LINE_BREAKS.contains(c)).collect()
}

fn needs_trailing(param: &str) -> bool {
    param.is_empty() || param.contains(' ') || param.starts_with(':')
}

/// Cut a line to [`MAX_LINE_LENGTH`] bytes without splitting a character
pub fn truncate_line(line: &mut String) {
    if line.len() <= MAX_LINE_LENGTH {
        return;
    }

    let mut end = MAX_LINE_LENGTH;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    line.truncate(end);
}
