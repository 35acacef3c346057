//! Wire codec for the amplifier's zone protocol
//!
//! Commands are written as `^<OP> @<zone>, <value>$`. The amplifier answers
//! asynchronously with `^=<OP>.2 @<zone>,<value>` lines, which are decoded here
//! into single-attribute [`StatusEvent`]s.

use crate::error::ParseError;
use crate::types::{Attribute, StatusEvent, ZoneId, ZoneStatus};
use std::fmt;

/// Command opcodes understood by the amplifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Power,
    Volume,
    Mute,
    Source,
}

impl Opcode {
    /// Wire token for this opcode
    pub fn token(self) -> &'static str {
        match self {
            Opcode::Power => "PZ",
            Opcode::Volume => "VPZ",
            Opcode::Mute => "MZ",
            Opcode::Source => "SZ",
        }
    }
}

impl From<Attribute> for Opcode {
    fn from(attribute: Attribute) -> Self {
        match attribute {
            Attribute::Power => Opcode::Power,
            Attribute::Volume => Opcode::Volume,
            Attribute::Mute => Opcode::Mute,
            Attribute::Source => Opcode::Source,
        }
    }
}

/// Argument of a zone command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandValue {
    /// On/off flag, written as `1`/`0`
    Flag(bool),
    /// Absolute level
    Level(u32),
    /// Relative step, written with an explicit sign
    Step(i32),
    /// Source selection
    Source(u32),
    /// Status query, written as `?`
    Query,
}

impl fmt::Display for CommandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandValue::Flag(on) => f.write_str(if *on { "1" } else { "0" }),
            CommandValue::Level(level) => write!(f, "{}", level),
            CommandValue::Step(step) => write!(f, "{:+}", step),
            CommandValue::Source(source) => write!(f, "{}", source),
            CommandValue::Query => f.write_str("?"),
        }
    }
}

/// A single zone-addressed command
///
/// No range checking is done on either the zone or the value; whatever is
/// given is written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneCommand {
    pub zone: ZoneId,
    pub op: Opcode,
    pub value: CommandValue,
}

impl ZoneCommand {
    pub fn new(zone: ZoneId, op: Opcode, value: CommandValue) -> Self {
        Self { zone, op, value }
    }

    pub fn power(zone: ZoneId, on: bool) -> Self {
        Self::new(zone, Opcode::Power, CommandValue::Flag(on))
    }

    pub fn mute(zone: ZoneId, muted: bool) -> Self {
        Self::new(zone, Opcode::Mute, CommandValue::Flag(muted))
    }

    pub fn volume(zone: ZoneId, level: u32) -> Self {
        Self::new(zone, Opcode::Volume, CommandValue::Level(level))
    }

    pub fn volume_step(zone: ZoneId, step: i32) -> Self {
        Self::new(zone, Opcode::Volume, CommandValue::Step(step))
    }

    pub fn source(zone: ZoneId, source: u32) -> Self {
        Self::new(zone, Opcode::Source, CommandValue::Source(source))
    }

    pub fn query(zone: ZoneId, op: Opcode) -> Self {
        Self::new(zone, op, CommandValue::Query)
    }

    /// Encode the command into its wire form
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ZoneCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^{} @{}, {}$", self.op.token(), self.zone, self.value)
    }
}

/// The four queries that make up a full status refresh of one zone
pub fn status_queries(zone: ZoneId) -> [ZoneCommand; 4] {
    Attribute::ALL.map(|attribute| ZoneCommand::query(zone, attribute.into()))
}

/// Decoding rule for one kind of status line
struct ResponsePattern {
    attribute: Attribute,
    prefix: &'static str,
    coerce: fn(&str) -> Option<ZoneStatus>,
}

/// Response patterns, tested in this order; prefixes are mutually exclusive
const RESPONSE_PATTERNS: [ResponsePattern; 4] = [
    ResponsePattern {
        attribute: Attribute::Power,
        prefix: "^=PZ.2 ",
        coerce: coerce_power,
    },
    ResponsePattern {
        attribute: Attribute::Volume,
        prefix: "^=VPZ.2 ",
        coerce: coerce_volume,
    },
    ResponsePattern {
        attribute: Attribute::Mute,
        prefix: "^=MZ.2 ",
        coerce: coerce_mute,
    },
    ResponsePattern {
        attribute: Attribute::Source,
        prefix: "^=SZ.2 ",
        coerce: coerce_source,
    },
];

/// Decode one status line
///
/// Returns `Ok(None)` for lines that match no known response (echoes and other
/// protocol chatter), and a [`ParseError`] when a known prefix is followed by
/// something that can't be coerced.
pub fn decode(line: &str) -> Result<Option<StatusEvent>, ParseError> {
    for pattern in &RESPONSE_PATTERNS {
        if let Some(rest) = line.strip_prefix(pattern.prefix) {
            return pattern.decode(line, rest).map(Some);
        }
    }
    Ok(None)
}

impl ResponsePattern {
    fn decode(&self, line: &str, rest: &str) -> Result<StatusEvent, ParseError> {
        let fail = |reason: &str| ParseError::new(self.attribute, line, reason);

        let rest = rest
            .strip_prefix('@')
            .ok_or_else(|| fail("missing zone marker"))?;
        let (zone, value) = rest
            .split_once(',')
            .ok_or_else(|| fail("missing value separator"))?;

        let zone = parse_number(zone).ok_or_else(|| fail("invalid zone"))?;
        let status = (self.coerce)(value)
            .ok_or_else(|| fail(&format!("invalid {} value", self.attribute)))?;

        Ok(StatusEvent::new(zone, status))
    }
}

// Coercions read only the leading value; whatever follows it is ignored.

fn coerce_power(value: &str) -> Option<ZoneStatus> {
    parse_flag(leading_char(value)?).map(ZoneStatus::Power)
}

fn coerce_volume(value: &str) -> Option<ZoneStatus> {
    parse_number(leading_digits(value))
        .filter(|level| *level <= 100)
        .map(ZoneStatus::Volume)
}

fn coerce_mute(value: &str) -> Option<ZoneStatus> {
    parse_flag(leading_char(value)?).map(ZoneStatus::Mute)
}

fn coerce_source(value: &str) -> Option<ZoneStatus> {
    parse_number(leading_digits(value)).map(ZoneStatus::Source)
}

fn leading_digits(value: &str) -> &str {
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    &value[..end]
}

fn leading_char(value: &str) -> Option<&str> {
    let first = value.chars().next()?;
    value.get(..first.len_utf8())
}

fn parse_number(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}
