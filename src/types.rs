use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Zone identifier (amplifier output channel)
pub type ZoneId = u32;

/// Source identifier (amplifier input)
pub type SourceId = u32;

/// Volume level in percent (0-100)
pub type VolumeLevel = u32;

/// Zone attribute carried by a command or a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Power,
    Volume,
    Mute,
    Source,
}

impl Attribute {
    /// All attributes, in the order a status refresh queries them
    pub const ALL: [Attribute; 4] = [
        Attribute::Power,
        Attribute::Volume,
        Attribute::Mute,
        Attribute::Source,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Attribute::Power => "power",
            Attribute::Volume => "volume",
            Attribute::Mute => "mute",
            Attribute::Source => "source",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single attribute reported by one status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    Power(bool),
    Volume(VolumeLevel),
    Mute(bool),
    Source(SourceId),
}

impl ZoneStatus {
    pub fn attribute(&self) -> Attribute {
        match self {
            ZoneStatus::Power(_) => Attribute::Power,
            ZoneStatus::Volume(_) => Attribute::Volume,
            ZoneStatus::Mute(_) => Attribute::Mute,
            ZoneStatus::Source(_) => Attribute::Source,
        }
    }
}

/// Status update for one zone
///
/// Every decoded status line becomes exactly one `StatusEvent`; the amplifier
/// never reports more than one attribute per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub zone: ZoneId,
    #[serde(flatten)]
    pub status: ZoneStatus,
}

impl StatusEvent {
    pub fn new(zone: ZoneId, status: ZoneStatus) -> Self {
        Self { zone, status }
    }

    pub fn power(&self) -> Option<bool> {
        match self.status {
            ZoneStatus::Power(on) => Some(on),
            _ => None,
        }
    }

    pub fn volume(&self) -> Option<VolumeLevel> {
        match self.status {
            ZoneStatus::Volume(level) => Some(level),
            _ => None,
        }
    }

    pub fn mute(&self) -> Option<bool> {
        match self.status {
            ZoneStatus::Mute(muted) => Some(muted),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<SourceId> {
        match self.status {
            ZoneStatus::Source(source) => Some(source),
            _ => None,
        }
    }
}

/// Notification delivered to the status subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmpEvent {
    /// A status line was decoded
    Status(StatusEvent),

    /// A status line matched a known prefix but could not be decoded
    ParseError(ParseError),
}

impl AmpEvent {
    /// The status event, if this is one
    pub fn status(&self) -> Option<&StatusEvent> {
        match self {
            AmpEvent::Status(event) => Some(event),
            AmpEvent::ParseError(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_exposes_only_its_own_attribute() {
        let event = StatusEvent::new(4, ZoneStatus::Volume(62));
        assert_eq!(event.volume(), Some(62));
        assert_eq!(event.power(), None);
        assert_eq!(event.mute(), None);
        assert_eq!(event.source(), None);
        assert_eq!(event.status.attribute(), Attribute::Volume);
    }

    #[test]
    fn status_event_serializes_flat() {
        let event = StatusEvent::new(4, ZoneStatus::Power(true));
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json, serde_json::json!({ "zone": 4, "power": true }));

        let back: StatusEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
