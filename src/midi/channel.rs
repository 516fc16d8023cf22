use std::fmt;

use crate::BackendError;

/// Kind of controllable parameter addressed by a channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlType {
    Note,
    Cc,
    Pressure,
    Aftertouch,
    PitchBend,
    Rpn,
    Nrpn,
}

impl ControlType {
    // tags start at 1 so a packed identifier is never zero
    fn tag(self) -> u8 {
        match self {
            ControlType::Note => 1,
            ControlType::Cc => 2,
            ControlType::Pressure => 3,
            ControlType::Aftertouch => 4,
            ControlType::PitchBend => 5,
            ControlType::Rpn => 6,
            ControlType::Nrpn => 7,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ControlType::Note),
            2 => Some(ControlType::Cc),
            3 => Some(ControlType::Pressure),
            4 => Some(ControlType::Aftertouch),
            5 => Some(ControlType::PitchBend),
            6 => Some(ControlType::Rpn),
            7 => Some(ControlType::Nrpn),
            _ => None,
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlType::Note => "note",
            ControlType::Cc => "cc",
            ControlType::Pressure => "pressure",
            ControlType::Aftertouch => "aftertouch",
            ControlType::PitchBend => "pitch",
            ControlType::Rpn => "rpn",
            ControlType::Nrpn => "nrpn",
        };
        write!(f, "{name}")
    }
}

/// Logical address of one controllable parameter within an instance.
///
/// `pack`/`unpack` convert to the opaque 64-bit form handed to the router,
/// which treats it as a hash key without further interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub kind: ControlType,
    pub channel: u8,
    pub control: u16,
}

impl ChannelId {
    pub fn new(kind: ControlType, channel: u8, control: u16) -> Result<Self, BackendError> {
        if channel > 15 {
            return Err(BackendError::Parse(format!(
                "MIDI channel {channel} out of range"
            )));
        }
        let control = match kind {
            // channel-wide types carry no control number
            ControlType::PitchBend | ControlType::Aftertouch => 0,
            ControlType::Note | ControlType::Cc | ControlType::Pressure if control > 127 => {
                return Err(BackendError::Parse(format!(
                    "control {control} out of range for {kind}"
                )));
            }
            ControlType::Rpn | ControlType::Nrpn if control > 16383 => {
                return Err(BackendError::Parse(format!(
                    "parameter {control} out of range for {kind}"
                )));
            }
            _ => control,
        };
        Ok(ChannelId {
            kind,
            channel,
            control,
        })
    }

    /// Pack into the opaque form. Explicit shifts keep the layout independent
    /// of host endianness; the result is never zero for a valid identifier.
    pub fn pack(&self) -> u64 {
        ((self.kind.tag() as u64) << 24) | ((self.channel as u64) << 16) | self.control as u64
    }

    pub fn unpack(raw: u64) -> Option<ChannelId> {
        let kind = ControlType::from_tag(((raw >> 24) & 0xFF) as u8)?;
        ChannelId::new(kind, ((raw >> 16) & 0xFF) as u8, (raw & 0xFFFF) as u16).ok()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ControlType::PitchBend | ControlType::Aftertouch => {
                write!(f, "ch{}.{}", self.channel, self.kind)
            }
            _ => write!(f, "ch{}.{}{}", self.channel, self.kind, self.control),
        }
    }
}

/// Parse a channel specification of the form `("ch"|"channel")<N>.<type>[<C>]`.
///
/// `cc`, `note` and `pressure` take a 0..127 control number, `rpn` and `nrpn`
/// a 0..16383 parameter number; `pitch` and `aftertouch` take none.
pub fn parse_channel_spec(spec: &str) -> Result<ChannelId, BackendError> {
    let rest = spec
        .strip_prefix("channel")
        .or_else(|| spec.strip_prefix("ch"))
        .ok_or_else(|| BackendError::Parse(format!("invalid channel specification {spec}")))?;

    let (channel_str, type_str) = rest.split_once('.').ok_or_else(|| {
        BackendError::Parse(format!(
            "channel specification {spec} does not conform to ch<X>.<type><Y>"
        ))
    })?;

    let channel = channel_str
        .parse::<u8>()
        .ok()
        .filter(|channel| *channel <= 15)
        .ok_or_else(|| BackendError::Parse(format!("MIDI channel out of range in spec {spec}")))?;

    let (kind, suffix) = if let Some(suffix) = type_str.strip_prefix("cc") {
        (ControlType::Cc, suffix)
    } else if let Some(suffix) = type_str.strip_prefix("note") {
        (ControlType::Note, suffix)
    } else if let Some(suffix) = type_str.strip_prefix("pressure") {
        (ControlType::Pressure, suffix)
    } else if let Some(suffix) = type_str.strip_prefix("nrpn") {
        (ControlType::Nrpn, suffix)
    } else if let Some(suffix) = type_str.strip_prefix("rpn") {
        (ControlType::Rpn, suffix)
    } else if let Some(suffix) = type_str.strip_prefix("pitch") {
        (ControlType::PitchBend, suffix)
    } else if let Some(suffix) = type_str.strip_prefix("aftertouch") {
        (ControlType::Aftertouch, suffix)
    } else {
        return Err(BackendError::Parse(format!("unknown control type in {spec}")));
    };

    let control = match kind {
        ControlType::PitchBend | ControlType::Aftertouch => {
            if !suffix.is_empty() {
                return Err(BackendError::Parse(format!(
                    "{kind} takes no control number in {spec}"
                )));
            }
            0
        }
        _ => suffix
            .parse::<u16>()
            .map_err(|_| BackendError::Parse(format!("invalid control number in {spec}")))?,
    };

    ChannelId::new(kind, channel, control)
}
