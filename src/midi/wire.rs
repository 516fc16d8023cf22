use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::midi::channel::{ChannelId, ControlType};
use crate::BackendError;

/// A short (two or three byte) MIDI channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortMessage {
    NoteOff { channel: u8, key: u8, velocity: u8 },
    NoteOn { channel: u8, key: u8, velocity: u8 },
    PolyPressure { channel: u8, key: u8, value: u8 },
    ControlChange { channel: u8, control: u8, value: u8 },
    ChannelPressure { channel: u8, value: u8 },
    PitchBend { channel: u8, value: u16 },
}

/// Convert a normalized value to 7-bit wire units. Truncates toward zero.
pub fn to_wire7(normalized: f64) -> u8 {
    (normalized * 127.0) as u8
}

/// Convert a normalized value to 14-bit wire units. Truncates toward zero.
pub fn to_wire14(normalized: f64) -> u16 {
    (normalized * 16383.0) as u16
}

impl ShortMessage {
    /// Decode one short message.
    ///
    /// System and otherwise unhandled status bytes decode to `None` and are
    /// dropped by the caller; a recognized status with too few data bytes is
    /// a `MalformedMessage` error.
    pub fn decode(raw: &[u8]) -> Result<Option<ShortMessage>, BackendError> {
        if raw.is_empty() {
            return Err(BackendError::MalformedMessage {
                expected: 1,
                actual: 0,
            });
        }

        let mut data = Bytes::copy_from_slice(raw);
        let status = data.get_u8();
        let channel = status & 0x0F;

        match status & 0xF0 {
            0x80 => {
                if data.len() < 2 {
                    return Err(BackendError::MalformedMessage {
                        expected: 3,
                        actual: raw.len(),
                    });
                }
                let key = data.get_u8();
                let velocity = data.get_u8();
                Ok(Some(ShortMessage::NoteOff {
                    channel,
                    key,
                    velocity,
                }))
            }
            0x90 => {
                if data.len() < 2 {
                    return Err(BackendError::MalformedMessage {
                        expected: 3,
                        actual: raw.len(),
                    });
                }
                let key = data.get_u8();
                let velocity = data.get_u8();
                Ok(Some(ShortMessage::NoteOn {
                    channel,
                    key,
                    velocity,
                }))
            }
            0xA0 => {
                if data.len() < 2 {
                    return Err(BackendError::MalformedMessage {
                        expected: 3,
                        actual: raw.len(),
                    });
                }
                let key = data.get_u8();
                let value = data.get_u8();
                Ok(Some(ShortMessage::PolyPressure {
                    channel,
                    key,
                    value,
                }))
            }
            0xB0 => {
                if data.len() < 2 {
                    return Err(BackendError::MalformedMessage {
                        expected: 3,
                        actual: raw.len(),
                    });
                }
                let control = data.get_u8();
                let value = data.get_u8();
                Ok(Some(ShortMessage::ControlChange {
                    channel,
                    control,
                    value,
                }))
            }
            0xD0 => {
                if data.is_empty() {
                    return Err(BackendError::MalformedMessage {
                        expected: 2,
                        actual: raw.len(),
                    });
                }
                let value = data.get_u8();
                Ok(Some(ShortMessage::ChannelPressure { channel, value }))
            }
            0xE0 => {
                if data.len() < 2 {
                    return Err(BackendError::MalformedMessage {
                        expected: 3,
                        actual: raw.len(),
                    });
                }
                let lsb = data.get_u8();
                let msb = data.get_u8();
                Ok(Some(ShortMessage::PitchBend {
                    channel,
                    value: ((msb as u16) << 7) | (lsb as u16),
                }))
            }
            // program change, SysEx and system realtime are not routable
            _ => Ok(None),
        }
    }

    /// Serialize per the MIDI 1.0 short-message encoding.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            ShortMessage::NoteOff {
                channel,
                key,
                velocity,
            } => {
                buf.put_u8(0x80 | (channel & 0x0F));
                buf.put_u8(*key);
                buf.put_u8(*velocity);
            }
            ShortMessage::NoteOn {
                channel,
                key,
                velocity,
            } => {
                buf.put_u8(0x90 | (channel & 0x0F));
                buf.put_u8(*key);
                buf.put_u8(*velocity);
            }
            ShortMessage::PolyPressure {
                channel,
                key,
                value,
            } => {
                buf.put_u8(0xA0 | (channel & 0x0F));
                buf.put_u8(*key);
                buf.put_u8(*value);
            }
            ShortMessage::ControlChange {
                channel,
                control,
                value,
            } => {
                buf.put_u8(0xB0 | (channel & 0x0F));
                buf.put_u8(*control);
                buf.put_u8(*value);
            }
            ShortMessage::ChannelPressure { channel, value } => {
                buf.put_u8(0xD0 | (channel & 0x0F));
                buf.put_u8(*value);
            }
            ShortMessage::PitchBend { channel, value } => {
                buf.put_u8(0xE0 | (channel & 0x0F));
                buf.put_u8((*value & 0x7F) as u8);
                buf.put_u8(((*value >> 7) & 0x7F) as u8);
            }
        }
    }

    /// Map a decoded message to its routable channel and normalized value.
    /// Note-off folds into the note channel with value 0.
    pub fn to_event(&self) -> (ChannelId, f64) {
        match *self {
            ShortMessage::NoteOff { channel, key, .. } => (
                ChannelId {
                    kind: ControlType::Note,
                    channel,
                    control: key as u16,
                },
                0.0,
            ),
            ShortMessage::NoteOn {
                channel,
                key,
                velocity,
            } => (
                ChannelId {
                    kind: ControlType::Note,
                    channel,
                    control: key as u16,
                },
                velocity as f64 / 127.0,
            ),
            ShortMessage::PolyPressure {
                channel,
                key,
                value,
            } => (
                ChannelId {
                    kind: ControlType::Pressure,
                    channel,
                    control: key as u16,
                },
                value as f64 / 127.0,
            ),
            ShortMessage::ControlChange {
                channel,
                control,
                value,
            } => (
                ChannelId {
                    kind: ControlType::Cc,
                    channel,
                    control: control as u16,
                },
                value as f64 / 127.0,
            ),
            ShortMessage::ChannelPressure { channel, value } => (
                ChannelId {
                    kind: ControlType::Aftertouch,
                    channel,
                    control: 0,
                },
                value as f64 / 127.0,
            ),
            ShortMessage::PitchBend { channel, value } => (
                ChannelId {
                    kind: ControlType::PitchBend,
                    channel,
                    control: 0,
                },
                value as f64 / 16383.0,
            ),
        }
    }
}
