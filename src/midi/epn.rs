//! Extended parameter number (RPN/NRPN) reassembly and fragmentation.
//!
//! A 14-bit parameter write arrives as a run of control changes: CC 101/100
//! (or 99/98 for NRPN) establish the parameter address, CC 6 and CC 38 carry
//! the value halves. The decoder tracks per-channel validity bits so partial
//! runs, address rewrites and the null-function sentinel never produce a
//! bogus event.

use log::trace;

use crate::midi::channel::{ChannelId, ControlType};
use crate::midi::wire::{self, ShortMessage};

/// Reassembly state for one MIDI channel.
#[derive(Debug, Default, Clone, Copy)]
struct ChannelState {
    parameter: u16,
    value: u16,
    nrpn: bool,
    parameter_hi: bool,
    parameter_lo: bool,
    value_hi: bool,
}

/// Per-instance (N)RPN decoder; its 16 channels are independent.
///
/// Owned by the input callback of one device, which the OS driver serializes,
/// so no locking is involved.
#[derive(Debug, Default)]
pub struct EpnDecoder {
    channels: [ChannelState; 16],
}

impl EpnDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Control changes that take part in (N)RPN runs. Everything else
    /// bypasses the decoder.
    pub fn wants(control: u8) -> bool {
        control == 6 || control == 38 || (98..=101).contains(&control)
    }

    /// Advance the state machine by one control change. Returns the completed
    /// parameter event when CC 38 closes a fully-addressed run.
    pub fn feed(&mut self, channel: u8, control: u8, value: u8) -> Option<(ChannelId, f64)> {
        let state = &mut self.channels[(channel & 0x0F) as usize];

        // switching between NRPN and RPN invalidates the whole address
        if (state.nrpn && (control == 101 || control == 100))
            || (!state.nrpn && (control == 99 || control == 98))
        {
            state.nrpn = false;
            state.parameter_hi = false;
            state.parameter_lo = false;
        }

        // writing any address byte abandons a half-received value
        if (98..=101).contains(&control) {
            state.value_hi = false;
        }

        if control == 101 || control == 99 {
            state.parameter = (state.parameter & 0x7F) | ((value as u16) << 7);
            state.parameter_hi = true;
            if control == 99 {
                state.nrpn = true;
            }
            if control == 101 && value == 127 {
                // null function number disarms the decoder
                state.parameter_hi = false;
            }
        }

        if control == 100 || control == 98 {
            state.parameter = (state.parameter & !0x7F) | (value as u16 & 0x7F);
            state.parameter_lo = true;
            if control == 98 {
                state.nrpn = true;
            }
            if control == 100 && value == 127 {
                state.parameter_lo = false;
            }
        }

        // the value high half is only accepted once the address is complete
        if control == 6 && state.parameter_hi && state.parameter_lo {
            state.value = (value as u16) << 7;
            state.value_hi = true;
        }

        // the value low half closes the run
        if control == 38 && state.value_hi {
            state.value = (state.value & !0x7F) | (value as u16 & 0x7F);
            state.value_hi = false;

            let kind = if state.nrpn {
                ControlType::Nrpn
            } else {
                ControlType::Rpn
            };
            trace!(
                "Assembled {kind} {} value {} on channel {channel}",
                state.parameter,
                state.value
            );
            return Some((
                ChannelId {
                    kind,
                    channel: channel & 0x0F,
                    control: state.parameter,
                },
                state.value as f64 / 16383.0,
            ));
        }

        None
    }
}

/// Fragment an outgoing (N)RPN write into its control-change run: parameter
/// high/low, value high/low, and unless `short` the null-function trailer
/// that disarms the receiving decoder.
pub fn encode(
    channel: u8,
    nrpn: bool,
    parameter: u16,
    normalized: f64,
    short: bool,
) -> Vec<ShortMessage> {
    let value = wire::to_wire14(normalized);
    let cc = |control: u8, value: u8| ShortMessage::ControlChange {
        channel,
        control,
        value,
    };

    let mut run = vec![
        cc(if nrpn { 99 } else { 101 }, ((parameter >> 7) & 0x7F) as u8),
        cc(if nrpn { 98 } else { 100 }, (parameter & 0x7F) as u8),
        cc(6, ((value >> 7) & 0x7F) as u8),
        cc(38, (value & 0x7F) as u8),
    ];
    if !short {
        run.push(cc(101, 127));
        run.push(cc(100, 127));
    }
    run
}
