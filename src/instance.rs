//! Device lifecycle for one configured instance: match and open the input
//! and output ports, run the input callback, fragment outgoing events.

use std::sync::Arc;

use bytes::BytesMut;
use log::{debug, error, info, trace, warn};
use midir::{
    Ignore, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};

use crate::config::{EpnTx, InstanceConfig};
use crate::midi::channel::{ChannelId, ControlType};
use crate::midi::epn::{self, EpnDecoder};
use crate::midi::wire::{self, ShortMessage};
use crate::queue::{EventQueue, QueuedEvent};
use crate::wakeup::WakeupSender;
use crate::{BackendError, InstanceId};

const CLIENT_NAME: &str = "midimonster";

/// State owned by one instance's input callback. The OS driver serializes
/// callbacks per device, so nothing here needs a lock.
struct InputContext {
    instance: InstanceId,
    queue: Arc<EventQueue>,
    wakeup: WakeupSender,
    epn: EpnDecoder,
}

pub struct MidiInstance {
    name: String,
    epn_tx_short: bool,
    input: Option<MidiInputConnection<InputContext>>,
    output: Option<MidiOutputConnection>,
}

impl MidiInstance {
    /// Open the devices an instance is configured for and start input
    /// callbacks. Opened devices are released again when the instance drops.
    pub fn open(
        id: InstanceId,
        config: &InstanceConfig,
        queue: &Arc<EventQueue>,
        wakeup: WakeupSender,
    ) -> Result<Self, BackendError> {
        let mut instance = MidiInstance {
            name: config.name.clone(),
            epn_tx_short: config.epn_tx == EpnTx::Short,
            input: None,
            output: None,
        };

        if let Some(pattern) = config.read.as_deref() {
            let context = InputContext {
                instance: id,
                queue: Arc::clone(queue),
                wakeup,
                epn: EpnDecoder::new(),
            };
            instance.input = Some(open_input(&config.name, pattern, context)?);
        }
        if let Some(pattern) = config.write.as_deref() {
            instance.output = Some(open_output(&config.name, pattern)?);
        }

        Ok(instance)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transmit one normalized event. (N)RPN channels fragment into their
    /// control-change run; device errors are logged and do not tear down the
    /// instance.
    pub fn send(&mut self, channel: ChannelId, value: f64) {
        if self.output.is_none() {
            warn!("Instance {} has no output device", self.name);
            return;
        }

        let messages = match channel.kind {
            ControlType::Rpn | ControlType::Nrpn => epn::encode(
                channel.channel,
                channel.kind == ControlType::Nrpn,
                channel.control,
                value,
                self.epn_tx_short,
            ),
            ControlType::PitchBend => vec![ShortMessage::PitchBend {
                channel: channel.channel,
                value: wire::to_wire14(value),
            }],
            ControlType::Aftertouch => vec![ShortMessage::ChannelPressure {
                channel: channel.channel,
                value: wire::to_wire7(value),
            }],
            ControlType::Note => vec![ShortMessage::NoteOn {
                channel: channel.channel,
                key: channel.control as u8,
                velocity: wire::to_wire7(value),
            }],
            ControlType::Pressure => vec![ShortMessage::PolyPressure {
                channel: channel.channel,
                key: channel.control as u8,
                value: wire::to_wire7(value),
            }],
            ControlType::Cc => vec![ShortMessage::ControlChange {
                channel: channel.channel,
                control: channel.control as u8,
                value: wire::to_wire7(value),
            }],
        };

        let mut buf = BytesMut::with_capacity(4);
        if let Some(output) = self.output.as_mut() {
            for message in messages {
                buf.clear();
                message.encode(&mut buf);
                if let Err(e) = output.send(&buf) {
                    error!("Failed to transmit on instance {}: {e}", self.name);
                }
            }
        }
    }

    /// Stop input callbacks and release both devices. Input goes first so no
    /// callback can run once the caller starts tearing down shared state.
    pub fn close(&mut self) {
        if let Some(connection) = self.input.take() {
            connection.close();
        }
        if let Some(connection) = self.output.take() {
            connection.close();
        }
    }
}

/// Enumerate visible devices to the log, both directions.
pub fn list_devices() -> Result<(), BackendError> {
    let input = MidiInput::new(CLIENT_NAME).map_err(|e| BackendError::DeviceOpen(e.to_string()))?;
    let ports = input.ports();
    info!("Detected {} input devices", ports.len());
    for (id, port) in ports.iter().enumerate() {
        info!("\tID {id}: {}", input.port_name(port).unwrap_or_default());
    }

    let output =
        MidiOutput::new(CLIENT_NAME).map_err(|e| BackendError::DeviceOpen(e.to_string()))?;
    let ports = output.ports();
    info!("Detected {} output devices", ports.len());
    for (id, port) in ports.iter().enumerate() {
        info!("\tID {id}: {}", output.port_name(port).unwrap_or_default());
    }
    Ok(())
}

fn open_input(
    name: &str,
    pattern: &str,
    context: InputContext,
) -> Result<MidiInputConnection<InputContext>, BackendError> {
    let mut input = MidiInput::new(CLIENT_NAME).map_err(|e| BackendError::DeviceOpen(e.to_string()))?;
    input.ignore(Ignore::Sysex);
    let port = match_input_port(&input, pattern)?;
    input
        .connect(&port, name, handle_input, context)
        .map_err(|e| BackendError::DeviceOpen(e.to_string()))
}

fn open_output(name: &str, pattern: &str) -> Result<MidiOutputConnection, BackendError> {
    let output =
        MidiOutput::new(CLIENT_NAME).map_err(|e| BackendError::DeviceOpen(e.to_string()))?;
    let port = match_output_port(&output, pattern)?;
    output
        .connect(&port, name)
        .map_err(|e| BackendError::DeviceOpen(e.to_string()))
}

// An all-digit pattern in range selects by id, anything else is a name
// prefix; first match wins.
fn match_input_port(input: &MidiInput, pattern: &str) -> Result<MidiInputPort, BackendError> {
    let ports = input.ports();
    if let Ok(id) = pattern.parse::<usize>() {
        if let Some(port) = ports.get(id) {
            info!(
                "Selected input device {} for ID {id}",
                input.port_name(port).unwrap_or_default()
            );
            return Ok(port.clone());
        }
    }
    for port in &ports {
        if let Ok(name) = input.port_name(port) {
            if name.starts_with(pattern) {
                info!("Selected input device {name} for name {pattern}");
                return Ok(port.clone());
            }
        }
    }
    Err(BackendError::DeviceNotFound(pattern.to_string()))
}

fn match_output_port(output: &MidiOutput, pattern: &str) -> Result<MidiOutputPort, BackendError> {
    let ports = output.ports();
    if let Ok(id) = pattern.parse::<usize>() {
        if let Some(port) = ports.get(id) {
            info!(
                "Selected output device {} for ID {id}",
                output.port_name(port).unwrap_or_default()
            );
            return Ok(port.clone());
        }
    }
    for port in &ports {
        if let Ok(name) = output.port_name(port) {
            if name.starts_with(pattern) {
                info!("Selected output device {name} for name {pattern}");
                return Ok(port.clone());
            }
        }
    }
    Err(BackendError::DeviceNotFound(pattern.to_string()))
}

/// Input callback. Runs on an OS-owned thread; hands events to the main loop
/// through the shared queue and nudges the wakeup pipe when the queue was
/// empty (a non-empty queue already has a wakeup in flight).
fn handle_input(_timestamp: u64, raw: &[u8], context: &mut InputContext) {
    let message = match ShortMessage::decode(raw) {
        Ok(Some(message)) => message,
        Ok(None) => {
            trace!(
                "Ignoring unhandled status byte {:#04x}",
                raw.first().copied().unwrap_or(0)
            );
            return;
        }
        Err(e) => {
            debug!("Dropping malformed message: {e}");
            return;
        }
    };

    let mut wake = false;

    // (N)RPN-relevant control changes advance the reassembler; a completed
    // parameter queues its own event ahead of the plain CC event
    if let ShortMessage::ControlChange {
        channel,
        control,
        value,
    } = message
    {
        if EpnDecoder::wants(control) {
            if let Some((channel_id, value)) = context.epn.feed(channel, control, value) {
                wake |= enqueue(context, channel_id, value);
            }
        }
    }

    let (channel_id, value) = message.to_event();
    trace!(
        "Incoming message {channel_id} value {value} on instance {}",
        context.instance
    );
    wake |= enqueue(context, channel_id, value);

    if wake {
        context.wakeup.notify();
    }
}

fn enqueue(context: &InputContext, channel: ChannelId, value: f64) -> bool {
    match context.queue.push(QueuedEvent {
        instance: context.instance,
        channel,
        value,
    }) {
        Ok(was_empty) => was_empty,
        Err(e) => {
            warn!("Failed to enqueue incoming event: {e}");
            false
        }
    }
}
