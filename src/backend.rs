//! Backend context tying the pieces together: instances, the shared event
//! queue and the wakeup pipe, with the poll/process cycle the main loop runs.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::config::Config;
use crate::instance::{self, MidiInstance};
use crate::midi::channel::ChannelId;
use crate::queue::EventQueue;
use crate::routing::Router;
use crate::wakeup::{self, WakeupPipe};
use crate::{BackendError, InstanceId};

pub struct MidiBackend {
    instances: Vec<MidiInstance>,
    queue: Arc<EventQueue>,
    wakeup: WakeupPipe,
    detect: bool,
}

impl MidiBackend {
    /// Bring the backend up: enumerate devices when asked to, open the wakeup
    /// pipe, then open every configured instance. Any failure aborts startup;
    /// instances already opened are released on the way out.
    pub fn start(config: &Config) -> Result<Self, BackendError> {
        if config.backend.list.is_on() {
            instance::list_devices()?;
        }

        let (pipe, sender) = wakeup::wakeup_pair()?;
        let queue = Arc::new(EventQueue::new());

        let mut instances = Vec::with_capacity(config.instance.len());
        for (id, instance_config) in config.instance.iter().enumerate() {
            // duplicate names would make mapping endpoints ambiguous
            if config.instance[..id]
                .iter()
                .any(|other| other.name == instance_config.name)
            {
                return Err(BackendError::Parse(format!(
                    "duplicate instance name {}",
                    instance_config.name
                )));
            }
            instances.push(MidiInstance::open(
                InstanceId(id),
                instance_config,
                &queue,
                sender.try_clone()?,
            )?);
        }

        info!("Backend started with {} instances", instances.len());
        Ok(MidiBackend {
            instances,
            queue,
            wakeup: pipe,
            detect: config.backend.detect.is_on(),
        })
    }

    /// Resolve an instance name from the configuration to its identifier.
    pub fn instance_id(&self, name: &str) -> Option<InstanceId> {
        self.instances
            .iter()
            .position(|instance| instance.name() == name)
            .map(InstanceId)
    }

    /// Wait for a wakeup. Returns false when the timeout elapsed with the
    /// pipe quiescent.
    pub fn poll(&self, timeout: Duration) -> io::Result<bool> {
        self.wakeup.wait(timeout)
    }

    /// Flush the wakeup pipe, then drain the queue into the router. The pipe
    /// is read first so a byte is never consumed for an event the drain does
    /// not observe.
    pub fn process<R: Router>(&self, router: &mut R) -> io::Result<usize> {
        let wakeups = self.wakeup.flush()?;

        let detect = self.detect;
        let instances = &self.instances;
        let handled = self.queue.drain(|event| {
            if detect {
                let name = instances
                    .get(event.instance.0)
                    .map(MidiInstance::name)
                    .unwrap_or("?");
                info!(
                    "Incoming data on channel {name}.{}, value {}",
                    event.channel, event.value
                );
            }
            if let Some(handle) = router.lookup(event.instance, event.channel, false) {
                router.deliver(handle, event.value);
            }
        });

        debug!("Flushed {wakeups} wakeup bytes, handled {handled} events");
        Ok(handled)
    }

    /// Transmit one event on an instance's output device.
    pub fn transmit(&mut self, instance: InstanceId, channel: ChannelId, value: f64) {
        if let Some(target) = self.instances.get_mut(instance.0) {
            target.send(channel, value);
        }
    }

    /// Stop input callbacks and release every device, then let the queue and
    /// pipe go down with the context.
    pub fn shutdown(mut self) {
        for instance in &mut self.instances {
            instance.close();
        }
        info!("Backend shut down");
    }
}
