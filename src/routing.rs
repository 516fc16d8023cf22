//! Router interface consumed by the backend, plus the mapping table the
//! daemon binary feeds it with.

use std::collections::HashMap;

use crossbeam_channel::Sender;
use log::debug;

use crate::midi::channel::ChannelId;
use crate::InstanceId;

/// Opaque handle to a registered channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteHandle(usize);

/// Maps channel identifiers across instances. The backend guarantees that
/// the identifier it produces on receive matches the one it accepts on
/// transmit for the same logical parameter; everything else is up to the
/// implementation.
pub trait Router {
    /// Resolve a channel, registering it when `create` is set.
    fn lookup(
        &mut self,
        instance: InstanceId,
        channel: ChannelId,
        create: bool,
    ) -> Option<RouteHandle>;

    /// Hand a normalized value to whatever the channel routes to.
    fn deliver(&mut self, handle: RouteHandle, value: f64);
}

/// Transmit request emitted when a delivery lands on a channel mapped to an
/// output; executed by the main loop after the drain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxRequest {
    pub instance: InstanceId,
    pub channel: ChannelId,
    pub value: f64,
}

#[derive(Debug)]
struct ChannelEntry {
    instance: InstanceId,
    channel: ChannelId,
    targets: Vec<usize>,
}

/// Static mapping table: registered channels forward their deliveries to
/// zero or more target channels as `TxRequest`s.
#[derive(Debug)]
pub struct RoutingTable {
    entries: Vec<ChannelEntry>,
    // the packed identifier doubles as the hash key
    index: HashMap<(InstanceId, u64), usize>,
    requests: Sender<TxRequest>,
}

impl RoutingTable {
    pub fn new(requests: Sender<TxRequest>) -> Self {
        RoutingTable {
            entries: Vec::new(),
            index: HashMap::new(),
            requests,
        }
    }

    /// Forward deliveries on `from` to `to`.
    pub fn map(&mut self, from: RouteHandle, to: RouteHandle) {
        self.entries[from.0].targets.push(to.0);
    }
}

impl Router for RoutingTable {
    fn lookup(
        &mut self,
        instance: InstanceId,
        channel: ChannelId,
        create: bool,
    ) -> Option<RouteHandle> {
        let key = (instance, channel.pack());
        if let Some(&entry) = self.index.get(&key) {
            return Some(RouteHandle(entry));
        }
        if !create {
            return None;
        }
        let entry = self.entries.len();
        self.entries.push(ChannelEntry {
            instance,
            channel,
            targets: Vec::new(),
        });
        self.index.insert(key, entry);
        Some(RouteHandle(entry))
    }

    fn deliver(&mut self, handle: RouteHandle, value: f64) {
        let entry = &self.entries[handle.0];
        for &target in &entry.targets {
            let target = &self.entries[target];
            if self
                .requests
                .send(TxRequest {
                    instance: target.instance,
                    channel: target.channel,
                    value,
                })
                .is_err()
            {
                debug!("Transmit side gone, dropping delivery");
            }
        }
    }
}

/// Mock router for tests and dependency injection; records every delivery.
#[derive(Debug, Default)]
pub struct MockRouter {
    channels: Vec<(InstanceId, ChannelId)>,
    index: HashMap<(InstanceId, u64), usize>,
    pub delivered: Vec<(InstanceId, ChannelId, f64)>,
}

impl MockRouter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Router for MockRouter {
    fn lookup(
        &mut self,
        instance: InstanceId,
        channel: ChannelId,
        create: bool,
    ) -> Option<RouteHandle> {
        let key = (instance, channel.pack());
        if let Some(&entry) = self.index.get(&key) {
            return Some(RouteHandle(entry));
        }
        if !create {
            return None;
        }
        let entry = self.channels.len();
        self.channels.push((instance, channel));
        self.index.insert(key, entry);
        Some(RouteHandle(entry))
    }

    fn deliver(&mut self, handle: RouteHandle, value: f64) {
        let (instance, channel) = self.channels[handle.0];
        self.delivered.push((instance, channel, value));
    }
}
