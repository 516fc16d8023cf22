//! End-to-end tests over the public pipeline: wire decode, (N)RPN
//! reassembly, the shared queue, the wakeup pipe and the routing table.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use midimonster::midi::channel::{parse_channel_spec, ChannelId, ControlType};
use midimonster::midi::epn::{self, EpnDecoder};
use midimonster::midi::wire::ShortMessage;
use midimonster::queue::{EventQueue, QueuedEvent};
use midimonster::routing::{MockRouter, Router, RoutingTable, TxRequest};
use midimonster::wakeup;
use midimonster::InstanceId;

/// What the backend's process step does: look up each drained event and
/// deliver it when the router knows the channel.
fn drain_into(queue: &EventQueue, router: &mut MockRouter) -> usize {
    queue.drain(|event| {
        if let Some(handle) = router.lookup(event.instance, event.channel, false) {
            router.deliver(handle, event.value);
        }
    })
}

/// What the input callback does for one decoded message: feed the (N)RPN
/// decoder, queue the completed parameter event and the plain event, nudge
/// the pipe when the queue went non-empty.
fn ingest(
    queue: &EventQueue,
    sender: &wakeup::WakeupSender,
    decoder: &mut EpnDecoder,
    instance: InstanceId,
    raw: &[u8],
) {
    let message = match ShortMessage::decode(raw).unwrap() {
        Some(message) => message,
        None => return,
    };
    let mut wake = false;
    if let ShortMessage::ControlChange {
        channel,
        control,
        value,
    } = message
    {
        if EpnDecoder::wants(control) {
            if let Some((channel_id, value)) = decoder.feed(channel, control, value) {
                wake |= queue
                    .push(QueuedEvent {
                        instance,
                        channel: channel_id,
                        value,
                    })
                    .unwrap();
            }
        }
    }
    let (channel_id, value) = message.to_event();
    wake |= queue
        .push(QueuedEvent {
            instance,
            channel: channel_id,
            value,
        })
        .unwrap();
    if wake {
        sender.notify();
    }
}

#[test]
fn nrpn_stream_reaches_the_router_once() {
    let queue = EventQueue::new();
    let (_pipe, sender) = wakeup::wakeup_pair().unwrap();
    let mut decoder = EpnDecoder::new();
    let instance = InstanceId(0);

    let mut router = MockRouter::new();
    let nrpn = parse_channel_spec("ch0.nrpn130").unwrap();
    router.lookup(instance, nrpn, true).unwrap();

    for raw in [
        [0xB0, 99, 1],
        [0xB0, 98, 2],
        [0xB0, 6, 64],
        [0xB0, 38, 0],
    ] {
        ingest(&queue, &sender, &mut decoder, instance, &raw);
    }

    // four plain CC events plus the assembled parameter went through the queue
    assert_eq!(drain_into(&queue, &mut router), 5);
    assert_eq!(router.delivered.len(), 1);
    let (_, channel, value) = router.delivered[0];
    assert_eq!(channel, nrpn);
    assert!((value - 8192.0 / 16383.0).abs() < 1e-12);
}

#[test]
fn plain_cc_events_survive_alongside_epn() {
    let queue = EventQueue::new();
    let (_pipe, sender) = wakeup::wakeup_pair().unwrap();
    let mut decoder = EpnDecoder::new();
    let instance = InstanceId(0);

    let mut router = MockRouter::new();
    let cc6 = parse_channel_spec("ch0.cc6").unwrap();
    router.lookup(instance, cc6, true).unwrap();

    for raw in [
        [0xB0, 99, 1],
        [0xB0, 98, 2],
        [0xB0, 6, 64],
        [0xB0, 38, 0],
    ] {
        ingest(&queue, &sender, &mut decoder, instance, &raw);
    }

    drain_into(&queue, &mut router);
    // the raw CC 6 is still routable on its own channel
    assert_eq!(router.delivered.len(), 1);
    assert_eq!(router.delivered[0].1, cc6);
}

#[test]
fn pitch_bend_bytes_resolve_to_center_value() {
    let queue = EventQueue::new();
    let (_pipe, sender) = wakeup::wakeup_pair().unwrap();
    let mut decoder = EpnDecoder::new();
    let instance = InstanceId(0);

    let mut router = MockRouter::new();
    let pitch = parse_channel_spec("ch2.pitch").unwrap();
    router.lookup(instance, pitch, true).unwrap();

    ingest(&queue, &sender, &mut decoder, instance, &[0xE2, 0x00, 0x40]);

    drain_into(&queue, &mut router);
    assert_eq!(router.delivered.len(), 1);
    let (_, channel, value) = router.delivered[0];
    assert_eq!(channel, pitch);
    assert!((value - 8192.0 / 16383.0).abs() < 1e-12);
}

#[test]
fn rpn_write_fragments_to_exact_wire_bytes() {
    use bytes::BytesMut;

    let run = epn::encode(3, false, 0x0101, 0.5, false);
    let mut wire_bytes = Vec::new();
    let mut buf = BytesMut::new();
    for message in run {
        buf.clear();
        message.encode(&mut buf);
        wire_bytes.push(buf.to_vec());
    }
    assert_eq!(
        wire_bytes,
        vec![
            vec![0xB3, 101, 2],
            vec![0xB3, 100, 1],
            vec![0xB3, 6, 63],
            vec![0xB3, 38, 127],
            vec![0xB3, 101, 127],
            vec![0xB3, 100, 127],
        ]
    );
}

#[test]
fn mapped_delivery_produces_transmit_request() {
    let (tx, rx) = crossbeam_channel::unbounded::<TxRequest>();
    let mut table = RoutingTable::new(tx);

    let keys = InstanceId(0);
    let synth = InstanceId(1);
    let from = table
        .lookup(keys, parse_channel_spec("ch0.cc1").unwrap(), true)
        .unwrap();
    let to_channel = parse_channel_spec("ch1.pitch").unwrap();
    let to = table.lookup(synth, to_channel, true).unwrap();
    table.map(from, to);

    table.deliver(from, 0.5);

    let request = rx.try_recv().unwrap();
    assert_eq!(request.instance, synth);
    assert_eq!(request.channel, to_channel);
    assert_eq!(request.value, 0.5);
    assert!(rx.try_recv().is_err());
}

#[test]
fn two_producers_drain_without_loss_or_duplication() {
    const EVENTS_PER_PRODUCER: usize = 10_000;

    let queue = Arc::new(EventQueue::new());
    let (pipe, sender) = wakeup::wakeup_pair().unwrap();

    let channel = ChannelId {
        kind: ControlType::Cc,
        channel: 0,
        control: 1,
    };
    let mut router = MockRouter::new();
    router.lookup(InstanceId(0), channel, true).unwrap();
    router.lookup(InstanceId(1), channel, true).unwrap();

    let producers: Vec<_> = (0..2)
        .map(|p| {
            let queue = Arc::clone(&queue);
            let sender = sender.try_clone().unwrap();
            thread::spawn(move || {
                for i in 0..EVENTS_PER_PRODUCER {
                    let was_empty = queue
                        .push(QueuedEvent {
                            instance: InstanceId(p),
                            channel,
                            value: i as f64,
                        })
                        .unwrap();
                    if was_empty {
                        sender.notify();
                    }
                }
            })
        })
        .collect();

    // drain concurrently with the producers
    for _ in 0..100 {
        let _ = pipe.wait(Duration::from_millis(1)).unwrap();
        pipe.flush().unwrap();
        drain_into(&queue, &mut router);
    }

    for producer in producers {
        producer.join().unwrap();
    }
    pipe.flush().unwrap();
    drain_into(&queue, &mut router);

    assert_eq!(router.delivered.len(), 2 * EVENTS_PER_PRODUCER);

    // per-producer order is the push order, with nothing lost or repeated
    for p in 0..2 {
        let values: Vec<f64> = router
            .delivered
            .iter()
            .filter(|(instance, _, _)| *instance == InstanceId(p))
            .map(|&(_, _, value)| value)
            .collect();
        assert_eq!(
            values,
            (0..EVENTS_PER_PRODUCER).map(|i| i as f64).collect::<Vec<_>>()
        );
    }
}

#[test]
fn slow_consumer_misses_no_wakeup() {
    const EVENTS: usize = 500;

    let queue = Arc::new(EventQueue::new());
    let (pipe, sender) = wakeup::wakeup_pair().unwrap();

    let channel = ChannelId {
        kind: ControlType::Note,
        channel: 0,
        control: 60,
    };
    let mut router = MockRouter::new();
    router.lookup(InstanceId(0), channel, true).unwrap();

    let producer = {
        let queue = Arc::clone(&queue);
        let sender = sender.try_clone().unwrap();
        thread::spawn(move || {
            for i in 0..EVENTS {
                let was_empty = queue
                    .push(QueuedEvent {
                        instance: InstanceId(0),
                        channel,
                        value: i as f64,
                    })
                    .unwrap();
                if was_empty {
                    sender.notify();
                }
                if i % 50 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut received = 0;
    while received < EVENTS && Instant::now() < deadline {
        if pipe.wait(Duration::from_millis(100)).unwrap() {
            pipe.flush().unwrap();
        }
        received += drain_into(&queue, &mut router);
    }
    producer.join().unwrap();
    received += drain_into(&queue, &mut router);

    assert_eq!(received, EVENTS);
    assert_eq!(router.delivered.len(), EVENTS);
}
