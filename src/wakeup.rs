//! Wakeup pipe between producer threads and the main loop.
//!
//! A self-connected loopback datagram pair: the receiving end is waited on by
//! the main loop, the sending end is written by device callbacks after they
//! enqueue into an empty queue. Datagram writes never block and never
//! partially succeed; a wakeup the kernel drops is harmless because the queue
//! drain, not the byte count, is authoritative.

use std::io;
use std::net::{Ipv4Addr, UdpSocket};
use std::time::Duration;

use log::debug;

/// Receiving end, owned by the main loop.
#[derive(Debug)]
pub struct WakeupPipe {
    socket: UdpSocket,
}

/// Sending end, cloned into every producer.
#[derive(Debug)]
pub struct WakeupSender {
    socket: UdpSocket,
}

/// Open the pipe. Both ends bind ephemeral ports on 127.0.0.1 and the sender
/// is connected to the receiver, so writes cannot stray.
pub fn wakeup_pair() -> io::Result<(WakeupPipe, WakeupSender)> {
    let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
    let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
    sender.connect(receiver.local_addr()?)?;
    sender.set_nonblocking(true)?;
    debug!(
        "Wakeup pipe established on port {}",
        receiver.local_addr()?.port()
    );
    Ok((WakeupPipe { socket: receiver }, WakeupSender { socket: sender }))
}

impl WakeupPipe {
    /// Block until a wakeup byte arrives or `timeout` (which must be nonzero)
    /// elapses. Returns whether a wakeup was observed.
    pub fn wait(&self, timeout: Duration) -> io::Result<bool> {
        self.socket.set_read_timeout(Some(timeout))?;
        let mut buf = [0u8; 16];
        match self.socket.recv(&mut buf) {
            Ok(_) => Ok(true),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Discard every pending wakeup byte. Must run before the queue drain so
    /// a byte is never consumed for an event the drain has not observed. The
    /// count is diagnostic only.
    pub fn flush(&self) -> io::Result<usize> {
        self.socket.set_nonblocking(true)?;
        let mut buf = [0u8; 1024];
        let mut bytes = 0;
        let result = loop {
            match self.socket.recv(&mut buf) {
                Ok(n) => bytes += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(bytes),
                Err(e) => break Err(e),
            }
        };
        self.socket.set_nonblocking(false)?;
        result
    }
}

impl WakeupSender {
    /// Mark the queue non-empty. Never blocks; failures are logged and
    /// dropped because the queue drain is authoritative.
    pub fn notify(&self) {
        if let Err(e) = self.socket.send(b"w") {
            if e.kind() != io::ErrorKind::WouldBlock {
                debug!("Wakeup write failed: {e}");
            }
        }
    }

    pub fn try_clone(&self) -> io::Result<WakeupSender> {
        Ok(WakeupSender {
            socket: self.socket.try_clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_wakes_the_waiter() {
        let (pipe, sender) = wakeup_pair().unwrap();
        sender.notify();
        assert!(pipe.wait(Duration::from_secs(2)).unwrap());
    }

    #[test]
    fn wait_times_out_when_quiescent() {
        let (pipe, _sender) = wakeup_pair().unwrap();
        assert!(!pipe.wait(Duration::from_millis(20)).unwrap());
    }

    #[test]
    fn flush_discards_backlog() {
        let (pipe, sender) = wakeup_pair().unwrap();
        for _ in 0..3 {
            sender.notify();
        }
        assert!(pipe.wait(Duration::from_secs(2)).unwrap());
        // give the remaining datagrams time to land, then flush them all
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(pipe.flush().unwrap(), 2);
        assert!(!pipe.wait(Duration::from_millis(20)).unwrap());
    }

    #[test]
    fn cloned_senders_share_the_pipe() {
        let (pipe, sender) = wakeup_pair().unwrap();
        let clone = sender.try_clone().unwrap();
        clone.notify();
        assert!(pipe.wait(Duration::from_secs(2)).unwrap());
    }
}
