use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    time::{Duration, Instant},
};

use mio::{net::UdpSocket, Events, Interest, Poll, Token};
use tracing::{debug, trace};

use super::{interrupted, would_block, Readiness, SendOutcome, Transport};

const ENDPOINT: Token = Token(0);

/// A non-blocking UDP endpoint bound to a single destination.
///
/// Readiness is tracked with `mio`, which is edge-triggered: once the socket has been reported writable, it stays
/// writable from our perspective until a send reports `WouldBlock`, at which point we go back to waiting for the next
/// readiness event.
pub struct Endpoint {
    socket: UdpSocket,
    destination: SocketAddr,
    poll: Poll,
    events: Events,
    writable: bool,
}

impl Endpoint {
    /// Creates a new `Endpoint` that sends to `destination`.
    ///
    /// The socket is bound to the unspecified address of the same family as `destination`, on an ephemeral port.
    ///
    /// # Errors
    ///
    /// If the socket cannot be created, cannot be placed into non-blocking mode, or cannot be registered for readiness
    /// events, an error is returned.
    pub fn create(destination: SocketAddr) -> io::Result<Self> {
        let bind_addr = match destination {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };

        // We go through the standard library socket so that a failure to switch to non-blocking mode is surfaced
        // to the caller rather than leaving us with a socket that could block in `try_send`.
        let socket = std::net::UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;

        let mut socket = UdpSocket::from_std(socket);
        let poll = Poll::new()?;
        poll.registry().register(&mut socket, ENDPOINT, Interest::WRITABLE)?;

        debug!(local_addr = ?socket.local_addr().ok(), %destination, "Created endpoint.");

        Ok(Endpoint { socket, destination, poll, events: Events::with_capacity(8), writable: false })
    }

    /// Returns the destination address.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Returns the local address the endpoint is bound to.
    ///
    /// # Errors
    ///
    /// If the local address cannot be queried, an error is returned.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for Endpoint {
    fn poll_writable(&mut self, timeout: Duration) -> io::Result<Readiness> {
        if self.writable {
            return Ok(Readiness::Ready);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.poll.poll(&mut self.events, Some(remaining)) {
                Ok(()) => {}
                Err(ref e) if interrupted(e) => continue,
                Err(e) => return Err(e),
            }

            trace!(events = self.events.iter().count(), "return from poll");

            if self.events.iter().any(|event| event.token() == ENDPOINT && event.is_writable()) {
                self.writable = true;
                return Ok(Readiness::Ready);
            }

            if remaining.is_zero() || Instant::now() >= deadline {
                return Ok(Readiness::TimedOut);
            }
        }
    }

    fn try_send(&mut self, buf: &[u8]) -> io::Result<SendOutcome> {
        loop {
            match self.socket.send_to(buf, self.destination) {
                Ok(n) => return Ok(SendOutcome::Accepted(n)),
                Err(ref e) if would_block(e) => {
                    self.writable = false;
                    return Ok(SendOutcome::WouldBlock);
                }
                // Interrupted before anything was sent, so just try again.
                Err(ref e) if interrupted(e) => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn close(mut self) {
        if let Err(e) = self.poll.registry().deregister(&mut self.socket) {
            debug!(error = %e, "Failed to deregister endpoint.");
        }

        debug!(destination = %self.destination, "Closed endpoint.");
    }
}
