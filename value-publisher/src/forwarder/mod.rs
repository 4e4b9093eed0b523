use std::{
    fmt, io,
    net::{SocketAddr, ToSocketAddrs as _},
    time::Duration,
};

pub mod channel;
pub mod sync;

/// Remote address of the collector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RemoteAddr {
    Udp(Vec<SocketAddr>),
}

impl RemoteAddr {
    /// Returns the transport ID for the remote address.
    ///
    /// This is a simple acronym related to the transport that will be used for the remote address, such as `udp` for
    /// UDP.
    pub const fn transport_id(&self) -> &'static str {
        match self {
            RemoteAddr::Udp(_) => "udp",
        }
    }

    /// Returns the first resolved socket address.
    pub fn primary(&self) -> Option<SocketAddr> {
        match self {
            RemoteAddr::Udp(addrs) => addrs.first().copied(),
        }
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.primary() {
            Some(addr) => write!(f, "{}://{}", self.transport_id(), addr),
            None => write!(f, "{}://<unresolved>", self.transport_id()),
        }
    }
}

impl<'a> TryFrom<&'a str> for RemoteAddr {
    type Error = String;

    fn try_from(addr: &'a str) -> Result<Self, Self::Error> {
        if let Some((scheme, rest)) = addr.split_once("://") {
            return match scheme {
                "udp" => RemoteAddr::try_from(rest),
                _ => Err(format!("invalid scheme '{scheme}' (expected 'udp')")),
            };
        }

        match addr.to_socket_addrs() {
            Ok(addrs) => {
                let addrs = addrs.collect::<Vec<_>>();
                if addrs.is_empty() {
                    Err(format!("'{addr}' did not resolve to any addresses"))
                } else {
                    Ok(RemoteAddr::Udp(addrs))
                }
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Forwarder configuration.
#[derive(Clone, Debug)]
pub struct ForwarderConfiguration {
    pub(crate) remote_addr: RemoteAddr,
    pub(crate) write_timeout: Duration,
    pub(crate) retry_pause: Duration,
}

/// Result of waiting for an endpoint to become writable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// The endpoint can accept more output.
    Ready,

    /// The wait expired before the endpoint became writable.
    TimedOut,
}

/// Result of a single non-blocking send attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The given number of bytes were accepted.
    Accepted(usize),

    /// The endpoint could not accept any bytes right now.
    WouldBlock,
}

/// A non-blocking, connectionless transport endpoint bound to a single destination.
///
/// Implementations must never block in [`try_send`][Transport::try_send]. The only place a caller is allowed to be
/// suspended is [`poll_writable`][Transport::poll_writable], and only up to the given timeout.
pub trait Transport {
    /// Waits until the endpoint can accept more output, or until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// If the underlying readiness mechanism fails, an error is returned.
    fn poll_writable(&mut self, timeout: Duration) -> io::Result<Readiness>;

    /// Attempts to send `buf` to the destination without blocking.
    ///
    /// # Errors
    ///
    /// Any error other than the endpoint not being ready is returned as-is.
    fn try_send(&mut self, buf: &[u8]) -> io::Result<SendOutcome>;

    /// Closes the endpoint.
    fn close(self);
}

pub(crate) fn would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

pub(crate) fn interrupted(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Interrupted
}
