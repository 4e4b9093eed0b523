use std::{io, thread::sleep, time::Duration};

use thiserror::Error;
use tracing::trace;

use super::{Readiness, SendOutcome, Transport};

/// Errors that could occur while sending a payload.
#[derive(Debug, Error)]
pub enum SendError {
    /// The endpoint did not become writable within the per-attempt timeout.
    #[error("timed out after {timeout:?} waiting for endpoint to become writable ({bytes_sent} of {payload_len} bytes sent)")]
    TimedOut {
        /// The per-attempt timeout that expired.
        timeout: Duration,

        /// Number of bytes accepted before timing out.
        bytes_sent: usize,

        /// Total length of the payload.
        payload_len: usize,
    },

    /// The transport reported an error other than not being ready.
    #[error("failed to send payload ({bytes_sent} of {payload_len} bytes sent): {source}")]
    Fatal {
        /// The underlying transport error.
        #[source]
        source: io::Error,

        /// Number of bytes accepted before failing.
        bytes_sent: usize,

        /// Total length of the payload.
        payload_len: usize,
    },
}

impl SendError {
    /// Returns `true` if this error was caused by the endpoint not becoming writable in time.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, SendError::TimedOut { .. })
    }
}

/// Summary of a completed transmission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Number of bytes accepted by the transport.
    pub bytes_sent: usize,

    /// Number of send calls that accepted bytes.
    pub send_calls: usize,

    /// Number of send calls that reported the endpoint was not ready, despite it having been reported writable.
    pub retries: usize,
}

enum SendState {
    // Deciding whether there is anything left to send.
    Accumulating,

    // Waiting for the endpoint to become writable.
    WaitingReady,

    // Endpoint was reported writable; attempting to send the remainder.
    Sending,

    Done,
    Fatal(io::Error),
    TimedOut,
}

/// Per-call transmission bookkeeping.
///
/// `bytes_sent` only ever moves forward, and never past the end of the payload.
struct TransmissionState<'a> {
    payload: &'a [u8],
    bytes_sent: usize,
    report: SendReport,
}

impl<'a> TransmissionState<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, bytes_sent: 0, report: SendReport::default() }
    }

    fn is_complete(&self) -> bool {
        self.bytes_sent == self.payload.len()
    }

    fn remaining(&self) -> &'a [u8] {
        &self.payload[self.bytes_sent..]
    }

    fn advance(&mut self, n: usize) {
        // A transport claiming to have accepted more than we handed it is clamped to the remainder.
        let n = n.min(self.payload.len() - self.bytes_sent);
        self.bytes_sent += n;
        self.report.bytes_sent = self.bytes_sent;
        self.report.send_calls += 1;
    }
}

/// Reliably hands a payload to a non-blocking transport.
///
/// Waits for the endpoint to become writable, sends as much of the remaining payload as the endpoint will accept, and
/// repeats until the whole payload has been accepted. An endpoint that reports `WouldBlock` after having been reported
/// writable is given a short pause before waiting on readiness again.
pub struct ReliableSender {
    write_timeout: Duration,
    retry_pause: Duration,
}

impl ReliableSender {
    /// Creates a new `ReliableSender`.
    ///
    /// `write_timeout` bounds each individual readiness wait, and `retry_pause` is how long to pause after the endpoint
    /// reports it was not actually ready.
    pub const fn new(write_timeout: Duration, retry_pause: Duration) -> Self {
        Self { write_timeout, retry_pause }
    }

    /// Sends `payload` over `transport`.
    ///
    /// # Errors
    ///
    /// If the endpoint does not become writable within the configured write timeout, [`SendError::TimedOut`] is
    /// returned and the rest of the payload is abandoned. If the transport returns any error other than not being
    /// ready, [`SendError::Fatal`] is returned and the rest of the payload is abandoned.
    pub fn send<T: Transport>(&self, transport: &mut T, payload: &[u8]) -> Result<SendReport, SendError> {
        let mut tx = TransmissionState::new(payload);
        let mut state = SendState::Accumulating;

        loop {
            state = match state {
                SendState::Accumulating => {
                    if tx.is_complete() {
                        SendState::Done
                    } else {
                        SendState::WaitingReady
                    }
                }
                SendState::WaitingReady => match transport.poll_writable(self.write_timeout) {
                    Ok(Readiness::Ready) => SendState::Sending,
                    Ok(Readiness::TimedOut) => SendState::TimedOut,
                    Err(e) => SendState::Fatal(e),
                },
                SendState::Sending => match transport.try_send(tx.remaining()) {
                    Ok(SendOutcome::Accepted(0)) => SendState::Fatal(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "transport accepted zero bytes",
                    )),
                    Ok(SendOutcome::Accepted(n)) => {
                        tx.advance(n);
                        trace!(accepted = n, bytes_sent = tx.bytes_sent, payload_len = payload.len(), "Sent bytes.");
                        SendState::Accumulating
                    }
                    Ok(SendOutcome::WouldBlock) => {
                        tx.report.retries += 1;
                        trace!(retry_pause = ?self.retry_pause, "Endpoint not ready despite readiness signal, pausing.");
                        sleep(self.retry_pause);
                        SendState::WaitingReady
                    }
                    Err(e) => SendState::Fatal(e),
                },
                SendState::Done => return Ok(tx.report),
                SendState::Fatal(source) => {
                    return Err(SendError::Fatal {
                        source,
                        bytes_sent: tx.bytes_sent,
                        payload_len: payload.len(),
                    })
                }
                SendState::TimedOut => {
                    return Err(SendError::TimedOut {
                        timeout: self.write_timeout,
                        bytes_sent: tx.bytes_sent,
                        payload_len: payload.len(),
                    })
                }
            };
        }
    }
}
