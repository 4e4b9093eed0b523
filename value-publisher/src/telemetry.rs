use metrics::{counter, Counter};

use crate::forwarder::sync::SendReport;

/// Reason a sample was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The encoded line would not fit within the maximum line length.
    Overflow,

    /// The endpoint did not become writable in time.
    Timeout,

    /// The transport failed with a non-transient error.
    Fatal,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            DropReason::Overflow => "overflow",
            DropReason::Timeout => "timeout",
            DropReason::Fatal => "fatal",
        }
    }
}

/// Publisher telemetry.
///
/// Counters are registered against whichever recorder is active when the publisher is created. If no recorder has
/// been installed, they are no-ops.
pub struct Telemetry {
    samples_published: Counter,
    samples_dropped_overflow: Counter,
    samples_dropped_timeout: Counter,
    samples_dropped_fatal: Counter,
    bytes_sent: Counter,
    send_retries: Counter,
}

impl Telemetry {
    /// Creates a `Telemetry` instance.
    pub fn new(transport: &'static str) -> Self {
        let base_labels = telemetry_tags!("client_transport" => transport);
        let dropped_labels = |reason: DropReason| {
            telemetry_tags!("client_transport" => transport, "reason" => reason.as_str())
        };

        Self {
            samples_published: counter!("value_publisher.samples_published", base_labels.iter()),
            samples_dropped_overflow: counter!(
                "value_publisher.samples_dropped",
                dropped_labels(DropReason::Overflow).iter()
            ),
            samples_dropped_timeout: counter!(
                "value_publisher.samples_dropped",
                dropped_labels(DropReason::Timeout).iter()
            ),
            samples_dropped_fatal: counter!(
                "value_publisher.samples_dropped",
                dropped_labels(DropReason::Fatal).iter()
            ),
            bytes_sent: counter!("value_publisher.bytes_sent", base_labels.iter()),
            send_retries: counter!("value_publisher.send_retries", base_labels.iter()),
        }
    }

    /// Tracks a successfully published sample.
    pub fn track_published(&self, report: &SendReport) {
        self.samples_published.increment(1);
        self.bytes_sent.increment(report.bytes_sent as u64);
        self.send_retries.increment(report.retries as u64);
    }

    /// Tracks a dropped sample.
    pub fn track_dropped(&self, reason: DropReason) {
        match reason {
            DropReason::Overflow => self.samples_dropped_overflow.increment(1),
            DropReason::Timeout => self.samples_dropped_timeout.increment(1),
            DropReason::Fatal => self.samples_dropped_fatal.increment(1),
        }
    }
}

macro_rules! _telemetry_tags {
    ($($k:literal => $v:expr),*) => {
        [
            ::metrics::Label::from_static_parts("client", "rust"),
            ::metrics::Label::from_static_parts("client_version", env!("CARGO_PKG_VERSION")),
            $(::metrics::Label::from_static_parts($k, $v),)*
        ]
    };
}

pub(crate) use _telemetry_tags as telemetry_tags;
