use std::{
    thread::sleep,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    forwarder::{
        sync::{ReliableSender, SendError},
        ForwarderConfiguration, Transport,
    },
    shutdown::Shutdown,
    telemetry::{DropReason, Telemetry},
    writer::{join_pairs, Sample},
};

const WAVEFORM_STEP: f64 = 0.2;

// Steps per period; 50 steps of 0.2 make up one period of 10.
const WAVEFORM_STEPS_PER_PERIOD: u64 = 50;

/// Errors that could occur while running the publisher.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Too many sends failed in a row.
    #[error("giving up after {consecutive} consecutive failed sends")]
    TooManyFailures {
        /// Number of consecutive failures.
        consecutive: u64,

        /// The last send failure.
        #[source]
        last: SendError,
    },
}

/// Deterministic sawtooth waveform: each step adds 0.2, wrapping at 10.
///
/// The value is derived from an integer step count so that the wrap lands exactly on zero instead of accumulating
/// floating point error.
#[derive(Clone, Debug, Default)]
pub struct Waveform {
    step: u64,
}

impl Waveform {
    /// Creates a new `Waveform` starting at zero.
    pub const fn new() -> Self {
        Self { step: 0 }
    }

    /// Advances the waveform by one step and returns the new value.
    pub fn advance(&mut self) -> f64 {
        self.step = (self.step + 1) % WAVEFORM_STEPS_PER_PERIOD;
        self.value()
    }

    /// Returns the current value.
    pub fn value(&self) -> f64 {
        self.step as f64 * WAVEFORM_STEP
    }
}

/// Totals for a single publisher run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublisherReport {
    /// Number of samples generated.
    pub samples_generated: u64,

    /// Number of samples fully handed to the transport.
    pub samples_published: u64,

    /// Number of samples dropped, either because they could not be encoded or could not be sent.
    pub samples_dropped: u64,

    /// Number of bytes handed to the transport.
    pub bytes_sent: u64,

    /// Number of sends retried because the endpoint was not actually ready.
    pub send_retries: u64,
}

pub(crate) struct PublisherConfiguration {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub sample_interval: Duration,
    pub progress_interval: u64,
    pub max_line_len: usize,
    pub sample_limit: Option<u64>,
    pub max_consecutive_failures: Option<u64>,
}

/// Periodically samples a waveform and publishes it over a transport.
pub struct Publisher<T> {
    config: PublisherConfiguration,
    forwarder_config: ForwarderConfiguration,
    sender: ReliableSender,
    transport: T,
}

impl<T: Transport> Publisher<T> {
    pub(crate) fn new(
        config: PublisherConfiguration,
        forwarder_config: ForwarderConfiguration,
        sender: ReliableSender,
        transport: T,
    ) -> Self {
        Publisher { config, forwarder_config, sender, transport }
    }

    /// Returns the tag set attached to every sample, joined as it appears on the wire.
    pub fn tag_set(&self) -> String {
        join_pairs(&self.config.tags)
    }

    /// Runs the publisher until shutdown is requested, the sample limit is reached, or too many sends fail in a row.
    ///
    /// Shutdown is only observed between ticks: a send in progress always runs to completion. The transport is closed
    /// exactly once before returning, regardless of why the publisher stopped.
    ///
    /// # Errors
    ///
    /// If a consecutive failure limit is configured and reached, [`PublishError::TooManyFailures`] is returned.
    pub fn run(self, shutdown: &Shutdown) -> Result<PublisherReport, PublishError> {
        let Publisher { config, forwarder_config, sender, mut transport } = self;
        let telemetry = Telemetry::new(forwarder_config.remote_addr.transport_id());

        info!(
            destination = %forwarder_config.remote_addr,
            measurement = %config.measurement,
            tags = %join_pairs(&config.tags),
            sample_interval = ?config.sample_interval,
            write_timeout = ?forwarder_config.write_timeout,
            "Starting publisher."
        );

        let mut waveform = Waveform::new();
        let mut report = PublisherReport::default();
        let mut consecutive_failures = 0;

        let result = loop {
            let next_tick = Instant::now() + config.sample_interval;

            let value = waveform.advance();
            report.samples_generated += 1;

            let sample = Sample::new(config.measurement.as_str(), unix_timestamp_ns())
                .with_tags(&config.tags)
                .with_field("value", format!("{value:.6}"));

            match sample.encode(config.max_line_len) {
                Ok(line) => match sender.send(&mut transport, line.as_bytes()) {
                    Ok(send_report) => {
                        consecutive_failures = 0;
                        telemetry.track_published(&send_report);
                        report.samples_published += 1;
                        report.bytes_sent += send_report.bytes_sent as u64;
                        report.send_retries += send_report.retries as u64;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to send sample.");
                        let reason = if e.is_timeout() { DropReason::Timeout } else { DropReason::Fatal };
                        telemetry.track_dropped(reason);
                        report.samples_dropped += 1;
                        consecutive_failures += 1;

                        if let Some(limit) = config.max_consecutive_failures {
                            if consecutive_failures >= limit {
                                break Err(PublishError::TooManyFailures {
                                    consecutive: consecutive_failures,
                                    last: e,
                                });
                            }
                        }
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Dropping sample that could not be encoded.");
                    telemetry.track_dropped(DropReason::Overflow);
                    report.samples_dropped += 1;
                }
            }

            // If the tick took longer than the sample interval, we don't sleep at all.
            if let Some(sleep_duration) = next_tick.checked_duration_since(Instant::now()) {
                sleep(sleep_duration);
            }

            if report.samples_generated % config.progress_interval == 0 {
                info!(
                    published = report.samples_published,
                    dropped = report.samples_dropped,
                    "Published {} measurements.",
                    report.samples_generated
                );
            }

            if shutdown.is_requested() {
                info!("Shutdown requested, stopping publisher.");
                break Ok(());
            }

            if config.sample_limit.is_some_and(|limit| report.samples_generated >= limit) {
                debug!(samples = report.samples_generated, "Sample limit reached, stopping publisher.");
                break Ok(());
            }
        };

        transport.close();
        debug!(?report, "Publisher stopped.");

        result.map(|()| report)
    }
}

/// Returns the current wall clock time in nanoseconds since the Unix epoch.
///
/// A clock set before the epoch yields zero.
fn unix_timestamp_ns() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(since_epoch) => u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX),
        Err(e) => {
            warn!(error = %e, "System clock is set before the Unix epoch.");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    use super::*;
    use crate::{
        builder::PublisherBuilder,
        forwarder::{Readiness, SendOutcome},
    };

    #[derive(Default)]
    struct Recorded {
        payloads: Vec<String>,
        closes: usize,
    }

    /// An in-memory transport that records every payload it accepts.
    struct RecordingTransport {
        recorded: Arc<Mutex<Recorded>>,
        fail_with: Option<io::ErrorKind>,
        request_shutdown_after: Option<(usize, Shutdown)>,
    }

    impl RecordingTransport {
        fn new() -> (Self, Arc<Mutex<Recorded>>) {
            let recorded = Arc::new(Mutex::new(Recorded::default()));
            let transport =
                Self { recorded: Arc::clone(&recorded), fail_with: None, request_shutdown_after: None };
            (transport, recorded)
        }
    }

    impl Transport for RecordingTransport {
        fn poll_writable(&mut self, _timeout: Duration) -> io::Result<Readiness> {
            Ok(Readiness::Ready)
        }

        fn try_send(&mut self, buf: &[u8]) -> io::Result<SendOutcome> {
            if let Some(kind) = self.fail_with {
                return Err(io::Error::from(kind));
            }

            let mut recorded = self.recorded.lock().unwrap();
            recorded.payloads.push(String::from_utf8(buf.to_vec()).unwrap());

            if let Some((after, shutdown)) = &self.request_shutdown_after {
                if recorded.payloads.len() == *after {
                    shutdown.request();
                }
            }

            Ok(SendOutcome::Accepted(buf.len()))
        }

        fn close(self) {
            self.recorded.lock().unwrap().closes += 1;
        }
    }

    fn builder() -> PublisherBuilder {
        PublisherBuilder::default()
            .with_hostname_tag(false)
            .with_sample_interval(Duration::from_millis(1))
    }

    fn field_value(line: &str) -> &str {
        let mut parts = line.split(' ');
        let fields = parts.nth(1).expect("missing field set");
        fields.strip_prefix("value=").expect("missing value field")
    }

    #[test]
    fn waveform_wraps() {
        let mut waveform = Waveform::new();
        assert_eq!(waveform.value(), 0.0);

        let values = (0..60).map(|_| waveform.advance()).collect::<Vec<_>>();
        assert!(values.iter().all(|v| (0.0..10.0).contains(v)));

        // The 50th step lands exactly back on zero.
        let wrap = values.windows(2).position(|w| w[1] < w[0]).expect("waveform never wrapped");
        assert_eq!(wrap, 48);
        assert_eq!(values[49], 0.0);
        assert_eq!(format!("{:.6}", values[48]), "9.800000");
        assert_eq!(format!("{:.6}", values[50]), "0.200000");
        assert_eq!(format!("{:.6}", values[59]), "2.000000");
    }

    #[test]
    fn wire_values_wrap_at_ten() {
        let (transport, recorded) = RecordingTransport::new();
        let publisher =
            builder().with_sample_limit(Some(51)).build_with_transport(transport).expect("should build");
        publisher.run(&Shutdown::new()).expect("run should succeed");

        let recorded = recorded.lock().unwrap();
        let values = recorded.payloads.iter().map(|line| field_value(line)).collect::<Vec<_>>();
        assert_eq!(values.len(), 51);
        assert_eq!(values[48], "9.800000");
        assert_eq!(values[49], "0.000000");
        assert_eq!(values[50], "0.200000");
        assert!(values.iter().all(|v| v.parse::<f64>().unwrap() < 10.0));
    }

    #[test]
    fn publishes_waveform_values() {
        let (transport, recorded) = RecordingTransport::new();
        let publisher =
            builder().with_sample_limit(Some(5)).build_with_transport(transport).expect("should build");

        let report = publisher.run(&Shutdown::new()).expect("run should succeed");
        assert_eq!(report.samples_generated, 5);
        assert_eq!(report.samples_published, 5);
        assert_eq!(report.samples_dropped, 0);

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.closes, 1);

        let values = recorded.payloads.iter().map(|line| field_value(line)).collect::<Vec<_>>();
        assert_eq!(values, ["0.200000", "0.400000", "0.600000", "0.800000", "1.000000"]);

        let total_bytes: usize = recorded.payloads.iter().map(String::len).sum();
        assert_eq!(report.bytes_sent, total_bytes as u64);

        for line in &recorded.payloads {
            let (head, rest) = line.split_once(' ').unwrap();
            assert_eq!(head, "series,language=rust");
            let (_, timestamp) = rest.split_once(' ').unwrap();
            assert!(timestamp.parse::<u64>().unwrap() > 0);
        }
    }

    #[test]
    fn shutdown_stops_further_sends() {
        let shutdown = Shutdown::new();
        let (mut transport, recorded) = RecordingTransport::new();
        transport.request_shutdown_after = Some((3, shutdown.clone()));

        let publisher = builder().build_with_transport(transport).expect("should build");
        let report = publisher.run(&shutdown).expect("run should succeed");
        assert_eq!(report.samples_generated, 3);

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.payloads.len(), 3);
        assert_eq!(recorded.closes, 1);
    }

    #[test]
    fn shutdown_requested_before_start_still_sends_one_tick() {
        let shutdown = Shutdown::new();
        shutdown.request();

        let (transport, recorded) = RecordingTransport::new();
        let publisher = builder().build_with_transport(transport).expect("should build");
        publisher.run(&shutdown).expect("run should succeed");

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.payloads.len(), 1);
        assert_eq!(recorded.closes, 1);
    }

    #[test]
    fn failed_sends_do_not_stop_the_loop() {
        let (mut transport, recorded) = RecordingTransport::new();
        transport.fail_with = Some(io::ErrorKind::ConnectionRefused);

        let publisher =
            builder().with_sample_limit(Some(4)).build_with_transport(transport).expect("should build");
        let report = publisher.run(&Shutdown::new()).expect("run should succeed");
        assert_eq!(report.samples_generated, 4);
        assert_eq!(report.samples_published, 0);
        assert_eq!(report.samples_dropped, 4);
        assert_eq!(recorded.lock().unwrap().closes, 1);
    }

    #[test]
    fn consecutive_failure_limit() {
        let (mut transport, recorded) = RecordingTransport::new();
        transport.fail_with = Some(io::ErrorKind::PermissionDenied);

        let publisher = builder()
            .with_sample_limit(Some(10))
            .with_max_consecutive_failures(Some(3))
            .build_with_transport(transport)
            .expect("should build");

        match publisher.run(&Shutdown::new()) {
            Err(PublishError::TooManyFailures { consecutive, last }) => {
                assert_eq!(consecutive, 3);
                assert!(!last.is_timeout());
            }
            other => panic!("expected failure limit to be hit, got {:?}", other),
        }
        assert_eq!(recorded.lock().unwrap().closes, 1);
    }

    #[test]
    fn overflowing_samples_are_dropped() {
        let (transport, recorded) = RecordingTransport::new();
        let publisher = builder()
            .with_sample_limit(Some(3))
            .with_maximum_line_length(16)
            .build_with_transport(transport)
            .expect("should build");

        let report = publisher.run(&Shutdown::new()).expect("run should succeed");
        assert_eq!(report.samples_generated, 3);
        assert_eq!(report.samples_dropped, 3);

        let recorded = recorded.lock().unwrap();
        assert!(recorded.payloads.is_empty());
        assert_eq!(recorded.closes, 1);
    }

    #[test]
    fn telemetry() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let (transport, _) = RecordingTransport::new();
            let publisher = builder()
                .with_sample_limit(Some(4))
                .with_maximum_line_length(80)
                .build_with_transport(transport)
                .expect("should build");
            publisher.run(&Shutdown::new()).expect("run should succeed");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let counter = |name: &str| -> u64 {
            snapshot
                .iter()
                .filter(|(key, _, _, _)| key.key().name() == name)
                .map(|(_, _, _, value)| match value {
                    DebugValue::Counter(v) => *v,
                    other => panic!("unexpected value {:?}", other),
                })
                .sum()
        };

        assert_eq!(counter("value_publisher.samples_published"), 4);
        assert_eq!(counter("value_publisher.samples_dropped"), 0);
        assert!(counter("value_publisher.bytes_sent") > 0);
        assert_eq!(counter("value_publisher.send_retries"), 0);
    }
}
