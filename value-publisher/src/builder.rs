use std::{io, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::{
    forwarder::{channel::Endpoint, sync::ReliableSender, ForwarderConfiguration, RemoteAddr, Transport},
    hostname::system_hostname,
    publisher::{Publisher, PublisherConfiguration},
    writer::is_usable_line_length,
};

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RETRY_PAUSE: Duration = Duration::from_millis(10);
const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_PROGRESS_INTERVAL: u64 = 50;
const DEFAULT_MAX_LINE_LEN: usize = 2048;
const DEFAULT_MEASUREMENT: &str = "series";
const DEFAULT_PORT: u16 = 8094;

/// Errors that could occur while building a publisher.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// A configuration value was out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Details about which value was invalid.
        reason: String,
    },

    /// Failed to create the endpoint used to send samples.
    #[error("failed to create endpoint: {0}")]
    Endpoint(#[source] io::Error),
}

/// Builder for a [`Publisher`].
pub struct PublisherBuilder {
    remote_addr: RemoteAddr,
    write_timeout: Duration,
    retry_pause: Duration,
    sample_interval: Duration,
    progress_interval: u64,
    max_line_len: usize,
    measurement: String,
    tags: Vec<(String, String)>,
    hostname_tag: bool,
    sample_limit: Option<u64>,
    max_consecutive_failures: Option<u64>,
}

impl PublisherBuilder {
    /// Set the remote address to publish samples to.
    ///
    /// The address needs to be in the format of `<host>:<port>`, optionally prefixed with `udp://`.
    ///
    /// Defaults to sending to `127.0.0.1:8094` over UDP.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid address, an error will be returned indicating the
    /// reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.remote_addr = RemoteAddr::try_from(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        Ok(self)
    }

    /// Set the write timeout for sending samples.
    ///
    /// This bounds each wait for the endpoint to become writable. When it is reached, the sample being sent at the
    /// time is dropped without retrying.
    ///
    /// Defaults to 5 seconds.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set how long to pause when the endpoint reports it is not ready right after being reported writable.
    ///
    /// Defaults to 10 milliseconds.
    #[must_use]
    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// Set the interval between samples.
    ///
    /// Defaults to 100 milliseconds.
    #[must_use]
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Set how many samples are generated between progress notices.
    ///
    /// Defaults to 50.
    #[must_use]
    pub fn with_progress_interval(mut self, samples: u64) -> Self {
        self.progress_interval = samples;
        self
    }

    /// Set the maximum length of an encoded line.
    ///
    /// Lines must be strictly shorter than this length. Samples whose line would not fit are dropped.
    ///
    /// Defaults to 2048 bytes.
    #[must_use]
    pub fn with_maximum_line_length(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Set the measurement name.
    ///
    /// Defaults to `series`.
    #[must_use]
    pub fn with_measurement<M: Into<String>>(mut self, measurement: M) -> Self {
        self.measurement = measurement.into();
        self
    }

    /// Set a constant tag that is attached to every sample.
    ///
    /// If a tag with the same key is already set, its value is replaced. Tags are emitted in the order they were first
    /// set.
    ///
    /// Defaults to a single tag, `language=rust`.
    #[must_use]
    pub fn with_tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.tags.push((key, value)),
        }
        self
    }

    /// Sets whether or not to attach the system hostname as a `hostname` tag.
    ///
    /// If the hostname cannot be determined, the tag is omitted.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_hostname_tag(mut self, hostname_tag: bool) -> Self {
        self.hostname_tag = hostname_tag;
        self
    }

    /// Set the number of samples to generate before stopping.
    ///
    /// A limit of zero is rejected when building.
    ///
    /// Defaults to `None`, which publishes until shutdown is requested.
    #[must_use]
    pub fn with_sample_limit(mut self, limit: Option<u64>) -> Self {
        self.sample_limit = limit;
        self
    }

    /// Set the number of consecutive failed sends after which the publisher gives up.
    ///
    /// A successful send resets the count. Encoding failures do not count towards it.
    ///
    /// A limit of zero is rejected when building.
    ///
    /// Defaults to `None`, which logs failed sends and keeps going indefinitely.
    #[must_use]
    pub fn with_max_consecutive_failures(mut self, limit: Option<u64>) -> Self {
        self.max_consecutive_failures = limit;
        self
    }

    /// Returns the first resolved remote address.
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.remote_addr.primary()
    }

    fn validate(&self) -> Result<(), BuildError> {
        let invalid = |reason: &str| Err(BuildError::InvalidConfiguration { reason: reason.to_string() });

        if self.measurement.is_empty() {
            return invalid("measurement name must not be empty");
        }
        if self.sample_interval.is_zero() {
            return invalid("sample interval must be greater than zero");
        }
        if self.write_timeout.is_zero() {
            return invalid("write timeout must be greater than zero");
        }
        if self.progress_interval == 0 {
            return invalid("progress interval must be greater than zero");
        }
        if !is_usable_line_length(self.max_line_len) {
            return invalid("maximum line length is too small to hold any line");
        }
        if self.tags.iter().any(|(k, v)| k.is_empty() || v.is_empty()) {
            return invalid("tag keys and values must not be empty");
        }
        if self.sample_limit == Some(0) {
            return invalid("sample limit must be greater than zero");
        }
        if self.max_consecutive_failures == Some(0) {
            return invalid("consecutive failure limit must be greater than zero");
        }
        Ok(())
    }

    /// Builds the publisher, creating a UDP endpoint to send samples over.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, or the endpoint cannot be created, an error will be returned.
    pub fn build(self) -> Result<Publisher<Endpoint>, BuildError> {
        self.validate()?;

        let destination = self.remote_addr.primary().ok_or_else(|| BuildError::InvalidRemoteAddress {
            reason: "remote address did not resolve to any addresses".to_string(),
        })?;
        let endpoint = Endpoint::create(destination).map_err(BuildError::Endpoint)?;

        self.build_with_transport(endpoint)
    }

    /// Builds the publisher around the given transport.
    ///
    /// The configured remote address is only used for reporting; the transport is expected to already be bound to its
    /// destination.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, an error will be returned.
    pub fn build_with_transport<T: Transport>(self, transport: T) -> Result<Publisher<T>, BuildError> {
        self.validate()?;

        let mut tags = self.tags;
        if self.hostname_tag {
            if let Some(hostname) = system_hostname() {
                tags.push(("hostname".to_string(), hostname));
            }
        }

        let forwarder_config = ForwarderConfiguration {
            remote_addr: self.remote_addr,
            write_timeout: self.write_timeout,
            retry_pause: self.retry_pause,
        };
        let sender = ReliableSender::new(forwarder_config.write_timeout, forwarder_config.retry_pause);

        let config = PublisherConfiguration {
            measurement: self.measurement,
            tags,
            sample_interval: self.sample_interval,
            progress_interval: self.progress_interval,
            max_line_len: self.max_line_len,
            sample_limit: self.sample_limit,
            max_consecutive_failures: self.max_consecutive_failures,
        };

        Ok(Publisher::new(config, forwarder_config, sender, transport))
    }
}

impl Default for PublisherBuilder {
    fn default() -> Self {
        PublisherBuilder {
            remote_addr: RemoteAddr::Udp(vec![SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))]),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            retry_pause: DEFAULT_RETRY_PAUSE,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            measurement: DEFAULT_MEASUREMENT.to_string(),
            tags: vec![("language".to_string(), "rust".to_string())],
            hostname_tag: true,
            sample_limit: None,
            max_consecutive_failures: None,
        }
    }
}
