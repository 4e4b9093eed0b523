//! A periodic telemetry publisher that sends samples to a collector in the [line protocol][line] format over UDP.
//!
//! [line]: https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/
//!
//! # Usage
//!
//! ```no_run
//! # use value_publisher::{PublisherBuilder, Shutdown};
//! // First, create a builder.
//! //
//! // The builder can configure the remote address, sampling cadence, timeouts, and which tags are attached to every
//! // sample.
//! let publisher = PublisherBuilder::default()
//!     .with_remote_address("127.0.0.1:8094")
//!     .expect("failed to parse remote address")
//!     .with_tag("region", "us-east-1")
//!     .build()
//!     .expect("failed to build publisher");
//!
//! // The publisher runs on the calling thread until shutdown is requested through a `Shutdown` handle, which can be
//! // cloned and handed to a signal handler.
//! let shutdown = Shutdown::new();
//! let report = publisher.run(&shutdown).expect("publisher failed");
//! println!("published {} samples", report.samples_published);
//! ```
//!
//! # Wire format
//!
//! Each sample is sent as a single datagram with no trailing newline:
//!
//! ```text
//! series,language=rust,hostname=node1 value=3.200000 1700000000123456789
//! ```
//!
//! Tag and field keys and values are not escaped.
//!
//! When no tags are configured, the comma after the measurement name is omitted as well, so the line reads
//! `<measurement> <field set> <timestamp>`. Parsers must not assume the first comma always ends the measurement name.
//!
//! # Delivery
//!
//! UDP is fire-and-forget, so "reliable" here only means that the full payload is handed to the kernel. Sends wait for
//! the socket to become writable, resume after partial sends, and briefly back off when the socket reports it is not
//! ready after all. A send that cannot make progress within the write timeout is dropped, as is one that hits any
//! other socket error, and the publisher moves on to the next sample.
//!
//! # Telemetry
//!
//! The publisher captures its own internal telemetry around the number of samples published or dropped, bytes sent,
//! and so on, through the [`metrics`] facade. These are only visible if a recorder is installed.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, PublisherBuilder};

mod forwarder;
pub use self::forwarder::{
    channel::Endpoint,
    sync::{ReliableSender, SendError, SendReport},
    Readiness, SendOutcome, Transport,
};

pub mod hostname;

mod publisher;
pub use self::publisher::{PublishError, Publisher, PublisherReport, Waveform};

mod shutdown;
pub use self::shutdown::Shutdown;

mod telemetry;

mod writer;
pub use self::writer::{encode_line, EncodeError, EncodedLine, Sample};
