use std::fmt;

use thiserror::Error;

/// Smallest line that could ever be produced: a single-byte measurement, a single-byte field set, and a one-digit
/// timestamp, separated by spaces.
const SMALLEST_VALID_LINE_LEN: usize = b"a b 0".len();

/// Errors that could occur while encoding a line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// The measurement name was empty.
    #[error("measurement name must not be empty")]
    EmptyMeasurement,

    /// The formatted line would not fit within the maximum line length.
    #[error("encoded line length {len} reaches or exceeds maximum line length {max_len}")]
    Overflow {
        /// Length the formatted line would have had.
        len: usize,

        /// Configured maximum line length.
        max_len: usize,
    },
}

/// A single measurement ready to be encoded.
///
/// Tags and fields are kept in insertion order, and are emitted in that same order.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, String)>,
    timestamp_ns: u64,
}

impl Sample {
    /// Creates a new `Sample` with no tags or fields.
    pub fn new<M: Into<String>>(measurement: M, timestamp_ns: u64) -> Self {
        Self { measurement: measurement.into(), tags: Vec::new(), fields: Vec::new(), timestamp_ns }
    }

    /// Adds a tag to the sample.
    #[must_use]
    pub fn with_tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Adds multiple tags to the sample, in order.
    #[must_use]
    pub fn with_tags<'a, I>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = &'a (String, String)>,
    {
        self.tags.extend(tags.into_iter().cloned());
        self
    }

    /// Adds a field to the sample.
    #[must_use]
    pub fn with_field<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Returns the measurement name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Returns the tags, in insertion order.
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    /// Returns the fields, in insertion order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Returns the timestamp, in nanoseconds since the Unix epoch.
    pub const fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// Encodes this sample as a single line.
    ///
    /// # Errors
    ///
    /// See [`encode_line`].
    pub fn encode(&self, max_len: usize) -> Result<EncodedLine, EncodeError> {
        let tag_set = join_pairs(&self.tags);
        let field_set = join_pairs(&self.fields);
        encode_line(&self.measurement, &tag_set, &field_set, self.timestamp_ns, max_len)
    }
}

/// An encoded line, guaranteed to be shorter than the maximum line length it was encoded against.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedLine {
    buf: String,
}

impl EncodedLine {
    /// Returns the raw bytes of the line.
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    /// Returns the line as a string slice.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Returns the length of the line, in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if the line is empty.
    ///
    /// Lines produced by [`encode_line`] are never empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl fmt::Debug for EncodedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncodedLine").field(&self.buf).finish()
    }
}

impl fmt::Display for EncodedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buf)
    }
}

/// Encodes a measurement as a single line: `<measurement>,<tag set> <field set> <timestamp>`.
///
/// The tag set and field set must already be joined as `key=value` pairs separated by commas. No escaping or
/// validation of individual keys or values is performed. When the tag set is empty, the comma separating it from the
/// measurement name is omitted.
///
/// # Errors
///
/// If the measurement name is empty, [`EncodeError::EmptyMeasurement`] is returned. If the formatted line would reach
/// or exceed `max_len` bytes, [`EncodeError::Overflow`] is returned and nothing is written.
pub fn encode_line(
    measurement: &str,
    tag_set: &str,
    field_set: &str,
    timestamp_ns: u64,
    max_len: usize,
) -> Result<EncodedLine, EncodeError> {
    if measurement.is_empty() {
        return Err(EncodeError::EmptyMeasurement);
    }

    let mut int_writer = itoa::Buffer::new();
    let ts_str = int_writer.format(timestamp_ns);

    // Figure out the full length up front so that we never hand back a partial line.
    let tag_set_len = if tag_set.is_empty() { 0 } else { tag_set.len() + 1 };
    let len = measurement.len() + tag_set_len + 1 + field_set.len() + 1 + ts_str.len();
    if len >= max_len {
        return Err(EncodeError::Overflow { len, max_len });
    }

    let mut buf = String::with_capacity(len);
    buf.push_str(measurement);
    if !tag_set.is_empty() {
        buf.push(',');
        buf.push_str(tag_set);
    }
    buf.push(' ');
    buf.push_str(field_set);
    buf.push(' ');
    buf.push_str(ts_str);

    debug_assert_eq!(buf.len(), len);
    Ok(EncodedLine { buf })
}

/// Returns `true` if `max_len` leaves room for at least the smallest possible line.
pub(crate) const fn is_usable_line_length(max_len: usize) -> bool {
    max_len > SMALLEST_VALID_LINE_LEN
}

/// Joins `key=value` pairs with commas.
pub(crate) fn join_pairs(pairs: &[(String, String)]) -> String {
    let mut out = String::new();
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out
}
