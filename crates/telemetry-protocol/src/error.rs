//! Error types for the wire protocol.
//!
//! Every decode failure is connection-fatal: the caller is expected to
//! drop the connection rather than try to resynchronize the stream.

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer ended in the middle of a value.
    #[error("unexpected end of buffer while reading {what}")]
    UnexpectedEof {
        /// What was being read.
        what: &'static str,
    },

    /// A variable-length integer used more bytes than its type allows.
    #[error("variable-length integer longer than {max_bytes} bytes")]
    VarIntTooLong {
        /// Maximum number of bytes for the integer type.
        max_bytes: usize,
    },

    /// A request carried an unknown type tag.
    #[error("unknown observation request type: {tag}")]
    UnknownRequestTag {
        /// The tag byte that was read.
        tag: u8,
    },

    /// A keepalive interval was outside `1..=MAX_TICK_INTERVAL`.
    #[error("invalid tick interval {value}: must be between 1 and {max}")]
    InvalidInterval {
        /// The rejected interval.
        value: i64,
        /// The largest accepted interval.
        max: u32,
    },

    /// A tick cannot be represented in the `tick + 1` encoding.
    #[error("tick {tick} cannot be encoded")]
    TickOutOfRange {
        /// The rejected tick.
        tick: i64,
    },

    /// A length prefix was negative or larger than allowed.
    #[error("invalid length {length} for {what} (max {max})")]
    InvalidLength {
        /// The length that was read or requested.
        length: i64,
        /// The largest accepted length.
        max: usize,
        /// What the length prefixed.
        what: &'static str,
    },

    /// A string was not valid UTF-8.
    #[error("invalid UTF-8 in {what}")]
    InvalidUtf8 {
        /// What was being read.
        what: &'static str,
    },

    /// An attribute value carried an unknown type tag.
    #[error("unknown attribute value type: {tag}")]
    UnknownAttributeTag {
        /// The tag byte that was read.
        tag: u8,
    },

    /// An observation point declared neither an integer nor a floating value.
    #[error("observation point without value (flags {flags:#04x})")]
    MissingObservationValue {
        /// The flag byte that was read.
        flags: u8,
    },

    /// Bytes were left over after decoding a complete message.
    #[error("{remaining} trailing bytes after message")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },
}
