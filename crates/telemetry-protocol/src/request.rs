//! Client-to-server observation requests.
//!
//! Layout on the wire:
//!
//! ```text
//! +----------+-----+---------------------+-------------------------+
//! | location | tag | interval (tags 2,3) | client tick (tick + 1)  |
//! |          | u8  | varint              | varlong, 0 = absent     |
//! +----------+-----+---------------------+-------------------------+
//! ```
//!
//! Tags: `0` Stop, `1` Single, `2` Keepalive, `3` `KeepaliveStart`.

use std::fmt;
use std::num::NonZeroU32;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use telemetry_types::Location;

use crate::codec;
use crate::error::ProtocolError;

/// Largest accepted update interval: one hour at 20 ticks per second.
pub const MAX_TICK_INTERVAL: u32 = 20 * 60 * 60;

const TAG_STOP: u8 = 0;
const TAG_SINGLE: u8 = 1;
const TAG_KEEPALIVE: u8 = 2;
const TAG_KEEPALIVE_START: u8 = 3;

/// Update interval of a subscription, in ticks. Always within
/// `1..=MAX_TICK_INTERVAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickInterval(NonZeroU32);

impl TickInterval {
    /// Validate an interval.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidInterval`] for zero or anything above
    /// [`MAX_TICK_INTERVAL`].
    pub fn new(ticks: u32) -> Result<Self, ProtocolError> {
        NonZeroU32::new(ticks)
            .filter(|t| t.get() <= MAX_TICK_INTERVAL)
            .map(Self)
            .ok_or(ProtocolError::InvalidInterval {
                value: i64::from(ticks),
                max: MAX_TICK_INTERVAL,
            })
    }

    /// Clamp an arbitrary value into the accepted range.
    pub fn clamped(ticks: i64) -> Self {
        let bounded = ticks.clamp(1, i64::from(MAX_TICK_INTERVAL));
        let ticks = u32::try_from(bounded).unwrap_or(MAX_TICK_INTERVAL);
        Self(NonZeroU32::new(ticks).unwrap_or(NonZeroU32::MIN))
    }

    /// Number of ticks.
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TickInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}

/// What a client asks the server to do for one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Drop the client's registration for the location.
    Stop,
    /// Send one observation at the next sweep, then forget the client.
    Single,
    /// Renew an existing subscription, possibly with a new interval.
    Keepalive(TickInterval),
    /// Begin (or restart) a subscription.
    KeepaliveStart(TickInterval),
}

impl RequestKind {
    /// Wire tag of this kind.
    pub const fn tag(self) -> u8 {
        match self {
            Self::Stop => TAG_STOP,
            Self::Single => TAG_SINGLE,
            Self::Keepalive(_) => TAG_KEEPALIVE,
            Self::KeepaliveStart(_) => TAG_KEEPALIVE_START,
        }
    }

    /// Update interval for the keepalive kinds.
    pub const fn interval(self) -> Option<TickInterval> {
        match self {
            Self::Stop | Self::Single => None,
            Self::Keepalive(interval) | Self::KeepaliveStart(interval) => Some(interval),
        }
    }

    fn encode(self, buf: &mut impl BufMut) {
        buf.put_u8(self.tag());
        if let Some(interval) = self.interval() {
            // MAX_TICK_INTERVAL fits in i32.
            codec::put_var_i32(buf, i32::try_from(interval.get()).unwrap_or(i32::MAX));
        }
    }

    fn decode(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        let tag = codec::get_u8(buf, "request type")?;
        match tag {
            TAG_STOP => Ok(Self::Stop),
            TAG_SINGLE => Ok(Self::Single),
            TAG_KEEPALIVE => Ok(Self::Keepalive(decode_interval(buf)?)),
            TAG_KEEPALIVE_START => Ok(Self::KeepaliveStart(decode_interval(buf)?)),
            other => Err(ProtocolError::UnknownRequestTag { tag: other }),
        }
    }
}

fn decode_interval(buf: &mut impl Buf) -> Result<TickInterval, ProtocolError> {
    let raw = codec::get_var_i32(buf, "tick interval")?;
    u32::try_from(raw)
        .ok()
        .and_then(|ticks| TickInterval::new(ticks).ok())
        .ok_or(ProtocolError::InvalidInterval {
            value: i64::from(raw),
            max: MAX_TICK_INTERVAL,
        })
}

/// A client-to-server observation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct C2SRequest {
    /// The location the request is about.
    pub location: Location,
    /// What the client wants.
    pub kind: RequestKind,
    /// Client tick at send time, if the client tracks one.
    pub client_tick: Option<i64>,
}

impl C2SRequest {
    /// Create a request without a client tick.
    pub const fn new(location: Location, kind: RequestKind) -> Self {
        Self {
            location,
            kind,
            client_tick: None,
        }
    }

    /// Attach a client tick.
    #[must_use]
    pub const fn with_client_tick(mut self, tick: i64) -> Self {
        self.client_tick = Some(tick);
        self
    }

    /// Encode into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidLength`] for an oversized partition
    /// name or [`ProtocolError::TickOutOfRange`] for an unencodable tick.
    pub fn encode(&self, buf: &mut impl BufMut) -> Result<(), ProtocolError> {
        codec::put_location(buf, &self.location)?;
        self.kind.encode(buf);
        codec::put_optional_tick(buf, self.client_tick, "client_tick")
    }

    /// Encode into a fresh buffer.
    ///
    /// # Errors
    ///
    /// See [`C2SRequest::encode`].
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode one request from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownRequestTag`],
    /// [`ProtocolError::InvalidInterval`] or any primitive decode error.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        let location = codec::get_location(buf)?;
        let kind = RequestKind::decode(buf)?;
        let client_tick = codec::get_optional_tick(buf, "client_tick")?;
        Ok(Self {
            location,
            kind,
            client_tick,
        })
    }

    /// Decode a request that must occupy the whole buffer.
    ///
    /// # Errors
    ///
    /// As [`C2SRequest::decode`], plus [`ProtocolError::TrailingBytes`].
    pub fn decode_exact(mut bytes: Bytes) -> Result<Self, ProtocolError> {
        let request = Self::decode(&mut bytes)?;
        if bytes.has_remaining() {
            return Err(ProtocolError::TrailingBytes {
                remaining: bytes.remaining(),
            });
        }
        Ok(request)
    }
}
