//! Primitive encoders and decoders shared by both messages.
//!
//! Integers use the familiar 7-bit little-endian varint layout (sign bits
//! reinterpreted, no zigzag): at most 5 bytes for an `i32`, 10 bytes for an
//! `i64`. Strings are a varint byte length followed by UTF-8. Block
//! coordinates are three big-endian `i32`.
//!
//! Optional ticks are written as a varlong of `tick + 1`, with `0` meaning
//! "absent". A tick of `-1` collides with the sentinel and is normalized to
//! absent with a warning; `i64::MAX` cannot be shifted and is rejected.

use bytes::{Buf, BufMut};
use telemetry_types::{BlockPos, Location, PartitionId};
use tracing::warn;

use crate::error::ProtocolError;

/// Longest string accepted on the wire, in bytes.
pub const MAX_STRING_BYTES: usize = 32_767;

const VAR_I32_MAX_BYTES: usize = 5;
const VAR_I64_MAX_BYTES: usize = 10;
const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// Read one byte.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedEof`] on an empty buffer.
pub fn get_u8(buf: &mut impl Buf, what: &'static str) -> Result<u8, ProtocolError> {
    if !buf.has_remaining() {
        return Err(ProtocolError::UnexpectedEof { what });
    }
    Ok(buf.get_u8())
}

/// Read a big-endian `i32`.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedEof`] if fewer than 4 bytes remain.
pub fn get_i32(buf: &mut impl Buf, what: &'static str) -> Result<i32, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::UnexpectedEof { what });
    }
    Ok(buf.get_i32())
}

/// Read a big-endian `i64`.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedEof`] if fewer than 8 bytes remain.
pub fn get_i64(buf: &mut impl Buf, what: &'static str) -> Result<i64, ProtocolError> {
    if buf.remaining() < 8 {
        return Err(ProtocolError::UnexpectedEof { what });
    }
    Ok(buf.get_i64())
}

/// Read a big-endian `f64`.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedEof`] if fewer than 8 bytes remain.
pub fn get_f64(buf: &mut impl Buf, what: &'static str) -> Result<f64, ProtocolError> {
    if buf.remaining() < 8 {
        return Err(ProtocolError::UnexpectedEof { what });
    }
    Ok(buf.get_f64())
}

/// Write a varint-encoded `i32`.
#[allow(clippy::cast_possible_truncation)] // masked to 7 bits before the cast
pub fn put_var_i32(buf: &mut impl BufMut, value: i32) {
    let mut remaining = u32::from_ne_bytes(value.to_ne_bytes());
    loop {
        let segment = (remaining & u32::from(SEGMENT_BITS)) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buf.put_u8(segment);
            return;
        }
        buf.put_u8(segment | CONTINUE_BIT);
    }
}

/// Read a varint-encoded `i32`.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedEof`] on a truncated buffer or
/// [`ProtocolError::VarIntTooLong`] after 5 continuation bytes.
pub fn get_var_i32(buf: &mut impl Buf, what: &'static str) -> Result<i32, ProtocolError> {
    let mut value: u32 = 0;
    for index in 0..VAR_I32_MAX_BYTES {
        let byte = get_u8(buf, what)?;
        let shift = u32::try_from(index.saturating_mul(7)).unwrap_or(u32::MAX);
        value |= u32::from(byte & SEGMENT_BITS).checked_shl(shift).unwrap_or(0);
        if byte & CONTINUE_BIT == 0 {
            return Ok(i32::from_ne_bytes(value.to_ne_bytes()));
        }
    }
    Err(ProtocolError::VarIntTooLong {
        max_bytes: VAR_I32_MAX_BYTES,
    })
}

/// Write a varint-encoded `i64`.
#[allow(clippy::cast_possible_truncation)] // masked to 7 bits before the cast
pub fn put_var_i64(buf: &mut impl BufMut, value: i64) {
    let mut remaining = u64::from_ne_bytes(value.to_ne_bytes());
    loop {
        let segment = (remaining & u64::from(SEGMENT_BITS)) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buf.put_u8(segment);
            return;
        }
        buf.put_u8(segment | CONTINUE_BIT);
    }
}

/// Read a varint-encoded `i64`.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedEof`] on a truncated buffer or
/// [`ProtocolError::VarIntTooLong`] after 10 continuation bytes.
pub fn get_var_i64(buf: &mut impl Buf, what: &'static str) -> Result<i64, ProtocolError> {
    let mut value: u64 = 0;
    for index in 0..VAR_I64_MAX_BYTES {
        let byte = get_u8(buf, what)?;
        let shift = u32::try_from(index.saturating_mul(7)).unwrap_or(u32::MAX);
        value |= u64::from(byte & SEGMENT_BITS).checked_shl(shift).unwrap_or(0);
        if byte & CONTINUE_BIT == 0 {
            return Ok(i64::from_ne_bytes(value.to_ne_bytes()));
        }
    }
    Err(ProtocolError::VarIntTooLong {
        max_bytes: VAR_I64_MAX_BYTES,
    })
}

/// Write a non-negative length or count as a varint.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] if `len` does not fit in an
/// `i32` or exceeds `max`.
pub fn put_len(
    buf: &mut impl BufMut,
    len: usize,
    max: usize,
    what: &'static str,
) -> Result<(), ProtocolError> {
    let encoded = i32::try_from(len).ok().filter(|_| len <= max);
    let Some(encoded) = encoded else {
        return Err(ProtocolError::InvalidLength {
            length: i64::try_from(len).unwrap_or(i64::MAX),
            max,
            what,
        });
    };
    put_var_i32(buf, encoded);
    Ok(())
}

/// Read a non-negative length or count written by [`put_len`].
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] for negative values or values
/// above `max`.
pub fn get_len(buf: &mut impl Buf, max: usize, what: &'static str) -> Result<usize, ProtocolError> {
    let raw = get_var_i32(buf, what)?;
    usize::try_from(raw)
        .ok()
        .filter(|len| *len <= max)
        .ok_or(ProtocolError::InvalidLength {
            length: i64::from(raw),
            max,
            what,
        })
}

/// Write a length-prefixed UTF-8 string.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] if the string is longer than
/// [`MAX_STRING_BYTES`].
pub fn put_string(buf: &mut impl BufMut, value: &str, what: &'static str) -> Result<(), ProtocolError> {
    put_len(buf, value.len(), MAX_STRING_BYTES, what)?;
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Read a length-prefixed UTF-8 string.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedEof`], [`ProtocolError::InvalidLength`]
/// or [`ProtocolError::InvalidUtf8`].
pub fn get_string(buf: &mut impl Buf, what: &'static str) -> Result<String, ProtocolError> {
    let len = get_len(buf, MAX_STRING_BYTES, what)?;
    if buf.remaining() < len {
        return Err(ProtocolError::UnexpectedEof { what });
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_err| ProtocolError::InvalidUtf8 { what })
}

/// Write a location: partition name, then the three block coordinates.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] for an oversized partition name.
pub fn put_location(buf: &mut impl BufMut, location: &Location) -> Result<(), ProtocolError> {
    put_string(buf, location.partition.as_str(), "partition")?;
    buf.put_i32(location.pos.x);
    buf.put_i32(location.pos.y);
    buf.put_i32(location.pos.z);
    Ok(())
}

/// Read a location written by [`put_location`].
///
/// # Errors
///
/// Returns any primitive decode error.
pub fn get_location(buf: &mut impl Buf) -> Result<Location, ProtocolError> {
    let partition = get_string(buf, "partition")?;
    let x = get_i32(buf, "block x")?;
    let y = get_i32(buf, "block y")?;
    let z = get_i32(buf, "block z")?;
    Ok(Location::new(
        PartitionId::new(partition),
        BlockPos::new(x, y, z),
    ))
}

/// Write an optional tick using the `tick + 1` encoding.
///
/// # Errors
///
/// Returns [`ProtocolError::TickOutOfRange`] for `i64::MAX`.
pub fn put_optional_tick(
    buf: &mut impl BufMut,
    tick: Option<i64>,
    field: &'static str,
) -> Result<(), ProtocolError> {
    let raw = match tick {
        None => 0,
        Some(-1) => {
            warn!(field, "serializing a tick of -1, it will be transported as absent");
            0
        }
        Some(tick) => tick
            .checked_add(1)
            .ok_or(ProtocolError::TickOutOfRange { tick })?,
    };
    put_var_i64(buf, raw);
    Ok(())
}

/// Read an optional tick written by [`put_optional_tick`].
///
/// # Errors
///
/// Returns any varint decode error, or [`ProtocolError::TickOutOfRange`]
/// for the one raw value (`i64::MIN`) that cannot be shifted back.
pub fn get_optional_tick(buf: &mut impl Buf, field: &'static str) -> Result<Option<i64>, ProtocolError> {
    let raw = get_var_i64(buf, field)?;
    if raw == 0 {
        return Ok(None);
    }
    raw.checked_sub(1)
        .map(Some)
        .ok_or(ProtocolError::TickOutOfRange { tick: raw })
}
