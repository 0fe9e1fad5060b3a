//! Server-to-client observation responses.
//!
//! Layout on the wire:
//!
//! ```text
//! location
//! varint source_count
//!   string source_name, u8 slot
//!   varint point_count
//!     varint attribute_count
//!       string key, u8 tag, value   (0 text | 1 i64 BE | 2 bool u8)
//!     u8 flags                      (0x01 long, 0x02 double)
//!     [i64 BE long] [f64 BE double]
//! varlong server tick (tick + 1, 0 = absent)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use telemetry_types::{
    Attribute, AttributeValue, Location, ObservationPoint, ObservationSnapshot,
    RecordedObservations, SharedSnapshot, SourceKey,
};

use crate::codec;
use crate::error::ProtocolError;

/// Largest number of sources, points or attributes accepted in one
/// collection.
pub const MAX_ENTRIES: usize = 1 << 16;

const FLAG_HAS_LONG: u8 = 0x01;
const FLAG_HAS_DOUBLE: u8 = 0x02;

const ATTR_TEXT: u8 = 0;
const ATTR_LONG: u8 = 1;
const ATTR_BOOL: u8 = 2;

/// A server-to-client observation response.
#[derive(Debug, Clone, PartialEq)]
pub struct S2CResponse {
    /// The observed location.
    pub location: Location,
    /// What was observed.
    pub observations: SharedSnapshot,
    /// Server tick at observation time, if known.
    pub server_tick: Option<i64>,
}

impl S2CResponse {
    /// Create a response.
    pub const fn new(
        location: Location,
        observations: SharedSnapshot,
        server_tick: Option<i64>,
    ) -> Self {
        Self {
            location,
            observations,
            server_tick,
        }
    }

    /// Encode into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidLength`] for oversized strings or
    /// collections, or [`ProtocolError::TickOutOfRange`].
    pub fn encode(&self, buf: &mut impl BufMut) -> Result<(), ProtocolError> {
        codec::put_location(buf, &self.location)?;
        put_snapshot(buf, &self.observations)?;
        codec::put_optional_tick(buf, self.server_tick, "server_tick")
    }

    /// Encode into a fresh buffer.
    ///
    /// # Errors
    ///
    /// See [`S2CResponse::encode`].
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode one response from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns any primitive decode error,
    /// [`ProtocolError::UnknownAttributeTag`] or
    /// [`ProtocolError::MissingObservationValue`].
    pub fn decode(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        let location = codec::get_location(buf)?;
        let observations = Arc::new(get_snapshot(buf)?);
        let server_tick = codec::get_optional_tick(buf, "server_tick")?;
        Ok(Self {
            location,
            observations,
            server_tick,
        })
    }

    /// Decode a response that must occupy the whole buffer.
    ///
    /// # Errors
    ///
    /// As [`S2CResponse::decode`], plus [`ProtocolError::TrailingBytes`].
    pub fn decode_exact(mut bytes: Bytes) -> Result<Self, ProtocolError> {
        let response = Self::decode(&mut bytes)?;
        if bytes.has_remaining() {
            return Err(ProtocolError::TrailingBytes {
                remaining: bytes.remaining(),
            });
        }
        Ok(response)
    }
}

fn put_snapshot(buf: &mut impl BufMut, snapshot: &ObservationSnapshot) -> Result<(), ProtocolError> {
    codec::put_len(buf, snapshot.sources.len(), MAX_ENTRIES, "source count")?;
    for (source, recorded) in &snapshot.sources {
        codec::put_string(buf, &source.name, "source name")?;
        buf.put_u8(source.slot);
        codec::put_len(buf, recorded.points.len(), MAX_ENTRIES, "point count")?;
        for (attributes, point) in &recorded.points {
            put_attributes(buf, attributes)?;
            put_point(buf, *point);
        }
    }
    Ok(())
}

fn get_snapshot(buf: &mut impl Buf) -> Result<ObservationSnapshot, ProtocolError> {
    let source_count = codec::get_len(buf, MAX_ENTRIES, "source count")?;
    let mut sources = BTreeMap::new();
    for _ in 0..source_count {
        let name = codec::get_string(buf, "source name")?;
        let slot = codec::get_u8(buf, "source slot")?;
        let point_count = codec::get_len(buf, MAX_ENTRIES, "point count")?;
        let mut points = BTreeMap::new();
        for _ in 0..point_count {
            let attributes = get_attributes(buf)?;
            let point = get_point(buf)?;
            points.insert(attributes, point);
        }
        sources.insert(SourceKey { name, slot }, RecordedObservations { points });
    }
    Ok(ObservationSnapshot { sources })
}

fn put_attributes(buf: &mut impl BufMut, attributes: &[Attribute]) -> Result<(), ProtocolError> {
    codec::put_len(buf, attributes.len(), MAX_ENTRIES, "attribute count")?;
    for attribute in attributes {
        codec::put_string(buf, &attribute.key, "attribute key")?;
        match &attribute.value {
            AttributeValue::Text(text) => {
                buf.put_u8(ATTR_TEXT);
                codec::put_string(buf, text, "attribute text")?;
            }
            AttributeValue::Long(value) => {
                buf.put_u8(ATTR_LONG);
                buf.put_i64(*value);
            }
            AttributeValue::Bool(value) => {
                buf.put_u8(ATTR_BOOL);
                buf.put_u8(u8::from(*value));
            }
        }
    }
    Ok(())
}

fn get_attributes(buf: &mut impl Buf) -> Result<Vec<Attribute>, ProtocolError> {
    let count = codec::get_len(buf, MAX_ENTRIES, "attribute count")?;
    let mut attributes = Vec::with_capacity(count.min(16));
    for _ in 0..count {
        let key = codec::get_string(buf, "attribute key")?;
        let value = match codec::get_u8(buf, "attribute tag")? {
            ATTR_TEXT => AttributeValue::Text(codec::get_string(buf, "attribute text")?),
            ATTR_LONG => AttributeValue::Long(codec::get_i64(buf, "attribute long")?),
            ATTR_BOOL => AttributeValue::Bool(codec::get_u8(buf, "attribute bool")? != 0),
            tag => return Err(ProtocolError::UnknownAttributeTag { tag }),
        };
        attributes.push(Attribute { key, value });
    }
    Ok(attributes)
}

fn put_point(buf: &mut impl BufMut, point: ObservationPoint) {
    let long = point.long_value();
    let double = point.double_value();
    let mut flags = 0;
    if long.is_some() {
        flags |= FLAG_HAS_LONG;
    }
    if double.is_some() {
        flags |= FLAG_HAS_DOUBLE;
    }
    buf.put_u8(flags);
    if let Some(long) = long {
        buf.put_i64(long);
    }
    if let Some(double) = double {
        buf.put_f64(double);
    }
}

fn get_point(buf: &mut impl Buf) -> Result<ObservationPoint, ProtocolError> {
    let flags = codec::get_u8(buf, "point flags")?;
    let long = if flags & FLAG_HAS_LONG == 0 {
        None
    } else {
        Some(codec::get_i64(buf, "point long")?)
    };
    let double = if flags & FLAG_HAS_DOUBLE == 0 {
        None
    } else {
        Some(codec::get_f64(buf, "point double")?)
    };
    ObservationPoint::from_parts(long, double)
        .ok_or(ProtocolError::MissingObservationValue { flags })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use telemetry_types::{BlockPos, PartitionId};

    use super::*;

    fn location() -> Location {
        Location::new(PartitionId::from("nether"), BlockPos::new(-100, 32, 7))
    }

    fn snapshot() -> ObservationSnapshot {
        let mut inventory = RecordedObservations::default();
        inventory.points.insert(
            vec![
                Attribute::new("item", AttributeValue::Text("minecraft:iron_ingot".to_owned())),
                Attribute::new("slot", AttributeValue::Long(3)),
            ],
            ObservationPoint::long(64),
        );
        inventory.points.insert(
            vec![Attribute::new("full", AttributeValue::Bool(false))],
            ObservationPoint::both(0.25, 1),
        );
        let mut power = RecordedObservations::default();
        power.points.insert(Vec::new(), ObservationPoint::double(14.5));

        let mut snapshot = ObservationSnapshot::default();
        snapshot.sources.insert(SourceKey::new("inventory", 0), inventory);
        snapshot.sources.insert(SourceKey::new("redstone.power", 1), power);
        snapshot
    }

    #[test]
    fn snapshot_and_tick_survive_the_wire() {
        let response = S2CResponse::new(location(), Arc::new(snapshot()), Some(1234));
        let decoded = S2CResponse::decode_exact(response.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(decoded.observations.point_count(), 3);
    }

    #[test]
    fn empty_snapshot_without_tick() {
        let response = S2CResponse::new(location(), Arc::default(), None);
        let decoded = S2CResponse::decode_exact(response.to_bytes().unwrap()).unwrap();
        assert!(decoded.observations.sources.is_empty());
        assert_eq!(decoded.server_tick, None);
    }

    #[test]
    fn point_without_value_is_rejected() {
        let mut buf = BytesMut::new();
        codec::put_location(&mut buf, &location()).unwrap();
        codec::put_var_i32(&mut buf, 1);
        codec::put_string(&mut buf, "src", "source name").unwrap();
        buf.put_u8(0);
        codec::put_var_i32(&mut buf, 1);
        codec::put_var_i32(&mut buf, 0);
        buf.put_u8(0);
        assert!(matches!(
            S2CResponse::decode(&mut buf.freeze()),
            Err(ProtocolError::MissingObservationValue { flags: 0 })
        ));
    }

    #[test]
    fn unknown_attribute_tag_is_rejected() {
        let mut buf = BytesMut::new();
        codec::put_location(&mut buf, &location()).unwrap();
        codec::put_var_i32(&mut buf, 1);
        codec::put_string(&mut buf, "src", "source name").unwrap();
        buf.put_u8(0);
        codec::put_var_i32(&mut buf, 1);
        codec::put_var_i32(&mut buf, 1);
        codec::put_string(&mut buf, "key", "attribute key").unwrap();
        buf.put_u8(7);
        assert!(matches!(
            S2CResponse::decode(&mut buf.freeze()),
            Err(ProtocolError::UnknownAttributeTag { tag: 7 })
        ));
    }

    #[test]
    fn truncated_response_is_eof() {
        let bytes = S2CResponse::new(location(), Arc::new(snapshot()), Some(9))
            .to_bytes()
            .unwrap();
        let truncated = bytes.slice(..bytes.len() - 3);
        assert!(matches!(
            S2CResponse::decode_exact(truncated),
            Err(ProtocolError::UnexpectedEof { .. })
        ));
    }
}
