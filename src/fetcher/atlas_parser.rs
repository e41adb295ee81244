//! Atlas response parser
//!
//! Stateless conversion of Atlas API JSON items into typed records. Kept
//! separate from the fetcher so the filters and transforms handed to
//! [`fetch_all`](crate::fetcher::pagination::fetch_all) can be unit tested
//! without a server.

use crate::fetcher::{FetcherError, FetcherResult};
use crate::{Anchor, MeasurementRef};
use serde_json::Value;
use std::net::Ipv4Addr;

/// Measurement type retained from the anchor measurement catalog
pub const PING_TYPE: &str = "ping";

/// Stateless parser for Atlas API responses
pub struct AtlasParser;

impl AtlasParser {
    /// Whether an anchor listing item can become an [`Anchor`]
    ///
    /// Disabled anchors and anchors without IPv4 connectivity or location
    /// are of no use as calibration targets.
    pub fn is_usable_anchor(item: &Value) -> bool {
        let disabled = item
            .get("is_disabled")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        !disabled
            && item.get("address_v4").is_some_and(|v| v.is_string())
            && item.get("asn_v4").is_some_and(|v| v.is_u64())
            && Self::coordinates(item).is_some()
    }

    /// Parse an anchor listing item
    ///
    /// # Format
    /// `{"id", "probe", "address_v4", "asn_v4", "country", "city",
    ///   "geometry": {"coordinates": [longitude, latitude]}}`
    ///
    /// # Errors
    /// Returns `FetcherError::Parse` if a required field is missing or malformed
    pub fn parse_anchor(item: Value) -> FetcherResult<Anchor> {
        let aid = Self::u32_field(&item, "id")?;

        // `probe` is a bare id, or an object when expanded with `include=probe`
        let pid = item
            .get("probe")
            .and_then(Self::id_from_ref)
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| FetcherError::Parse(format!("Anchor {aid}: invalid probe")))?;

        let address_v4 = item
            .get("address_v4")
            .and_then(Value::as_str)
            .ok_or_else(|| FetcherError::Parse(format!("Anchor {aid}: missing address_v4")))?
            .parse::<Ipv4Addr>()
            .map_err(|e| FetcherError::Parse(format!("Anchor {aid}: invalid address_v4: {e}")))?;

        let asn_v4 = Self::u32_field(&item, "asn_v4")?;

        let (longitude, latitude) = Self::coordinates(&item)
            .ok_or_else(|| FetcherError::Parse(format!("Anchor {aid}: invalid geometry")))?;

        Ok(Anchor {
            aid,
            pid,
            address_v4,
            asn_v4,
            latitude,
            longitude,
            country_code: Self::string_field(&item, "country"),
            city: Self::string_field(&item, "city"),
        })
    }

    /// Whether a catalog item is a ping measurement targeting one of `anchor_ids`
    pub fn is_ping_to(item: &Value, anchor_ids: &[u32]) -> bool {
        item.get("type").and_then(Value::as_str) == Some(PING_TYPE)
            && Self::target_anchor_id(item).is_some_and(|aid| anchor_ids.contains(&aid))
    }

    /// Parse an anchor measurement catalog item into `(target anchor id, measurement)`
    ///
    /// # Format
    /// `{"type": "ping", "target": <anchor>, "measurement": <measurement>}` where
    /// each reference is an id, a resource URL, or an expanded object.
    ///
    /// # Errors
    /// Returns `FetcherError::Parse` if either reference cannot be resolved
    pub fn parse_anchor_measurement(item: Value) -> FetcherResult<(u32, MeasurementRef)> {
        let target = Self::target_anchor_id(&item)
            .ok_or_else(|| FetcherError::Parse(format!("Invalid measurement target: {item}")))?;

        let measurement = item
            .get("measurement")
            .and_then(Self::id_from_ref)
            .ok_or_else(|| FetcherError::Parse(format!("Invalid measurement reference: {item}")))?;

        Ok((target, MeasurementRef(measurement)))
    }

    fn target_anchor_id(item: &Value) -> Option<u32> {
        item.get("target")
            .and_then(Self::id_from_ref)
            .and_then(|id| u32::try_from(id).ok())
    }

    /// Resolve a resource reference to its numeric id
    ///
    /// Accepts `1234`, `"https://.../measurements/1234/"` and `{"id": 1234, ...}`.
    pub fn id_from_ref(value: &Value) -> Option<u64> {
        match value {
            Value::Number(n) => n.as_u64(),
            Value::String(url) => url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .and_then(|segment| segment.parse().ok()),
            Value::Object(map) => map.get("id").and_then(Value::as_u64),
            _ => None,
        }
    }

    fn coordinates(item: &Value) -> Option<(f64, f64)> {
        let coords = item.get("geometry")?.get("coordinates")?.as_array()?;
        match coords.as_slice() {
            [lon, lat, ..] => Some((lon.as_f64()?, lat.as_f64()?)),
            _ => None,
        }
    }

    fn u32_field(item: &Value, field: &str) -> FetcherResult<u32> {
        item.get(field)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| FetcherError::Parse(format!("Invalid or missing {field}")))
    }

    fn string_field(item: &Value, field: &str) -> String {
        item.get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}
