//! Field codec for flat field/value stores
//!
//! Scalar fields are written as plain strings. The link collection, the
//! visited flag and the fetch status are opaque-encoded as JSON blobs so
//! that a store which only understands strings can hold them. An absent or
//! empty blob decodes to the field's zero value.

use crate::page::PageRecord;
use crate::storage::traits::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

pub const FIELD_URL: &str = "url";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_CONTENT_TYPE: &str = "content_type";
pub const FIELD_BODY: &str = "body";
pub const FIELD_LINKS: &str = "links";
pub const FIELD_DEPTH: &str = "depth";
pub const FIELD_REFERER: &str = "referer";
pub const FIELD_REDIRECT_TO: &str = "redirect_to";
pub const FIELD_RESPONSE_TIME: &str = "response_time_ms";
pub const FIELD_FETCHED_AT: &str = "fetched_at";
pub const FIELD_VISITED: &str = "visited";

/// Flattens a record into (field, value) pairs. Unset optional fields are
/// omitted rather than written empty.
pub fn encode_fields(record: &PageRecord) -> StorageResult<Vec<(&'static str, String)>> {
    let mut fields = vec![
        (FIELD_URL, record.url.clone()),
        (FIELD_LINKS, encode_opaque(FIELD_LINKS, &record.links)?),
        (FIELD_DEPTH, record.depth.to_string()),
        (FIELD_VISITED, encode_opaque(FIELD_VISITED, &record.visited)?),
    ];

    if let Some(status) = &record.status {
        fields.push((FIELD_STATUS, encode_opaque(FIELD_STATUS, status)?));
    }

    let optional = [
        (FIELD_CONTENT_TYPE, record.content_type.clone()),
        (FIELD_BODY, record.body.clone()),
        (FIELD_REFERER, record.referer.clone()),
        (FIELD_REDIRECT_TO, record.redirect_to.clone()),
        (FIELD_RESPONSE_TIME, record.response_time_ms.map(|ms| ms.to_string())),
        (FIELD_FETCHED_AT, record.fetched_at.map(|at| at.to_rfc3339())),
    ];
    fields.extend(
        optional
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v))),
    );

    Ok(fields)
}

/// Rebuilds a record from its stored fields
pub fn decode_fields(mut fields: HashMap<String, String>) -> StorageResult<PageRecord> {
    Ok(PageRecord {
        url: fields.remove(FIELD_URL).unwrap_or_default(),
        status: decode_opaque(FIELD_STATUS, fields.get(FIELD_STATUS))?,
        content_type: fields.remove(FIELD_CONTENT_TYPE),
        body: fields.remove(FIELD_BODY),
        links: decode_opaque(FIELD_LINKS, fields.get(FIELD_LINKS))?,
        depth: decode_scalar(FIELD_DEPTH, fields.get(FIELD_DEPTH))?.unwrap_or(0),
        referer: fields.remove(FIELD_REFERER),
        redirect_to: fields.remove(FIELD_REDIRECT_TO),
        response_time_ms: decode_scalar(FIELD_RESPONSE_TIME, fields.get(FIELD_RESPONSE_TIME))?,
        fetched_at: decode_timestamp(fields.get(FIELD_FETCHED_AT))?,
        visited: decode_opaque(FIELD_VISITED, fields.get(FIELD_VISITED))?,
    })
}

fn encode_opaque<T: Serialize + ?Sized>(field: &'static str, value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|source| StorageError::Serialization { field, source })
}

fn decode_opaque<T>(field: &'static str, raw: Option<&String>) -> StorageResult<T>
where
    T: DeserializeOwned + Default,
{
    match raw.map(|s| s.trim()) {
        None | Some("") => Ok(T::default()),
        Some(s) => {
            serde_json::from_str(s).map_err(|source| StorageError::Serialization { field, source })
        }
    }
}

fn decode_scalar<T: std::str::FromStr>(
    field: &'static str,
    raw: Option<&String>,
) -> StorageResult<Option<T>> {
    match raw.map(|s| s.trim()) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|_| StorageError::InvalidField {
            field,
            value: s.to_string(),
        }),
    }
}

fn decode_timestamp(raw: Option<&String>) -> StorageResult<Option<DateTime<Utc>>> {
    match raw.map(|s| s.trim()) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|_| StorageError::InvalidField {
                field: FIELD_FETCHED_AT,
                value: s.to_string(),
            }),
    }
}
