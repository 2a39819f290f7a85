//! Document codec: JSON/YAML encoding of protocol values and the wire
//! helpers for bytes and durations.
//!
//! Documents are `serde_json` objects. The workspace enables serde_json's
//! `preserve_order`, so key order survives a decode/encode cycle and unknown
//! fields round-trip untouched.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{XfnError, XfnResult};

/// An opaque, order-preserving key/value document (manifests, input, context).
pub type Document = serde_json::Map<String, Value>;

/// Text formats understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// Pick a format from a file extension; anything not YAML is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Format::Yaml,
            _ => Format::Json,
        }
    }
}

/// Decode any protocol value from bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], format: Format) -> XfnResult<T> {
    match format {
        Format::Json => Ok(serde_json::from_slice(bytes)?),
        Format::Yaml => Ok(serde_yaml::from_slice(bytes)?),
    }
}

/// Encode any protocol value; JSON output is pretty-printed.
pub fn encode<T: Serialize>(value: &T, format: Format) -> XfnResult<Vec<u8>> {
    match format {
        Format::Json => Ok(serde_json::to_vec_pretty(value)?),
        Format::Yaml => Ok(serde_yaml::to_string(value)?.into_bytes()),
    }
}

/// Serialize a value into a document. Non-object values are rejected.
pub fn to_document<T: Serialize>(value: &T) -> XfnResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(XfnError::Codec(format!("expected an object, got {}", kind_of(&other)))),
    }
}

/// Deserialize a typed value out of a document.
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> XfnResult<T> {
    Ok(serde_json::from_value(Value::Object(doc.clone()))?)
}

pub(crate) fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Render a duration the way protobuf JSON does: `"60s"`, `"1.5s"`.
pub fn format_duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        return format!("{}s", d.as_secs());
    }
    let frac = format!("{:09}", d.subsec_nanos());
    format!("{}.{}s", d.as_secs(), frac.trim_end_matches('0'))
}

/// Largest duration protobuf allows: 10,000 years.
pub const MAX_DURATION_SECS: u64 = 315_576_000_000;

/// Parse a protobuf JSON duration string.
pub fn parse_duration(s: &str) -> XfnResult<Duration> {
    let body = s
        .strip_suffix('s')
        .ok_or_else(|| XfnError::Codec(format!("duration {s:?} must end in 's'")))?;
    let (secs, frac) = match body.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (body, ""),
    };
    let secs: u64 = secs
        .parse()
        .map_err(|_| XfnError::Codec(format!("invalid duration seconds in {s:?}")))?;
    if secs > MAX_DURATION_SECS {
        return Err(XfnError::Codec(format!("duration {s:?} exceeds {MAX_DURATION_SECS}s")));
    }
    if frac.len() > 9 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(XfnError::Codec(format!("invalid duration fraction in {s:?}")));
    }
    let nanos = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<9}").parse::<u32>().map_err(|e| XfnError::Codec(e.to_string()))?
    };
    Ok(Duration::new(secs, nanos))
}

/// Serde adapter for `Duration` fields as protobuf JSON strings.
pub mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `key -> bytes` maps, bytes as standard base64.
pub mod bytes_map {
    use std::collections::BTreeMap;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(map: &BTreeMap<String, Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&str, String> =
            map.iter().map(|(k, v)| (k.as_str(), STANDARD.encode(v))).collect();
        encoded.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let encoded = BTreeMap::<String, String>::deserialize(d)?;
        encoded
            .into_iter()
            .map(|(k, v)| {
                STANDARD
                    .decode(v.as_bytes())
                    .map(|b| (k, b))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

/// Same as [`bytes_map`] for optional maps, where absence carries meaning.
pub mod opt_bytes_map {
    use std::collections::BTreeMap;

    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(map: &Option<BTreeMap<String, Vec<u8>>>, s: S) -> Result<S::Ok, S::Error> {
        match map {
            Some(m) => super::bytes_map::serialize(m, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<BTreeMap<String, Vec<u8>>>, D::Error> {
        super::bytes_map::deserialize(d).map(Some)
    }
}
