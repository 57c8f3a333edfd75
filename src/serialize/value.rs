use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

/// An engine-level value: anything a component can take or produce.
///
/// The variants mirror the transport envelopes. `Opaque` carries bytes the
/// engine cannot interpret; opaque payloads must not cross engine
/// boundaries, so cross-language workflow ports stick to JSON-expressible
/// variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Ordered, growable sequence
    Seq(Vec<Value>),
    /// Ordered fixed-arity sequence; kept distinct so it round-trips
    Tuple(Vec<Value>),
    /// String-keyed mapping. Keys starting with `__type__` are reserved for
    /// envelopes and must not appear in user maps.
    Map(BTreeMap<String, Value>),
    DateTime(DateTime<Utc>),
    Path(PathBuf),
    /// N-dimensional numeric array, flattened row-major
    NdArray {
        dtype: String,
        shape: Vec<usize>,
        data: Vec<f64>,
    },
    /// Tabular value: rows with named columns
    DataFrame {
        columns: Vec<String>,
        rows: Vec<BTreeMap<String, Value>>,
    },
    /// Typed record with a qualified class name
    Record {
        class: String,
        fields: BTreeMap<String, Value>,
    },
    /// Bytes in a named encoding scheme the engine does not interpret
    Opaque { encoding: String, data: Vec<u8> },
    /// Best-effort textual representation of an unencodable value
    Repr(String),
}

impl Value {
    pub fn record(class: &str, fields: BTreeMap<String, Value>) -> Self {
        Value::Record {
            class: class.to_string(),
            fields,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Seq(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// Encode a value into its transport form. Never fails: values JSON cannot
/// carry (non-finite floats) degrade to a `repr` envelope.
pub fn encode(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Float(f) => {
            if f.is_finite() {
                json!(f)
            } else {
                json!({"__type__": "repr", "value": f.to_string()})
            }
        }
        Value::Str(s) => json!(s),
        Value::Seq(items) => serde_json::Value::Array(items.iter().map(encode).collect()),
        Value::Tuple(items) => json!({
            "__type__": "tuple",
            "value": items.iter().map(encode).collect::<Vec<_>>(),
        }),
        Value::Map(entries) => {
            let map: serde_json::Map<String, serde_json::Value> = entries
                .iter()
                .map(|(k, v)| (k.clone(), encode(v)))
                .collect();
            serde_json::Value::Object(map)
        }
        Value::DateTime(dt) => json!({
            "__type__": "datetime",
            "value": dt.to_rfc3339_opts(SecondsFormat::Micros, true),
        }),
        Value::Path(p) => json!({
            "__type__": "Path",
            "value": p.to_string_lossy(),
        }),
        Value::NdArray { dtype, shape, data } => json!({
            "__type__": "ndarray",
            "dtype": dtype,
            "shape": shape,
            "data": data,
        }),
        Value::DataFrame { columns, rows } => json!({
            "__type__": "DataFrame",
            "columns": columns,
            "data": rows
                .iter()
                .map(|row| {
                    let map: serde_json::Map<String, serde_json::Value> = row
                        .iter()
                        .map(|(k, v)| (k.clone(), encode(v)))
                        .collect();
                    serde_json::Value::Object(map)
                })
                .collect::<Vec<_>>(),
        }),
        Value::Record { class, fields } => json!({
            "__type__": "record",
            "__class__": class,
            "data": fields
                .iter()
                .map(|(k, v)| (k.clone(), encode(v)))
                .collect::<serde_json::Map<String, serde_json::Value>>(),
        }),
        Value::Opaque { encoding, data } => json!({
            "__type__": "opaque",
            "encoding": encoding,
            "data": to_hex(data),
        }),
        Value::Repr(text) => json!({"__type__": "repr", "value": text}),
    }
}

/// Decode a transport form back into a value. Envelopes with an unknown
/// `__type__` come back as the envelope map unchanged.
pub fn decode(encoded: &serde_json::Value) -> Value {
    match encoded {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::Seq(items.iter().map(decode).collect()),
        serde_json::Value::Object(map) => match map.get("__type__").and_then(|t| t.as_str()) {
            Some(tag) => decode_envelope(tag, map)
                .unwrap_or_else(|| Value::Map(decode_entries(map))),
            None => Value::Map(decode_entries(map)),
        },
    }
}

fn decode_entries(map: &serde_json::Map<String, serde_json::Value>) -> BTreeMap<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), decode(v))).collect()
}

/// Decode a recognized envelope; `None` means the envelope is unknown or
/// malformed and should pass through unchanged.
fn decode_envelope(
    tag: &str,
    map: &serde_json::Map<String, serde_json::Value>,
) -> Option<Value> {
    match tag {
        "tuple" => {
            let items = map.get("value")?.as_array()?;
            Some(Value::Tuple(items.iter().map(decode).collect()))
        }
        "datetime" => {
            let text = map.get("value")?.as_str()?;
            let parsed = DateTime::parse_from_rfc3339(text).ok()?;
            Some(Value::DateTime(parsed.with_timezone(&Utc)))
        }
        "Path" => {
            let text = map.get("value")?.as_str()?;
            Some(Value::Path(PathBuf::from(text)))
        }
        "ndarray" => {
            let dtype = map.get("dtype")?.as_str()?.to_string();
            let shape = map
                .get("shape")?
                .as_array()?
                .iter()
                .map(|v| v.as_u64().map(|u| u as usize))
                .collect::<Option<Vec<_>>>()?;
            let data = map
                .get("data")?
                .as_array()?
                .iter()
                .map(|v| v.as_f64())
                .collect::<Option<Vec<_>>>()?;
            Some(Value::NdArray { dtype, shape, data })
        }
        "DataFrame" => {
            let columns = map
                .get("columns")?
                .as_array()?
                .iter()
                .map(|v| v.as_str().map(String::from))
                .collect::<Option<Vec<_>>>()?;
            let rows = map
                .get("data")?
                .as_array()?
                .iter()
                .map(|row| row.as_object().map(decode_entries))
                .collect::<Option<Vec<_>>>()?;
            Some(Value::DataFrame { columns, rows })
        }
        "record" => {
            let class = map.get("__class__")?.as_str()?.to_string();
            let fields = map.get("data")?.as_object().map(decode_entries)?;
            Some(Value::Record { class, fields })
        }
        "opaque" => {
            let encoding = map.get("encoding")?.as_str()?.to_string();
            let data = from_hex(map.get("data")?.as_str()?)?;
            Some(Value::Opaque { encoding, data })
        }
        "repr" => {
            let text = map.get("value")?.as_str()?.to_string();
            Some(Value::Repr(text))
        }
        _ => None,
    }
}

/// Emit JSON text with object keys in sorted order, recursively.
///
/// This is the byte stream the execution hash digests, so the ordering must
/// hold no matter how the `serde_json` map was built.
pub fn canonical_string(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // String keys serialize without failure
                let _ = write!(out, "{}:", serde_json::Value::String((*key).clone()));
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => {
            let _ = write!(out, "{}", other);
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{:02x}", b);
        acc
    })
}

fn from_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn roundtrip(value: Value) {
        let encoded = encode(&value);
        assert_eq!(decode(&encoded), value);
    }

    #[test]
    fn primitives_round_trip() {
        roundtrip(Value::Null);
        roundtrip(Value::Bool(true));
        roundtrip(Value::Int(-42));
        roundtrip(Value::Float(3.5));
        roundtrip(Value::Str("hello".into()));
    }

    #[test]
    fn sequences_and_tuples_round_trip() {
        roundtrip(Value::Seq(vec![Value::Int(1), Value::Str("two".into())]));
        roundtrip(Value::Tuple(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn tuple_envelope_is_tagged() {
        let encoded = encode(&Value::Tuple(vec![Value::Int(1)]));
        assert_eq!(encoded["__type__"], "tuple");
        assert_eq!(encoded["value"][0], 1);
    }

    #[test]
    fn datetime_round_trips_to_iso8601() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
        let encoded = encode(&Value::DateTime(dt));
        assert_eq!(encoded["__type__"], "datetime");
        roundtrip(Value::DateTime(dt));
    }

    #[test]
    fn path_round_trips() {
        roundtrip(Value::Path(PathBuf::from("/tmp/data.csv")));
    }

    #[test]
    fn ndarray_round_trips() {
        roundtrip(Value::NdArray {
            dtype: "float64".into(),
            shape: vec![2, 2],
            data: vec![1.0, 2.0, 3.0, 4.0],
        });
    }

    #[test]
    fn dataframe_round_trips() {
        let mut row = BTreeMap::new();
        row.insert("a".to_string(), Value::Int(1));
        row.insert("b".to_string(), Value::Str("x".into()));
        roundtrip(Value::DataFrame {
            columns: vec!["a".into(), "b".into()],
            rows: vec![row],
        });
    }

    #[test]
    fn record_round_trips() {
        let mut fields = BTreeMap::new();
        fields.insert("sum".to_string(), Value::Int(5));
        roundtrip(Value::Record {
            class: "outputs".into(),
            fields,
        });
    }

    #[test]
    fn opaque_round_trips_through_hex() {
        let value = Value::Opaque {
            encoding: "bincode".into(),
            data: vec![0x00, 0xff, 0x10],
        };
        let encoded = encode(&value);
        assert_eq!(encoded["data"], "00ff10");
        roundtrip(value);
    }

    #[test]
    fn non_finite_float_degrades_to_repr() {
        let encoded = encode(&Value::Float(f64::NAN));
        assert_eq!(encoded["__type__"], "repr");
        assert_eq!(encoded["value"], "NaN");
    }

    #[test]
    fn unknown_envelope_passes_through_unchanged() {
        let envelope = serde_json::json!({"__type__": "hologram", "value": 9});
        match decode(&envelope) {
            Value::Map(entries) => {
                assert_eq!(entries.get("__type__"), Some(&Value::Str("hologram".into())));
                assert_eq!(entries.get("value"), Some(&Value::Int(9)));
            }
            other => panic!("expected passthrough map, got {:?}", other),
        }
    }

    #[test]
    fn equal_values_encode_identically() {
        let mut a = BTreeMap::new();
        a.insert("z".to_string(), Value::Int(1));
        a.insert("a".to_string(), Value::Seq(vec![Value::Bool(false)]));
        let first = canonical_string(&encode(&Value::Map(a.clone())));
        let second = canonical_string(&encode(&Value::Map(a)));
        assert_eq!(first, second);
    }

    #[test]
    fn canonical_string_sorts_keys() {
        let value = serde_json::json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(canonical_string(&value), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }
}
