//! The canonical wire shape of a value.
//!
//! [`WireValue`] is what a session response carries. It has exactly five
//! kinds of node: scalar, string, array, ordered map and typed buffer. The
//! JSON form is:
//!
//! | Node | JSON |
//! |------|------|
//! | scalar | `null`, `true`, `42`, `0.5` |
//! | string | `"text"` |
//! | array | `[...]` |
//! | ordered map | `{...}` with keys in insertion order |
//! | typed buffer | `{"type":"array","datatype":"float32","length":N,"endianness":"little","data":"<hex>"}` |
//!
//! A JSON object with `"type": "array"` and a `datatype` key is always read
//! back as a typed buffer.

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::buffer::{BufferError, ElementType, TypedBuffer};

/// Byte order written into every typed buffer.
pub const ENDIANNESS: &str = "little";

/// Serialized form of any value subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// Integral JSON number.
    Int(i64),
    /// Fractional JSON number. Always finite.
    Float(f64),
    /// JSON string.
    String(String),
    /// JSON array.
    Array(Vec<WireValue>),
    /// JSON object, in insertion order.
    Map(Vec<(String, WireValue)>),
    /// Typed numeric buffer.
    Buffer(TypedBuffer),
}

impl WireValue {
    /// Look up `key` if this is a map.
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Serialize to compact JSON text.
    ///
    /// # Errors
    ///
    /// Propagates [`serde_json::Error`]; cannot fail for values produced by
    /// [`encode`](crate::encode), which rejects non-finite floats.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] for malformed JSON or a malformed typed
    /// buffer object.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::Buffer(buf) => {
                let mut map = serializer.serialize_map(Some(5))?;
                map.serialize_entry("type", "array")?;
                map.serialize_entry("datatype", buf.element_type().tag())?;
                map.serialize_entry("length", &buf.len())?;
                map.serialize_entry("endianness", ENDIANNESS)?;
                map.serialize_entry("data", &hex::encode(buf.to_le_bytes()))?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WireValueVisitor)
    }
}

struct WireValueVisitor;

impl<'de> Visitor<'de> for WireValueVisitor {
    type Value = WireValue;

    fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<WireValue, D::Error> {
        WireValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<WireValue, E> {
        Ok(WireValue::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<WireValue, E> {
        Ok(WireValue::Int(i))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<WireValue, E> {
        i64::try_from(u)
            .map(WireValue::Int)
            .map_err(|e| E::custom(format!("integer {u} out of range: {e}")))
    }

    fn visit_f64<E: de::Error>(self, f: f64) -> Result<WireValue, E> {
        Ok(WireValue::Float(f))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<WireValue, E> {
        Ok(WireValue::String(s.to_owned()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<WireValue, E> {
        Ok(WireValue::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(WireValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<WireValue, A::Error> {
        let mut entries: Vec<(String, WireValue)> = Vec::new();
        while let Some((key, value)) = access.next_entry::<String, WireValue>()? {
            if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
            } else {
                entries.push((key, value));
            }
        }

        let is_buffer = lookup(&entries, "type") == Some(&WireValue::String("array".to_owned()))
            && lookup(&entries, "datatype").is_some();
        if is_buffer {
            return buffer_from_entries(&entries)
                .map(WireValue::Buffer)
                .map_err(<A::Error as de::Error>::custom);
        }
        Ok(WireValue::Map(entries))
    }
}

fn lookup<'a>(entries: &'a [(String, WireValue)], key: &str) -> Option<&'a WireValue> {
    entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn buffer_from_entries(entries: &[(String, WireValue)]) -> Result<TypedBuffer, BufferError> {
    let tag = match lookup(entries, "datatype") {
        Some(WireValue::String(tag)) => tag.as_str(),
        _ => return Err(BufferError::UnknownElementType(String::from("<non-string>"))),
    };
    let element_type = ElementType::from_tag(tag)?;

    match lookup(entries, "endianness") {
        None => {}
        Some(WireValue::String(e)) if e == ENDIANNESS => {}
        Some(WireValue::String(e)) => return Err(BufferError::UnsupportedEndianness(e.clone())),
        Some(_) => {
            return Err(BufferError::UnsupportedEndianness(String::from("<non-string>")));
        }
    }

    let bytes = match lookup(entries, "data") {
        Some(WireValue::String(data)) => {
            hex::decode(data).map_err(|e| BufferError::InvalidHex(e.to_string()))?
        }
        _ => return Err(BufferError::InvalidHex(String::from("missing data"))),
    };

    let length = match lookup(entries, "length") {
        Some(WireValue::Int(n)) => usize::try_from(*n)
            .ok()
            .ok_or_else(|| BufferError::InvalidLength(n.to_string()))?,
        // A missing length is implied by the payload size.
        None | Some(WireValue::Null) => bytes.len().checked_div(element_type.size()).unwrap_or(0),
        Some(other) => return Err(BufferError::InvalidLength(format!("{other:?}"))),
    };

    TypedBuffer::from_le_bytes(element_type, length, &bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn map_keeps_key_order_in_json() {
        let value = WireValue::Map(vec![
            ("z".to_owned(), WireValue::Int(1)),
            ("a".to_owned(), WireValue::Int(2)),
        ]);
        assert_eq!(value.to_json().unwrap(), r#"{"z":1,"a":2}"#);

        let parsed = WireValue::from_json(r#"{"z":1,"a":2}"#).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn buffer_json_shape() {
        let value = WireValue::Buffer(TypedBuffer::Uint8(vec![0, 127, 255]));
        assert_eq!(
            value.to_json().unwrap(),
            r#"{"type":"array","datatype":"uint8","length":3,"endianness":"little","data":"007fff"}"#
        );
    }

    #[test]
    fn buffer_object_is_read_back_as_buffer() {
        let json = r#"{"type":"array","datatype":"int16","length":2,"data":"0100ffff"}"#;
        let parsed = WireValue::from_json(json).unwrap();
        assert_eq!(parsed, WireValue::Buffer(TypedBuffer::Int16(vec![1, -1])));
    }

    #[test]
    fn object_with_type_but_no_datatype_stays_a_map() {
        let parsed = WireValue::from_json(r#"{"type":"array","items":[]}"#).unwrap();
        assert!(matches!(parsed, WireValue::Map(_)));
    }

    #[test]
    fn bad_buffers_are_rejected() {
        let short = r#"{"type":"array","datatype":"float32","length":2,"data":"00000000"}"#;
        assert!(WireValue::from_json(short).is_err());

        let big_endian =
            r#"{"type":"array","datatype":"uint8","length":1,"endianness":"big","data":"00"}"#;
        assert!(WireValue::from_json(big_endian).is_err());

        let unknown = r#"{"type":"array","datatype":"float16","length":1,"data":"0000"}"#;
        assert!(WireValue::from_json(unknown).is_err());
    }

    #[test]
    fn negative_or_non_integer_length_is_reported() {
        let entries = |length: WireValue| {
            vec![
                ("datatype".to_owned(), WireValue::String("uint8".to_owned())),
                ("length".to_owned(), length),
                ("data".to_owned(), WireValue::String("00".to_owned())),
            ]
        };
        assert_eq!(
            buffer_from_entries(&entries(WireValue::Int(-3))),
            Err(BufferError::InvalidLength("-3".to_owned()))
        );
        assert!(matches!(
            buffer_from_entries(&entries(WireValue::Float(1.5))),
            Err(BufferError::InvalidLength(_))
        ));

        let json = r#"{"type":"array","datatype":"uint8","length":-3,"data":"00"}"#;
        let err = WireValue::from_json(json).unwrap_err();
        assert!(err.to_string().contains("invalid buffer length: -3"), "{err}");
    }

    #[test]
    fn integers_and_floats_stay_distinct() {
        let parsed = WireValue::from_json("[1, 1.0, -4]").unwrap();
        assert_eq!(
            parsed,
            WireValue::Array(vec![
                WireValue::Int(1),
                WireValue::Float(1.0),
                WireValue::Int(-4)
            ])
        );
    }
}
