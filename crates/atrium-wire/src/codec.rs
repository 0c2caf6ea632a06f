//! Encoding between [`Value`] trees and [`WireValue`]s.
//!
//! Both directions are pure: they take the input by reference, never mutate
//! it, and return freshly allocated output (buffers are copied, not
//! aliased), so a response can be handed to an asynchronous transport while
//! the engine keeps reusing its own frame storage.
//!
//! Shape rules:
//!
//! - vectors become arrays of numbers
//! - bounding boxes become `{min: [..], max: [..]}`
//! - typed buffers stay typed buffers
//! - maps keep insertion order
//! - sets are emitted sorted by the JSON text of each element
//! - opaque handles and non-finite scalar floats cannot be encoded

use crate::value::{BBox, Map, Value, Vector};
use crate::wire::WireValue;

/// A value could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot serialize value at {path}: {reason}")]
pub struct SerializationError {
    /// Location of the offending node, e.g. `$.sensors.depth[2]`. Keys
    /// holding path syntax are quoted, as in `$["a.b"]`.
    pub path: String,
    /// What was wrong with it.
    pub reason: String,
}

/// Encode a value tree into its wire form.
///
/// # Errors
///
/// Returns [`SerializationError`] naming the path of the first opaque
/// handle or non-finite float encountered.
pub fn encode(value: &Value) -> Result<WireValue, SerializationError> {
    encode_at(value, &mut String::from("$"), OpaquePolicy::Reject)
}

/// Encode a value tree, silently dropping opaque handles.
///
/// Map entries and list elements holding an [`Value::Opaque`] are omitted.
/// Used for effective-configuration responses, where engine-internal
/// objects such as renderers are not meant for the client.
///
/// # Errors
///
/// Returns [`SerializationError`] for non-finite floats.
pub fn encode_lossy(value: &Value) -> Result<WireValue, SerializationError> {
    if matches!(value, Value::Opaque(_)) {
        return Ok(WireValue::Null);
    }
    encode_at(value, &mut String::from("$"), OpaquePolicy::Skip)
}

/// Decode a wire value back into a value tree.
///
/// Arrays come back as [`Value::List`] and maps as [`Value::Map`]; use
/// [`Value::as_vector`] and [`Value::as_bbox`] to read vector and bounding
/// box shapes.
pub fn decode(wire: &WireValue) -> Value {
    match wire {
        WireValue::Null => Value::Null,
        WireValue::Bool(b) => Value::Bool(*b),
        WireValue::Int(i) => Value::Int(*i),
        WireValue::Float(f) => Value::Float(*f),
        WireValue::String(s) => Value::String(s.clone()),
        WireValue::Array(items) => Value::List(items.iter().map(decode).collect()),
        WireValue::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), decode(v)))
                .collect::<Map>(),
        ),
        WireValue::Buffer(buf) => Value::Buffer(buf.clone()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpaquePolicy {
    Reject,
    Skip,
}

fn encode_at(
    value: &Value,
    path: &mut String,
    policy: OpaquePolicy,
) -> Result<WireValue, SerializationError> {
    match value {
        Value::Null => Ok(WireValue::Null),
        Value::Bool(b) => Ok(WireValue::Bool(*b)),
        Value::Int(i) => Ok(WireValue::Int(*i)),
        Value::Float(f) => finite(*f, path).map(WireValue::Float),
        Value::String(s) => Ok(WireValue::String(s.clone())),
        Value::Vector(v) => encode_vector(v, path),
        Value::BBox(b) => encode_bbox(b, path),
        Value::Buffer(buf) => Ok(WireValue::Buffer(buf.clone())),
        Value::List(items) => encode_items(items, path, policy).map(WireValue::Array),
        Value::Set(items) => {
            let encoded = encode_items(items, path, policy)?;
            canonical_order(encoded, path).map(WireValue::Array)
        }
        Value::Map(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (key, child) in map.iter() {
                if policy == OpaquePolicy::Skip && matches!(child, Value::Opaque(_)) {
                    continue;
                }
                let len = path.len();
                push_key(path, key);
                let encoded = encode_at(child, path, policy)?;
                path.truncate(len);
                entries.push((key.clone(), encoded));
            }
            Ok(WireValue::Map(entries))
        }
        Value::Opaque(name) => Err(SerializationError {
            path: path.clone(),
            reason: format!("opaque handle `{name}` has no wire form"),
        }),
    }
}

/// Append a map key to an error path. Keys that would read as path syntax
/// are quoted, so `{"a.b": ..}` reports `$["a.b"]` rather than `$.a.b`.
fn push_key(path: &mut String, key: &str) {
    if key.is_empty() || key.contains(['.', '[', ']', '"']) {
        path.push_str(&format!("[{key:?}]"));
    } else {
        path.push('.');
        path.push_str(key);
    }
}

fn encode_items(
    items: &[Value],
    path: &mut String,
    policy: OpaquePolicy,
) -> Result<Vec<WireValue>, SerializationError> {
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if policy == OpaquePolicy::Skip && matches!(item, Value::Opaque(_)) {
            continue;
        }
        let len = path.len();
        path.push_str(&format!("[{index}]"));
        out.push(encode_at(item, path, policy)?);
        path.truncate(len);
    }
    Ok(out)
}

fn encode_vector(vector: &Vector, path: &str) -> Result<WireValue, SerializationError> {
    encode_components(vector.as_slice(), path).map(WireValue::Array)
}

fn encode_bbox(bbox: &BBox, path: &str) -> Result<WireValue, SerializationError> {
    Ok(WireValue::Map(vec![
        (
            String::from("min"),
            WireValue::Array(encode_components(&bbox.min, &format!("{path}.min"))?),
        ),
        (
            String::from("max"),
            WireValue::Array(encode_components(&bbox.max, &format!("{path}.max"))?),
        ),
    ]))
}

fn encode_components(components: &[f64], path: &str) -> Result<Vec<WireValue>, SerializationError> {
    components
        .iter()
        .enumerate()
        .map(|(i, c)| finite(*c, &format!("{path}[{i}]")).map(WireValue::Float))
        .collect()
}

fn finite(f: f64, path: &str) -> Result<f64, SerializationError> {
    if f.is_finite() {
        Ok(f)
    } else {
        Err(SerializationError {
            path: path.to_owned(),
            reason: format!("non-finite number {f}"),
        })
    }
}

/// Sort set members by their JSON text so equal sets encode identically.
fn canonical_order(
    items: Vec<WireValue>,
    path: &str,
) -> Result<Vec<WireValue>, SerializationError> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let key = item.to_json().map_err(|e| SerializationError {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        keyed.push((key, item));
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::TypedBuffer;

    fn observation() -> Value {
        Value::Map(
            Map::new()
                .with("step", 3_i64)
                .with("position", Vector::Vec3([1.0, 0.5, -2.0]))
                .with("bbox", BBox::new([0.0, 0.0, 0.0], [4.0, 3.0, 5.0]))
                .with("depth", TypedBuffer::Float32(vec![0.5, 1.25]))
                .with("done", false),
        )
    }

    #[test]
    fn vectors_encode_as_plain_arrays() {
        let wire = encode(&Value::Vector(Vector::Vec2([1.0, 2.0]))).unwrap();
        assert_eq!(
            wire,
            WireValue::Array(vec![WireValue::Float(1.0), WireValue::Float(2.0)])
        );
    }

    #[test]
    fn bbox_encodes_as_min_max() {
        let wire = encode(&Value::BBox(BBox::new([0.0, 1.0, 2.0], [3.0, 4.0, 5.0]))).unwrap();
        assert_eq!(
            wire.to_json().unwrap(),
            r#"{"min":[0.0,1.0,2.0],"max":[3.0,4.0,5.0]}"#
        );
    }

    #[test]
    fn encoding_is_deterministic() {
        let value = observation();
        let a = encode(&value).unwrap().to_json().unwrap();
        let b = encode(&value).unwrap().to_json().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sets_are_order_independent() {
        let a = Value::Set(vec![Value::from("door"), Value::from("arch"), Value::Int(3)]);
        let b = Value::Set(vec![Value::Int(3), Value::from("arch"), Value::from("door")]);
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
    }

    #[test]
    fn opaque_handle_fails_with_path() {
        let value = Value::Map(Map::new().with(
            "sensors",
            Value::List(vec![Value::Int(1), Value::Opaque(String::from("renderer"))]),
        ));
        let err = encode(&value).unwrap_err();
        assert_eq!(err.path, "$.sensors[1]");
        assert!(err.reason.contains("renderer"));
    }

    #[test]
    fn non_finite_float_fails_with_path() {
        let value = Value::Map(Map::new().with("pose", Vector::Vec3([0.0, f64::NAN, 0.0])));
        let err = encode(&value).unwrap_err();
        assert_eq!(err.path, "$.pose[1]");
    }

    #[test]
    fn keys_that_look_like_paths_are_quoted() {
        let opaque = || Value::Opaque("renderer".to_owned());
        let dotted = Value::Map(Map::new().with("a.b", opaque()));
        assert_eq!(encode(&dotted).unwrap_err().path, r#"$["a.b"]"#);

        let nested = Value::Map(Map::new().with(
            "a",
            Map::new().with("b", Map::new().with("x[0]", opaque())),
        ));
        assert_eq!(encode(&nested).unwrap_err().path, r#"$.a.b["x[0]"]"#);

        let plain = Value::Map(Map::new().with("a", Map::new().with("b", opaque())));
        assert_eq!(encode(&plain).unwrap_err().path, "$.a.b");
    }

    #[test]
    fn nan_inside_buffer_is_fine() {
        let value = Value::Buffer(TypedBuffer::Float32(vec![f32::NAN]));
        assert!(encode(&value).is_ok());
    }

    #[test]
    fn lossy_encoding_drops_opaque_entries() {
        let config = Value::Map(
            Map::new()
                .with("width", 64_i64)
                .with("renderer", Value::Opaque(String::from("renderer")))
                .with("height", 48_i64),
        );
        let wire = encode_lossy(&config).unwrap();
        assert_eq!(wire.to_json().unwrap(), r#"{"width":64,"height":48}"#);
    }

    #[test]
    fn decode_restores_shapes() {
        let value = observation();
        let decoded = decode(&encode(&value).unwrap());

        assert_eq!(decoded.get("step"), Some(&Value::Int(3)));
        assert_eq!(
            decoded.get("position").and_then(Value::as_vector),
            Some(Vector::Vec3([1.0, 0.5, -2.0]))
        );
        assert_eq!(
            decoded.get("bbox").and_then(Value::as_bbox),
            Some(BBox::new([0.0, 0.0, 0.0], [4.0, 3.0, 5.0]))
        );
        assert_eq!(
            decoded.get("depth").and_then(Value::as_buffer),
            Some(&TypedBuffer::Float32(vec![0.5, 1.25]))
        );
    }

    #[test]
    fn encode_does_not_alias_input() {
        let mut value = Value::Buffer(TypedBuffer::Uint8(vec![1, 2, 3]));
        let wire = encode(&value).unwrap();
        if let Value::Buffer(TypedBuffer::Uint8(bytes)) = &mut value {
            bytes.fill(0);
        }
        assert_eq!(wire, WireValue::Buffer(TypedBuffer::Uint8(vec![1, 2, 3])));
    }
}
