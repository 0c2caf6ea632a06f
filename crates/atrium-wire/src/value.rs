//! In-memory value trees produced by a simulation engine.
//!
//! A [`Value`] is what an engine hands back from `start`, `reset`, `action`
//! and the query commands. It keeps the semantic distinctions the codec
//! needs (vectors, bounding boxes, typed buffers, ordered maps, sets, opaque
//! handles) that the wire form flattens away.

use crate::buffer::TypedBuffer;

/// A 2, 3 or 4 component numeric vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Vector {
    /// Two components (e.g. grid cell, image coordinate).
    Vec2([f64; 2]),
    /// Three components (e.g. position, direction).
    Vec3([f64; 3]),
    /// Four components (e.g. quaternion, RGBA colour).
    Vec4([f64; 4]),
}

impl Vector {
    /// Components as a slice.
    pub const fn as_slice(&self) -> &[f64] {
        match self {
            Self::Vec2(v) => v,
            Self::Vec3(v) => v,
            Self::Vec4(v) => v,
        }
    }

    /// Build a vector from 2, 3 or 4 components.
    pub fn from_slice(components: &[f64]) -> Option<Self> {
        match *components {
            [x, y] => Some(Self::Vec2([x, y])),
            [x, y, z] => Some(Self::Vec3([x, y, z])),
            [x, y, z, w] => Some(Self::Vec4([x, y, z, w])),
            _ => None,
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    /// Minimum corner.
    pub min: [f64; 3],
    /// Maximum corner.
    pub max: [f64; 3],
}

impl BBox {
    /// Create a bounding box from its corners.
    pub const fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Whether `point` lies inside the box (inclusive).
    pub fn contains(&self, point: [f64; 3]) -> bool {
        point
            .iter()
            .zip(self.min.iter().zip(self.max.iter()))
            .all(|(p, (lo, hi))| p >= lo && p <= hi)
    }
}

/// Insertion-ordered string-keyed map.
///
/// Order is kept because some engine outputs (step traces, sensor lists)
/// are meaningful in the order they were produced. Inserting an existing
/// key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Map {
    entries: Vec<(String, Value)>,
}

impl Map {
    /// Create an empty map.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert or replace `key`. Returns the previous value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(core::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Overlay `other` onto `self`: overlapping keys take `other`'s value,
    /// keys only in `self` are kept untouched.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in other.iter() {
            self.insert(key.clone(), value.clone());
        }
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.entries.iter()
    }

    /// Iterate keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of entries.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Map {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for Map {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A simulation result tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// Text.
    String(String),
    /// Numeric vector; encoded as a plain array of numbers.
    Vector(Vector),
    /// Bounding box; encoded as `{min, max}` arrays.
    BBox(BBox),
    /// Typed numeric buffer.
    Buffer(TypedBuffer),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Unordered collection; encoded in a canonical order.
    Set(Vec<Value>),
    /// Insertion-ordered mapping.
    Map(Map),
    /// Engine-internal handle (renderer, socket, ...) that has no wire form.
    /// The payload names the handle for diagnostics.
    Opaque(String),
}

impl Value {
    /// The mapping, if this is a map.
    pub const fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The string, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is an integer.
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The boolean, if this is a boolean.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of an integer or float scalar.
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Interpret this value as a vector.
    ///
    /// Accepts a [`Value::Vector`] or a list of 2-4 numbers, which is the
    /// shape a vector takes after a wire round trip.
    pub fn as_vector(&self) -> Option<Vector> {
        match self {
            Self::Vector(v) => Some(*v),
            Self::List(items) => {
                let components: Option<Vec<f64>> = items.iter().map(Self::as_f64).collect();
                Vector::from_slice(&components?)
            }
            _ => None,
        }
    }

    /// Interpret this value as a bounding box.
    ///
    /// Accepts a [`Value::BBox`] or a map with 3-component `min` and `max`.
    pub fn as_bbox(&self) -> Option<BBox> {
        match self {
            Self::BBox(b) => Some(*b),
            Self::Map(m) => {
                let min = m.get("min")?.as_vector()?;
                let max = m.get("max")?.as_vector()?;
                match (min, max) {
                    (Vector::Vec3(min), Vector::Vec3(max)) => Some(BBox::new(min, max)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// The typed buffer, if this is one.
    pub const fn as_buffer(&self) -> Option<&TypedBuffer> {
        match self {
            Self::Buffer(b) => Some(b),
            _ => None,
        }
    }

    /// Look up `key` if this is a map.
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_map()?.get(key)
    }

    /// Whether this is [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        i64::try_from(i).map_or_else(|_| Self::Float(u64_to_f64(i)), Self::Int)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vector> for Value {
    fn from(v: Vector) -> Self {
        Self::Vector(v)
    }
}

impl From<BBox> for Value {
    fn from(b: BBox) -> Self {
        Self::BBox(b)
    }
}

impl From<TypedBuffer> for Value {
    fn from(b: TypedBuffer) -> Self {
        Self::Buffer(b)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Self::Map(m)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::List(items)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

#[allow(clippy::cast_precision_loss)]
const fn u64_to_f64(i: u64) -> f64 {
    i as f64
}
