//! Wire values and the serialization codec for the Atrium session protocol.
//!
//! Simulation results are trees of numeric vectors, bounding boxes, typed
//! numeric buffers, and scalar/string fields. This crate defines the in-memory
//! [`Value`] tree an engine produces, the canonical [`WireValue`] shape that
//! travels over a connection, and the pure [`encode`]/[`decode`] functions
//! between them.
//!
//! # Modules
//!
//! - [`buffer`] -- [`TypedBuffer`] and its explicit [`ElementType`] tag
//! - [`value`] -- [`Value`], [`Map`], [`Vector`], [`BBox`]
//! - [`wire`] -- [`WireValue`] and its JSON representation
//! - [`codec`] -- [`encode`], [`encode_lossy`], [`decode`]
//!
//! # Determinism
//!
//! Encoding never depends on hash ordering or on the concrete type a value
//! was produced from, only on its shape: identical input always yields
//! byte-identical JSON.

pub mod buffer;
pub mod codec;
pub mod value;
pub mod wire;

pub use buffer::{BufferError, ElementType, TypedBuffer};
pub use codec::{SerializationError, decode, encode, encode_lossy};
pub use value::{BBox, Map, Value, Vector};
pub use wire::WireValue;
