//! Typed numeric buffers.
//!
//! Image frames, depth maps, audio samples and grid costs are large
//! homogeneous numeric collections. They travel as a [`TypedBuffer`]: the
//! element type is fixed by the enum variant chosen when the buffer is
//! created, never inferred later from a container name.
//!
//! On the wire the payload is the little-endian byte image of the elements.

use serde::{Deserialize, Serialize};

/// Errors that can occur when rebuilding a buffer from raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The `datatype` tag is not one of the supported element types.
    #[error("unknown element type tag: {0}")]
    UnknownElementType(String),

    /// The byte payload does not hold exactly `length` elements.
    #[error("buffer of {length} x {element_type} needs {expected} bytes, got {actual}")]
    LengthMismatch {
        /// The declared element type.
        element_type: ElementType,
        /// The declared element count.
        length: usize,
        /// Bytes required for `length` elements.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// The declared `length` is not a non-negative integer.
    #[error("invalid buffer length: {0}")]
    InvalidLength(String),

    /// The declared byte order is not the one this codec writes.
    #[error("unsupported endianness: {0}")]
    UnsupportedEndianness(String),

    /// The hex payload could not be decoded.
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),
}

/// Element type tag of a [`TypedBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 8-bit integer.
    Uint8,
    /// Unsigned 16-bit integer.
    Uint16,
    /// Unsigned 32-bit integer.
    Uint32,
    /// 32-bit IEEE 754 float.
    Float32,
    /// 64-bit IEEE 754 float.
    Float64,
}

impl ElementType {
    /// All element types, in tag order.
    pub const ALL: [Self; 8] = [
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Uint8,
        Self::Uint16,
        Self::Uint32,
        Self::Float32,
        Self::Float64,
    ];

    /// The wire tag (`"int8"`, `"float32"`, ...).
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: &str) -> Result<Self, BufferError> {
        Self::ALL
            .into_iter()
            .find(|t| t.tag() == tag)
            .ok_or_else(|| BufferError::UnknownElementType(tag.to_owned()))
    }

    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

impl core::fmt::Display for ElementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A homogeneous numeric buffer with an explicit element type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedBuffer {
    /// Signed 8-bit samples.
    Int8(Vec<i8>),
    /// Signed 16-bit samples (e.g. PCM audio).
    Int16(Vec<i16>),
    /// Signed 32-bit samples.
    Int32(Vec<i32>),
    /// Unsigned bytes (e.g. RGBA frames, semantic masks).
    Uint8(Vec<u8>),
    /// Unsigned 16-bit samples.
    Uint16(Vec<u16>),
    /// Unsigned 32-bit samples (e.g. object index frames).
    Uint32(Vec<u32>),
    /// 32-bit floats (e.g. depth maps, grid costs).
    Float32(Vec<f32>),
    /// 64-bit floats.
    Float64(Vec<f64>),
}

impl TypedBuffer {
    /// The element type tag of this buffer.
    pub const fn element_type(&self) -> ElementType {
        match self {
            Self::Int8(_) => ElementType::Int8,
            Self::Int16(_) => ElementType::Int16,
            Self::Int32(_) => ElementType::Int32,
            Self::Uint8(_) => ElementType::Uint8,
            Self::Uint16(_) => ElementType::Uint16,
            Self::Uint32(_) => ElementType::Uint32,
            Self::Float32(_) => ElementType::Float32,
            Self::Float64(_) => ElementType::Float64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Int8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Uint8(v) => v.len(),
            Self::Uint16(v) => v.len(),
            Self::Uint32(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
        }
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Little-endian byte image of the elements.
    ///
    /// Always returns a fresh allocation; the result never aliases the
    /// buffer's own storage.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Int8(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Int16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Int32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Uint8(v) => v.clone(),
            Self::Uint16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Uint32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Float32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Float64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        }
    }

    /// Rebuild a buffer from its little-endian byte image.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::LengthMismatch`] if `bytes` is not exactly
    /// `length` elements of `element_type`.
    pub fn from_le_bytes(
        element_type: ElementType,
        length: usize,
        bytes: &[u8],
    ) -> Result<Self, BufferError> {
        let expected = length.checked_mul(element_type.size());
        if expected != Some(bytes.len()) {
            return Err(BufferError::LengthMismatch {
                element_type,
                length,
                expected: expected.unwrap_or(usize::MAX),
                actual: bytes.len(),
            });
        }

        Ok(match element_type {
            ElementType::Int8 => Self::Int8(read_elements(bytes, i8::from_le_bytes)),
            ElementType::Int16 => Self::Int16(read_elements(bytes, i16::from_le_bytes)),
            ElementType::Int32 => Self::Int32(read_elements(bytes, i32::from_le_bytes)),
            ElementType::Uint8 => Self::Uint8(bytes.to_vec()),
            ElementType::Uint16 => Self::Uint16(read_elements(bytes, u16::from_le_bytes)),
            ElementType::Uint32 => Self::Uint32(read_elements(bytes, u32::from_le_bytes)),
            ElementType::Float32 => Self::Float32(read_elements(bytes, f32::from_le_bytes)),
            ElementType::Float64 => Self::Float64(read_elements(bytes, f64::from_le_bytes)),
        })
    }
}

fn read_elements<T, const N: usize>(bytes: &[u8], convert: fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .filter_map(|chunk| <[u8; N]>::try_from(chunk).ok())
        .map(convert)
        .collect()
}
