//! # State Serialization Primitives
//!
//! Every piece of emulated hardware that can be rewound implements
//! [`Serializable`]. A device writes its complete internal state into a
//! [`Serializer`] and reads it back from a [`Deserializer`]; the byte layout is
//! private to the device and only has to round-trip.
//!
//! ## Encoding
//!
//! All multi-byte integers are little-endian. Booleans are one byte (0 or 1).
//! Byte blocks are written raw; their length is implied by the device that reads
//! them back, except [`Serializer::put_blob`] which is length-prefixed.
//!
//! ```
//! use vcs_debug::serializer::{Deserializer, Serializer};
//!
//! let mut out = Serializer::new();
//! out.put_u8(0x42);
//! out.put_u16(0xF000);
//! out.put_bool(true);
//!
//! let bytes = out.into_bytes();
//! let mut input = Deserializer::new(&bytes);
//! assert_eq!(input.get_u8().unwrap(), 0x42);
//! assert_eq!(input.get_u16().unwrap(), 0xF000);
//! assert!(input.get_bool().unwrap());
//! assert!(input.is_empty());
//! ```

use thiserror::Error;

/// Errors raised while capturing or restoring machine state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// Input ended before a field could be read.
    #[error("save state truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Blob does not start with the expected magic number.
    #[error("invalid save state magic number")]
    BadMagic,

    /// Blob was produced by an incompatible format version.
    #[error("incompatible save state version: expected {expected}, got {found}")]
    Version { expected: u32, found: u32 },

    /// Device sections are not in the order (or number) of the current machine.
    #[error("save state expects device '{expected}', found '{found}'")]
    DeviceMismatch { expected: String, found: String },

    /// A device refused to serialize its state.
    #[error("device '{device}' cannot be serialized: {reason}")]
    Unserializable { device: String, reason: String },

    /// A field decoded to a value the device cannot accept.
    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u32 },

    /// A device section was not fully consumed by its owner.
    #[error("device '{device}' left {remaining} unread bytes in its section")]
    TrailingData { device: String, remaining: usize },
}

/// A component whose complete internal state can be saved and restored.
///
/// Implementations must be symmetric: whatever `save` writes, `load` reads in
/// the same order. `load` should decode into locals first and only assign to
/// `self` once every field has been read, so a failed load leaves the device
/// untouched.
pub trait Serializable {
    /// Stable name used to tag this component's section in a machine snapshot.
    fn name(&self) -> &'static str;

    /// Write the component state.
    fn save(&self, out: &mut Serializer) -> Result<(), StateError>;

    /// Replace the component state with the one read from `input`.
    fn load(&mut self, input: &mut Deserializer<'_>) -> Result<(), StateError>;
}

/// Append-only little-endian byte writer.
#[derive(Debug, Default)]
pub struct Serializer {
    data: Vec<u8>,
}

impl Serializer {
    /// Create an empty serializer.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.data.push(value as u8);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Write raw bytes with no length prefix.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write a `u32` length prefix followed by the bytes.
    pub fn put_blob(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.data.extend_from_slice(bytes);
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn put_str(&mut self, value: &str) {
        self.put_blob(value.as_bytes());
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the serializer, returning the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Cursor over a byte slice produced by [`Serializer`].
#[derive(Debug)]
pub struct Deserializer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Deserializer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], StateError> {
        if self.remaining() < needed {
            return Err(StateError::Truncated {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, StateError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_bool(&mut self) -> Result<bool, StateError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StateError::InvalidValue {
                field: "bool",
                value: other as u32,
            }),
        }
    }

    pub fn get_u16(&mut self) -> Result<u16, StateError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32, StateError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64, StateError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    /// Read exactly `len` raw bytes.
    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8], StateError> {
        self.take(len)
    }

    /// Fill `dest` with raw bytes.
    pub fn get_into(&mut self, dest: &mut [u8]) -> Result<(), StateError> {
        let src = self.take(dest.len())?;
        dest.copy_from_slice(src);
        Ok(())
    }

    /// Read a `u32` length prefix and that many bytes.
    pub fn get_blob(&mut self) -> Result<&'a [u8], StateError> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn get_str(&mut self) -> Result<String, StateError> {
        let bytes = self.get_blob()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StateError::InvalidValue {
            field: "string",
            value: bytes.len() as u32,
        })
    }
}
