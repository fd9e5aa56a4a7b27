//! Package identifiers, the package entity, and wire encoding.
//!
//! Every message on the wire is a "package":
//!
//! ```text
//! ┌──────────────┬────────────────────────────┬──────────────────┐
//! │ id (2 bytes) │ length prefix (dynamic     │ payload          │
//! │ big-endian   │ types only, 1–8 bytes)     │ (0 or more bytes)│
//! └──────────────┴────────────────────────────┴──────────────────┘
//! ```
//!
//! Fixed-length types have no prefix — their payload size is part of the
//! type's descriptor, not of the wire data. Dynamic types carry the payload
//! length in a big-endian unsigned prefix field whose *width* is declared by
//! the descriptor.

use std::fmt;

use crate::ProtocolError;

/// Width of the identifier field on the wire, in bytes.
pub const ID_LENGTH: usize = 2;

/// Widest supported length-prefix field, in bytes (a prefix decodes into a
/// `u64`).
pub const MAX_PREFIX_WIDTH: u16 = 8;

// ---------------------------------------------------------------------------
// PackageId
// ---------------------------------------------------------------------------

/// A package type identifier — two big-endian bytes on the wire.
///
/// Newtype over `u16` so an identifier cannot be confused with a length or
/// any other small integer, and so it can serve directly as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub u16);

impl PackageId {
    /// Reads an identifier from its two wire bytes.
    pub fn from_bytes(bytes: [u8; ID_LENGTH]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }

    /// Returns the two wire bytes of this identifier.
    pub fn to_bytes(self) -> [u8; ID_LENGTH] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<u16> for PackageId {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

// ---------------------------------------------------------------------------
// Package
// ---------------------------------------------------------------------------

/// One decoded (or pending-encode) protocol message.
///
/// The metadata fields (`declared_len`, `dynamic`) are copied from the
/// type's descriptor at construction so an entity is self-describing:
/// [`encode`](Self::encode) needs no registry access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// The package type identifier.
    pub id: PackageId,

    /// For fixed types: the exact payload byte count.
    /// For dynamic types: the width of the on-wire length-prefix field.
    pub declared_len: u16,

    /// Whether the payload length travels on the wire as a prefix field.
    pub dynamic: bool,

    /// The raw payload (possibly empty).
    pub payload: Vec<u8>,
}

impl Package {
    /// Constructs a package without shape validation.
    ///
    /// This is the decode-side constructor: the read loop only ever hands it
    /// payloads that already match the descriptor's declared shape. Code
    /// building *outgoing* packages by hand should prefer the checked
    /// [`fixed`](Self::fixed) and [`dynamic`](Self::dynamic) constructors.
    pub fn new(id: PackageId, declared_len: u16, dynamic: bool, payload: Vec<u8>) -> Self {
        Self {
            id,
            declared_len,
            dynamic,
            payload,
        }
    }

    /// Constructs a fixed-length package, validating the payload size.
    ///
    /// # Errors
    /// [`ProtocolError::FixedLengthMismatch`] if `payload.len() != len`.
    pub fn fixed(id: PackageId, len: u16, payload: Vec<u8>) -> Result<Self, ProtocolError> {
        if payload.len() != usize::from(len) {
            return Err(ProtocolError::FixedLengthMismatch {
                id,
                expected: len,
                actual: payload.len(),
            });
        }
        Ok(Self::new(id, len, false, payload))
    }

    /// Constructs a dynamic-length package, validating that the payload is
    /// representable in the given prefix width.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidPrefixWidth`] if `prefix_width` is outside
    ///   `1..=8`.
    /// - [`ProtocolError::PayloadTooLarge`] if the payload length does not
    ///   fit in the prefix field.
    pub fn dynamic(
        id: PackageId,
        prefix_width: u16,
        payload: Vec<u8>,
    ) -> Result<Self, ProtocolError> {
        if prefix_width == 0 || prefix_width > MAX_PREFIX_WIDTH {
            return Err(ProtocolError::InvalidPrefixWidth(prefix_width));
        }
        if payload.len() as u64 > prefix_capacity(prefix_width) {
            return Err(ProtocolError::PayloadTooLarge {
                id,
                len: payload.len(),
                width: prefix_width,
            });
        }
        Ok(Self::new(id, prefix_width, true, payload))
    }

    /// Serializes the package to its wire form:
    /// `id ‖ [length prefix if dynamic] ‖ payload`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.id.to_bytes());
        if self.dynamic {
            out.extend_from_slice(&encode_length_prefix(
                self.payload.len() as u64,
                self.declared_len,
            ));
        }
        out.extend_from_slice(&self.payload);
        out
    }

    /// Total size of the encoded wire form, in bytes.
    pub fn encoded_len(&self) -> usize {
        let prefix = if self.dynamic {
            usize::from(self.declared_len)
        } else {
            0
        };
        ID_LENGTH + prefix + self.payload.len()
    }
}

// ---------------------------------------------------------------------------
// Length-prefix helpers
// ---------------------------------------------------------------------------

/// Writes `value` big-endian into exactly `width` bytes.
///
/// The caller is responsible for `value` fitting the field (see
/// [`prefix_capacity`]); the checked [`Package::dynamic`] constructor
/// enforces this for outgoing packages.
pub fn encode_length_prefix(value: u64, width: u16) -> Vec<u8> {
    let width = usize::from(width);
    let be = value.to_be_bytes();
    if width >= be.len() {
        // Wider than u64: left-pad with zeros.
        let mut out = vec![0u8; width - be.len()];
        out.extend_from_slice(&be);
        out
    } else {
        be[be.len() - width..].to_vec()
    }
}

/// Reads a big-endian unsigned integer from a prefix field of up to 8 bytes.
pub fn decode_length_prefix(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
}

/// Largest payload length representable in a prefix field of `width` bytes.
pub fn prefix_capacity(width: u16) -> u64 {
    if width >= MAX_PREFIX_WIDTH {
        u64::MAX
    } else {
        (1u64 << (8 * u32::from(width))) - 1
    }
}

// =========================================================================
// Tests
// =========================================================================
