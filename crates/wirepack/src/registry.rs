//! The package registry: identifier → descriptor lookup.
//!
//! The registry is the single source of truth for which message shapes
//! exist on a connection. It is populated during initialization, before the
//! connection is activated, and the engine treats it as read-only from then
//! on — there is no hot-reload contract.

use std::collections::HashMap;

use wirepack_protocol::{ID_LENGTH, PackageId, ProtocolError, base};

use crate::PackageDescriptor;

/// Maps package identifiers to their descriptors.
///
/// Lookup is O(1); identifiers are short fixed-width byte sequences keyed
/// by their `u16` value.
#[derive(Debug, Default)]
pub struct PackageRegistry {
    types: HashMap<PackageId, PackageDescriptor>,
}

impl PackageRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with the standard package set
    /// (see [`wirepack_protocol::base`]).
    pub fn with_base_packages() -> Self {
        let mut registry = Self::new();

        let fixed = [
            base::REMOTE_CLOSED_CONNECTION,
            base::KEEP_ALIVE,
            base::CLOSE_CONNECTION,
        ];
        let dynamic = [
            base::RECONNECT,
            base::REQUEST_DATA,
            base::POST_DATA,
            base::MESSAGE,
        ];

        for id in fixed {
            registry
                .register(PackageDescriptor::fixed(id, 0))
                .expect("standard package ids are distinct");
        }
        for id in dynamic {
            let descriptor = PackageDescriptor::dynamic(id, base::DATA_PREFIX_WIDTH)
                .expect("standard prefix width is in range");
            registry
                .register(descriptor)
                .expect("standard package ids are distinct");
        }

        registry
    }

    /// Registers a package type.
    ///
    /// # Errors
    /// [`ProtocolError::DuplicateId`] if the identifier is already taken.
    /// Duplicates are a configuration error and must be fixed before any
    /// connection using this registry is activated — they are never
    /// silently overwritten.
    pub fn register(&mut self, descriptor: PackageDescriptor) -> Result<(), ProtocolError> {
        match self.types.entry(descriptor.id()) {
            std::collections::hash_map::Entry::Occupied(entry) => {
                Err(ProtocolError::DuplicateId(*entry.key()))
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(descriptor);
                Ok(())
            }
        }
    }

    /// Looks up the descriptor for an identifier.
    pub fn lookup(&self, id: PackageId) -> Option<&PackageDescriptor> {
        self.types.get(&id)
    }

    /// Looks up the descriptor for a raw wire identifier.
    pub fn lookup_bytes(&self, raw: [u8; ID_LENGTH]) -> Option<&PackageDescriptor> {
        self.lookup(PackageId::from_bytes(raw))
    }

    /// Number of registered package types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
