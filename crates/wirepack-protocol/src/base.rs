//! The standard package set.
//!
//! Seven built-in package types cover the basic conversation between a
//! client and a server: liveness, connection teardown, and free-form data
//! exchange. They are plain data — the engine never special-cases any of
//! them. In particular, [`RECONNECT`] is application-level signaling only:
//! the engine itself never reopens a dead connection.
//!
//! All dynamic standard packages share a 4-byte length prefix
//! ([`DATA_PREFIX_WIDTH`]).

use crate::{Package, PackageId};

/// Sent by a peer that observed the remote side closing the connection.
/// Fixed, zero payload.
pub const REMOTE_CLOSED_CONNECTION: PackageId = PackageId(0x0000);

/// Liveness probe. Fixed, zero payload.
pub const KEEP_ALIVE: PackageId = PackageId(0x0001);

/// Orderly teardown request. Fixed, zero payload.
pub const CLOSE_CONNECTION: PackageId = PackageId(0x0002);

/// Application-level reconnect hint (opaque payload). Dynamic.
pub const RECONNECT: PackageId = PackageId(0x0003);

/// Request for a piece of data identified by the payload. Dynamic.
pub const REQUEST_DATA: PackageId = PackageId(0x0004);

/// Upload of a piece of data carried in the payload. Dynamic.
pub const POST_DATA: PackageId = PackageId(0x0005);

/// Free-form text message (UTF-8 payload). Dynamic.
pub const MESSAGE: PackageId = PackageId(0x0006);

/// Length-prefix width shared by all dynamic standard packages.
pub const DATA_PREFIX_WIDTH: u16 = 4;

fn empty_fixed(id: PackageId) -> Package {
    Package::new(id, 0, false, Vec::new())
}

// A 4-byte prefix can describe any payload a real program will hold in
// memory, so these constructors use the unchecked form.
fn data(id: PackageId, payload: Vec<u8>) -> Package {
    Package::new(id, DATA_PREFIX_WIDTH, true, payload)
}

/// Builds a [`REMOTE_CLOSED_CONNECTION`] package.
pub fn remote_closed_connection() -> Package {
    empty_fixed(REMOTE_CLOSED_CONNECTION)
}

/// Builds a [`KEEP_ALIVE`] package.
pub fn keep_alive() -> Package {
    empty_fixed(KEEP_ALIVE)
}

/// Builds a [`CLOSE_CONNECTION`] package.
pub fn close_connection() -> Package {
    empty_fixed(CLOSE_CONNECTION)
}

/// Builds a [`RECONNECT`] package carrying an opaque payload.
pub fn reconnect(payload: Vec<u8>) -> Package {
    data(RECONNECT, payload)
}

/// Builds a [`REQUEST_DATA`] package.
pub fn request_data(payload: Vec<u8>) -> Package {
    data(REQUEST_DATA, payload)
}

/// Builds a [`POST_DATA`] package.
pub fn post_data(payload: Vec<u8>) -> Package {
    data(POST_DATA, payload)
}

/// Builds a [`MESSAGE`] package from UTF-8 text.
pub fn message(text: &str) -> Package {
    data(MESSAGE, text.as_bytes().to_vec())
}

/// Reads a package's payload as text (lossy UTF-8).
///
/// Meant for [`MESSAGE`] packages but works on any payload.
pub fn message_text(package: &Package) -> String {
    String::from_utf8_lossy(&package.payload).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_ids_are_distinct_and_stable() {
        let ids = [
            REMOTE_CLOSED_CONNECTION,
            KEEP_ALIVE,
            CLOSE_CONNECTION,
            RECONNECT,
            REQUEST_DATA,
            POST_DATA,
            MESSAGE,
        ];
        for (index, id) in ids.iter().enumerate() {
            assert_eq!(id.0, index as u16, "ids are assigned in order from 0x0000");
        }
    }

    #[test]
    fn test_fixed_standard_packages_have_empty_payloads() {
        for package in [remote_closed_connection(), keep_alive(), close_connection()] {
            assert!(!package.dynamic);
            assert_eq!(package.declared_len, 0);
            assert!(package.payload.is_empty());
        }
    }

    #[test]
    fn test_dynamic_standard_packages_use_four_byte_prefix() {
        for package in [
            reconnect(vec![1]),
            request_data(vec![2]),
            post_data(vec![3]),
            message("x"),
        ] {
            assert!(package.dynamic);
            assert_eq!(package.declared_len, DATA_PREFIX_WIDTH);
        }
    }

    #[test]
    fn test_message_text_round_trip() {
        let package = message("hello there");
        assert_eq!(package.id, MESSAGE);
        assert_eq!(message_text(&package), "hello there");
    }

    #[test]
    fn test_message_text_is_lossy_on_invalid_utf8() {
        let package = post_data(vec![0xFF, 0xFE]);
        // Invalid bytes are replaced, not rejected.
        assert_eq!(message_text(&package), "\u{FFFD}\u{FFFD}");
    }

    #[test]
    fn test_keep_alive_encodes_to_bare_identifier() {
        assert_eq!(keep_alive().encode(), vec![0x00, 0x01]);
    }
}
