//! Error types for the engine crate.

use wirepack_protocol::ProtocolError;

/// Errors surfaced to callers of the client API.
///
/// Protocol violations observed by the read loop (unknown identifiers,
/// out-of-bounds lengths) are not represented here: they are
/// connection-fatal, reported through the unknown-package and disconnect
/// handlers, and logged — there is no caller on the read path to return
/// them to.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Opening the TCP connection failed.
    #[error("connect failed: {0}")]
    Connect(std::io::Error),

    /// Writing to the connection failed. The connection has already been
    /// disabled by the time this is returned.
    #[error("i/o failure on connection: {0}")]
    Io(#[from] std::io::Error),

    /// A package or registry was misconfigured (duplicate identifier,
    /// invalid shape).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirepack_protocol::PackageId;

    #[test]
    fn test_from_protocol_error() {
        let err: ClientError = ProtocolError::DuplicateId(PackageId(3)).into();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(err.to_string().contains("0x0003"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: ClientError = io.into();
        assert!(matches!(err, ClientError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }
}
