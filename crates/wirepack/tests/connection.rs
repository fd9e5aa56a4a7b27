//! Integration tests for the connection engine.
//!
//! These spin up real loopback TCP sockets: the test plays the server side,
//! writing raw wire bytes, and asserts what the engine decodes, dispatches,
//! and tears down on the client side. Handler invocations are recorded
//! through channels so ordering and exactly-once properties can be asserted
//! without sleeping.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use wirepack::protocol::{Package, PackageId, base};
use wirepack::{
    ClientConfig, ClientConnection, ConnectionState, DisconnectHandler, HandlerError,
    PackageDescriptor, PackageRegistry, ReceiveHandler, TimeoutHandler, UnknownPackageHandler,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Opens a loopback socket pair: (client side, server side).
async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let addr = listener.local_addr().expect("should have a local addr");
    let client = TcpStream::connect(addr).await.expect("should connect");
    let (server, _) = listener.accept().await.expect("should accept");
    (client, server)
}

fn connection_with(
    stream: TcpStream,
    registry: PackageRegistry,
    config: ClientConfig,
) -> ClientConnection {
    ClientConnection::new(stream, Arc::new(registry), config)
}

fn base_connection(stream: TcpStream) -> ClientConnection {
    connection_with(
        stream,
        PackageRegistry::with_base_packages(),
        ClientConfig::default(),
    )
}

/// Receives from a recorder channel, failing the test after two seconds
/// instead of hanging forever.
async fn recv_timely<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("handler should fire in time")
        .expect("recorder channel should stay open")
}

// -- Recorder handlers ------------------------------------------------------

/// Records each received package as `(label, id)`.
struct Recorder {
    label: &'static str,
    tx: mpsc::UnboundedSender<(&'static str, PackageId)>,
}

#[async_trait]
impl ReceiveHandler for Recorder {
    async fn on_receive(
        &self,
        package: &Package,
        _connection: &ClientConnection,
    ) -> Result<(), HandlerError> {
        let _ = self.tx.send((self.label, package.id));
        Ok(())
    }
}

/// Records each received package's payload.
struct PayloadRecorder {
    tx: mpsc::UnboundedSender<(PackageId, Vec<u8>)>,
}

#[async_trait]
impl ReceiveHandler for PayloadRecorder {
    async fn on_receive(
        &self,
        package: &Package,
        _connection: &ClientConnection,
    ) -> Result<(), HandlerError> {
        let _ = self.tx.send((package.id, package.payload.clone()));
        Ok(())
    }
}

/// Fails on every package.
struct FailingReceive;

#[async_trait]
impl ReceiveHandler for FailingReceive {
    async fn on_receive(
        &self,
        _package: &Package,
        _connection: &ClientConnection,
    ) -> Result<(), HandlerError> {
        Err("handler rejected the package".into())
    }
}

/// Disables the connection from inside dispatch.
struct DisablingReceive;

#[async_trait]
impl ReceiveHandler for DisablingReceive {
    async fn on_receive(
        &self,
        _package: &Package,
        connection: &ClientConnection,
    ) -> Result<(), HandlerError> {
        connection.disable().await;
        Ok(())
    }
}

struct UnknownRecorder {
    tx: mpsc::UnboundedSender<[u8; 2]>,
}

#[async_trait]
impl UnknownPackageHandler for UnknownRecorder {
    async fn on_unknown_package(&self, raw_id: [u8; 2], _connection: &ClientConnection) {
        let _ = self.tx.send(raw_id);
    }
}

struct DisconnectRecorder {
    tx: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl DisconnectHandler for DisconnectRecorder {
    async fn on_disconnect(&self, _connection: &ClientConnection) {
        let _ = self.tx.send(());
    }
}

/// Records the timeout, then fails — teardown must not care.
struct FailingTimeout {
    tx: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl TimeoutHandler for FailingTimeout {
    async fn on_timeout(&self, _connection: &ClientConnection) -> Result<(), HandlerError> {
        let _ = self.tx.send(());
        Err("timeout handler exploded".into())
    }
}

// ---------------------------------------------------------------------------
// Framing and dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fixed_zero_payload_package_dispatches_and_loop_continues() {
    let (client, mut server) = socket_pair().await;
    let connection = base_connection(client);

    let (tx, mut rx) = mpsc::unbounded_channel();
    connection.add_receive_handler(Arc::new(PayloadRecorder { tx }));
    connection.enable();

    // Two keep-alive packages back to back: the loop must dispatch the
    // first and keep reading.
    server
        .write_all(&[0x00, 0x01, 0x00, 0x01])
        .await
        .expect("server write");

    let (id, payload) = recv_timely(&mut rx).await;
    assert_eq!(id, base::KEEP_ALIVE);
    assert!(payload.is_empty());

    let (id, _) = recv_timely(&mut rx).await;
    assert_eq!(id, base::KEEP_ALIVE);

    assert_eq!(connection.state(), ConnectionState::Active);
    connection.disable().await;
}

#[tokio::test]
async fn test_dynamic_package_reads_prefix_then_payload() {
    let (client, mut server) = socket_pair().await;
    let connection = base_connection(client);

    let (tx, mut rx) = mpsc::unbounded_channel();
    connection.add_receive_handler(Arc::new(PayloadRecorder { tx }));
    connection.enable();

    // Message package: id 0x0006, 4-byte prefix = 5, payload "HELLO".
    server
        .write_all(&[
            0x00, 0x06, 0x00, 0x00, 0x00, 0x05, b'H', b'E', b'L', b'L', b'O',
        ])
        .await
        .expect("server write");

    let (id, payload) = recv_timely(&mut rx).await;
    assert_eq!(id, base::MESSAGE);
    assert_eq!(payload, b"HELLO");

    connection.disable().await;
}

#[tokio::test]
async fn test_fixed_type_reads_exactly_declared_length_regardless_of_content() {
    let (client, mut server) = socket_pair().await;

    let mut registry = PackageRegistry::with_base_packages();
    registry
        .register(PackageDescriptor::fixed(PackageId(0x0200), 4))
        .expect("register custom type");

    let connection = connection_with(client, registry, ClientConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    connection.add_receive_handler(Arc::new(PayloadRecorder { tx }));
    connection.enable();

    // The 4-byte payload deliberately looks like another identifier plus a
    // prefix fragment; a fixed type must consume it as opaque payload, so
    // the keep-alive behind it still frames correctly.
    server
        .write_all(&[0x02, 0x00, 0x00, 0x06, 0xFF, 0xFF, 0x00, 0x01])
        .await
        .expect("server write");

    let (id, payload) = recv_timely(&mut rx).await;
    assert_eq!(id, PackageId(0x0200));
    assert_eq!(payload, [0x00, 0x06, 0xFF, 0xFF]);

    let (id, _) = recv_timely(&mut rx).await;
    assert_eq!(id, base::KEEP_ALIVE);

    connection.disable().await;
}

#[tokio::test]
async fn test_dispatch_order_is_global_registration_order_then_type_handler() {
    let (client, mut server) = socket_pair().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    // A custom fixed type carrying its own per-type handler "D".
    let mut registry = PackageRegistry::with_base_packages();
    registry
        .register(
            PackageDescriptor::fixed(PackageId(0x0100), 0).with_handler(Arc::new(Recorder {
                label: "D",
                tx: tx.clone(),
            })),
        )
        .expect("register custom type");

    let connection = connection_with(client, registry, ClientConfig::default());
    for label in ["A", "B", "C"] {
        connection.add_receive_handler(Arc::new(Recorder {
            label,
            tx: tx.clone(),
        }));
    }
    connection.enable();

    server.write_all(&[0x01, 0x00]).await.expect("server write");

    let mut order = Vec::new();
    for _ in 0..4 {
        let (label, id) = recv_timely(&mut rx).await;
        assert_eq!(id, PackageId(0x0100));
        order.push(label);
    }
    assert_eq!(order, ["A", "B", "C", "D"]);

    connection.disable().await;
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_identifier_fires_callback_once_and_disables() {
    let (client, mut server) = socket_pair().await;
    let connection = base_connection(client);

    let (unknown_tx, mut unknown_rx) = mpsc::unbounded_channel();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    let (receive_tx, mut receive_rx) = mpsc::unbounded_channel();
    connection.set_unknown_package_handler(Arc::new(UnknownRecorder { tx: unknown_tx }));
    connection.set_disconnect_handler(Arc::new(DisconnectRecorder { tx: disconnect_tx }));
    connection.add_receive_handler(Arc::new(PayloadRecorder { tx: receive_tx }));
    connection.enable();

    server.write_all(&[0xFF, 0xFF]).await.expect("server write");

    assert_eq!(recv_timely(&mut unknown_rx).await, [0xFF, 0xFF]);
    recv_timely(&mut disconnect_rx).await;

    assert_eq!(connection.state(), ConnectionState::Dead);
    // Exactly once, and nothing was ever dispatched.
    assert!(unknown_rx.try_recv().is_err());
    assert!(receive_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_length_at_bound_closes_without_reading_payload() {
    let (client, mut server) = socket_pair().await;
    let connection = base_connection(client);

    let (receive_tx, mut receive_rx) = mpsc::unbounded_channel();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    let (unknown_tx, mut unknown_rx) = mpsc::unbounded_channel();
    connection.add_receive_handler(Arc::new(PayloadRecorder { tx: receive_tx }));
    connection.set_disconnect_handler(Arc::new(DisconnectRecorder { tx: disconnect_tx }));
    connection.set_unknown_package_handler(Arc::new(UnknownRecorder { tx: unknown_tx }));
    connection.enable();

    // Prefix of exactly 2048 — equal to the default bound, so rejected
    // (the bound is exclusive). No payload follows; none must be awaited.
    server
        .write_all(&[0x00, 0x06, 0x00, 0x00, 0x08, 0x00])
        .await
        .expect("server write");

    recv_timely(&mut disconnect_rx).await;
    assert_eq!(connection.state(), ConnectionState::Dead);
    assert!(receive_rx.try_recv().is_err(), "no package may be dispatched");
    // Size mismatch is the "normal" exit path, not the unknown-package path.
    assert!(unknown_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_length_with_high_bit_set_is_rejected_as_oversized() {
    let (client, mut server) = socket_pair().await;
    let connection = base_connection(client);

    let (receive_tx, mut receive_rx) = mpsc::unbounded_channel();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    connection.add_receive_handler(Arc::new(PayloadRecorder { tx: receive_tx }));
    connection.set_disconnect_handler(Arc::new(DisconnectRecorder { tx: disconnect_tx }));
    connection.enable();

    // 0xFFFFFFFF would be -1 as a signed 32-bit value. Read unsigned it is
    // enormous; either way no payload allocation or read may happen.
    server
        .write_all(&[0x00, 0x06, 0xFF, 0xFF, 0xFF, 0xFF])
        .await
        .expect("server write");

    recv_timely(&mut disconnect_rx).await;
    assert_eq!(connection.state(), ConnectionState::Dead);
    assert!(receive_rx.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Handler failure modes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_receive_handler_error_tears_down_connection() {
    let (client, mut server) = socket_pair().await;
    let connection = base_connection(client);

    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    connection.add_receive_handler(Arc::new(FailingReceive));
    connection.set_disconnect_handler(Arc::new(DisconnectRecorder { tx: disconnect_tx }));
    connection.enable();

    server.write_all(&[0x00, 0x01]).await.expect("server write");

    recv_timely(&mut disconnect_rx).await;
    assert_eq!(connection.state(), ConnectionState::Dead);
}

#[tokio::test]
async fn test_handler_disabling_connection_stops_loop_before_next_read() {
    let (client, mut server) = socket_pair().await;
    let connection = base_connection(client);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    // The disabling handler runs first; the recorder still sees the package
    // currently being dispatched, but never a second one.
    connection.add_receive_handler(Arc::new(DisablingReceive));
    connection.add_receive_handler(Arc::new(PayloadRecorder { tx }));
    connection.set_disconnect_handler(Arc::new(DisconnectRecorder { tx: disconnect_tx }));
    connection.enable();

    // Two packages arrive together; only the first may be dispatched.
    server
        .write_all(&[0x00, 0x01, 0x00, 0x01])
        .await
        .expect("server write");

    let (id, _) = recv_timely(&mut rx).await;
    assert_eq!(id, base::KEEP_ALIVE);
    recv_timely(&mut disconnect_rx).await;

    assert_eq!(connection.state(), ConnectionState::Dead);
    assert!(rx.try_recv().is_err(), "the second package must not be dispatched");
}

// ---------------------------------------------------------------------------
// Timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_timeout_handler_failure_still_disconnects() {
    let (client, _server) = socket_pair().await;
    let config = ClientConfig {
        read_timeout: Some(Duration::from_millis(50)),
        ..ClientConfig::default()
    };
    let connection = connection_with(client, PackageRegistry::with_base_packages(), config);

    let (timeout_tx, mut timeout_rx) = mpsc::unbounded_channel();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    connection.set_timeout_handler(Arc::new(FailingTimeout { tx: timeout_tx }));
    connection.set_disconnect_handler(Arc::new(DisconnectRecorder { tx: disconnect_tx }));
    connection.enable();

    // No bytes are ever written: the identifier read must time out, the
    // timeout handler fires (and fails), and teardown proceeds anyway.
    recv_timely(&mut timeout_rx).await;
    recv_timely(&mut disconnect_rx).await;
    assert_eq!(connection.state(), ConnectionState::Dead);
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_disable_twice_fires_disconnect_once() {
    let (client, _server) = socket_pair().await;
    let connection = base_connection(client);

    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    connection.set_disconnect_handler(Arc::new(DisconnectRecorder { tx: disconnect_tx }));

    connection.disable().await;
    connection.disable().await;

    recv_timely(&mut disconnect_rx).await;
    assert!(disconnect_rx.try_recv().is_err(), "disconnect must fire exactly once");
    assert_eq!(connection.state(), ConnectionState::Dead);
}

#[tokio::test]
async fn test_remote_close_disables_and_fires_disconnect() {
    let (client, server) = socket_pair().await;
    let connection = base_connection(client);

    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    connection.set_disconnect_handler(Arc::new(DisconnectRecorder { tx: disconnect_tx }));
    connection.enable();

    // The remote end goes away mid-identifier.
    drop(server);

    recv_timely(&mut disconnect_rx).await;
    assert_eq!(connection.state(), ConnectionState::Dead);
}

// ---------------------------------------------------------------------------
// Send path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_send_writes_encoded_bytes_to_peer() {
    let (client, mut server) = socket_pair().await;
    let connection = base_connection(client);

    connection
        .send(&base::message("hi"))
        .await
        .expect("send should succeed");

    let mut wire = [0u8; 8];
    server
        .read_exact(&mut wire)
        .await
        .expect("server should see the bytes");
    assert_eq!(wire, [0x00, 0x06, 0x00, 0x00, 0x00, 0x02, b'h', b'i']);
}

#[tokio::test]
async fn test_send_after_disable_is_a_noop() {
    let (client, mut server) = socket_pair().await;
    let connection = base_connection(client);

    connection.disable().await;
    connection
        .send(&base::message("ghost"))
        .await
        .expect("send on a dead connection is a silent no-op");

    // The server observes only the shutdown, never the package.
    let mut buf = [0u8; 16];
    let read = server.read(&mut buf).await.expect("read should succeed");
    assert_eq!(read, 0, "nothing may be written after disable");
}
