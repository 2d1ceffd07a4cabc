//! Server end-to-end tests
//!
//! Real TCP connections against a server bound to an ephemeral port.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use ebbchar_core::{BrokerConfig, DeviceBroker};
use ebbchar_server::{ClientError, DeviceClient, Server, ServerRuntimeConfig};
use proptest::prelude::*;
use tokio::{sync::oneshot, task::JoinHandle};

struct TestServer {
    addr: SocketAddr,
    broker: Arc<DeviceBroker>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<ebbchar_core::BrokerStats, ebbchar_server::ServerError>>,
}

async fn start(capacity: usize) -> TestServer {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        broker: BrokerConfig::with_capacity(capacity),
        ..Default::default()
    };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let broker = server.broker();
    let (shutdown, rx) = oneshot::channel();

    let task = tokio::spawn(server.run_until(async move {
        let _ = rx.await;
    }));

    TestServer { addr, broker, shutdown, task }
}

// Handles are released on the server's connection task, which may lag the
// client by a scheduling round
async fn wait_for_available(broker: &DeviceBroker, expected: usize) {
    for _ in 0..200 {
        if broker.available() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("available slots stuck at {}, expected {}", broker.available(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hello_round_trip() {
    let server = start(5).await;

    let mut client = DeviceClient::connect(server.addr).await.unwrap();
    assert_eq!(client.write(b"hello").await.unwrap(), 5);
    assert_eq!(client.read(10).await.unwrap().as_deref(), Some(&b"hello"[..]));
    assert_eq!(client.read(10).await.unwrap(), None);
    client.close().await.unwrap();

    wait_for_available(&server.broker, 5).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn capacity_two_rejects_third_client() {
    let server = start(2).await;

    let a = DeviceClient::connect(server.addr).await.unwrap();
    let _b = DeviceClient::connect(server.addr).await.unwrap();

    let c = DeviceClient::connect(server.addr).await;
    assert!(matches!(c, Err(ClientError::Busy(_))));

    a.close().await.unwrap();
    wait_for_available(&server.broker, 1).await;

    let c = DeviceClient::connect(server.addr).await;
    assert!(c.is_ok(), "slot from A must be reusable: {:?}", c.err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_connection_releases_slot_and_buffer() {
    let server = start(1).await;

    {
        let mut client = DeviceClient::connect(server.addr).await.unwrap();
        client.write(b"abandoned").await.unwrap();
    }

    wait_for_available(&server.broker, 1).await;
    assert_eq!(server.broker.stats().live_buffers, 0);

    let again = DeviceClient::connect(server.addr).await;
    assert!(again.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn short_read_truncates_over_the_wire() {
    let server = start(1).await;

    let mut client = DeviceClient::connect(server.addr).await.unwrap();
    client.write(b"0123456789").await.unwrap();
    assert_eq!(client.read(3).await.unwrap().as_deref(), Some(&b"012"[..]));
    assert_eq!(client.read(100).await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clients_have_separate_buffers() {
    let server = start(2).await;

    let mut a = DeviceClient::connect(server.addr).await.unwrap();
    let mut b = DeviceClient::connect(server.addr).await.unwrap();
    assert_ne!(a.session_id(), b.session_id());

    a.write(b"from a").await.unwrap();
    b.write(b"from b").await.unwrap();

    assert_eq!(b.read(64).await.unwrap().as_deref(), Some(&b"from b"[..]));
    assert_eq!(a.read(64).await.unwrap().as_deref(), Some(&b"from a"[..]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_returns_stats() {
    let server = start(3).await;

    let client = DeviceClient::connect(server.addr).await.unwrap();
    client.close().await.unwrap();
    wait_for_available(&server.broker, 3).await;

    server.shutdown.send(()).unwrap();
    let stats = server.task.await.unwrap().unwrap();
    assert_eq!(stats.total_opens, 1);
    assert_eq!(stats.open_sessions, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unbounded_client_message_limit_still_reads() {
    let server = start(1).await;

    let mut client = DeviceClient::connect(server.addr).await.unwrap();
    client.set_max_message_len(usize::MAX);
    assert_eq!(client.write(b"hi").await.unwrap(), 2);
    assert_eq!(client.read(10).await.unwrap().as_deref(), Some(&b"hi"[..]));
    client.close().await.unwrap();
}

#[tokio::test]
async fn bind_rejects_invalid_config() {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        broker: BrokerConfig::with_capacity(0),
        ..Default::default()
    };
    assert!(Server::bind(config).await.is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Whatever a client writes, the next read returns it (truncated to the
    /// read length) and the one after that finds nothing.
    #[test]
    fn prop_write_read_over_tcp(
        data in prop::collection::vec(any::<u8>(), 0..512),
        read_len in 0..600u32,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let server = start(1).await;
            let mut client = DeviceClient::connect(server.addr).await.unwrap();

            client.write(&data).await.unwrap();
            let expected = &data[..data.len().min(read_len as usize)];
            let got = client.read(read_len).await.unwrap().unwrap();
            assert_eq!(&got[..], expected);
            assert_eq!(client.read(read_len).await.unwrap(), None);
        });
    }
}
