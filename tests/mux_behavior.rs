//! Behavioral tests for the multiplexer core.
//!
//! Everything runs against `MockTransport` injected through `open_with`, so
//! no hardware is required. Covers the registry contract, per-port write
//! ordering, observer fan-out, backpressure, and failure handling.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serial_mux::{MockTransport, MuxConfig, MuxError, PortHealth, SerialMux};
use tokio::time::{sleep, timeout};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with tight timings so failure-path tests finish quickly.
fn fast_config() -> MuxConfig {
    MuxConfig {
        read_timeout_ms: 10,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        ..MuxConfig::default()
    }
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

#[tokio::test]
async fn second_open_on_same_index_fails_and_leaves_first_intact() {
    init_tracing();
    let mux = SerialMux::with_config(fast_config());
    let first = MockTransport::new("devA");
    let second = MockTransport::new("devB");

    mux.open_with(1, Box::new(first.clone())).unwrap();
    let err = mux.open_with(1, Box::new(second.clone())).unwrap_err();
    assert!(matches!(err, MuxError::AlreadyOpen(1)));
    assert_eq!(mux.device(1).as_deref(), Some("devA"));

    // The first port still transmits normally.
    mux.send(1, vec![0x01, 0x02]).await;
    wait_until("frame on devA", || !first.write_log().is_empty()).await;
    assert_eq!(first.write_log(), vec![vec![0x01, 0x02]]);
    assert!(second.write_log().is_empty());
}

#[tokio::test]
async fn frames_reach_the_transport_in_send_order() {
    init_tracing();
    let mux = SerialMux::with_config(fast_config());
    let transport = MockTransport::new("devA");
    mux.open_with(7, Box::new(transport.clone())).unwrap();

    let frames: Vec<Vec<u8>> = (0u8..5).map(|i| vec![i, i, i]).collect();
    for frame in &frames {
        mux.send(7, frame.clone()).await;
    }

    wait_until("all frames written", || transport.write_log().len() == frames.len()).await;
    assert_eq!(transport.write_log(), frames);
}

#[tokio::test]
async fn every_observer_receives_every_chunk() {
    init_tracing();
    let mux = SerialMux::with_config(fast_config());
    let transport = MockTransport::new("devA");

    let seen_a: Arc<Mutex<Vec<(u32, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_b: Arc<Mutex<Vec<(u32, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    for seen in [&seen_a, &seen_b] {
        let seen = Arc::clone(seen);
        mux.register_observer(move |index, data| {
            seen.lock().unwrap().push((index, data.to_vec()));
        });
    }

    mux.open_with(3, Box::new(transport.clone())).unwrap();
    transport.enqueue_read(&[0xAA, 0xBB]);

    wait_until("both observers notified", || {
        !seen_a.lock().unwrap().is_empty() && !seen_b.lock().unwrap().is_empty()
    })
    .await;
    assert_eq!(seen_a.lock().unwrap()[0], (3, vec![0xAA, 0xBB]));
    assert_eq!(seen_b.lock().unwrap()[0], (3, vec![0xAA, 0xBB]));
}

#[tokio::test]
async fn observer_sees_chunks_from_one_port_in_read_order() {
    init_tracing();
    let mux = SerialMux::with_config(fast_config());
    let transport = MockTransport::new("devA");

    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        mux.register_observer(move |_, data| {
            seen.lock().unwrap().push(data.to_vec());
        });
    }
    mux.open_with(1, Box::new(transport.clone())).unwrap();

    // Enqueue the second chunk only after the first was delivered, so the
    // reader cannot coalesce them into one read.
    transport.enqueue_read(b"one");
    wait_until("first chunk seen", || seen.lock().unwrap().len() == 1).await;
    transport.enqueue_read(b"two");
    wait_until("second chunk seen", || seen.lock().unwrap().len() == 2).await;

    assert_eq!(*seen.lock().unwrap(), vec![b"one".to_vec(), b"two".to_vec()]);
}

#[tokio::test]
async fn send_to_unknown_index_is_a_silent_no_op() {
    init_tracing();
    let mux = SerialMux::with_config(fast_config());
    let transport = MockTransport::new("devA");
    mux.open_with(1, Box::new(transport.clone())).unwrap();

    mux.send(99, vec![0x00]).await;

    sleep(Duration::from_millis(50)).await;
    assert!(transport.write_log().is_empty());
}

#[tokio::test]
async fn full_outbound_queue_applies_backpressure() {
    init_tracing();
    let config = MuxConfig {
        queue_capacity: 1,
        ..fast_config()
    };
    let mux = SerialMux::with_config(config);
    let transport = MockTransport::new("devA");
    transport.hold_writes(true);
    mux.open_with(1, Box::new(transport.clone())).unwrap();

    // With writes held, the first frame parks in the writer and the second
    // fills the queue; the third must suspend.
    mux.send(1, b"A".to_vec()).await;
    mux.send(1, b"B".to_vec()).await;
    let blocked = timeout(Duration::from_millis(100), mux.send(1, b"C".to_vec())).await;
    assert!(blocked.is_err(), "third send should block on a full queue");

    transport.hold_writes(false);
    wait_until("held frames flushed", || transport.write_log().len() == 2).await;
    assert_eq!(transport.write_log(), vec![b"A".to_vec(), b"B".to_vec()]);

    // The queue has space again.
    mux.send(1, b"D".to_vec()).await;
    wait_until("post-release frame written", || transport.write_log().len() == 3).await;
}

#[tokio::test]
async fn writer_faults_after_repeated_failures_and_sends_stay_silent() {
    init_tracing();
    let config = MuxConfig {
        max_consecutive_errors: 2,
        ..fast_config()
    };
    let mux = SerialMux::with_config(config);
    let transport = MockTransport::new("devA");
    transport.fail_writes(10);
    mux.open_with(1, Box::new(transport.clone())).unwrap();

    mux.send(1, b"doomed".to_vec()).await;
    wait_until("writer faulted", || {
        mux.health(1).is_some_and(|h| !h.writer_alive)
    })
    .await;

    // Later sends still complete normally but nothing reaches the device.
    mux.send(1, b"after".to_vec()).await;
    sleep(Duration::from_millis(50)).await;
    assert!(transport.write_log().is_empty());

    // The reader side is unaffected.
    assert_eq!(
        mux.health(1),
        Some(PortHealth {
            reader_alive: true,
            writer_alive: false,
        })
    );
}

#[tokio::test]
async fn reader_survives_transient_failures() {
    init_tracing();
    let mux = SerialMux::with_config(fast_config());
    let transport = MockTransport::new("devA");
    transport.fail_reads(3);
    transport.enqueue_read(b"recovered");

    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        mux.register_observer(move |_, data| {
            seen.lock().unwrap().push(data.to_vec());
        });
    }
    mux.open_with(1, Box::new(transport)).unwrap();

    wait_until("chunk delivered after read failures", || {
        !seen.lock().unwrap().is_empty()
    })
    .await;
    assert_eq!(seen.lock().unwrap()[0], b"recovered".to_vec());
    assert!(mux.health(1).is_some_and(|h| h.reader_alive));
}

#[tokio::test]
async fn panicking_observer_does_not_affect_peers_or_the_port() {
    init_tracing();
    let mux = SerialMux::with_config(fast_config());
    let transport = MockTransport::new("devA");

    // First observer panics on every chunk; it must only take down its own
    // dispatch task.
    mux.register_observer(|_, _| panic!("observer bug"));

    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        mux.register_observer(move |_, data| {
            seen.lock().unwrap().push(data.to_vec());
        });
    }
    mux.open_with(1, Box::new(transport.clone())).unwrap();

    transport.enqueue_read(b"first");
    wait_until("peer saw first chunk", || seen.lock().unwrap().len() == 1).await;
    transport.enqueue_read(b"second");
    wait_until("peer saw second chunk", || seen.lock().unwrap().len() == 2).await;

    assert_eq!(*seen.lock().unwrap(), vec![b"first".to_vec(), b"second".to_vec()]);
    assert!(mux.health(1).is_some_and(|h| h.reader_alive));
}

#[tokio::test]
async fn zero_queue_capacity_is_clamped_not_a_panic() {
    init_tracing();
    let config = MuxConfig {
        queue_capacity: 0,
        observer_queue_capacity: 0,
        ..fast_config()
    };
    let mux = SerialMux::with_config(config);
    let transport = MockTransport::new("devA");

    mux.register_observer(|_, _| {});
    mux.open_with(1, Box::new(transport.clone())).unwrap();
    mux.send(1, b"ok".to_vec()).await;

    wait_until("frame written", || !transport.write_log().is_empty()).await;
    assert_eq!(transport.write_log(), vec![b"ok".to_vec()]);
}

#[tokio::test]
async fn read_failure_streak_is_broken_by_an_idle_line() {
    init_tracing();
    let config = MuxConfig {
        max_consecutive_errors: 2,
        ..fast_config()
    };
    let mux = SerialMux::with_config(config);
    let transport = MockTransport::new("devA");
    transport.fail_reads(1);

    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        mux.register_observer(move |_, data| {
            seen.lock().unwrap().push(data.to_vec());
        });
    }
    mux.open_with(1, Box::new(transport.clone())).unwrap();

    // Let several idle timeouts pass after the first failure, then fail
    // again: two errors separated by an idle line are not consecutive and
    // must not spend the two-failure budget.
    sleep(Duration::from_millis(100)).await;
    transport.fail_reads(1);
    sleep(Duration::from_millis(100)).await;

    transport.enqueue_read(b"alive");
    wait_until("chunk after split failures", || !seen.lock().unwrap().is_empty()).await;
    assert!(mux.health(1).is_some_and(|h| h.reader_alive));
}

#[tokio::test]
async fn managers_are_independent() {
    init_tracing();
    let mux_a = SerialMux::with_config(fast_config());
    let mux_b = SerialMux::with_config(fast_config());

    mux_a
        .open_with(1, Box::new(MockTransport::new("devA")))
        .unwrap();
    // Same index on a different manager is fine.
    mux_b
        .open_with(1, Box::new(MockTransport::new("devB")))
        .unwrap();

    assert_eq!(mux_a.device(1).as_deref(), Some("devA"));
    assert_eq!(mux_b.device(1).as_deref(), Some("devB"));
}

#[tokio::test]
async fn port_listing_and_health() {
    init_tracing();
    let mux = SerialMux::with_config(fast_config());
    mux.open_with(4, Box::new(MockTransport::new("devA"))).unwrap();
    mux.open_with(2, Box::new(MockTransport::new("devB"))).unwrap();

    assert_eq!(mux.indices(), vec![2, 4]);
    assert_eq!(
        mux.health(4),
        Some(PortHealth {
            reader_alive: true,
            writer_alive: true,
        })
    );
    assert_eq!(mux.health(9), None);
}

#[tokio::test]
async fn shutdown_unregisters_ports_and_silences_sends() {
    init_tracing();
    let mux = SerialMux::with_config(fast_config());
    let transport = MockTransport::new("devA");
    mux.open_with(1, Box::new(transport.clone())).unwrap();

    mux.shutdown();
    assert!(mux.indices().is_empty());
    assert_eq!(mux.health(1), None);

    // Fire-and-forget contract holds after shutdown too.
    mux.send(1, b"late".to_vec()).await;
    sleep(Duration::from_millis(50)).await;
    assert!(transport.write_log().is_empty());

    // No new ports can be registered on a shut-down mux.
    let err = mux
        .open_with(2, Box::new(MockTransport::new("devB")))
        .unwrap_err();
    assert!(matches!(err, MuxError::ShutDown));
    assert!(mux.indices().is_empty());
}
