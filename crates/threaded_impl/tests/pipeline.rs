use std::collections::VecDeque;
use std::io;
use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

use common::config::ReplayPolicy;
use common::packet::encode_yaw_pitch;
use common::pointer::RecordingSink;
use common::{Displacement, InjectionRecorder, PointerConfig, StopReason};
use threaded_impl::{Coordinator, DatagramSource};

fn loopback_config() -> PointerConfig {
    PointerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..PointerConfig::default()
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

struct Feed {
    socket: UdpSocket,
    target: std::net::SocketAddr,
}

impl Feed {
    fn new(coordinator: &Coordinator) -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").unwrap(),
            target: coordinator.local_addr().unwrap(),
        }
    }

    fn send(&self, yaw: f64, pitch: f64) {
        self.socket
            .send_to(&encode_yaw_pitch(yaw, pitch), self.target)
            .unwrap();
    }

    fn send_raw(&self, bytes: &[u8]) {
        self.socket.send_to(bytes, self.target).unwrap();
    }
}

#[test]
fn test_bootstrap_then_displacement() {
    let sink = RecordingSink::new();
    let coordinator = Coordinator::start(&loopback_config(), Box::new(sink.clone()), None).unwrap();
    let feed = Feed::new(&coordinator);
    let diagnostics = coordinator.diagnostics();

    feed.send(1.0, 1.0);
    assert!(wait_until(Duration::from_secs(1), || {
        diagnostics.snapshot().bootstrap_samples == 1
    }));
    assert_eq!(coordinator.cell().get(), Displacement::ZERO);
    assert_eq!(sink.count(), 0);

    feed.send(1.05, 1.5);
    assert!(wait_until(Duration::from_secs(1), || sink.count() > 0));
    assert_eq!(sink.displacements()[0], Displacement::new(0, 20));

    let report = coordinator.shutdown(StopReason::Interrupted);
    assert!(report.clean);
    assert_eq!(report.diagnostics.displacements_published, 1);
}

#[test]
fn test_malformed_packets_are_skipped() {
    let sink = RecordingSink::new();
    let coordinator = Coordinator::start(&loopback_config(), Box::new(sink.clone()), None).unwrap();
    let feed = Feed::new(&coordinator);
    let diagnostics = coordinator.diagnostics();

    feed.send(0.0, 0.0);
    feed.send_raw(&[0u8; 47]);
    feed.send_raw(&[0u8; 49]);
    feed.send(-1.0, 0.0);

    assert!(wait_until(Duration::from_secs(1), || sink.count() > 0));
    let snapshot = diagnostics.snapshot();
    assert_eq!(snapshot.malformed_packets, 2);
    assert_eq!(snapshot.packets_received, 4);
    // deltas are taken against the last valid sample
    assert_eq!(sink.displacements()[0], Displacement::new(40, 0));

    assert!(coordinator.shutdown(StopReason::Interrupted).clean);
}

#[test]
fn test_fast_producer_only_latest_value_is_applied() {
    let config = PointerConfig {
        update_rate_ms: 300,
        ..loopback_config()
    };
    let sink = RecordingSink::new();
    let coordinator = Coordinator::start(&config, Box::new(sink.clone()), None).unwrap();
    let feed = Feed::new(&coordinator);
    let diagnostics = coordinator.diagnostics();

    // pitch deltas 1, 2, 3, 4, 5 -> dy 40, 80, 120, 160, 200
    for pitch in [0.0, 1.0, 3.0, 6.0, 10.0, 15.0] {
        feed.send(0.0, pitch);
    }
    assert!(wait_until(Duration::from_secs(1), || {
        diagnostics.snapshot().displacements_published == 5
    }));
    assert!(wait_until(Duration::from_secs(2), || sink.count() >= 2));

    let report = coordinator.shutdown(StopReason::Interrupted);
    assert!(report.clean);

    let applied = sink.displacements();
    assert_eq!(applied[1], Displacement::new(0, 200));
    // at most one intermediate value could have been seen, by the very
    // first tick, before the burst finished
    let intermediates = applied
        .iter()
        .filter(|d| **d != Displacement::new(0, 200))
        .count();
    assert!(intermediates <= 1, "applied: {applied:?}");
}

#[test]
fn test_injections_respect_minimum_interval() {
    let config = PointerConfig {
        update_rate_ms: 20,
        ..loopback_config()
    };
    let recorder = InjectionRecorder::new();
    let sink = RecordingSink::new();
    let coordinator =
        Coordinator::start(&config, Box::new(sink.clone()), Some(recorder.clone())).unwrap();
    let feed = Feed::new(&coordinator);

    let mut yaw = 0.0;
    let started = Instant::now();
    while started.elapsed() < Duration::from_millis(250) {
        feed.send(yaw, 0.0);
        yaw += 0.5;
        thread::sleep(Duration::from_millis(1));
    }

    assert!(coordinator.shutdown(StopReason::Interrupted).clean);

    let records = recorder.get_records();
    assert!(records.len() >= 2, "expected several injections");
    for pair in records.windows(2) {
        let gap = pair[1].elapsed_us - pair[0].elapsed_us;
        assert!(gap >= 20_000, "injections {gap}us apart");
    }
}

#[test]
fn test_repeat_policy_redelivers_last_intent() {
    let config = PointerConfig {
        update_rate_ms: 20,
        ..loopback_config()
    };
    let sink = RecordingSink::new();
    let coordinator = Coordinator::start(&config, Box::new(sink.clone()), None).unwrap();
    let feed = Feed::new(&coordinator);

    feed.send(0.0, 0.0);
    feed.send(0.0, 1.0);
    thread::sleep(Duration::from_millis(200));
    assert!(coordinator.shutdown(StopReason::Interrupted).clean);

    let applied = sink.displacements();
    assert!(applied.len() >= 3, "applied: {applied:?}");
    assert!(applied.len() <= 11, "applied: {applied:?}");
    assert!(applied.iter().all(|d| *d == Displacement::new(0, 40)));
}

#[test]
fn test_consume_once_applies_a_single_time() {
    let config = PointerConfig {
        update_rate_ms: 20,
        replay: ReplayPolicy::ConsumeOnce,
        ..loopback_config()
    };
    let sink = RecordingSink::new();
    let coordinator = Coordinator::start(&config, Box::new(sink.clone()), None).unwrap();
    let feed = Feed::new(&coordinator);

    feed.send(0.0, 0.0);
    feed.send(0.0, 1.0);
    assert!(wait_until(Duration::from_secs(1), || sink.count() > 0));
    thread::sleep(Duration::from_millis(100));
    assert!(coordinator.shutdown(StopReason::Interrupted).clean);

    assert_eq!(sink.displacements(), vec![Displacement::new(0, 40)]);
}

#[test]
fn test_idle_shutdown_is_prompt() {
    let sink = RecordingSink::new();
    let coordinator = Coordinator::start(&loopback_config(), Box::new(sink), None).unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    let report = coordinator.shutdown(StopReason::Interrupted);
    assert!(report.clean);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_stop_handle_unblocks_run_until_stopped() {
    let sink = RecordingSink::new();
    let coordinator = Coordinator::start(&loopback_config(), Box::new(sink), None).unwrap();
    let stop = coordinator.stop_handle();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        stop.interrupt();
    });

    let report = coordinator.run_until_stopped();
    stopper.join().unwrap();
    assert_eq!(report.reason, StopReason::Interrupted);
    assert!(report.clean);
}

struct ScriptedSource {
    script: VecDeque<io::Result<Vec<u8>>>,
}

impl DatagramSource for ScriptedSource {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.script.pop_front() {
            Some(Ok(bytes)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Some(Err(e)) => Err(e),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "script exhausted")),
        }
    }
}

#[test]
fn test_transport_failure_stops_both_loops() {
    let source = ScriptedSource {
        script: VecDeque::from(vec![
            Ok(encode_yaw_pitch(1.0, 1.0).to_vec()),
            Err(io::Error::new(io::ErrorKind::Interrupted, "signal")),
            Ok(encode_yaw_pitch(1.05, 1.5).to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "socket gone")),
        ]),
    };
    let sink = RecordingSink::new();
    let coordinator = Coordinator::start_with_source(
        &PointerConfig::default(),
        source,
        None,
        Box::new(sink),
        None,
    )
    .unwrap();

    let started = Instant::now();
    let report = coordinator.run_until_stopped();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(
        report.reason,
        StopReason::TransportFailure("socket gone".to_string())
    );
    assert!(report.clean);
    assert_eq!(report.diagnostics.packets_received, 2);
    assert_eq!(report.diagnostics.displacements_published, 1);
}

#[test]
fn test_oversized_datagram_only_drops_that_packet() {
    let source = ScriptedSource {
        script: VecDeque::from(vec![
            Ok(encode_yaw_pitch(1.0, 1.0).to_vec()),
            Err(io::Error::from_raw_os_error(10040)),
            Ok(encode_yaw_pitch(1.05, 1.5).to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "socket gone")),
        ]),
    };
    let coordinator = Coordinator::start_with_source(
        &PointerConfig::default(),
        source,
        None,
        Box::new(RecordingSink::new()),
        None,
    )
    .unwrap();

    let report = coordinator.run_until_stopped();
    assert_eq!(
        report.reason,
        StopReason::TransportFailure("socket gone".to_string())
    );
    assert!(report.clean);
    assert_eq!(report.diagnostics.packets_received, 3);
    assert_eq!(report.diagnostics.malformed_packets, 1);
    assert_eq!(report.diagnostics.displacements_published, 1);
}
