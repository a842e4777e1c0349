//! NewReno tests: slow start, congestion avoidance and loss recovery.

use std::time::{Duration, Instant};

use quic_cc::congestion::NewReno;
use quic_cc::{AckEvent, CongestionConfig, CongestionController, LossEvent, Phase};

const MSS: u64 = 1200;
const RTT: Duration = Duration::from_millis(50);

fn ack(bytes: u64, sent: Instant, at: Instant) -> AckEvent {
    AckEvent {
        acked_bytes: bytes,
        largest_acked_sent_time: sent,
        ack_time: at,
    }
}

fn loss(sent: Instant, at: Instant) -> LossEvent {
    LossEvent {
        lost_bytes: MSS,
        largest_lost_sent_time: sent,
        loss_time: at,
        persistent_congestion: false,
    }
}

#[test]
fn initial_state() {
    let r = NewReno::new(&CongestionConfig::default());
    assert_eq!(r.congestion_window(), 10 * MSS);
    assert_eq!(r.phase(), Phase::SlowStart);
    assert_eq!(r.writable_bytes(0), 10 * MSS);
}

#[test]
fn slow_start_doubles_per_rtt() {
    let mut r = NewReno::new(&CongestionConfig::default());
    let t0 = Instant::now();
    let initial = r.congestion_window();

    // One RTT: every segment of the window acknowledged.
    for _ in 0..initial / MSS {
        r.on_packets_acked(&ack(MSS, t0, t0 + RTT));
    }
    assert_eq!(r.congestion_window(), 2 * initial);
}

#[test]
fn loss_in_slow_start_halves_and_enters_avoidance() {
    let mut r = NewReno::new(&CongestionConfig::default());
    let t0 = Instant::now();
    let before = r.congestion_window();

    r.on_packet_loss(&loss(t0, t0 + RTT));
    assert_eq!(r.ssthresh(), Some(before / 2));
    assert_eq!(r.congestion_window(), before / 2);
    assert_eq!(r.phase(), Phase::CongestionAvoidance);
}

#[test]
fn single_reduction_per_round_trip() {
    let mut r = NewReno::new(&CongestionConfig::default());
    let t0 = Instant::now();
    r.on_packets_acked(&ack(30 * MSS, t0, t0 + RTT));
    let t1 = t0 + 2 * RTT;

    r.on_packet_loss(&loss(t0 + RTT, t1));
    let after_first = r.congestion_window();
    assert_eq!(after_first, 20 * MSS);

    // More losses from the same flight, reported later in the round.
    r.on_packet_loss(&loss(t0 + RTT + Duration::from_millis(5), t1 + Duration::from_millis(2)));
    r.on_packet_loss(&loss(t1, t1 + Duration::from_millis(4)));
    assert_eq!(r.congestion_window(), after_first);

    // A packet sent after recovery started is acked, then one sent later still is lost.
    let t2 = t1 + Duration::from_millis(10);
    r.on_packets_acked(&ack(MSS, t2, t2 + RTT));
    r.on_packet_loss(&loss(t2 + RTT, t2 + 2 * RTT));
    assert_eq!(r.congestion_window(), after_first / 2);
}

#[test]
fn congestion_avoidance_grows_one_mss_per_rtt() {
    let mut r = NewReno::new(&CongestionConfig::default());
    let t0 = Instant::now();
    r.on_packet_loss(&loss(t0, t0));
    let start = r.congestion_window();

    let mut t = t0;
    for round in 1..=5u64 {
        let cwnd = r.congestion_window();
        t += RTT;
        for _ in 0..cwnd / MSS {
            r.on_packets_acked(&ack(MSS, t, t + RTT));
        }
        assert_eq!(r.congestion_window(), start + round * MSS);
    }
}

#[test]
fn twenty_full_window_acks_then_loss() {
    let cfg = CongestionConfig::default();
    let mut r = NewReno::new(&cfg);
    let mut t = Instant::now();

    for _ in 0..20 {
        let cwnd = r.congestion_window();
        r.on_packets_acked(&ack(cwnd, t, t + RTT));
        t += RTT;
    }
    let expected = (10 * MSS).saturating_mul(1 << 20).min(cfg.max_window);
    assert_eq!(r.phase(), Phase::SlowStart);
    assert_eq!(r.congestion_window(), expected);

    let prior = r.congestion_window();
    r.on_packet_loss(&loss(t, t + RTT));
    assert_eq!(r.congestion_window(), (prior / 2).max(cfg.min_window));
}

#[test]
fn twenty_full_window_acks_uncapped() {
    let mut cfg = CongestionConfig::default();
    cfg.max_window = 10 * MSS << 20;
    let mut r = NewReno::new(&cfg);
    let mut t = Instant::now();

    for _ in 0..20 {
        let cwnd = r.congestion_window();
        r.on_packets_acked(&ack(cwnd, t, t + RTT));
        t += RTT;
    }
    assert_eq!(r.congestion_window(), 10 * MSS << 20);
    assert_eq!(r.phase(), Phase::SlowStart);
}

#[test]
fn persistent_congestion_resets_to_floor() {
    let mut r = NewReno::new(&CongestionConfig::default());
    let t0 = Instant::now();
    r.on_packets_acked(&ack(50 * MSS, t0, t0 + RTT));
    r.on_packet_loss(&loss(t0, t0 + RTT));
    assert_eq!(r.phase(), Phase::CongestionAvoidance);

    r.on_persistent_congestion();
    assert_eq!(r.congestion_window(), 2 * MSS);
    assert_eq!(r.phase(), Phase::SlowStart);
}

#[test]
fn writable_bytes_tracks_in_flight() {
    let r = NewReno::new(&CongestionConfig::default());
    assert_eq!(r.writable_bytes(4 * MSS), 6 * MSS);
    assert_eq!(r.writable_bytes(10 * MSS), 0);
    // Stale send overshoot never authorizes more.
    assert_eq!(r.writable_bytes(11 * MSS), 0);
    assert_eq!(r.writable_bytes(11 * MSS), 0);
}

#[test]
fn out_of_order_timestamps_are_absorbed() {
    let mut r = NewReno::new(&CongestionConfig::default());
    let t0 = Instant::now();
    // Ack time before send time.
    r.on_packets_acked(&ack(MSS, t0 + RTT, t0));
    assert_eq!(r.congestion_window(), 11 * MSS);
    // Loss detected "before" the packet was sent.
    r.on_packet_loss(&loss(t0 + RTT, t0));
    assert_eq!(r.congestion_window(), (11 * MSS) / 2);
}
