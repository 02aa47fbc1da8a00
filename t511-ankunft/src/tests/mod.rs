//! Whole-cycle tests: scheduler, fetch, parse, classify and board together,
//! with a hand-cranked clock and scripted responses.

use chrono::{DateTime, TimeZone, Utc};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use t511_util::http::HttpServer;

use crate::board::{ArrivalRecord, Board};
use crate::buffer::ResponseBuffer;
use crate::config::{ColorValue, Config, DurationValue, Settings, SizeValue};
use crate::errors::{DependencyError, FetchError};
use crate::fetch::{Fetcher, NetworkGate};
use crate::scheduler::{Clock, RefreshScheduler};
use crate::server::App;
use crate::sources::SourceId;

static WAIT: Duration = Duration::from_secs(5);

struct ManualClock(Mutex<Option<DateTime<Utc>>>);

impl ManualClock {
    fn at(t: DateTime<Utc>) -> Arc<Self> {
        Arc::new(ManualClock(Mutex::new(Some(t))))
    }
    fn unset() -> Arc<Self> {
        Arc::new(ManualClock(Mutex::new(None)))
    }
    fn advance(&self, d: chrono::Duration) {
        let mut t = self.0.lock().unwrap();
        *t = t.map(|t| t + d);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        *self.0.lock().unwrap()
    }
}

struct Gate(Mutex<bool>);

impl NetworkGate for Gate {
    fn is_ready(&self) -> bool {
        *self.0.lock().unwrap()
    }
}

#[derive(Clone)]
enum Script {
    Body(Vec<u8>),
    TimedOut,
    Status(u16),
    /// Waits for a message before answering with the body.
    Held(Receiver<()>, Vec<u8>),
}

#[derive(Default)]
struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetcher {
    fn set(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.into(), script);
    }
    fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, url: &str, buf: &mut ResponseBuffer) -> Result<(), FetchError> {
        *self.calls.lock().unwrap().entry(url.into()).or_insert(0) += 1;
        let script = self.scripts.lock().unwrap().get(url).cloned();
        match script {
            Some(Script::Body(b)) => buf.fill_from(&b[..]).map(|_| ()),
            Some(Script::Held(rx, b)) => {
                let _ = rx.recv();
                buf.fill_from(&b[..]).map(|_| ())
            },
            Some(Script::Status(code)) => Err(FetchError::StatusCode(code)),
            Some(Script::TimedOut) | None => {
                Err(FetchError::Io(io::Error::new(io::ErrorKind::TimedOut, "operation timed out")))
            }
        }
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 8, 11, 19, 0, 0).unwrap()
}

fn payload(visits: &[(&str, &str, &str)]) -> Vec<u8> {
    let visits: Vec<String> = visits.iter()
        .map(|(line, dir, eta)| format!(r#"{{"RecordedAtTime":"2019-08-11T18:59:30Z","MonitoringRef":"13915","MonitoredVehicleJourney":{{"LineRef":"{}","DirectionRef":"{}","MonitoredCall":{{"ExpectedArrivalTime":"{}"}}}}}}"#, line, dir, eta))
        .collect();
    format!(r#"{{"ServiceDelivery":{{"StopMonitoringDelivery":{{"ResponseTimestamp":"2019-08-11T19:00:00Z","MonitoredStopVisit":[{}]}}}}}}"#,
            visits.join(","))
        .into_bytes()
}

fn config(sources: &[&str]) -> Config {
    let mut cfg = Config {
        sources: sources.iter().map(|s| s.to_string()).collect(),
        refresh_interval: Some(DurationValue::Text("5min".into())),
        max_response_buffer_size: Some(SizeValue::Bytes(1024)),
        tick_ms: Some(1000),
        ..Default::default()
    };
    cfg.colors.insert("red".into(), ColorValue::Text("#ff0000".into()));
    cfg.colors.insert("blue".into(), ColorValue::Text("#0000ff".into()));
    cfg.colors.insert("gray".into(), ColorValue::Rgb([128, 128, 128]));
    cfg.route_colors.insert("38".into(), "red".into());
    cfg.direction_colors.insert("OB".into(), "blue".into());
    cfg
}

struct Harness {
    settings: Settings,
    clock: Arc<ManualClock>,
    gate: Arc<Gate>,
    fetcher: Arc<ScriptedFetcher>,
    board: Arc<RwLock<Board>>,
    sched: RefreshScheduler,
}

impl Harness {
    fn new(cfg: Config) -> Self {
        let settings = Settings::from_raw(cfg).unwrap();
        let clock = ManualClock::at(t0());
        let gate = Arc::new(Gate(Mutex::new(true)));
        let fetcher = Arc::new(ScriptedFetcher::default());
        let board = Arc::new(RwLock::new(Board::new(settings.sources.len())));
        let sched = RefreshScheduler::new(&settings, clock.clone(), gate.clone(), fetcher.clone(), board.clone()).unwrap();
        Self { settings, clock, gate, fetcher, board, sched }
    }
    /// Runs one tick and waits for whatever it dispatched.
    fn cycle(&mut self) -> usize {
        let n = self.sched.tick();
        self.sched.await_idle(WAIT);
        n
    }
    fn records(&self) -> Vec<ArrivalRecord> {
        self.board.read().unwrap().ordered().into_iter().cloned().collect()
    }
    fn hex(&self, rec: &ArrivalRecord) -> String {
        self.settings.palette.hex(rec.color)
    }
}

#[test]
fn one_source_times_out() {
    let mut h = Harness::new(config(&["A", "B"]));
    let body = payload(&[("38", "IB", "2019-08-11T19:12:00Z")]);
    assert!(body.len() < 1024);
    h.fetcher.set("A", Script::Body(body));
    h.fetcher.set("B", Script::TimedOut);
    assert_eq!(h.cycle(), 2);
    let recs = h.records();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].route, "38");
    assert_eq!(recs[0].source, SourceId(0));
    assert_eq!(h.hex(&recs[0]), "#ff0000");
    let board = h.board.read().unwrap();
    assert!(board.source_records(SourceId(1)).is_empty());
    assert!(board.last_updated(SourceId(1)).is_some());
}

#[test]
fn unmatched_route_gets_default() {
    let mut cfg = config(&["A"]);
    cfg.default_route_color = Some("gray".into());
    let mut h = Harness::new(cfg);
    h.fetcher.set("A", Script::Body(payload(&[("99", "IB", "2019-08-11T19:12:00Z")])));
    h.cycle();
    let recs = h.records();
    assert_eq!(recs.len(), 1);
    assert_eq!(h.hex(&recs[0]), "#808080");
}

#[test]
fn unmatched_route_without_default_gets_fallback() {
    let mut h = Harness::new(config(&["A"]));
    h.fetcher.set("A", Script::Body(payload(&[("99", "IB", "2019-08-11T19:12:00Z")])));
    h.cycle();
    let recs = h.records();
    assert_eq!(recs.len(), 1);
    assert_eq!(h.hex(&recs[0]), "#ffffff");
}

#[test]
fn route_beats_direction() {
    let mut h = Harness::new(config(&["A"]));
    h.fetcher.set("A", Script::Body(payload(&[
        ("38", "OB", "2019-08-11T19:12:00Z"),
        ("5", "OB", "2019-08-11T19:14:00Z"),
    ])));
    h.cycle();
    let recs = h.records();
    assert_eq!(h.hex(&recs[0]), "#ff0000");
    assert_eq!(h.hex(&recs[1]), "#0000ff");
}

#[test]
fn oversize_payload_yields_nothing() {
    let mut cfg = config(&["A"]);
    cfg.max_response_buffer_size = Some(SizeValue::Bytes(400));
    let mut h = Harness::new(cfg);
    let small = payload(&[("38", "IB", "2019-08-11T19:12:00Z")]);
    assert!(small.len() <= 400);
    h.fetcher.set("A", Script::Body(small));
    h.cycle();
    assert_eq!(h.records().len(), 1);

    let big = payload(&[
        ("38", "IB", "2019-08-11T19:12:00Z"),
        ("38", "IB", "2019-08-11T19:22:00Z"),
        ("38", "IB", "2019-08-11T19:32:00Z"),
    ]);
    assert!(big.len() > 400);
    h.fetcher.set("A", Script::Body(big));
    h.clock.advance(chrono::Duration::minutes(5));
    assert_eq!(h.cycle(), 1);
    assert!(h.records().is_empty());
}

#[test]
fn malformed_payload_isolated() {
    let mut h = Harness::new(config(&["A", "B", "C"]));
    h.fetcher.set("A", Script::Body(b"<html>oops</html>".to_vec()));
    h.fetcher.set("B", Script::Body(payload(&[("N", "OB", "2019-08-11T19:03:00Z")])));
    h.fetcher.set("C", Script::Status(503));
    h.cycle();
    let recs = h.records();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].source, SourceId(1));
}

#[test]
fn one_fetch_per_source_per_interval() {
    let mut h = Harness::new(config(&["A", "B"]));
    let body = payload(&[("38", "IB", "2019-08-11T19:12:00Z")]);
    h.fetcher.set("A", Script::Body(body.clone()));
    h.fetcher.set("B", Script::Body(body));
    // Fifteen minutes of one-second ticks.
    for _ in 0..900 {
        h.cycle();
        h.clock.advance(chrono::Duration::seconds(1));
    }
    assert_eq!(h.fetcher.calls("A"), 3);
    assert_eq!(h.fetcher.calls("B"), 3);
}

#[test]
fn busy_source_not_refetched() {
    let mut h = Harness::new(config(&["A", "B"]));
    let (release, held): (Sender<()>, Receiver<()>) = crossbeam_channel::unbounded();
    let body = payload(&[("38", "IB", "2019-08-11T19:12:00Z")]);
    h.fetcher.set("A", Script::Held(held, body.clone()));
    h.fetcher.set("B", Script::Body(body));
    assert_eq!(h.sched.tick(), 2);
    h.clock.advance(chrono::Duration::minutes(5));
    // A is still waiting on its first response.
    let deadline = Instant::now() + WAIT;
    while h.sched.in_flight() > 1 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(h.sched.tick(), 1);
    release.send(()).unwrap();
    h.sched.await_idle(WAIT);
    assert_eq!(h.fetcher.calls("A"), 1);
    assert_eq!(h.fetcher.calls("B"), 2);
    assert_eq!(h.records().len(), 2);
}

#[test]
fn identical_payloads_identical_records() {
    let mut h = Harness::new(config(&["A", "B"]));
    let body = payload(&[
        ("38", "IB", "2019-08-11T19:12:00Z"),
        ("N", "OB", "2019-08-11T19:05:00Z"),
    ]);
    h.fetcher.set("A", Script::Body(body.clone()));
    h.fetcher.set("B", Script::Body(body));
    h.cycle();
    let first = h.records();
    h.clock.advance(chrono::Duration::minutes(5));
    h.cycle();
    let second = h.records();
    assert_eq!(first.len(), 4);
    assert_eq!(first, second);
}

#[test]
fn network_not_ready_skips_cycle() {
    let mut h = Harness::new(config(&["A"]));
    h.fetcher.set("A", Script::Body(payload(&[("38", "IB", "2019-08-11T19:12:00Z")])));
    *h.gate.0.lock().unwrap() = false;
    assert_eq!(h.cycle(), 0);
    assert_eq!(h.fetcher.calls("A"), 0);
    *h.gate.0.lock().unwrap() = true;
    h.clock.advance(chrono::Duration::minutes(5));
    assert_eq!(h.cycle(), 1);
    assert_eq!(h.records().len(), 1);
}

#[test]
fn max_eta_applied() {
    let mut cfg = config(&["A"]);
    cfg.max_eta = Some(DurationValue::Minutes(30));
    let mut h = Harness::new(cfg);
    h.fetcher.set("A", Script::Body(payload(&[
        ("38", "IB", "2019-08-11T19:12:00Z"),
        ("38", "IB", "2019-08-11T19:45:00Z"),
    ])));
    h.cycle();
    assert_eq!(h.records().len(), 1);
}

#[test]
fn missing_time_source_is_fatal() {
    let settings = Settings::from_raw(config(&["A"])).unwrap();
    let board = Arc::new(RwLock::new(Board::new(1)));
    let ret = RefreshScheduler::new(&settings, ManualClock::unset(), Arc::new(Gate(Mutex::new(true))),
                                    Arc::new(ScriptedFetcher::default()), board);
    match ret {
        Err(e) => match e.downcast_ref::<DependencyError>() {
            Some(DependencyError::TimeSource) => {},
            _ => panic!("unexpected error: {}", e)
        },
        Ok(_) => panic!("scheduler started without a clock")
    }
}

#[test]
fn running_scheduler_and_manual_refresh() {
    let h = Harness::new(config(&["A"]));
    h.fetcher.set("A", Script::Body(payload(&[("38", "IB", "2019-08-11T19:12:00Z")])));
    let fetcher = h.fetcher.clone();
    let board = h.board.clone();
    let handle = h.sched.run().unwrap();
    let deadline = Instant::now() + WAIT;
    while board.read().unwrap().updates() < 1 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(fetcher.calls("A"), 1);
    assert_eq!(board.read().unwrap().ordered().len(), 1);
    // The clock never moves, so only manual refreshes fetch again.
    let deadline = Instant::now() + WAIT;
    while fetcher.calls("A") < 2 && Instant::now() < deadline {
        handle.refresh_now();
        thread::sleep(Duration::from_millis(50));
    }
    assert!(fetcher.calls("A") >= 2);
    handle.shutdown();
}

#[test]
fn http_views() {
    use rouille::Request;

    let mut cfg = config(&["A", "B"]);
    cfg.colors.insert("sep".into(), ColorValue::Text("#101010".into()));
    cfg.separator_color = Some("sep".into());
    let mut h = Harness::new(cfg);
    h.fetcher.set("A", Script::Body(payload(&[("38", "IB", "2019-08-11T19:12:00Z")])));
    h.fetcher.set("B", Script::Body(payload(&[("N", "OB", "2019-08-11T20:30:00Z")])));
    h.cycle();
    let app = App::new(&h.settings, h.board.clone(), h.clock.clone(), h.sched.trigger());

    let arrivals = app.arrivals();
    assert_eq!(arrivals.separator_color, "#101010");
    assert_eq!(arrivals.sources.len(), 2);
    let r = &arrivals.sources[0].records[0];
    assert_eq!(r.route, "38");
    assert_eq!(r.minutes, 12);
    assert_eq!(r.color, "#ff0000");
    assert_eq!(arrivals.sources[1].records[0].color, "#0000ff");

    let active = app.active(None);
    assert_eq!(active.within_mins, 60);
    assert_eq!(active.routes, vec!["38".to_string()]);
    assert_eq!(app.active(Some(120)).count, 2);

    let ok = app.process_request(&Request::fake_http("GET", "/routes/38", vec![], vec![]));
    assert_eq!(ok.status_code, 200);
    let missing = app.process_request(&Request::fake_http("GET", "/routes/99", vec![], vec![]));
    assert_eq!(missing.status_code, 404);
    let bad = app.process_request(&Request::fake_http("GET", "/active?within_mins=soon", vec![], vec![]));
    assert_eq!(bad.status_code, 400);
    let refresh = app.process_request(&Request::fake_http("POST", "/refresh", vec![], vec![]));
    assert_eq!(refresh.status_code, 202);
}
