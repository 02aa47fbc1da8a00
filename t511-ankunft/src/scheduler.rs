//! Background refresh scheduling.
//!
//! One scheduler thread decides when a refresh cycle is due and hands a job
//! to every source's worker. Each worker thread owns its source's response
//! buffer, fetches, parses and classifies, then sends the outcome back; the
//! scheduler thread is the only thing that writes to the board.

use chrono::{DateTime, Utc};
use crossbeam_channel::{self, Receiver, Sender, select};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use log::*;

use crate::board::{build_records, ArrivalRecord, Board};
use crate::buffer::ResponseBuffer;
use crate::classify::Classifier;
use crate::config::Settings;
use crate::errors::{CycleError, DependencyError, Result};
use crate::fetch::{Fetcher, NetworkGate};
use crate::sources::{Source, SourceId, SourceRegistry};

/// Source of wall-clock time.
pub trait Clock: Send + Sync + 'static {
    /// The current time, or `None` if the clock isn't set yet.
    fn now(&self) -> Option<DateTime<Utc>>;
}

/// The system clock, which is always set.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        Some(Utc::now())
    }
}

/// Decides when refresh cycles are due.
///
/// The first poll is always due. After that, cycles are due at
/// `first + k * interval`; a poll that arrives late fires once and skips
/// whatever slots it missed.
#[derive(Clone, Debug)]
pub struct Cadence {
    interval_ms: i64,
    next_due: Option<i64>,
}

impl Cadence {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: (interval.as_millis() as i64).max(1),
            next_due: None
        }
    }
    pub fn poll(&mut self, now_ms: i64) -> bool {
        match self.next_due {
            None => {
                self.next_due = Some(now_ms + self.interval_ms);
                true
            },
            Some(due) if now_ms >= due => {
                let missed = (now_ms - due) / self.interval_ms;
                if missed > 0 {
                    warn!("Skipping {} missed refresh slot(s)", missed);
                }
                self.next_due = Some(due + (missed + 1) * self.interval_ms);
                true
            },
            Some(_) => false
        }
    }
    /// Timestamp (ms) of the next due cycle, if any cycle has run.
    pub fn next_due(&self) -> Option<i64> {
        self.next_due
    }
}

/// Outcome of one source's part of a refresh cycle.
#[derive(Debug)]
pub struct CycleResult {
    pub source: SourceId,
    pub cycle: u64,
    pub outcome: Result<Vec<ArrivalRecord>, CycleError>,
}

enum Control {
    Refresh,
    Shutdown,
}

/// Requests refreshes from a running scheduler.
#[derive(Clone)]
pub struct RefreshTrigger(Sender<Control>);

impl RefreshTrigger {
    /// Asks for a refresh cycle at the next tick. Sources still busy with
    /// an earlier fetch are skipped, as usual.
    pub fn request(&self) {
        let _ = self.0.send(Control::Refresh);
    }
}

struct SourceWorker {
    source: Source,
    buf: ResponseBuffer,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    classifier: Arc<Classifier>,
    max_eta: Option<chrono::Duration>,
    in_flight: Arc<AtomicBool>,
    jobs: Receiver<u64>,
    results: Sender<CycleResult>,
}

impl SourceWorker {
    fn refresh(&mut self) -> Result<Vec<ArrivalRecord>, CycleError> {
        debug!("Fetching {}", self.source);
        let ret = self.fetcher.fetch(&self.source.url, &mut self.buf);
        if let Err(e) = ret {
            self.buf.clear();
            return Err(e.into());
        }
        debug!("{}: {} bytes", self.source, self.buf.len());
        let now = self.clock.now().ok_or(CycleError::ClockUnavailable)?;
        let ret = build_records(self.source.id, self.buf.as_slice(), now, self.max_eta, &self.classifier);
        self.buf.clear();
        Ok(ret?)
    }
    fn run(mut self) {
        for cycle in self.jobs.clone().iter() {
            let outcome = self.refresh();
            let res = CycleResult {
                source: self.source.id,
                cycle,
                outcome
            };
            let sent = self.results.send(res);
            self.in_flight.store(false, Ordering::Release);
            if sent.is_err() {
                debug!("Scheduler gone; dropping result for {}", self.source);
                break;
            }
        }
        debug!("Worker for {} exiting", self.source);
    }
}

struct WorkerHandle {
    id: SourceId,
    in_flight: Arc<AtomicBool>,
    jobs: Sender<u64>,
}

/// Runs refresh cycles across all sources.
pub struct RefreshScheduler {
    sources: SourceRegistry,
    clock: Arc<dyn Clock>,
    gate: Arc<dyn NetworkGate>,
    board: Arc<RwLock<Board>>,
    cadence: Cadence,
    tick: Duration,
    cycle: u64,
    forced: bool,
    workers: Vec<WorkerHandle>,
    results: Receiver<CycleResult>,
    control_tx: Sender<Control>,
    control_rx: Receiver<Control>,
}

impl RefreshScheduler {
    /// Sets up the scheduler and spawns one worker per source.
    ///
    /// Fails if the clock can't tell the time.
    pub fn new(settings: &Settings, clock: Arc<dyn Clock>, gate: Arc<dyn NetworkGate>, fetcher: Arc<dyn Fetcher>, board: Arc<RwLock<Board>>) -> Result<Self> {
        let now = clock.now().ok_or(DependencyError::TimeSource)?;
        info!("Time source OK (now: {})", now);
        let max_eta = match settings.max_eta {
            Some(d) => Some(chrono::Duration::from_std(d)?),
            None => None
        };
        let (results_tx, results) = crossbeam_channel::unbounded();
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let mut workers = Vec::with_capacity(settings.sources.len());
        for src in settings.sources.iter() {
            let (jobs_tx, jobs) = crossbeam_channel::bounded(1);
            let in_flight = Arc::new(AtomicBool::new(false));
            let worker = SourceWorker {
                source: src.clone(),
                buf: ResponseBuffer::with_limit(settings.max_response_buffer_size),
                fetcher: fetcher.clone(),
                clock: clock.clone(),
                classifier: settings.classifier.clone(),
                max_eta,
                in_flight: in_flight.clone(),
                jobs,
                results: results_tx.clone()
            };
            thread::Builder::new()
                .name(format!("t511-ankunft: source #{}", src.id.0))
                .spawn(move || worker.run())?;
            workers.push(WorkerHandle {
                id: src.id,
                in_flight,
                jobs: jobs_tx
            });
        }
        Ok(Self {
            sources: settings.sources.clone(),
            clock, gate, board,
            cadence: Cadence::new(settings.refresh_interval),
            tick: settings.tick,
            cycle: 0,
            forced: false,
            workers,
            results,
            control_tx,
            control_rx
        })
    }
    pub fn trigger(&self) -> RefreshTrigger {
        RefreshTrigger(self.control_tx.clone())
    }
    /// Number of sources with a fetch outstanding.
    pub fn in_flight(&self) -> usize {
        self.workers.iter()
            .filter(|w| w.in_flight.load(Ordering::Acquire))
            .count()
    }
    /// Starts a refresh cycle if one is due, returning how many fetches
    /// were dispatched.
    pub fn tick(&mut self) -> usize {
        let now = match self.clock.now() {
            Some(n) => n,
            None => {
                warn!("Time source unavailable; not refreshing");
                return 0;
            }
        };
        let due = self.cadence.poll(now.timestamp_millis());
        let forced = std::mem::replace(&mut self.forced, false);
        if !due && !forced {
            return 0;
        }
        if !self.gate.is_ready() {
            warn!("Network not ready; skipping refresh cycle");
            return 0;
        }
        self.cycle += 1;
        info!("Refreshing arrivals (cycle #{}{})", self.cycle, if forced && !due { ", forced" } else { "" });
        let mut dispatched = 0;
        for w in self.workers.iter() {
            if w.in_flight.swap(true, Ordering::AcqRel) {
                warn!("Source #{} still busy with an earlier fetch; skipping", w.id.0);
                continue;
            }
            if w.jobs.try_send(self.cycle).is_err() {
                w.in_flight.store(false, Ordering::Release);
                error!("Worker for source #{} is gone", w.id.0);
                continue;
            }
            dispatched += 1;
        }
        dispatched
    }
    /// Writes a worker's outcome to the board. Failed sources end up empty.
    pub fn apply(&mut self, res: CycleResult) {
        let now = self.clock.now().unwrap_or_else(Utc::now);
        let src = match self.sources.get(res.source) {
            Some(s) => s.to_string(),
            None => format!("source #{}", res.source.0)
        };
        let records = match res.outcome {
            Ok(recs) => {
                info!("{}: {} arrival(s) (cycle #{})", src, recs.len(), res.cycle);
                recs
            },
            Err(e) => {
                warn!("{}: refresh failed (cycle #{}): {}", src, res.cycle, e);
                vec![]
            }
        };
        let mut board = self.board.write().unwrap_or_else(PoisonError::into_inner);
        board.replace(res.source, records, now);
        board.debug_print(now);
    }
    /// Applies results until no fetches are outstanding or `timeout` passes.
    /// Returns the number of results applied.
    pub fn await_idle(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut applied = 0;
        loop {
            while let Ok(res) = self.results.try_recv() {
                self.apply(res);
                applied += 1;
            }
            if self.in_flight() == 0 {
                // A worker clears its flag after sending, so anything it
                // sent is already queued.
                while let Ok(res) = self.results.try_recv() {
                    self.apply(res);
                    applied += 1;
                }
                return applied;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left == Duration::from_millis(0) {
                return applied;
            }
            if let Ok(res) = self.results.recv_timeout(left.min(Duration::from_millis(50))) {
                self.apply(res);
                applied += 1;
            }
        }
    }
    fn run_loop(&mut self) {
        let results = self.results.clone();
        let control = self.control_rx.clone();
        loop {
            select! {
                recv(results) -> msg => {
                    if let Ok(res) = msg {
                        self.apply(res);
                    }
                },
                recv(control) -> msg => {
                    match msg {
                        Ok(Control::Refresh) => {
                            info!("Manual refresh requested");
                            self.forced = true;
                        },
                        Ok(Control::Shutdown) | Err(_) => {
                            info!("Refresh scheduler shutting down");
                            return;
                        }
                    }
                },
                default(self.tick) => {}
            }
            self.tick();
        }
    }
    /// Spawns the scheduler thread.
    pub fn run(mut self) -> Result<SchedulerHandle> {
        info!("Running refresh scheduler for {} source(s)", self.workers.len());
        let control = self.control_tx.clone();
        let thread = thread::Builder::new()
            .name("t511-ankunft: refresh scheduler".into())
            .spawn(move || {
                self.run_loop();
                // Dropping `self` closes the job channels, so idle workers
                // exit; busy ones finish their fetch and find nobody to
                // report to.
            })?;
        Ok(SchedulerHandle {
            control,
            thread: Some(thread)
        })
    }
}

/// Handle to a running scheduler thread.
pub struct SchedulerHandle {
    control: Sender<Control>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn trigger(&self) -> RefreshTrigger {
        RefreshTrigger(self.control.clone())
    }
    pub fn refresh_now(&self) {
        self.trigger().request();
    }
    /// Stops the scheduler and waits for its thread. Outstanding fetches
    /// are abandoned.
    pub fn shutdown(mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                error!("Refresh scheduler thread panicked");
            }
        }
    }
}
