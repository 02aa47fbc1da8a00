//! The arrival board: what we currently know about upcoming arrivals.
//!
//! Each source has its own slot, which every refresh cycle overwrites
//! wholesale. Nothing from an older cycle survives into a newer one.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use siri_types::parse_stop_monitoring;
use siri_types::errors::ParseError;
use log::*;

use crate::classify::{Classifier, ColorHandle};
use crate::sources::SourceId;

/// One predicted arrival, with its display color.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrivalRecord {
    /// Source this came from.
    pub source: SourceId,
    /// Stop reference.
    pub stop: String,
    /// Route (line) id.
    pub route: String,
    pub direction: String,
    /// Predicted arrival time.
    pub expected: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    /// When the API produced the response this came from.
    pub response_ts: DateTime<Utc>,
    /// Whether the prediction comes from live tracking.
    pub live: bool,
    pub color: ColorHandle,
}

/// Turns one source's payload into classified arrival records.
///
/// Arrivals more than `max_eta` after `now` are dropped. The payload either
/// parses completely or yields nothing.
pub fn build_records(source: SourceId, payload: &[u8], now: DateTime<Utc>, max_eta: Option<Duration>, classifier: &Classifier) -> Result<Vec<ArrivalRecord>, ParseError> {
    let sm = parse_stop_monitoring(payload)?;
    let total = sm.arrivals.len();
    let response_ts = sm.response_ts;
    let ret: Vec<ArrivalRecord> = sm.arrivals.into_iter()
        .filter(|a| match max_eta {
            // Overdue arrivals are kept; the feed drops them once they've gone.
            Some(max) => a.expected - now <= max,
            None => true
        })
        .map(|a| ArrivalRecord {
            source,
            color: classifier.classify(&a.line, &a.direction),
            stop: a.reference,
            route: a.line,
            direction: a.direction,
            expected: a.expected,
            recorded_at: a.recorded_at,
            response_ts,
            live: a.live
        })
        .collect();
    if ret.len() != total {
        debug!("Dropped {} arrival(s) beyond max ETA", total - ret.len());
    }
    Ok(ret)
}

#[derive(Clone, Debug, Default)]
struct Slot {
    records: Vec<ArrivalRecord>,
    updated: Option<DateTime<Utc>>,
}

/// All current arrivals, grouped by source.
#[derive(Clone, Debug)]
pub struct Board {
    slots: Vec<Slot>,
    updates: u64,
}

impl Board {
    pub fn new(n_sources: usize) -> Self {
        Self {
            slots: vec![Slot::default(); n_sources],
            updates: 0
        }
    }
    /// Replaces everything known about `source` with `records`.
    pub fn replace(&mut self, source: SourceId, mut records: Vec<ArrivalRecord>, at: DateTime<Utc>) {
        let slot = match self.slots.get_mut(source.0) {
            Some(s) => s,
            None => {
                warn!("Ignoring records for unknown source #{}", source.0);
                return;
            }
        };
        records.sort_by_key(|r| r.expected);
        slot.records = records;
        slot.updated = Some(at);
        self.updates += 1;
    }
    pub fn source_records(&self, source: SourceId) -> &[ArrivalRecord] {
        self.slots.get(source.0)
            .map(|s| &s.records as &[_])
            .unwrap_or(&[])
    }
    /// When `source` last had a refresh outcome applied.
    pub fn last_updated(&self, source: SourceId) -> Option<DateTime<Utc>> {
        self.slots.get(source.0).and_then(|s| s.updated)
    }
    pub fn n_sources(&self) -> usize {
        self.slots.len()
    }
    /// Number of per-source updates applied so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }
    /// Every record: sources in configured order, each source's records
    /// in ETA order.
    pub fn ordered(&self) -> Vec<&ArrivalRecord> {
        self.slots.iter()
            .flat_map(|s| s.records.iter())
            .collect()
    }
    /// Records grouped by route, each group sorted by ETA.
    pub fn routes(&self) -> BTreeMap<&str, Vec<&ArrivalRecord>> {
        let mut ret: BTreeMap<&str, Vec<&ArrivalRecord>> = BTreeMap::new();
        for rec in self.ordered() {
            ret.entry(&rec.route as &str).or_insert_with(Vec::new).push(rec);
        }
        for recs in ret.values_mut() {
            recs.sort_by_key(|r| r.expected);
        }
        ret
    }
    /// Routes with an arrival between `now` and `now + within`.
    pub fn active_routes(&self, now: DateTime<Utc>, within: Duration) -> BTreeSet<&str> {
        let until = now + within;
        self.ordered().into_iter()
            .filter(|r| r.expected >= now && r.expected <= until)
            .map(|r| &r.route as &str)
            .collect()
    }
    pub fn num_active_routes(&self, now: DateTime<Utc>, within: Duration) -> usize {
        self.active_routes(now, within).len()
    }
    pub fn is_route_active(&self, route: &str, now: DateTime<Utc>, within: Duration) -> bool {
        self.active_routes(now, within).contains(route)
    }
    /// Logs the board, route by route.
    pub fn debug_print(&self, now: DateTime<Utc>) {
        let routes = self.routes();
        debug!("routes, len: {}", routes.len());
        for (route, recs) in routes {
            debug!("route: {} len: {}", route, recs.len());
            for rec in recs {
                let eta_s = (rec.expected - now).num_seconds();
                debug!("Route: {}:{} ETA: [{}] {:.1}min live: {}",
                       rec.route, rec.direction, rec.expected, eta_s as f64 / 60.0, rec.live);
            }
        }
    }
}
