//! Types for the SIRI StopMonitoring feed, as served (in JSON) by the
//! 511.org transit API.
//!
//! `stop_monitoring` holds the raw serde structures; `parse_stop_monitoring`
//! turns a fetched payload into a list of `Arrival`s.

pub mod errors;
pub mod stop_monitoring;
pub mod util;

use chrono::{DateTime, Utc};
use log::*;

use crate::errors::*;
use crate::stop_monitoring::{Document, MonitoredStopVisit};
use crate::util::parse_timestamp;

/// One predicted arrival at a monitored stop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Arrival {
    /// Stop reference (`MonitoringRef`).
    pub reference: String,
    /// Line name (`LineRef`).
    pub line: String,
    /// Direction, usually `IB` or `OB` (`DirectionRef`).
    pub direction: String,
    /// When the vehicle position was sampled. Epoch zero if not tracked live.
    pub recorded_at: DateTime<Utc>,
    /// Expected arrival time.
    pub expected: DateTime<Utc>,
    /// Whether the prediction comes from live vehicle tracking.
    pub live: bool,
}

/// A successfully parsed StopMonitoring payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopMonitoring {
    /// When the API produced this response.
    pub response_ts: DateTime<Utc>,
    /// Arrivals, sorted by expected arrival time.
    pub arrivals: Vec<Arrival>,
}

impl Arrival {
    fn from_visit(visit: MonitoredStopVisit) -> Result<Self> {
        let journey = visit.monitored_vehicle_journey;
        let eta = journey.monitored_call
            .and_then(|c| c.expected_arrival_time)
            .ok_or(ParseError::Missing("ExpectedArrivalTime"))?;
        let recorded = visit.recorded_at_time
            .ok_or(ParseError::Missing("RecordedAtTime"))?;
        let recorded_at = parse_timestamp(&recorded)?;
        let expected = parse_timestamp(&eta)?;
        Ok(Self {
            reference: visit.monitoring_ref.unwrap_or_default(),
            line: journey.line_ref.unwrap_or_default(),
            direction: journey.direction_ref.unwrap_or_default(),
            recorded_at,
            expected,
            // Scheduled-only predictions carry an epoch-zero sample time.
            live: recorded_at.timestamp() > 0
        })
    }
}

/// Parses a StopMonitoring payload.
///
/// Anything before the first `{` is skipped (the API prefixes its JSON with
/// a byte order mark). A payload that ends early is reported as
/// `ParseError::Truncated` rather than yielding whatever arrivals came before
/// the cut. Individual stop visits that lack a timestamp are skipped.
pub fn parse_stop_monitoring(data: &[u8]) -> Result<StopMonitoring> {
    let start = data.iter()
        .position(|&b| b == b'{')
        .ok_or(ParseError::NoJsonObject)?;
    let body = &data[start..];
    let doc: Document = serde_json::from_slice(body)
        .map_err(|e| {
            if e.is_eof() {
                ParseError::Truncated(body.len())
            }
            else {
                ParseError::Json(e)
            }
        })?;
    let delivery = doc.service_delivery.stop_monitoring_delivery;
    let response_ts = delivery.response_timestamp
        .as_ref()
        .ok_or(ParseError::Missing("ResponseTimestamp"))?;
    let response_ts = parse_timestamp(response_ts)?;
    let mut arrivals = Vec::with_capacity(delivery.monitored_stop_visit.len());
    for (i, visit) in delivery.monitored_stop_visit.into_iter().enumerate() {
        match Arrival::from_visit(visit) {
            Ok(a) => arrivals.push(a),
            Err(e) => warn!("Skipping stop visit #{}: {}", i, e)
        }
    }
    if arrivals.is_empty() {
        warn!("Got 0 arrivals");
    }
    arrivals.sort_by_key(|a| a.expected);
    Ok(StopMonitoring { response_ts, arrivals })
}
