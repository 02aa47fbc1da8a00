//! Raw StopMonitoring JSON structures.
//!
//! Only the fields we use are modelled; the API sends plenty more. Almost
//! everything is optional, since the feed is happy to send `null` or leave
//! fields out entirely.

use serde_derive::Deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct Document {
    pub service_delivery: ServiceDelivery,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDelivery {
    pub stop_monitoring_delivery: StopMonitoringDelivery,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct StopMonitoringDelivery {
    #[serde(default)]
    pub response_timestamp: Option<String>,
    #[serde(default)]
    pub monitored_stop_visit: Vec<MonitoredStopVisit>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredStopVisit {
    #[serde(default)]
    pub recorded_at_time: Option<String>,
    #[serde(default)]
    pub monitoring_ref: Option<String>,
    #[serde(default)]
    pub monitored_vehicle_journey: MonitoredVehicleJourney,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredVehicleJourney {
    #[serde(default)]
    pub line_ref: Option<String>,
    #[serde(default)]
    pub direction_ref: Option<String>,
    #[serde(default)]
    pub monitored_call: Option<MonitoredCall>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredCall {
    #[serde(default)]
    pub expected_arrival_time: Option<String>,
}
