use serde::Serialize;

/// Per-service health tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Operational,
    Degraded,
    PartialOutage,
    MajorOutage,
    /// No slot or record to judge from.
    Unknown,
}

/// System-wide health tier shown in the page banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverallStatus {
    #[serde(rename = "No Data")]
    NoData,
    #[serde(rename = "Major System Outage")]
    MajorSystemOutage,
    #[serde(rename = "Partial System Outage")]
    PartialSystemOutage,
    #[serde(rename = "Minor Service Disruption")]
    MinorServiceDisruption,
    #[serde(rename = "All Systems Operational")]
    AllSystemsOperational,
}

/// Four request counters for one slot or one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub total: i64,
    pub success: i64,
    pub client_error: i64,
    pub server_error: i64,
}

impl Counters {
    pub fn add(&mut self, other: &Counters) {
        self.total += other.total;
        self.success += other.success;
        self.client_error += other.client_error;
        self.server_error += other.server_error;
    }
}

/// One bar on the status page. `service_*` fields are only filled for the daily window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_title: Option<String>,
    pub date: String,
    pub total_requests: i64,
    pub success_count: i64,
    pub client_error_count: i64,
    pub server_error_count: i64,
    pub uptime: f64,
}

impl SlotEntry {
    pub fn from_counters(date: String, counters: &Counters) -> Self {
        Self {
            service_id: None,
            service_alias: None,
            service_title: None,
            date,
            total_requests: counters.total,
            success_count: counters.success,
            client_error_count: counters.client_error,
            server_error_count: counters.server_error,
            uptime: uptime_pct(counters.total, counters.server_error),
        }
    }
}

/// The `*_90d` key names are what the frontend reads for every window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSummary {
    pub service_id: String,
    pub service_alias: String,
    pub service_title: String,
    pub current_status: ServiceStatus,
    #[serde(rename = "uptime_90d")]
    pub uptime: f64,
    #[serde(rename = "total_requests_90d")]
    pub total_requests: i64,
    pub daily: Vec<SlotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub overall_status: OverallStatus,
    pub granularity: String,
    pub services: Vec<ServiceSummary>,
}

impl Report {
    pub fn empty(granularity: &str) -> Self {
        Self {
            overall_status: OverallStatus::NoData,
            granularity: granularity.to_string(),
            services: Vec::new(),
        }
    }
}

/// Three-decimal rounding on the exact binary value, ties to even.
pub fn round3(value: f64) -> f64 {
    let scaled = value * 1000.0;
    let rounded = if (scaled - scaled.trunc()).abs() == 0.5 {
        // The product may have rounded onto the tie; its exact error decides the side.
        let err = value.mul_add(1000.0, -scaled);
        if err > 0.0 {
            scaled.ceil()
        } else if err < 0.0 {
            scaled.floor()
        } else {
            scaled.round_ties_even()
        }
    } else {
        scaled.round()
    };
    rounded / 1000.0
}

/// Share of requests that did not end in a 5xx; an empty period counts as fully up.
pub fn uptime_pct(total: i64, server_error: i64) -> f64 {
    if total <= 0 {
        return 100.0;
    }
    let ok = (total - server_error).max(0);
    round3(ok as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}
