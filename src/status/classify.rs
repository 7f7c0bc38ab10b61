use super::model::{OverallStatus, ServiceStatus, ServiceSummary};

pub fn determine_status(uptime: f64) -> ServiceStatus {
    if uptime >= 95.0 {
        ServiceStatus::Operational
    } else if uptime >= 80.0 {
        ServiceStatus::Degraded
    } else if uptime >= 50.0 {
        ServiceStatus::PartialOutage
    } else {
        ServiceStatus::MajorOutage
    }
}

/// First matching tier wins; "widespread" means at least max(2, 20% of services).
pub fn compute_overall(statuses: &[ServiceStatus]) -> OverallStatus {
    let total = statuses.len();
    if total == 0 {
        return OverallStatus::NoData;
    }
    let count = |wanted: ServiceStatus| statuses.iter().filter(|s| **s == wanted).count();
    let major = count(ServiceStatus::MajorOutage);
    let partial = count(ServiceStatus::PartialOutage);
    let degraded = count(ServiceStatus::Degraded);

    let widespread = f64::max(2.0, total as f64 * 0.2);
    if major as f64 >= widespread {
        OverallStatus::MajorSystemOutage
    } else if major >= 1 || partial as f64 >= widespread {
        OverallStatus::PartialSystemOutage
    } else if partial >= 1 || degraded >= 1 {
        OverallStatus::MinorServiceDisruption
    } else {
        OverallStatus::AllSystemsOperational
    }
}

pub fn overall_for(services: &[ServiceSummary]) -> OverallStatus {
    let statuses: Vec<ServiceStatus> = services.iter().map(|s| s.current_status).collect();
    compute_overall(&statuses)
}
