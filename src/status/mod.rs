pub mod buckets;
pub mod classify;
pub mod daily;
pub mod model;
pub mod resolver;
pub mod writer;

pub use model::{OverallStatus, Report, ServiceStatus, ServiceSummary, SlotEntry};
