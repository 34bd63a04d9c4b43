//! Read-mostly reports: monitor SLA, status page reports, feature usage.

pub mod sla;
pub mod stats;
pub mod status_report;

pub use sla::{SlaReader, SlaSpec};
pub use stats::{FeatureStats, StatsReader, StatsSpec};
pub use status_report::{StatusReportReconciler, StatusReportSpec};
