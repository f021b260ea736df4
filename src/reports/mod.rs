pub mod domain;
pub mod ids;
pub mod lifecycle;

pub use domain::{IncidentType, ReportForm, Severity, SeverityLevel, TypePresentation, ValidReport};
pub use ids::ReportIdAllocator;
pub use lifecycle::{ReportLifecycle, Submitted};
