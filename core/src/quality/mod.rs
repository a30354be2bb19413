//! Quality scoring over a workflow state.
//!
//! Everything here is a pure function of its arguments so dashboards can call
//! it as often as they like.

mod report;
mod scorer;

pub use report::{
    generate_quality_report, Priority, QualityReport, Recommendation, SectionClass, SectionQuality,
};
pub use scorer::{quality_score, task_weight};
