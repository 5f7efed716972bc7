pub mod check;
pub mod error;
pub mod reconcile;
pub mod report;

pub use check::Checker;
pub use error::ReconcileError;
pub use reconcile::{prepare, run};
pub use report::{
    CheckKind, CheckRequest, FetchStage, Mismatch, RbacSummary, ResourceGroupOutcome,
    ResourceGroupReport, ResourceGroupVerdict, RunReport, SubCheckResult,
};
