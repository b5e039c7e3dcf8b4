//! Health classification and configuration editing for the ANG monitor dashboard.
//!
//! Both halves are plain data transformations: [`status::evaluate`] turns a snapshot into a
//! [`status::HealthReport`], [`reconcile::ConfigReconciler`] keeps an operator's draft in step
//! with the agent's stored configuration. Network calls belong to the caller.

pub mod normalize;
pub mod reconcile;
pub mod status;

pub use normalize::{ValidConfig, normalize};
pub use reconcile::{ConfigReconciler, DraftState, FieldEdit, ReconcileError};
pub use status::{HealthReport, evaluate};
