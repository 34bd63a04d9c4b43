//! Idempotent desired-state reconcilers for the Better Uptime and Flagsmith APIs.
//!
//! Every reconciler locates the remote resource by its natural key through
//! the [`paginate::Paginator`], narrows the desired attributes to an update
//! payload with the [`payload::AttributeDiffer`], and converges with at most
//! one call per resource.

pub mod clients;
pub mod date;
pub mod error;
pub mod outcome;
pub mod paginate;
pub mod payload;
pub mod reconciler;
pub mod reports;
pub mod resource;

pub use error::{ReconcileError, Result};
pub use outcome::Outcome;
pub use reconciler::{Reconciler, State};
