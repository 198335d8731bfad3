pub mod context;
pub mod error;
pub mod fingerprint;
pub mod policy;
pub mod reconciler;
pub mod users;

pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use reconciler::{error_policy, reconcile};
pub use users::{AppliedAnnotations, LAST_APPLIED_ANNOTATION, UserReconciler};
