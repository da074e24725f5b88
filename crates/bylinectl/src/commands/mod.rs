mod export;
mod review;
mod rollback;
mod sync;
mod validate;

pub use export::{export, ExportArgs};
pub use review::{
    review_apply, review_queue, ApplySummary, ReviewApplyArgs, ReviewArgs, ReviewCommand,
    ReviewQueueArgs,
};
pub use rollback::{rollback, RollbackArgs};
pub use sync::{sync, SyncArgs};
pub use validate::validate_schemas;

pub(crate) const DEFAULT_DB: &str = "byline.db";
