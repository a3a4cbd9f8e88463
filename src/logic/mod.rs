pub mod commit_apply;
pub mod lifecycle;
pub mod materialize;

pub use commit_apply::{CommitApplier, CommitRequest};
pub use lifecycle::ProjectOperations;
pub use materialize::Materializer;
