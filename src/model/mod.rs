pub mod commit;
pub mod common;
pub mod element;
pub mod kind;
pub mod project;

pub use commit::*;
pub use common::*;
pub use element::*;
pub use kind::*;
pub use project::*;
