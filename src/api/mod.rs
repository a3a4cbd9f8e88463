pub mod branch_handlers;
pub mod handlers;
pub mod routes;

pub use branch_handlers::*;
pub use handlers::*;
pub use routes::*;
