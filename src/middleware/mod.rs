pub mod body_limit;
pub mod middleware;
pub mod recover_middleware;
pub mod request_id;

pub use body_limit::BodyLimitMiddleware;
pub use middleware::Middleware;
pub use recover_middleware::{panics_counter, PanicRecoverMiddleware};
pub use request_id::{RequestIdMiddleware, REQUEST_ID_HEADER};
