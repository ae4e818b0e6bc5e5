// HTTP module: server assembly and the outbound hyper client.

pub mod client;
pub mod server;

pub use crate::middleware::middleware::Middleware;

pub use server::{HttpServer, Server};

pub use crate::controller::controller::Controller;
