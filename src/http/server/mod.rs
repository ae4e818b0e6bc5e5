mod server;

pub use server::{HttpServer, Server};
