// HTTP API controllers: one per endpoint (or tight endpoint family), each
// implementing `Controller::add_route`, composed by `HttpServer`.

pub mod admin;
pub mod completions;
pub mod controller;
pub mod health;
pub mod metrics;
pub mod models;

pub use admin::AdminController;
pub use completions::CompletionsController;
pub use controller::Controller;
pub use health::HealthController;
pub use metrics::PrometheusMetricsController;
pub use models::ModelsController;
