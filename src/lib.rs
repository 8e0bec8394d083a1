pub mod auth;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod fallback;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod rate_limiter;
pub mod response;
pub mod retry;
pub mod server;
pub mod store;
pub mod upstream;
pub mod validation;

pub use config::{Config, Environment};
pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayReply, InboundRequest};
pub use response::ResponseEnvelope;
pub use server::create_app;
