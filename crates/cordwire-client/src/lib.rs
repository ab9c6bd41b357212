//! cordwire-client: async client for a real-time chat gateway and its REST API.
//!
//! The [`GatewayClient`] keeps one gateway session alive: it identifies,
//! heartbeats, dispatches events to registered handlers, and resumes or
//! re-identifies after the link drops. The [`RestClient`] sends REST calls
//! through a per-route rate limiter fed by the server's quota headers.
//!
//! # Quick Start
//!
//! ```no_run
//! use cordwire_client::{ClientConfig, ConnectOptions, GatewayClient, RestClient};
//! use cordwire_core::Event;
//!
//! # async fn example() -> cordwire_core::CordResult<()> {
//! let config = ClientConfig::default();
//! let rest = RestClient::new("my-token", config.rest.clone())?;
//! let url = rest.get_gateway_url().await?;
//!
//! let gateway = GatewayClient::with_websocket("my-token", config.gateway);
//! gateway.dispatcher().add_handler(Event::MessageCreate, |msg| {
//!     println!("{}", msg["content"]);
//! });
//! gateway.connect(&url, ConnectOptions::default()).await?;
//! gateway.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod gateway;
pub mod ratelimit;
pub mod rest;
pub mod transport;

// Re-export primary public types.
pub use config::{ClientConfig, GatewayConfig, RestConfig, TokenKind};
pub use gateway::{ConnectOptions, GatewayClient, GatewayState, Session, ShutdownHandle};
pub use ratelimit::{Clock, RateLimiter, SystemClock};
pub use rest::{GatewayBot, HttpRequest, Method, RestClient};
pub use transport::WebSocketConnector;

// Re-export cordwire-core error types for convenience.
pub use cordwire_core::{CordError, CordResult};
