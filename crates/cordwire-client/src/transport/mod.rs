//! Concrete gateway transports.

pub mod websocket;

pub use websocket::WebSocketConnector;
