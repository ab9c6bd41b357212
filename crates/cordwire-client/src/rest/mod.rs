//! REST request pipeline.

pub mod client;
pub mod endpoints;
pub mod multipart;
pub mod route;
pub mod transport;

pub use client::RestClient;
pub use endpoints::GatewayBot;
pub use multipart::{FormPart, Multipart};
pub use route::route_key;
pub use transport::{HttpRequest, HttpResponse, Method, RequestBody, ReqwestTransport, RestTransport};
