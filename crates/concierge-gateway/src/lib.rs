//! Backend gateway for the storefront assistant.
//!
//! The session engine never touches the network directly. Everything it needs
//! from the storefront backend goes through the [`BackendGateway`] contract:
//! - [`HttpGateway`] speaks the REST API with `reqwest`.
//! - [`MockGateway`] keeps an in-memory backend for tests and offline use.
//!
//! Responses are untrusted input. The [`wire`] module parses them into loose
//! shapes and validates them into the closed types of `concierge-core`.

pub mod backend;
pub mod error;
pub mod http;
pub mod mock;
pub mod wire;

pub use backend::BackendGateway;
pub use error::{GatewayError, GatewayErrorKind};
pub use http::HttpGateway;
pub use mock::{MockGateway, MockOp, RecordedFeedback};
