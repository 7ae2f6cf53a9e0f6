//! HTTP API layer for khidmat.
//!
//! - **Endpoints**: auth, users, duty charts, miqaat, notifications, finance
//! - **Extractors**: bearer identity and JSON bodies that fail as 400
//! - **Middleware**: token verification
//!
//! Built on Axum 0.8.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
