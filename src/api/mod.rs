//! HTTP surface for the Wardwatch services.
//!
//! Routes are grouped by component; [`configure`] mounts only the groups the
//! running service hosts.

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::configure;
