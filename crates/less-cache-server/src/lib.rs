//! lessd — HTTP middleware and static server that compiles LESS on request.

pub mod config;
pub mod error;
pub mod middleware;
pub mod server;

pub use config::{Options, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use middleware::{less_layer, CACHE_HEADER};
pub use server::{router, LessServer};
