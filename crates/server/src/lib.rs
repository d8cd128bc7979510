//! R2R MCP server.
//!
//! Serves the R2R document API as MCP tools, resources and prompts. The generated part comes from
//! the API's `OpenAPI` document (see `r2r-openapi-tools`); the hand-written part lives in
//! [`builtin`] and uses client-side sampling through [`sampling`] and [`pipeline`].

pub mod bootstrap;
pub mod builtin;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod sampling;
pub mod server;
pub mod transport;

pub use bootstrap::build_server;
pub use config::{ServerArgs, TransportKind};
pub use error::{Result, ServerError};
pub use server::R2rMcpServer;
