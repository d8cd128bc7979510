//! HTTP plumbing shared by the R2R MCP server and the command-line tools.
//!
//! - [`auth`]: request-time bearer credential injection
//! - [`client`]: base-URL-aware client with typed R2R endpoints
//! - [`types`] / [`format`]: request/response models and text rendering

pub mod auth;
pub mod client;
pub mod error;
pub mod format;
pub mod types;

pub use auth::{BearerAuth, CredentialSource, EnvCredentialSource, SharedCredential, mask_token};
pub use client::ApiClient;
pub use error::{ClientError, Result};
