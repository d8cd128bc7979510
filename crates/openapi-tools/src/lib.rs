//! `OpenAPI` -> MCP surface generation for the R2R API.
//!
//! - [`routes`]: ordered route rules and the first-match-wins classifier.
//! - [`loader`]: remote fetch with local fallback and hash pinning.
//! - [`surface`]: tools, resources and templates generated from the document, plus invocation.

pub mod config;
pub mod error;
pub mod loader;
pub mod resolver;
pub mod routes;
pub mod schema;
pub mod semantics;
pub mod surface;

pub use config::{HashPolicy, RouteRuleConfig, SpecSource, SurfaceOptions, load_route_map};
pub use error::{OpenApiToolsError, Result};
pub use loader::{LoadedSpec, SpecLoader, SpecOrigin};
pub use routes::{ComponentRole, Endpoint, RouteClassifier, RouteRule};
pub use surface::{OpenApiSurface, SkippedEndpoint, SurfaceSummary, json_resource_contents};
