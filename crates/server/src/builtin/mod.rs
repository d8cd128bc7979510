//! Hand-written MCP components served alongside the generated API surface.

pub mod prompts;
pub mod resources;
pub mod tools;
