//! # stratagem core
//!
//! Domain types, traits, and error definitions shared by every stratagem
//! crate. Nothing here talks to the network: the completion backend, the
//! tools and the reasoning engines all implement against these types.
//!
//! ## Layout
//!
//! - [`message`]: the conversation value objects sent to a model
//! - [`provider`]: the completion capability (`Provider`), usage accounting
//!   and the opaque [`Credential`]
//! - [`tool`]: the closed [`ToolKind`] enumeration, the `Tool` trait and the
//!   name-keyed [`ToolRegistry`]
//! - [`error`]: one error enum per bounded context

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, LlmError, ProviderError, Result, ToolError};
pub use message::{Message, Role};
pub use provider::{Credential, FinishReason, Provider, ProviderRequest, ProviderResponse, Usage};
pub use tool::{Tool, ToolContext, ToolKind, ToolOutput, ToolRegistry};
