//! # Lotline Core
//!
//! Domain types, traits, and error definitions for the Lotline
//! production analyst. This crate has **zero framework dependencies**;
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The pipeline side (records, enrichment inputs, conversation shapes)
//! is plain data defined here. The one external boundary, the chat
//! backend, is a trait. This enables:
//! - Swapping backends via configuration
//! - Easy testing with mock gateways
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod gateway;
pub mod message;
pub mod record;

// Re-export key types at crate root for ergonomics
pub use error::{ContextError, DatasetError, Error, GatewayError, Result};
pub use gateway::{ChatGateway, ChatRequest, ChatResponse, TokenUsage};
pub use message::{ChatMessage, History, Role};
pub use record::{EnrichedRecord, Period, ProductionRecord, PHASE_CUTOVER_YEAR};
