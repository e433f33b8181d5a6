//! Incident memory and advisory healing for reliability events.
//!
//! Vigil remembers past incidents, finds the ones that look like a new event, and
//! turns that history into an advisory [`HealingIntent`](advisory::HealingIntent):
//! a recommendation with a confidence score and a reasoning chain. It never
//! executes anything. Intents are handed to a downstream executor.
//!
//! # Architecture
//!
//! - **Vectors**: exact flat L2 index persisted as a binary file plus a JSON text
//!   sidecar, written in batches by a background task
//! - **Graph**: bounded in-memory incident and outcome nodes linked by typed edges,
//!   fronted by an LRU similarity cache
//! - **Decisions**: declarative healing policies with cooldowns choose candidate
//!   actions; the advisory pipeline scores each one against history
//! - **Transport**: MCP over stdio
//!
//! # Modules
//!
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`index`]: vector store, on-disk format, and the durable background writer
//! - [`memory`]: incident graph memory and similarity search
//! - [`advisory`]: tool registry, request validation, and the intent pipeline
//! - [`policy`]: healing policies and cooldown-aware evaluation
//! - [`engine`]: end-to-end event processing

pub mod advisory;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod event;
pub mod index;
pub mod memory;
pub mod policy;
