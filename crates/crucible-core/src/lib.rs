//! Shared types and configuration for the crucible execution engine.
//!
//! This crate defines the vocabulary the rest of the workspace speaks:
//! execution events streamed back to the agent loop, session lifecycle
//! states, the language bindings known to the interpreter registry, and the
//! TOML-backed configuration with its environment-variable overrides.

pub mod config;
pub mod env;
pub mod types;
