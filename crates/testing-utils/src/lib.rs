//! # Match Testing Utils
//!
//! Shared testing utilities for the match daemon workspace.
//! This crate provides recording test doubles for every collaborator trait
//! and builders for request payloads and configuration.
//!
//! ## Features
//!
//! - **Recording Doubles**: audit sink, operator alert and match handler that remember every call
//! - **Fault Injection**: failing, panicking and slow handlers; scripted connection providers
//! - **Test Data Builders**: match request payloads and fast-cycling configurations
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! match-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
