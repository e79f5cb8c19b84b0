//! trellis-graph: Bolt execution adapter for trellis statement bundles.
//!
//! This crate is the only place trellis touches the network. It consumes
//! the ordered statement bundle produced by the compiler, resolves deferred
//! identifier placeholders as the store assigns them, and hands the created
//! identifiers back for the session commit. Sessions, transactions, and
//! authentication beyond Bolt credentials belong to the host application.

pub mod client;

pub use client::{CreatedIds, GraphClient, GraphConfig, GraphError};
