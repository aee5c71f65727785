//! N-gram keyword search over tabular records.
//!
//! The library exposes the building blocks used by the `addrgram`
//! binary: corpus loading, the bigram inverted index with its
//! persistence backends, the query engine, the HTTP daemon and the CLI.

pub mod cli;
pub mod corpus;
pub mod index;
pub mod models;
pub mod search;
pub mod server;
