//! W-phase result publisher
//!
//! Turns a W-phase moment tensor result document into a seismological
//! object graph and publishes it to an archive file, a messaging bus, an
//! object store and email.

pub mod config;
pub mod driver;
pub mod errors;
pub mod graph;
pub mod ingestor;
pub mod models;
pub mod pipeline;
pub mod utils;
