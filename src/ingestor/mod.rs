//! Result ingestion: raw payload access and normalization

pub mod normalizer;
pub mod payload;

pub use normalizer::PayloadNormalizer;
pub use payload::{RawResult, Section};
