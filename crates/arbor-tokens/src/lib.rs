//! # arbor-tokens
//!
//! Token counting, model registry, and budgeted truncation.
//!
//! Counting never fails: models map to an encoding via a table
//! ([`encoding_for_model`]), unknown models get the default encoding, and
//! when no exact encoder has been registered for an encoding the density
//! heuristic takes over — CJK-dense text at ≈2.0 chars/token, code-like text
//! at ≈4.5, prose at ≈3.8.
//!
//! [`TokenBudgeter`] is the service object. It caches one [`Encoder`] per
//! model identifier in a bounded LRU so a flood of distinct model ids cannot
//! grow memory without bound.

#![deny(unsafe_code)]

pub mod budgeter;
pub mod encoder;
pub mod registry;

pub use budgeter::{TokenBudgeter, Truncation};
pub use encoder::{Encoder, EncodingId, ExactEncoder, TextDensity};
pub use registry::{encoding_for_model, token_limit};
