//! Aula · adaptive history/geography tutoring core.
//!
//! Scoring, proficiency tracking and recommendations over a pluggable store
//! and content provider, plus the axum surface that exposes them.

pub mod assessment;
pub mod config;
pub mod domain;
pub mod error;
pub mod openai;
pub mod proficiency;
pub mod protocol;
pub mod provider;
pub mod recommend;
pub mod routes;
pub mod scoring;
pub mod seeds;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;
