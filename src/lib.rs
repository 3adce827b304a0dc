pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod qdrant_store;
pub mod server;
pub mod service;
pub mod stages;
pub mod tokens;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use error::{InsightsError, Result};
pub use server::{router, run_server};
