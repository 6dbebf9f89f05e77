//! Multilingual survey translation and opinion scoring with an LLM.
//!
//! - `translation`: forward translation, back-translation and fidelity rating
//! - `scoring`: single-number opinion elicitation with bounded retries
//! - `batch`: questions × languages driver with skip-if-present semantics
//! - `store`: the four JSON documents on disk

pub mod batch;
pub mod config;
pub mod openai;
pub mod retry;
pub mod scoring;
pub mod store;
pub mod transcript;
pub mod translation;

#[cfg(test)]
mod testing;
