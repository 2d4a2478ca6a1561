//! genta-core: Domain model, adaptive scoring, and readiness aggregation.
//!
//! This crate defines the data model, the collaborator traits that storage
//! and text-generation backends implement, and the two synchronous engines
//! the rest of genta builds on: the theta update rule and the readiness
//! aggregator.

pub mod error;
pub mod memory;
pub mod model;
pub mod prompt;
pub mod readiness;
pub mod scoring;
pub mod traits;

pub use error::{DomainError, ProviderError};
pub use model::{AnswerOption, Language, Section, SectionCluster};
