//! # validate-manifests
//!
//! Concurrent validation of Kubernetes manifests against JSON schemas,
//! with multi-source schema resolution, caching, and streaming results.

pub mod cache;
pub mod cli;
pub mod discovery;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod resource;
pub mod validator;

pub use cache::{DiskCache, SchemaCache};
pub use cli::Cli;
pub use discovery::{Discovery, DiscoveryError};
pub use error::{RegistryError, SignatureError, ValidationError};
pub use output::Output;
pub use pipeline::{Input, PipelineOptions};
pub use registry::{Registry, RegistryOptions, RegistrySet};
pub use resource::{Resource, Signature};
pub use validator::{ValidationResult, ValidationStatus, Validator, ValidatorOptions};
