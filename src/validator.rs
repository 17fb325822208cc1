//! Per-resource validation: signature extraction, skip/reject
//! filtering, schema resolution through the registry set (with
//! run-scoped caching of compiled schemas), and schema validation.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::{schema_key, SchemaCache};
use crate::error::{Result, SignatureError, ValidationError};
use crate::registry::{Resolved, RegistrySet};
use crate::resource::{Resource, Signature};

/// Classification of a single validation result. Closed enumeration:
/// exactly one status per resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    /// Resource conforms to its schema
    Valid,
    /// Resource violates its schema
    Invalid,
    /// An error occurred processing the resource
    Error,
    /// Resource was deliberately not validated
    Skipped,
    /// Document contains no resource. Also produced for files starting
    /// with a `---` separator.
    Empty,
}

impl ValidationStatus {
    /// True for statuses that fail the overall run
    pub fn is_failure(&self) -> bool {
        matches!(self, ValidationStatus::Error | ValidationStatus::Invalid)
    }
}

/// One schema violation within an invalid resource
#[derive(Debug, Clone, serde::Serialize)]
pub struct Violation {
    pub path: String,
    pub msg: String,
}

/// The result of validating a single resource, produced once per
/// resource and consumed exactly once by the result consumer.
#[derive(Debug)]
pub struct ValidationResult {
    pub resource: Resource,
    pub status: ValidationStatus,
    pub message: Option<String>,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn valid(resource: Resource) -> Self {
        Self {
            resource,
            status: ValidationStatus::Valid,
            message: None,
            violations: Vec::new(),
        }
    }

    pub fn invalid(resource: Resource, message: String, violations: Vec<Violation>) -> Self {
        Self {
            resource,
            status: ValidationStatus::Invalid,
            message: Some(message),
            violations,
        }
    }

    pub fn error(resource: Resource, message: String) -> Self {
        Self {
            resource,
            status: ValidationStatus::Error,
            message: Some(message),
            violations: Vec::new(),
        }
    }

    pub fn skipped(resource: Resource) -> Self {
        Self {
            resource,
            status: ValidationStatus::Skipped,
            message: None,
            violations: Vec::new(),
        }
    }

    pub fn empty(resource: Resource) -> Self {
        Self {
            resource,
            status: ValidationStatus::Empty,
            message: None,
            violations: Vec::new(),
        }
    }
}

/// Options controlling per-resource validation decisions
#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    /// Version of the schema dialect/platform to validate against
    pub target_version: String,
    /// Use the `-strict` schema variants, which reject undeclared fields
    pub strict: bool,
    /// Kinds (or apiVersion/Kind encodings) to skip
    pub skip_kinds: HashSet<String>,
    /// Kinds (or apiVersion/Kind encodings) to reject outright
    pub reject_kinds: HashSet<String>,
    /// Skip resources whose schema cannot be found instead of failing
    pub ignore_missing_schemas: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            target_version: "master".to_string(),
            strict: false,
            skip_kinds: HashSet::new(),
            reject_kinds: HashSet::new(),
            ignore_missing_schemas: false,
        }
    }
}

/// Validates resources against schemas resolved from an ordered
/// registry set. Compiled schemas are memoized in a cache scoped to
/// this validator instance, never in process-global state.
pub struct Validator {
    opts: ValidatorOptions,
    registries: RegistrySet,
    cache: SchemaCache<jsonschema::Validator>,
}

impl Validator {
    pub fn new(registries: RegistrySet, opts: ValidatorOptions) -> Self {
        Self {
            opts,
            registries,
            cache: SchemaCache::new(),
        }
    }

    /// Validate a single resource.
    ///
    /// Decision order is significant: the empty-kind check precedes the
    /// skip set, which precedes the reject set, which precedes schema
    /// resolution. An empty kind never reaches a registry, and a
    /// skipped kind is never charged against missing-schema accounting.
    pub async fn validate_resource(&self, resource: Resource) -> ValidationResult {
        if resource.is_empty() {
            return ValidationResult::empty(resource);
        }

        let doc: Value = match serde_yaml::from_slice(&resource.bytes) {
            Ok(doc) => doc,
            Err(e) => {
                let err = ValidationError::Signature(SignatureError::Parse(e.to_string()));
                return ValidationResult::error(resource, err.to_string());
            }
        };

        if doc.is_null() {
            return ValidationResult::empty(resource);
        }

        let sig = resource.signature_from_value(&doc);

        if sig.kind.is_empty() {
            return ValidationResult::empty(resource);
        }

        if self.in_set(&self.opts.skip_kinds, &sig) {
            return ValidationResult::skipped(resource);
        }

        if self.in_set(&self.opts.reject_kinds, &sig) {
            let err = ValidationError::RejectedKind { kind: sig.kind };
            return ValidationResult::error(resource, err.to_string());
        }

        let schema = match self.resolve_schema(&sig).await {
            Ok(schema) => schema,
            Err(err) => return ValidationResult::error(resource, err.to_string()),
        };

        let schema = match schema {
            Some(schema) => schema,
            None => {
                if self.opts.ignore_missing_schemas {
                    return ValidationResult::skipped(resource);
                }
                let err = ValidationError::SchemaNotFound { kind: sig.kind };
                return ValidationResult::error(resource, err.to_string());
            }
        };

        let violations: Vec<Violation> = schema
            .iter_errors(&doc)
            .map(|e| Violation {
                path: e.instance_path.to_string(),
                msg: e.to_string(),
            })
            .collect();

        if violations.is_empty() {
            ValidationResult::valid(resource)
        } else {
            let message = violations
                .iter()
                .map(|v| v.msg.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            ValidationResult::invalid(resource, message, violations)
        }
    }

    /// Look up the compiled schema for a signature, consulting the
    /// cache first and falling back to the registry set. `Ok(None)` is
    /// the "no schema found" outcome.
    async fn resolve_schema(
        &self,
        sig: &Signature,
    ) -> Result<Option<Arc<jsonschema::Validator>>> {
        let key = schema_key(&sig.kind, &sig.version, &self.opts.target_version);

        if let Some(schema) = self.cache.get(&key) {
            debug!(key = %key, "schema cache hit");
            return Ok(Some(schema));
        }

        let resolved = self
            .registries
            .resolve(&sig.kind, &sig.version, &self.opts.target_version)
            .await?;

        match resolved {
            None => Ok(None),
            Some(resolved) => {
                let schema = Arc::new(compile_schema(&resolved)?);
                self.cache.set(key, Arc::clone(&schema));
                Ok(Some(schema))
            }
        }
    }

    fn in_set(&self, set: &HashSet<String>, sig: &Signature) -> bool {
        set.contains(&sig.kind) || set.contains(&sig.group_version_kind())
    }
}

fn compile_schema(resolved: &Resolved) -> Result<jsonschema::Validator> {
    let schema_doc: Value =
        serde_json::from_slice(&resolved.bytes).map_err(|e| ValidationError::SchemaCompilation {
            source_id: resolved.source.clone(),
            details: format!("invalid JSON: {}", e),
        })?;
    jsonschema::validator_for(&schema_doc).map_err(|e| ValidationError::SchemaCompilation {
        source_id: resolved.source.clone(),
        details: e.to_string(),
    })
}
