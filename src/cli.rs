//! Command-line interface.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{Result, ValidationError};
use crate::pipeline::{Input, PipelineOptions};
use crate::registry::RegistryOptions;
use crate::validator::ValidatorOptions;

#[derive(Parser, Debug)]
#[command(
    name = "validate-manifests",
    version,
    about = "Validate Kubernetes manifests against their schemas"
)]
pub struct Cli {
    /// Files or directories to validate, or '-' to read from stdin
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Number of concurrent validation workers
    #[arg(short = 'n', long, default_value_t = 4)]
    pub workers: usize,

    /// Schema location: 'embedded', 'default', a URL template, or a
    /// local path template. Repeatable; tried in order.
    #[arg(long = "schema-location")]
    pub schema_locations: Vec<String>,

    /// Version of Kubernetes to validate against, e.g. "1.31.0"
    #[arg(long, default_value = "master")]
    pub kubernetes_version: String,

    /// Disallow properties not declared in the schema
    #[arg(long)]
    pub strict: bool,

    /// Comma-separated kinds or apiVersion/Kind pairs to skip
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Comma-separated kinds or apiVersion/Kind pairs to reject
    #[arg(long, value_delimiter = ',')]
    pub reject: Vec<String>,

    /// Skip resources whose schema cannot be found
    #[arg(long)]
    pub ignore_missing_schemas: bool,

    /// Stop validating after the first invalid or errored resource
    #[arg(long)]
    pub exit_on_error: bool,

    /// Regex for file paths to ignore during discovery. Repeatable.
    #[arg(long = "ignore-filename-pattern")]
    pub ignore_filename_patterns: Vec<String>,

    /// Disable TLS certificate verification when downloading schemas
    #[arg(long)]
    pub insecure_skip_tls_verify: bool,

    /// Cache downloaded schemas, optionally in a specific folder
    /// (`--cache` or `--cache=FOLDER`)
    #[arg(long, num_args = 0..=1, require_equals = true)]
    pub cache: Option<Option<PathBuf>>,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    pub output: String,

    /// Print a summary of the run at the end
    #[arg(long)]
    pub summary: bool,

    /// Print results for passing resources too
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the input source. `-` selects stdin and may not be mixed
    /// with file paths.
    pub fn input(&self) -> Result<Input> {
        if self.paths.iter().any(|p| p == "-") {
            if self.paths.len() > 1 {
                return Err(ValidationError::Config(
                    "cannot mix '-' with file paths".to_string(),
                ));
            }
            return Ok(Input::Stdin);
        }
        Ok(Input::Paths(
            self.paths.iter().map(PathBuf::from).collect(),
        ))
    }

    /// Schema locations to try in order; the compiled-in bundle backed
    /// by the public registry when none are given.
    pub fn effective_schema_locations(&self) -> Vec<String> {
        if self.schema_locations.is_empty() {
            vec!["embedded".to_string(), "default".to_string()]
        } else {
            self.schema_locations.clone()
        }
    }

    pub fn validator_options(&self) -> ValidatorOptions {
        ValidatorOptions {
            target_version: self.kubernetes_version.clone(),
            strict: self.strict,
            skip_kinds: to_set(&self.skip),
            reject_kinds: to_set(&self.reject),
            ignore_missing_schemas: self.ignore_missing_schemas,
        }
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            strict: self.strict,
            skip_tls: self.insecure_skip_tls_verify,
            cache_folder: self.cache_folder(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Folder for the on-disk schema cache. `--cache` with no value
    /// uses the platform cache directory.
    pub fn cache_folder(&self) -> Option<PathBuf> {
        match &self.cache {
            None => None,
            Some(Some(folder)) => Some(folder.clone()),
            Some(None) => Some(
                dirs::cache_dir()
                    .unwrap_or_else(|| PathBuf::from(".cache"))
                    .join("validate-manifests"),
            ),
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            workers: self.workers,
            fail_fast: self.exit_on_error,
        }
    }
}

fn to_set(values: &[String]) -> HashSet<String> {
    values
        .iter()
        .filter(|v| !v.is_empty())
        .cloned()
        .collect()
}
