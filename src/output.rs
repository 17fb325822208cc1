//! Result sinks. The text sink streams one line per result; the JSON
//! sink buffers everything and emits a single document on flush.

use std::io::Write;

use serde::Serialize;

use crate::error::{Result, ValidationError};
use crate::resource::Signature;
use crate::validator::{ValidationResult, ValidationStatus, Violation};

/// Sink for validation results. `write` is called once per resource,
/// `flush` exactly once after the last result.
pub trait Output: Send {
    fn write(&mut self, result: &ValidationResult) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Running counts of results by status
#[derive(Debug, Default, Clone, Serialize)]
struct Summary {
    valid: usize,
    invalid: usize,
    errors: usize,
    skipped: usize,
}

impl Summary {
    fn record(&mut self, status: ValidationStatus) {
        match status {
            ValidationStatus::Valid => self.valid += 1,
            ValidationStatus::Invalid => self.invalid += 1,
            ValidationStatus::Error => self.errors += 1,
            ValidationStatus::Skipped => self.skipped += 1,
            ValidationStatus::Empty => {}
        }
    }
}

/// Line-oriented human-readable output.
///
/// Valid, skipped and empty results are only shown in verbose mode;
/// invalid results and errors are always shown.
pub struct TextOutput<W: Write> {
    writer: W,
    color: bool,
    verbose: bool,
    with_summary: bool,
    summary: Summary,
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

impl<W: Write> TextOutput<W> {
    pub fn new(writer: W, color: bool, verbose: bool, with_summary: bool) -> Self {
        Self {
            writer,
            color,
            verbose,
            with_summary,
            summary: Summary::default(),
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{}{}{}", code, text, RESET)
        } else {
            text.to_string()
        }
    }
}

fn subject(result: &ValidationResult) -> String {
    match result.resource.cached_signature() {
        Some(sig) if !sig.kind.is_empty() => {
            format!("{} - {} {}", result.resource.path, sig.kind, sig.name)
        }
        _ => result.resource.path.clone(),
    }
}

impl<W: Write + Send> Output for TextOutput<W> {
    fn write(&mut self, result: &ValidationResult) -> Result<()> {
        self.summary.record(result.status);

        let line = match result.status {
            ValidationStatus::Valid => {
                if !self.verbose {
                    return Ok(());
                }
                format!("{} is {}", subject(result), self.paint(GREEN, "valid"))
            }
            ValidationStatus::Invalid => format!(
                "{} is {}: {}",
                subject(result),
                self.paint(RED, "invalid"),
                result.message.as_deref().unwrap_or(""),
            ),
            ValidationStatus::Error => format!(
                "{} {}: {}",
                subject(result),
                self.paint(RED, "failed validation"),
                result.message.as_deref().unwrap_or(""),
            ),
            ValidationStatus::Skipped => {
                if !self.verbose {
                    return Ok(());
                }
                format!("{} {}", subject(result), self.paint(YELLOW, "skipped"))
            }
            ValidationStatus::Empty => return Ok(()),
        };

        writeln!(self.writer, "{}", line)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.with_summary {
            let s = &self.summary;
            writeln!(
                self.writer,
                "Summary: Valid: {}, Invalid: {}, Errors: {}, Skipped: {}",
                s.valid, s.invalid, s.errors, s.skipped
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct JsonResult {
    filename: String,
    kind: String,
    name: String,
    version: String,
    status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
    #[serde(rename = "validationErrors", skip_serializing_if = "Vec::is_empty")]
    violations: Vec<Violation>,
}

#[derive(Debug, Serialize)]
struct JsonReport {
    resources: Vec<JsonResult>,
    summary: Summary,
}

/// Machine-readable output: buffers all results and writes one JSON
/// document when flushed.
pub struct JsonOutput<W: Write> {
    writer: W,
    verbose: bool,
    results: Vec<JsonResult>,
    summary: Summary,
}

impl<W: Write> JsonOutput<W> {
    pub fn new(writer: W, verbose: bool) -> Self {
        Self {
            writer,
            verbose,
            results: Vec::new(),
            summary: Summary::default(),
        }
    }
}

impl<W: Write + Send> Output for JsonOutput<W> {
    fn write(&mut self, result: &ValidationResult) -> Result<()> {
        self.summary.record(result.status);

        if !self.verbose
            && matches!(
                result.status,
                ValidationStatus::Valid | ValidationStatus::Skipped | ValidationStatus::Empty
            )
        {
            return Ok(());
        }

        let sig = result
            .resource
            .cached_signature()
            .cloned()
            .unwrap_or_else(Signature::default);

        self.results.push(JsonResult {
            filename: result.resource.path.clone(),
            kind: sig.kind,
            name: sig.name,
            version: sig.version,
            status: result.status,
            msg: result.message.clone(),
            violations: result.violations.clone(),
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let report = JsonReport {
            resources: std::mem::take(&mut self.results),
            summary: self.summary.clone(),
        };
        serde_json::to_writer_pretty(&mut self.writer, &report)
            .map_err(|e| ValidationError::Output(e.to_string()))?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Build an output sink by format name
pub fn create(
    format: &str,
    writer: Box<dyn Write + Send>,
    color: bool,
    verbose: bool,
    with_summary: bool,
) -> Result<Box<dyn Output>> {
    match format {
        "text" => Ok(Box::new(TextOutput::new(
            writer,
            color,
            verbose,
            with_summary,
        ))),
        "json" => Ok(Box::new(JsonOutput::new(writer, verbose))),
        other => Err(ValidationError::Config(format!(
            "unknown output format '{}'",
            other
        ))),
    }
}
