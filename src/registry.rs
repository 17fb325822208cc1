//! Schema registries: ordered, pluggable sources of JSON schemas for
//! resource kinds. Three variants (embedded bundle, local filesystem
//! template, remote HTTP with bounded retry) share one [`Registry`]
//! capability; ordering and fallback live in [`RegistrySet`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::DiskCache;
use crate::error::{RegistryError, Result};

/// Default schema location: a public mirror of the kubernetes-json-schema
/// repository, fronted by a CDN.
pub const DEFAULT_SCHEMA_LOCATION: &str = "https://raw.githubusercontent.com/yannh/kubernetes-json-schema/master/{{ .NormalizedKubernetesVersion }}-standalone{{ .StrictSuffix }}/{{ .ResourceKind }}{{ .KindSuffix }}.json";

/// A successfully resolved schema: where it came from, and its raw bytes
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Identifier of the source (URL, file path, or embedded key)
    pub source: String,
    pub bytes: Vec<u8>,
}

/// A schema source capable of resolving a (kind, apiVersion,
/// targetVersion) triple to schema content.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn resolve(
        &self,
        kind: &str,
        api_version: &str,
        target_version: &str,
    ) -> std::result::Result<Resolved, RegistryError>;
}

/// Delimiters around template placeholders. Configurable to avoid
/// collision with other templating conventions in the same string.
#[derive(Debug, Clone)]
pub struct TemplateDelimiters {
    pub open: String,
    pub close: String,
}

impl Default for TemplateDelimiters {
    fn default() -> Self {
        Self {
            open: "{{".to_string(),
            close: "}}".to_string(),
        }
    }
}

/// Expand a schema location template into a concrete path or URL.
///
/// Recognized placeholders: `.NormalizedKubernetesVersion` (target
/// version prefixed with `v` unless it is `master`), `.StrictSuffix`
/// (`-strict` or empty), `.ResourceKind` (lowercased), `.KindSuffix`
/// (derived from the apiVersion group/version, e.g. `-v1`, `-apps-v1`).
pub fn schema_path(
    template: &str,
    delims: &TemplateDelimiters,
    kind: &str,
    api_version: &str,
    target_version: &str,
    strict: bool,
) -> String {
    let normalized_version = if target_version == "master" {
        target_version.to_string()
    } else {
        format!("v{}", target_version)
    };

    let strict_suffix = if strict { "-strict" } else { "" };

    let group_parts: Vec<&str> = api_version.split('/').collect();
    let version_parts: Vec<&str> = group_parts[0].split('.').collect();
    let mut kind_suffix = format!("-{}", version_parts[0].to_lowercase());
    if group_parts.len() > 1 {
        kind_suffix.push('-');
        kind_suffix.push_str(&group_parts[1].to_lowercase());
    }

    let kind_lower = kind.to_lowercase();
    let replacements = [
        ("NormalizedKubernetesVersion", normalized_version.as_str()),
        ("StrictSuffix", strict_suffix),
        ("ResourceKind", kind_lower.as_str()),
        ("KindSuffix", kind_suffix.as_str()),
    ];

    let mut expanded = template.to_string();
    for (name, value) in replacements {
        // Go-style templates allow flexible spacing around the field
        for placeholder in [
            format!("{} .{} {}", delims.open, name, delims.close),
            format!("{}.{}{}", delims.open, name, delims.close),
        ] {
            expanded = expanded.replace(&placeholder, value);
        }
    }

    expanded
}

/// Registry serving schemas from a compiled-in bundle.
///
/// Lookup is by `<kind>.json` or `<kind>-strict.json` with the kind
/// lowercased; a miss signals fallback to the next registry.
pub struct EmbeddedRegistry {
    strict: bool,
    bundle: HashMap<&'static str, &'static [u8]>,
}

impl EmbeddedRegistry {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            bundle: default_bundle(),
        }
    }

    /// Build a registry over a caller-provided bundle, mainly for tests
    pub fn with_bundle(strict: bool, bundle: HashMap<&'static str, &'static [u8]>) -> Self {
        Self { strict, bundle }
    }
}

fn default_bundle() -> HashMap<&'static str, &'static [u8]> {
    let mut bundle: HashMap<&'static str, &'static [u8]> = HashMap::new();
    bundle.insert(
        "configmap.json",
        include_bytes!("schemas/configmap.json").as_slice(),
    );
    bundle.insert(
        "configmap-strict.json",
        include_bytes!("schemas/configmap-strict.json").as_slice(),
    );
    bundle.insert(
        "namespace.json",
        include_bytes!("schemas/namespace.json").as_slice(),
    );
    bundle.insert(
        "namespace-strict.json",
        include_bytes!("schemas/namespace-strict.json").as_slice(),
    );
    bundle
}

#[async_trait]
impl Registry for EmbeddedRegistry {
    async fn resolve(
        &self,
        kind: &str,
        _api_version: &str,
        _target_version: &str,
    ) -> std::result::Result<Resolved, RegistryError> {
        let file_name = if self.strict {
            format!("{}-strict.json", kind.to_lowercase())
        } else {
            format!("{}.json", kind.to_lowercase())
        };

        match self.bundle.get(file_name.as_str()) {
            Some(bytes) => Ok(Resolved {
                source: format!("embedded:{}", file_name),
                bytes: bytes.to_vec(),
            }),
            None => Err(RegistryError::not_found(format!(
                "no embedded schema {}",
                file_name
            ))),
        }
    }
}

/// Registry reading schemas from the local filesystem through a path
/// template.
pub struct LocalRegistry {
    path_template: String,
    delimiters: TemplateDelimiters,
    strict: bool,
}

impl LocalRegistry {
    pub fn new(path_template: impl Into<String>, strict: bool) -> Self {
        Self {
            path_template: path_template.into(),
            delimiters: TemplateDelimiters::default(),
            strict,
        }
    }
}

#[async_trait]
impl Registry for LocalRegistry {
    async fn resolve(
        &self,
        kind: &str,
        api_version: &str,
        target_version: &str,
    ) -> std::result::Result<Resolved, RegistryError> {
        let path = schema_path(
            &self.path_template,
            &self.delimiters,
            kind,
            api_version,
            target_version,
            self.strict,
        );

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = %path, "using schema from local registry");
                Ok(Resolved {
                    source: path,
                    bytes,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(RegistryError::not_found(
                format!("could not find schema at {}", path),
            )),
            Err(e) => Err(RegistryError::fatal(format!(
                "failed reading schema at {}: {}",
                path, e
            ))),
        }
    }
}

/// Minimal HTTP GET surface, mockable in tests
#[async_trait]
pub trait SchemaGetter: Send + Sync {
    async fn get(&self, url: &str) -> std::result::Result<HttpResponse, String>;
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Production getter backed by reqwest
pub struct ReqwestGetter {
    client: reqwest::Client,
}

impl ReqwestGetter {
    pub fn new(skip_tls: bool, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(skip_tls)
            .user_agent(format!("validate-manifests/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::error::ValidationError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SchemaGetter for ReqwestGetter {
    async fn get(&self, url: &str) -> std::result::Result<HttpResponse, String> {
        let mut request = self.client.get(url);
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            request = request.header("Authorization", format!("token {}", token));
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// Registry downloading schemas over HTTP through a URL template.
///
/// Transient failures (transport errors, 5xx) are retried up to
/// `retry_attempts` extra times with a fixed delay; 404 signals
/// fallback; a 2xx body that is not valid JSON is a permanent failure
/// since retrying cannot fix a malformed document.
pub struct HttpRegistry<G: SchemaGetter> {
    getter: G,
    url_template: String,
    delimiters: TemplateDelimiters,
    strict: bool,
    retry_attempts: u32,
    retry_delay: Duration,
    cache: Option<DiskCache>,
}

impl<G: SchemaGetter> HttpRegistry<G> {
    pub fn new(getter: G, url_template: impl Into<String>, strict: bool) -> Self {
        Self {
            getter,
            url_template: url_template.into(),
            delimiters: TemplateDelimiters::default(),
            strict,
            retry_attempts: 2,
            retry_delay: Duration::from_millis(500),
            cache: None,
        }
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn with_cache(mut self, cache: Option<DiskCache>) -> Self {
        self.cache = cache;
        self
    }
}

#[async_trait]
impl<G: SchemaGetter> Registry for HttpRegistry<G> {
    async fn resolve(
        &self,
        kind: &str,
        api_version: &str,
        target_version: &str,
    ) -> std::result::Result<Resolved, RegistryError> {
        let url = schema_path(
            &self.url_template,
            &self.delimiters,
            kind,
            api_version,
            target_version,
            self.strict,
        );

        if let Some(cache) = &self.cache {
            if let Ok(Some(bytes)) = cache.get(&url).await {
                debug!(url = %url, "schema disk cache hit");
                return Ok(Resolved { source: url, bytes });
            }
        }

        let mut attempt = 0u32;
        loop {
            let response = match self.getter.get(&url).await {
                Ok(response) => response,
                Err(e) => {
                    if attempt < self.retry_attempts {
                        attempt += 1;
                        debug!(url = %url, attempt, "retrying after transport error: {}", e);
                        tokio::time::sleep(self.retry_delay).await;
                        continue;
                    }
                    return Err(RegistryError::retryable(format!(
                        "failed downloading schema at {}: {}",
                        url, e
                    )));
                }
            };

            match response.status {
                404 => {
                    return Err(RegistryError::not_found(format!(
                        "could not find schema at {}",
                        url
                    )));
                }
                status if (500..600).contains(&status) => {
                    if attempt < self.retry_attempts {
                        attempt += 1;
                        debug!(url = %url, status, attempt, "retrying after server error");
                        tokio::time::sleep(self.retry_delay).await;
                        continue;
                    }
                    return Err(RegistryError::fatal(format!(
                        "error while downloading schema at {} - received HTTP status {}",
                        url, status
                    )));
                }
                status if !(200..300).contains(&status) => {
                    return Err(RegistryError::fatal(format!(
                        "error while downloading schema at {} - received HTTP status {}",
                        url, status
                    )));
                }
                _ => {
                    // Retrying will not fix a malformed document
                    if serde_json::from_slice::<serde_json::Value>(&response.body).is_err() {
                        return Err(RegistryError::fatal(format!(
                            "non-JSON response when downloading schema at {}",
                            url
                        )));
                    }

                    if let Some(cache) = &self.cache {
                        if let Err(e) = cache.set(&url, &response.body).await {
                            return Err(RegistryError::fatal(e.to_string()));
                        }
                    }

                    debug!(url = %url, "using schema found over HTTP");
                    return Ok(Resolved {
                        source: url,
                        bytes: response.body,
                    });
                }
            }
        }
    }
}

/// Ordered list of registries with the fallback algorithm.
///
/// Registries are tried in configured order. A not-found result
/// advances to the next registry; any other failure aborts resolution
/// immediately. Exhausting every registry without a hit is the "no
/// schema" outcome, which is not an error here: the validator decides
/// whether that is fatal or skippable.
pub struct RegistrySet {
    registries: Vec<Box<dyn Registry>>,
}

impl RegistrySet {
    pub fn new(registries: Vec<Box<dyn Registry>>) -> Self {
        Self { registries }
    }

    pub async fn resolve(
        &self,
        kind: &str,
        api_version: &str,
        target_version: &str,
    ) -> std::result::Result<Option<Resolved>, RegistryError> {
        for registry in &self.registries {
            match registry.resolve(kind, api_version, target_version).await {
                Ok(resolved) => return Ok(Some(resolved)),
                Err(e) if e.is_not_found() => {
                    debug!(kind, "registry miss: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// Options shared by registries built from location strings
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub strict: bool,
    pub skip_tls: bool,
    pub cache_folder: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            strict: false,
            skip_tls: false,
            cache_folder: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Build one registry from a schema location string.
///
/// `embedded` selects the compiled-in bundle, `default` the public
/// HTTP mirror; anything starting with `http://` or `https://` is an
/// HTTP URL template, everything else a local path template.
pub fn from_location(location: &str, opts: &RegistryOptions) -> Result<Box<dyn Registry>> {
    match location {
        "embedded" => Ok(Box::new(EmbeddedRegistry::new(opts.strict))),
        "default" => from_location(DEFAULT_SCHEMA_LOCATION, opts),
        url if url.starts_with("http://") || url.starts_with("https://") => {
            let getter = ReqwestGetter::new(opts.skip_tls, opts.timeout)?;
            let cache = opts.cache_folder.clone().map(DiskCache::new);
            Ok(Box::new(
                HttpRegistry::new(getter, url, opts.strict).with_cache(cache),
            ))
        }
        path => Ok(Box::new(LocalRegistry::new(path, opts.strict))),
    }
}
