//! Pass configuration, read from the host's flat parameter bag.
//!
//! The bag is a JSON object. Every option is optional:
//!
//! | option | default |
//! |---|---|
//! | `data_source` | `"host-library"` (or `"external-rpc"`) |
//! | `citekey_template` | `{author}_{title}_{year}` |
//! | `confidence_threshold` | `0.93`, clamped into `[0, 1]` |
//! | `ambiguity_delta` | `0.03`, clamped into `[0, 0.2]` |
//! | `rpc_port` | `23119` |
//! | `rpc_path` | `better-bibtex/json-rpc` |
//! | `run_in_parallel` | `false` |
//!
//! Numbers may be given as JSON numbers or numeric strings.
//!
//! ```
//! use citebind::config::{DataSource, PassConfig};
//! use serde_json::json;
//!
//! let config = PassConfig::from_params(&json!({
//!     "data_source": "external-rpc",
//!     "confidence_threshold": "0.9",
//!     "rpc_port": 24119,
//! }))
//! .unwrap();
//!
//! assert_eq!(config.data_source, DataSource::ExternalRpc);
//! assert_eq!(config.rpc_endpoint(), "http://127.0.0.1:24119/better-bibtex/json-rpc");
//! ```

use crate::fuzzy::{DEFAULT_AMBIGUITY_DELTA, DEFAULT_CONFIDENCE_THRESHOLD, FuzzyConfig};
use crate::source::rpc::{DEFAULT_RPC_PATH, DEFAULT_RPC_PORT};
use crate::template::{Template, TemplateCache};
use crate::{CitekeyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

const MAX_AMBIGUITY_DELTA: f64 = 0.2;

/// Where the candidate snapshot comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    /// Scan the host's item store
    #[default]
    HostLibrary,
    /// Ask the external JSON-RPC citekey service
    ExternalRpc,
}

impl FromStr for DataSource {
    type Err = CitekeyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host-library" => Ok(DataSource::HostLibrary),
            "external-rpc" => Ok(DataSource::ExternalRpc),
            other => Err(CitekeyError::Config(format!(
                "unknown data_source '{other}', expected 'host-library' or 'external-rpc'"
            ))),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataSource::HostLibrary => "host-library",
            DataSource::ExternalRpc => "external-rpc",
        })
    }
}

/// Settings of one resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassConfig {
    pub data_source: DataSource,
    /// Template text; `None` selects the default template
    pub citekey_template: Option<String>,
    pub confidence_threshold: f64,
    pub ambiguity_delta: f64,
    pub rpc_port: u16,
    pub rpc_path: String,
    pub run_in_parallel: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            data_source: DataSource::default(),
            citekey_template: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            ambiguity_delta: DEFAULT_AMBIGUITY_DELTA,
            rpc_port: DEFAULT_RPC_PORT,
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            run_in_parallel: false,
        }
    }
}

/// The bag as received, before interpretation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawParams {
    data_source: Option<String>,
    citekey_template: Option<String>,
    confidence_threshold: Option<Value>,
    ambiguity_delta: Option<Value>,
    rpc_port: Option<Value>,
    rpc_path: Option<String>,
    run_in_parallel: Option<Value>,
}

impl PassConfig {
    /// Reads the parameter bag.
    ///
    /// # Errors
    ///
    /// Returns `CitekeyError::Config` if the bag is not an object, names an unknown data
    /// source, or holds a value that is not a number (or boolean) where one is expected.
    pub fn from_params(params: &Value) -> Result<Self> {
        if !params.is_object() {
            return Err(CitekeyError::Config(format!(
                "parameters must be a JSON object, found {params}"
            )));
        }
        let raw = RawParams::deserialize(params)
            .map_err(|e| CitekeyError::Config(e.to_string()))?;
        let defaults = Self::default();

        let data_source = match raw.data_source.as_deref().map(str::trim) {
            None | Some("") => defaults.data_source,
            Some(name) => name.parse()?,
        };

        let confidence_threshold = match raw.confidence_threshold {
            Some(value) => clamped("confidence_threshold", number("confidence_threshold", &value)?, 0.0, 1.0),
            None => defaults.confidence_threshold,
        };
        let ambiguity_delta = match raw.ambiguity_delta {
            Some(value) => clamped(
                "ambiguity_delta",
                number("ambiguity_delta", &value)?,
                0.0,
                MAX_AMBIGUITY_DELTA,
            ),
            None => defaults.ambiguity_delta,
        };

        let rpc_port = match raw.rpc_port {
            Some(value) => port(&value)?,
            None => defaults.rpc_port,
        };

        let rpc_path = raw
            .rpc_path
            .as_deref()
            .map(|path| path.trim().trim_start_matches('/'))
            .filter(|path| !path.is_empty())
            .map_or(defaults.rpc_path, str::to_string);

        let run_in_parallel = match raw.run_in_parallel {
            Some(value) => flag("run_in_parallel", &value)?,
            None => defaults.run_in_parallel,
        };

        Ok(Self {
            data_source,
            citekey_template: raw.citekey_template.filter(|text| !text.trim().is_empty()),
            confidence_threshold,
            ambiguity_delta,
            rpc_port,
            rpc_path,
            run_in_parallel,
        })
    }

    pub fn fuzzy_config(&self) -> FuzzyConfig {
        FuzzyConfig {
            confidence_threshold: self.confidence_threshold,
            ambiguity_delta: self.ambiguity_delta,
            run_in_parallel: self.run_in_parallel,
        }
    }

    /// The configured template, parsed once per text through `cache`.
    pub fn template(&self, cache: &TemplateCache) -> Arc<Template> {
        match &self.citekey_template {
            Some(text) => cache.get_or_resolve(text),
            None => Arc::new(Template::default()),
        }
    }

    /// URL of the JSON-RPC endpoint on the loopback interface.
    pub fn rpc_endpoint(&self) -> String {
        format!("http://127.0.0.1:{}/{}", self.rpc_port, self.rpc_path)
    }
}

fn number(name: &str, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(CitekeyError::Config(format!(
            "{name} must be a number, found {value}"
        ))),
    }
}

fn clamped(name: &str, value: f64, min: f64, max: f64) -> f64 {
    let result = value.clamp(min, max);
    if result != value {
        warn!(option = name, value, clamped = result, "option out of range, clamped");
    }
    result
}

fn port(value: &Value) -> Result<u16> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u16::try_from(n).ok())
        .filter(|&n| n != 0)
        .ok_or_else(|| CitekeyError::Config(format!("rpc_port must be a TCP port, found {value}")))
}

fn flag(name: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(CitekeyError::Config(format!(
            "{name} must be a boolean, found {value}"
        ))),
    }
}
