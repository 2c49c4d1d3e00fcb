// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client options and the layered sources they are loaded from.
//!
//! Options resolve from built-in defaults, then an optional TOML file, then
//! `FAULTLINE_*` environment variables, each layer overriding the previous.
//! Builder setters applied after [`crate::CrashClientBuilder::from_options`]
//! override all of them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use faultline_core::{ReportAttributes, ReportValue};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{ClientError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);
pub const DEFAULT_TAB_WIDTH: u32 = 8;
pub const DEFAULT_CONTEXT_LINE_COUNT: u32 = 200;

/// Fully resolved client options. Deserializing goes through
/// [`ClientOptionsLayer`], so embedded config sections get the same
/// defaults and validation as a standalone file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ClientOptionsLayer")]
pub struct ClientOptions {
	pub endpoint: Option<String>,
	pub token: Option<String>,
	/// Bound on a whole submission. Synchronous reports never block longer.
	pub timeout: Duration,
	pub tab_width: u32,
	/// Lines of context read around the referenced lines of each source file.
	pub context_line_count: u32,
	/// Static attributes added to every report.
	pub attributes: ReportAttributes,
	pub disable_global_handler: bool,
	/// Report panics of tasks started with [`crate::CrashClient::spawn`]
	/// through the async path.
	pub handle_promises: bool,
	pub allow_multiple_uncaught_exception_listeners: bool,
	/// Probability in `[0, 1]` that a report is kept. `None` keeps all.
	pub sampling: Option<f64>,
	/// Reports allowed per 60 second window. `0` disables the limit.
	pub rate_limit: u32,
	pub enable_symbolication: bool,
	/// Logs degraded collection steps (unreadable sources, missing manifests)
	/// at `warn` instead of `debug`.
	pub debug: bool,
}

impl Default for ClientOptions {
	fn default() -> Self {
		Self {
			endpoint: None,
			token: None,
			timeout: DEFAULT_TIMEOUT,
			tab_width: DEFAULT_TAB_WIDTH,
			context_line_count: DEFAULT_CONTEXT_LINE_COUNT,
			attributes: ReportAttributes::new(),
			disable_global_handler: false,
			handle_promises: false,
			allow_multiple_uncaught_exception_listeners: false,
			sampling: None,
			rate_limit: 0,
			enable_symbolication: false,
			debug: false,
		}
	}
}

impl ClientOptions {
	/// Resolves options from defaults, `path` (when given) and the process
	/// environment.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let mut sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource)];
		if let Some(path) = path {
			sources.push(Box::new(TomlSource::new(path)));
		}
		sources.push(Box::new(EnvSource::from_process()));
		Self::from_sources(sources)
	}

	pub fn from_toml_str(content: &str) -> Result<Self> {
		let layer: ClientOptionsLayer =
			toml::from_str(content).map_err(|e| ClientError::ConfigParse {
				path: PathBuf::from("<inline>"),
				source: e,
			})?;
		Self::try_from(layer)
	}

	/// Reads a single TOML file with no environment overlay. Unlike
	/// [`ClientOptions::load`], a missing file is an error.
	pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|e| ClientError::ConfigRead {
			path: path.to_path_buf(),
			source: e,
		})?;
		let layer: ClientOptionsLayer = toml::from_str(&content).map_err(|e| ClientError::ConfigParse {
			path: path.to_path_buf(),
			source: e,
		})?;
		Self::try_from(layer)
	}

	pub fn from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<Self> {
		sources.sort_by_key(|s| s.precedence());
		let mut merged = ClientOptionsLayer::default();
		for source in &sources {
			trace!(source = source.name(), "applying config layer");
			merged.merge(source.load()?);
		}
		merged.finalize()
	}

	pub fn validate(&self) -> Result<()> {
		if let Some(rate) = self.sampling {
			if !(0.0..=1.0).contains(&rate) {
				return Err(ClientError::InvalidOptions {
					key: "sampling".into(),
					message: format!("{rate} is outside [0, 1]"),
				});
			}
		}
		if self.timeout.is_zero() {
			return Err(ClientError::InvalidOptions {
				key: "timeout".into(),
				message: "must be greater than zero".into(),
			});
		}
		if self.tab_width == 0 {
			return Err(ClientError::InvalidOptions {
				key: "tab_width".into(),
				message: "must be greater than zero".into(),
			});
		}
		Ok(())
	}
}

/// A partially specified set of options, as read from one source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientOptionsLayer {
	pub endpoint: Option<String>,
	pub token: Option<String>,
	#[serde(alias = "timeout")]
	pub timeout_ms: Option<u64>,
	#[serde(alias = "tabWidth")]
	pub tab_width: Option<u32>,
	#[serde(alias = "contextLineCount")]
	pub context_line_count: Option<u32>,
	pub attributes: Option<BTreeMap<String, serde_json::Value>>,
	#[serde(alias = "disableGlobalHandler")]
	pub disable_global_handler: Option<bool>,
	#[serde(alias = "handlePromises")]
	pub handle_promises: Option<bool>,
	#[serde(alias = "allowMultipleUncaughtExceptionListeners")]
	pub allow_multiple_uncaught_exception_listeners: Option<bool>,
	pub sampling: Option<f64>,
	#[serde(alias = "rateLimit")]
	pub rate_limit: Option<u32>,
	#[serde(alias = "enableSymbolication")]
	pub enable_symbolication: Option<bool>,
	pub debug: Option<bool>,
}

impl ClientOptionsLayer {
	/// Overlays `other` on `self`. Attribute maps merge key by key.
	pub fn merge(&mut self, other: ClientOptionsLayer) {
		macro_rules! overlay {
			($($field:ident),*) => {
				$(
					if other.$field.is_some() {
						self.$field = other.$field;
					}
				)*
			};
		}
		overlay!(
			endpoint,
			token,
			timeout_ms,
			tab_width,
			context_line_count,
			disable_global_handler,
			handle_promises,
			allow_multiple_uncaught_exception_listeners,
			sampling,
			rate_limit,
			enable_symbolication,
			debug
		);
		if let Some(attributes) = other.attributes {
			self.attributes
				.get_or_insert_with(BTreeMap::new)
				.extend(attributes);
		}
	}

	fn finalize(self) -> Result<ClientOptions> {
		let defaults = ClientOptions::default();
		let options = ClientOptions {
			endpoint: self.endpoint,
			token: self.token,
			timeout: self
				.timeout_ms
				.map(Duration::from_millis)
				.unwrap_or(defaults.timeout),
			tab_width: self.tab_width.unwrap_or(defaults.tab_width),
			context_line_count: self
				.context_line_count
				.unwrap_or(defaults.context_line_count),
			attributes: self
				.attributes
				.unwrap_or_default()
				.into_iter()
				.map(|(k, v)| (k, ReportValue::from(v)))
				.collect(),
			disable_global_handler: self
				.disable_global_handler
				.unwrap_or(defaults.disable_global_handler),
			handle_promises: self.handle_promises.unwrap_or(defaults.handle_promises),
			allow_multiple_uncaught_exception_listeners: self
				.allow_multiple_uncaught_exception_listeners
				.unwrap_or(defaults.allow_multiple_uncaught_exception_listeners),
			sampling: self.sampling,
			rate_limit: self.rate_limit.unwrap_or(defaults.rate_limit),
			enable_symbolication: self
				.enable_symbolication
				.unwrap_or(defaults.enable_symbolication),
			debug: self.debug.unwrap_or(defaults.debug),
		};
		options.validate()?;
		Ok(options)
	}
}

impl TryFrom<ClientOptionsLayer> for ClientOptions {
	type Error = ClientError;

	fn try_from(layer: ClientOptionsLayer) -> Result<Self> {
		let mut merged = ClientOptionsLayer::default();
		merged.merge(layer);
		merged.finalize()
	}
}

/// Source precedence levels (higher overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ClientOptionsLayer>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ClientOptionsLayer> {
		Ok(ClientOptionsLayer::default())
	}
}

/// TOML file source. A missing file contributes nothing.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ClientOptionsLayer> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ClientOptionsLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ClientError::ConfigRead {
			path: self.path.clone(),
			source: e,
		})?;

		toml::from_str(&content).map_err(|e| ClientError::ConfigParse {
			path: self.path.clone(),
			source: e,
		})
	}
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable source.
///
/// Convention: `FAULTLINE_<OPTION>`, e.g. `FAULTLINE_TIMEOUT_MS`.
pub struct EnvSource {
	lookup: EnvLookup,
}

impl EnvSource {
	pub fn from_process() -> Self {
		Self::with_lookup(|name| std::env::var(name).ok())
	}

	pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
		Self {
			lookup: Box::new(lookup),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parsed<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ClientError::InvalidOptions {
				key: name.to_string(),
				message: format!("invalid value '{v}'"),
			}),
			None => Ok(None),
		}
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ClientOptionsLayer> {
		debug!("loading environment variables");
		Ok(ClientOptionsLayer {
			endpoint: self.var("FAULTLINE_ENDPOINT"),
			token: self.var("FAULTLINE_TOKEN"),
			timeout_ms: self.parsed("FAULTLINE_TIMEOUT_MS")?,
			sampling: self.parsed("FAULTLINE_SAMPLING")?,
			rate_limit: self.parsed("FAULTLINE_RATE_LIMIT")?,
			debug: self.bool("FAULTLINE_DEBUG"),
			disable_global_handler: self.bool("FAULTLINE_DISABLE_GLOBAL_HANDLER"),
			enable_symbolication: self.bool("FAULTLINE_ENABLE_SYMBOLICATION"),
			..ClientOptionsLayer::default()
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use faultline_core::AttributeValue;
	use std::collections::HashMap;
	use std::io::Write;

	fn env(pairs: &[(&str, &str)]) -> EnvSource {
		let vars: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		EnvSource::with_lookup(move |name| vars.get(name).cloned())
	}

	#[test]
	fn defaults_match_documented_values() {
		let options = ClientOptions::default();
		assert_eq!(options.timeout, Duration::from_millis(15_000));
		assert_eq!(options.tab_width, 8);
		assert_eq!(options.context_line_count, 200);
		assert_eq!(options.rate_limit, 0);
		assert_eq!(options.sampling, None);
		assert!(!options.disable_global_handler);
	}

	#[test]
	fn from_toml_file_reads_and_validates() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("faultline.toml");
		std::fs::write(&path, "endpoint = \"https://c.example.com\"\nsampling = 0.5\n").unwrap();
		let options = ClientOptions::from_toml_file(&path).unwrap();
		assert_eq!(options.sampling, Some(0.5));

		std::fs::write(&path, "sampling = 2.0\n").unwrap();
		assert!(matches!(
			ClientOptions::from_toml_file(&path),
			Err(ClientError::InvalidOptions { .. })
		));
		assert!(matches!(
			ClientOptions::from_toml_file(dir.path().join("missing.toml")),
			Err(ClientError::ConfigRead { .. })
		));
	}

	#[test]
	fn embeds_in_larger_config() {
		#[derive(Deserialize)]
		struct AppConfig {
			faultline: ClientOptions,
		}
		let config: AppConfig = toml::from_str(
			r#"
			[faultline]
			endpoint = "https://c.example.com"
			rateLimit = 3
			"#,
		)
		.unwrap();
		assert_eq!(config.faultline.rate_limit, 3);
		assert_eq!(config.faultline.tab_width, DEFAULT_TAB_WIDTH);
	}

	#[test]
	fn toml_accepts_snake_and_camel_case() {
		let options = ClientOptions::from_toml_str(
			r#"
			endpoint = "https://collector.example.com"
			token = "abc"
			timeout = 500
			tabWidth = 4
			rate_limit = 10

			[attributes]
			service = "billing"
			build = 42
			"#,
		)
		.unwrap();
		assert_eq!(options.endpoint.as_deref(), Some("https://collector.example.com"));
		assert_eq!(options.timeout, Duration::from_millis(500));
		assert_eq!(options.tab_width, 4);
		assert_eq!(options.rate_limit, 10);
		assert_eq!(
			options.attributes.get("service"),
			Some(&ReportValue::Scalar(AttributeValue::from("billing")))
		);
		assert_eq!(
			options.attributes.get("build"),
			Some(&ReportValue::Scalar(AttributeValue::Int(42)))
		);
	}

	#[test]
	fn environment_overrides_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "endpoint = \"https://from-file.example.com\"\nsampling = 0.5").unwrap();

		let options = ClientOptions::from_sources(vec![
			Box::new(env(&[("FAULTLINE_ENDPOINT", "https://from-env.example.com")])),
			Box::new(TomlSource::new(file.path())),
			Box::new(DefaultsSource),
		])
		.unwrap();

		assert_eq!(options.endpoint.as_deref(), Some("https://from-env.example.com"));
		assert_eq!(options.sampling, Some(0.5));
	}

	#[test]
	fn missing_file_is_skipped() {
		let layer = TomlSource::new("/nonexistent/faultline.toml").load().unwrap();
		assert_eq!(layer, ClientOptionsLayer::default());
	}

	#[test]
	fn malformed_file_is_an_error() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "endpoint = ").unwrap();
		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ClientError::ConfigParse { .. }));
	}

	#[test]
	fn invalid_env_number_is_reported() {
		let err = env(&[("FAULTLINE_RATE_LIMIT", "lots")]).load().unwrap_err();
		assert!(matches!(err, ClientError::InvalidOptions { key, .. } if key == "FAULTLINE_RATE_LIMIT"));
	}

	#[test]
	fn sampling_out_of_range_is_rejected() {
		let err = ClientOptions::from_toml_str("sampling = 1.5").unwrap_err();
		assert!(matches!(err, ClientError::InvalidOptions { key, .. } if key == "sampling"));
	}

	#[test]
	fn attribute_layers_merge_per_key() {
		let mut base = ClientOptionsLayer {
			attributes: Some(BTreeMap::from([
				("a".to_string(), serde_json::json!(1)),
				("b".to_string(), serde_json::json!(1)),
			])),
			..Default::default()
		};
		base.merge(ClientOptionsLayer {
			attributes: Some(BTreeMap::from([("b".to_string(), serde_json::json!(2))])),
			..Default::default()
		});
		let attributes = base.attributes.unwrap();
		assert_eq!(attributes["a"], serde_json::json!(1));
		assert_eq!(attributes["b"], serde_json::json!(2));
	}
}
