// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! A single report: built up by the caller, finalized once at send time.

use std::backtrace::Backtrace;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use faultline_common_version::BuildInfo;
use faultline_core::{
	content_uuid, flatten_attributes, split_report_values, stack_text, Annotations, AttributeValue,
	Attributes, FlattenOptions, ReportAttributes, ReportData, ReportId, ReportPayload,
	SymbolicationMapEntry, ThreadData, MAIN_THREAD, SOURCEMAP_SYMBOLICATION,
};
use futures::future::join_all;
use tracing::trace;

use crate::attributes::{builtin_annotations, error_attributes, merge_layers};
use crate::config::{DEFAULT_CONTEXT_LINE_COUNT, DEFAULT_TAB_WIDTH};
use crate::manifest::{resolve_manifest, PackageManifest};
use crate::source::SourceResolver;
use crate::stack::{ParsedStack, StackParser};
use crate::system::{ProcfsSystemAttributes, SystemAttributeProvider};

pub const LANG: &str = "rust";
pub const AGENT: &str = env!("CARGO_PKG_NAME");
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Source directories of the SDK itself. Frames in these never appear in a
/// report.
pub fn default_library_paths() -> Vec<PathBuf> {
	vec![
		PathBuf::from(env!("CARGO_MANIFEST_DIR")),
		PathBuf::from(faultline_core::CRATE_SOURCE_DIR),
	]
}

/// How a report's `symbolication` section is produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Symbolication {
	#[default]
	Disabled,
	/// Hash every source file the stack references.
	FromSources,
	/// Use a caller-provided map as-is.
	Map(Vec<SymbolicationMapEntry>),
}

/// Settings a report is finalized with. Clients hand their own to every
/// report they create.
#[derive(Clone)]
pub struct CollectionSettings {
	pub tab_width: u32,
	pub context_line_count: u32,
	pub library_paths: Vec<PathBuf>,
	pub symbolication: Symbolication,
	pub debug: bool,
	pub system: Arc<dyn SystemAttributeProvider>,
}

impl Default for CollectionSettings {
	fn default() -> Self {
		Self {
			tab_width: DEFAULT_TAB_WIDTH,
			context_line_count: DEFAULT_CONTEXT_LINE_COUNT,
			library_paths: default_library_paths(),
			symbolication: Symbolication::Disabled,
			debug: false,
			system: Arc::new(ProcfsSystemAttributes),
		}
	}
}

impl fmt::Debug for CollectionSettings {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CollectionSettings")
			.field("tab_width", &self.tab_width)
			.field("context_line_count", &self.context_line_count)
			.field("library_paths", &self.library_paths)
			.field("symbolication", &self.symbolication)
			.field("debug", &self.debug)
			.finish_non_exhaustive()
	}
}

/// An error or message on its way to a collector.
///
/// Caller values are routed at insertion: scalars become attributes and
/// structured values become annotations. Nothing is read from disk until
/// [`Report::to_data`].
#[derive(Debug, Clone)]
pub struct Report {
	id: ReportId,
	timestamp: i64,
	payload: ReportPayload,
	/// Where a message report was raised; error payloads carry their own.
	call_site: Option<String>,
	attributes: Attributes,
	annotations: Annotations,
	attachments: Vec<PathBuf>,
	settings: CollectionSettings,
}

impl Report {
	pub fn new(payload: impl Into<ReportPayload>, attributes: ReportAttributes, attachments: Vec<PathBuf>) -> Self {
		let payload = payload.into();
		let (attributes, annotations) = split_report_values(attributes);
		Self {
			id: ReportId::new(),
			timestamp: Utc::now().timestamp(),
			call_site: call_site_for(&payload),
			payload,
			attributes,
			annotations,
			attachments,
			settings: CollectionSettings::default(),
		}
	}

	pub(crate) fn with_settings(mut self, settings: CollectionSettings) -> Self {
		self.settings = settings;
		self
	}

	pub fn id(&self) -> ReportId {
		self.id
	}

	/// Seconds since the Unix epoch at creation.
	pub fn timestamp(&self) -> i64 {
		self.timestamp
	}

	pub fn payload(&self) -> &ReportPayload {
		&self.payload
	}

	pub fn classifiers(&self) -> Vec<String> {
		self.payload.classifiers()
	}

	pub fn is_exception_type_report(&self) -> bool {
		self.payload.is_error()
	}

	/// Replaces the payload; classifiers follow the new payload.
	pub fn set_error(&mut self, payload: impl Into<ReportPayload>) {
		self.payload = payload.into();
		self.call_site = call_site_for(&self.payload);
	}

	pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
		self.attributes.insert(key.into(), value.into());
	}

	/// Merges caller values, routing each by shape. Existing keys are
	/// overwritten.
	pub fn add_object_attributes(&mut self, values: ReportAttributes) {
		let (attributes, annotations) = split_report_values(values);
		self.attributes.extend(attributes);
		self.annotations.extend(annotations);
	}

	/// Flattens a nested object into dotted attributes.
	pub fn add_flattened_attributes(&mut self, value: &serde_json::Value, options: &FlattenOptions) {
		self.attributes.extend(flatten_attributes(value, options));
	}

	pub fn add_annotation(&mut self, key: impl Into<String>, value: serde_json::Value) {
		self.annotations.insert(key.into(), value);
	}

	pub fn add_attachment(&mut self, path: impl Into<PathBuf>) {
		self.attachments.push(path.into());
	}

	pub fn attachments(&self) -> &[PathBuf] {
		&self.attachments
	}

	/// Attributes added by the caller so far. Built-in attributes are only
	/// merged in by [`Report::to_data`].
	pub fn attributes(&self) -> &Attributes {
		&self.attributes
	}

	pub fn annotations(&self) -> &Annotations {
		&self.annotations
	}

	pub fn set_source_code_options(&mut self, tab_width: u32, context_line_count: u32) {
		self.settings.tab_width = tab_width;
		self.settings.context_line_count = context_line_count;
	}

	/// Assembles the submitted document: parses the stack, reads snippets,
	/// locates the calling module's manifest and merges every attribute
	/// layer. Unreadable files degrade the report instead of failing it.
	pub async fn to_data(&self) -> ReportData {
		let settings = &self.settings;
		let stack = self
			.payload
			.stack()
			.or(self.call_site.as_deref())
			.unwrap_or_default();
		let parsed = StackParser::new(settings.library_paths.clone()).parse(stack);
		let resolver = SourceResolver::new(settings.tab_width, settings.context_line_count, settings.debug);

		let (source_code, manifest, symbolication_maps) = futures::join!(
			resolver.resolve_all(&parsed.requested),
			resolve_manifest(parsed.calling_module.as_deref()),
			self.symbolication_maps(&parsed),
		);
		if manifest.is_none() {
			degraded!(settings.debug, report_id = %self.id, "no package manifest found for calling module");
		}

		let mut frames = parsed.frames;
		for frame in &mut frames {
			if frame
				.source_code
				.as_ref()
				.is_some_and(|id| !source_code.contains_key(id))
			{
				frame.source_code = None;
			}
		}

		let attributes = merge_layers([
			settings.system.attributes(),
			manifest
				.as_ref()
				.map(PackageManifest::attributes)
				.unwrap_or_default(),
			error_attributes(&self.payload),
			self.attributes.clone(),
		]);

		let mut annotations = builtin_annotations(&self.payload, manifest.as_ref());
		annotations.extend(self.annotations.clone());

		let mut threads = std::collections::BTreeMap::new();
		threads.insert(MAIN_THREAD.to_string(), ThreadData::faulting(frames));

		trace!(report_id = %self.id, snippets = source_code.len(), "report finalized");

		ReportData {
			uuid: self.id.0,
			timestamp: self.timestamp,
			lang: LANG.to_string(),
			lang_version: BuildInfo::current().rustc_semver().to_string(),
			agent: AGENT.to_string(),
			agent_version: AGENT_VERSION.to_string(),
			main_thread: MAIN_THREAD.to_string(),
			classifiers: self.classifiers(),
			threads,
			attributes,
			annotations,
			source_code,
			symbolication: symbolication_maps
				.is_some()
				.then(|| SOURCEMAP_SYMBOLICATION.to_string()),
			symbolication_maps,
		}
	}

	async fn symbolication_maps(&self, parsed: &ParsedStack) -> Option<Vec<SymbolicationMapEntry>> {
		match &self.settings.symbolication {
			Symbolication::Disabled => None,
			Symbolication::Map(entries) => Some(entries.clone()),
			Symbolication::FromSources => {
				let reads = parsed.requested.keys().map(|path| hash_file(path, self.settings.debug));
				Some(join_all(reads).await.into_iter().flatten().collect())
			}
		}
	}
}

async fn hash_file(path: &Path, debug: bool) -> Option<SymbolicationMapEntry> {
	match tokio::fs::read(path).await {
		Ok(bytes) => Some(SymbolicationMapEntry::new(
			path.to_string_lossy(),
			content_uuid(&bytes),
		)),
		Err(e) => {
			degraded!(debug, path = %path.display(), error = %e, "cannot hash source file for symbolication");
			None
		}
	}
}

/// Message reports carry the stack of the code that raised them.
fn call_site_for(payload: &ReportPayload) -> Option<String> {
	match payload {
		ReportPayload::Error(_) => None,
		ReportPayload::Message(message) => Some(stack_text("Message", message, &Backtrace::force_capture())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use faultline_core::{ErrorPayload, ReportValue};
	use proptest::prelude::*;
	use serde_json::json;

	#[derive(Debug)]
	struct FixedSystem;

	impl SystemAttributeProvider for FixedSystem {
		fn attributes(&self) -> Attributes {
			let mut attributes = Attributes::new();
			attributes.insert("hostname".into(), AttributeValue::from("fixture-host"));
			attributes.insert("error.message".into(), AttributeValue::from("from system"));
			attributes
		}
	}

	fn settings() -> CollectionSettings {
		CollectionSettings {
			system: Arc::new(FixedSystem),
			..CollectionSettings::default()
		}
	}

	fn error(message: &str) -> ReportPayload {
		ErrorPayload::new("Error", message).into()
	}

	#[test]
	fn classifiers_follow_payload() {
		let mut report = Report::new(error("x"), ReportAttributes::new(), vec![]);
		assert_eq!(report.classifiers(), vec!["Error".to_string()]);
		assert!(report.is_exception_type_report());

		report.set_error("just a message");
		assert!(report.classifiers().is_empty());
		assert!(!report.is_exception_type_report());
	}

	#[test]
	fn caller_values_are_routed_by_shape() {
		let mut values = ReportAttributes::new();
		values.insert("a".into(), ReportValue::from(1));
		values.insert("b".into(), ReportValue::from(json!({"x": 2})));
		let report = Report::new("m", values, vec![]);

		assert_eq!(report.attributes()["a"], AttributeValue::Int(1));
		assert_eq!(report.annotations()["b"], json!({"x": 2}));
		assert!(!report.attributes().contains_key("b"));
	}

	#[test]
	fn mutators_update_report() {
		let mut report = Report::new("m", ReportAttributes::new(), vec![]);
		report.add_attribute("k", "v");
		report.add_annotation("blob", json!([1, 2]));
		report.add_attachment("/tmp/log.txt");
		report.add_flattened_attributes(&json!({"user": {"id": 3}}), &FlattenOptions::default());

		assert_eq!(report.attributes()["k"], AttributeValue::from("v"));
		assert_eq!(report.attributes()["user.id"], AttributeValue::Int(3));
		assert_eq!(report.annotations()["blob"], json!([1, 2]));
		assert_eq!(report.attachments(), &[PathBuf::from("/tmp/log.txt")]);
	}

	#[tokio::test]
	async fn to_data_fills_identity_fields() {
		let report = Report::new(error("x"), ReportAttributes::new(), vec![]).with_settings(settings());
		let data = report.to_data().await;

		assert_eq!(data.uuid, report.id().0);
		assert_eq!(data.timestamp, report.timestamp());
		assert_eq!(data.lang, "rust");
		assert_eq!(data.agent, "faultline");
		assert_eq!(data.main_thread, "main");
		assert_eq!(data.classifiers, vec!["Error".to_string()]);
		assert!(data.threads["main"].fault);
		assert!(data.symbolication.is_none());
	}

	#[tokio::test]
	async fn attribute_layers_resolve_in_order() {
		let mut values = ReportAttributes::new();
		values.insert("hostname".into(), ReportValue::from("caller-host"));
		let report = Report::new(error("x"), values, vec![]).with_settings(settings());
		let data = report.to_data().await;

		assert_eq!(data.attributes["hostname"], AttributeValue::from("caller-host"));
		assert_eq!(data.attributes["error.message"], AttributeValue::from("x"));
	}

	#[tokio::test]
	async fn caller_annotations_override_builtins() {
		let mut report = Report::new(error("x"), ReportAttributes::new(), vec![]).with_settings(settings());
		report.add_annotation("Exception", json!("custom"));
		let data = report.to_data().await;

		assert_eq!(data.annotations["Exception"], json!("custom"));
		assert!(data.annotations.contains_key("Environment Variables"));
	}

	#[tokio::test]
	async fn frames_reference_resolved_snippets() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("app.rs");
		std::fs::write(&file, "fn a() {}\nfn b() {}\nfn c() {}\n").unwrap();
		let stack = format!(
			"Error: boom\n    at b ({p}:2:1)\n    at gone (/missing/file.rs:1:1)",
			p = file.display()
		);
		let payload = ErrorPayload::new("Error", "boom").with_stack(stack);
		let mut report = Report::new(payload, ReportAttributes::new(), vec![]).with_settings(settings());
		report.set_source_code_options(4, 0);

		let data = report.to_data().await;
		let stack = data.main_stack();
		assert_eq!(stack.len(), 2);

		let id = stack[0].source_code.clone().unwrap();
		let snippet = &data.source_code[&id];
		assert_eq!(snippet.start_line, 2);
		assert_eq!(snippet.text, "fn b() {}\n");
		assert_eq!(snippet.tab_width, 4);
		assert!(stack[1].source_code.is_none());
	}

	#[tokio::test]
	async fn symbolication_hashes_referenced_files() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("lib.rs");
		std::fs::write(&file, "pub fn f() {}\n").unwrap();
		let stack = format!("Error: boom\n    at f ({}:1:1)", file.display());
		let payload = ErrorPayload::new("Error", "boom").with_stack(stack);
		let report = Report::new(payload, ReportAttributes::new(), vec![]).with_settings(CollectionSettings {
			symbolication: Symbolication::FromSources,
			..settings()
		});

		let data = report.to_data().await;
		assert_eq!(data.symbolication.as_deref(), Some("sourcemap"));
		let maps = data.symbolication_maps.unwrap();
		assert_eq!(maps.len(), 1);
		assert_eq!(maps[0].uuid, content_uuid(b"pub fn f() {}\n"));
	}

	#[tokio::test]
	async fn explicit_symbolication_map_is_used_verbatim() {
		let entries = vec![SymbolicationMapEntry::new("dist/app", "id-1")];
		let report = Report::new(error("x"), ReportAttributes::new(), vec![]).with_settings(CollectionSettings {
			symbolication: Symbolication::Map(entries.clone()),
			..settings()
		});
		let data = report.to_data().await;
		assert_eq!(data.symbolication_maps, Some(entries));
	}

	#[tokio::test]
	async fn finalized_report_round_trips_through_json() {
		let report = Report::new("round trip", ReportAttributes::new(), vec![]).with_settings(settings());
		let data = report.to_data().await;
		let parsed: ReportData = serde_json::from_str(&data.to_json().unwrap()).unwrap();
		assert_eq!(parsed.uuid, data.uuid);
		assert_eq!(parsed.classifiers, data.classifiers);
		assert_eq!(parsed.attributes, data.attributes);
		assert_eq!(parsed.main_stack(), data.main_stack());
	}

	proptest! {
		#![proptest_config(ProptestConfig::with_cases(16))]

		#[test]
		fn message_reports_have_no_classifiers(message in "[a-z ]{0,24}") {
			let report = Report::new(message.clone(), ReportAttributes::new(), vec![]);
			prop_assert!(report.classifiers().is_empty());
			prop_assert_eq!(report.payload().message(), message.as_str());
		}
	}
}
