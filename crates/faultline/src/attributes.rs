// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Attribute precedence and built-in annotations.
//!
//! A finalized report's attributes are the union of these layers, later
//! layers winning on key conflicts:
//!
//! 1. system attributes
//! 2. calling-module metadata (`application`, `version`, …)
//! 3. `error.message`
//! 4. client-static attributes
//! 5. memorized attributes
//! 6. attributes passed with the report call or added to the report

use faultline_core::{AttributeValue, Attributes, Annotations, ReportAttributes, ReportPayload};
use serde_json::{json, Map, Value};

use crate::manifest::PackageManifest;

pub const ENVIRONMENT_ANNOTATION: &str = "Environment Variables";
pub const ARGUMENTS_ANNOTATION: &str = "Exec Arguments";
pub const DEPENDENCIES_ANNOTATION: &str = "Dependencies";
pub const EXCEPTION_ANNOTATION: &str = "Exception";

/// Merges the client-held layers for a new report: static, then memorized,
/// then per-call values.
pub fn combine_client_attributes(
	static_attributes: &ReportAttributes,
	memorized: ReportAttributes,
	per_call: ReportAttributes,
) -> ReportAttributes {
	let mut combined = static_attributes.clone();
	combined.extend(memorized);
	combined.extend(per_call);
	combined
}

/// Merges attribute layers in order; later layers override earlier ones.
pub fn merge_layers<I>(layers: I) -> Attributes
where
	I: IntoIterator<Item = Attributes>,
{
	layers.into_iter().fold(Attributes::new(), |mut acc, layer| {
		acc.extend(layer);
		acc
	})
}

pub fn error_attributes(payload: &ReportPayload) -> Attributes {
	let mut attributes = Attributes::new();
	attributes.insert(
		"error.message".to_string(),
		AttributeValue::from(payload.message()),
	);
	attributes
}

/// Built-in annotations. Caller annotations with the same name replace them.
pub fn builtin_annotations(payload: &ReportPayload, manifest: Option<&PackageManifest>) -> Annotations {
	let mut annotations = Annotations::new();

	let environment: Map<String, Value> = std::env::vars_os()
		.map(|(k, v)| {
			(
				k.to_string_lossy().into_owned(),
				Value::String(v.to_string_lossy().into_owned()),
			)
		})
		.collect();
	annotations.insert(ENVIRONMENT_ANNOTATION.to_string(), Value::Object(environment));

	let arguments: Vec<Value> = std::env::args_os()
		.map(|a| Value::String(a.to_string_lossy().into_owned()))
		.collect();
	annotations.insert(ARGUMENTS_ANNOTATION.to_string(), Value::Array(arguments));

	if let Some(manifest) = manifest {
		annotations.insert(
			DEPENDENCIES_ANNOTATION.to_string(),
			manifest.dependency_annotation(),
		);
	}

	if let Some(error) = payload.as_error() {
		annotations.insert(
			EXCEPTION_ANNOTATION.to_string(),
			json!({
				"name": error.name,
				"message": error.message,
				"stack": error.stack,
			}),
		);
	}

	annotations
}
