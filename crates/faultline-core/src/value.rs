// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Attribute and annotation values.
//!
//! Collectors index *attributes* (flat scalar key/value pairs) and store
//! *annotations* (arbitrary structured JSON) alongside a report. Callers hand
//! the client a single map of [`ReportValue`]s and the client routes each entry
//! by its shape: scalars become attributes, objects become annotations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flat scalar attributes, keyed by dotted names such as `uname.sysname`.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Named structured blobs attached to a report.
pub type Annotations = BTreeMap<String, serde_json::Value>;

/// Caller-supplied values before they are routed to attributes or annotations.
pub type ReportAttributes = BTreeMap<String, ReportValue>;

/// A scalar attribute value.
///
/// Deserialization tries the variants in declaration order, so JSON integers
/// land in `Int` and only fractional numbers become `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
}

impl AttributeValue {
	pub fn as_str(&self) -> Option<&str> {
		match self {
			AttributeValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			AttributeValue::Int(i) => Some(*i),
			_ => None,
		}
	}

	/// Converts a JSON scalar. Returns `None` for null, arrays and objects.
	pub fn from_json(value: &serde_json::Value) -> Option<Self> {
		match value {
			serde_json::Value::Bool(b) => Some(AttributeValue::Bool(*b)),
			serde_json::Value::Number(n) => n
				.as_i64()
				.map(AttributeValue::Int)
				.or_else(|| n.as_f64().map(AttributeValue::Float)),
			serde_json::Value::String(s) => Some(AttributeValue::String(s.clone())),
			serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
				None
			}
		}
	}
}

impl fmt::Display for AttributeValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AttributeValue::Bool(b) => write!(f, "{b}"),
			AttributeValue::Int(i) => write!(f, "{i}"),
			AttributeValue::Float(x) => write!(f, "{x}"),
			AttributeValue::String(s) => f.write_str(s),
		}
	}
}

impl From<&str> for AttributeValue {
	fn from(value: &str) -> Self {
		AttributeValue::String(value.to_string())
	}
}

impl From<String> for AttributeValue {
	fn from(value: String) -> Self {
		AttributeValue::String(value)
	}
}

impl From<bool> for AttributeValue {
	fn from(value: bool) -> Self {
		AttributeValue::Bool(value)
	}
}

impl From<f64> for AttributeValue {
	fn from(value: f64) -> Self {
		AttributeValue::Float(value)
	}
}

macro_rules! int_attribute {
	($($ty:ty),*) => {
		$(
			impl From<$ty> for AttributeValue {
				fn from(value: $ty) -> Self {
					AttributeValue::Int(i64::from(value))
				}
			}
		)*
	};
}

int_attribute!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! wide_int_attribute {
	($($ty:ty),*) => {
		$(
			impl From<$ty> for AttributeValue {
				fn from(value: $ty) -> Self {
					match i64::try_from(value) {
						Ok(v) => AttributeValue::Int(v),
						Err(_) => AttributeValue::Float(value as f64),
					}
				}
			}
		)*
	};
}

wide_int_attribute!(u64, usize, isize);

/// A value supplied by a caller, before routing.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportValue {
	Scalar(AttributeValue),
	Structured(serde_json::Value),
}

impl ReportValue {
	pub fn is_scalar(&self) -> bool {
		matches!(self, ReportValue::Scalar(_))
	}
}

impl From<AttributeValue> for ReportValue {
	fn from(value: AttributeValue) -> Self {
		ReportValue::Scalar(value)
	}
}

/// JSON scalars become [`ReportValue::Scalar`]; everything else is kept
/// structured.
impl From<serde_json::Value> for ReportValue {
	fn from(value: serde_json::Value) -> Self {
		match AttributeValue::from_json(&value) {
			Some(scalar) => ReportValue::Scalar(scalar),
			None => ReportValue::Structured(value),
		}
	}
}

macro_rules! scalar_report_value {
	($($ty:ty),*) => {
		$(
			impl From<$ty> for ReportValue {
				fn from(value: $ty) -> Self {
					ReportValue::Scalar(AttributeValue::from(value))
				}
			}
		)*
	};
}

scalar_report_value!(&str, String, bool, f64, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

/// Routes caller values by shape.
///
/// Scalars go to the attribute map and JSON objects and arrays go to the
/// annotation map, both under their original key. JSON `null` is dropped.
/// Classification is top-level only; nested content of an annotation is kept
/// as-is.
pub fn split_report_values(values: ReportAttributes) -> (Attributes, Annotations) {
	let mut attributes = Attributes::new();
	let mut annotations = Annotations::new();
	for (key, value) in values {
		match value {
			ReportValue::Scalar(scalar) => {
				attributes.insert(key, scalar);
			}
			ReportValue::Structured(serde_json::Value::Null) => {}
			ReportValue::Structured(structured) => {
				annotations.insert(key, structured);
			}
		}
	}
	(attributes, annotations)
}

/// Options for [`flatten_attributes`].
#[derive(Debug, Clone)]
pub struct FlattenOptions {
	/// Prepended to every produced key, joined with a dot.
	pub prefix: String,
	/// Descend into keys starting with `_`.
	pub include_private: bool,
	/// Objects nested deeper than this are not descended into.
	pub max_depth: usize,
}

impl Default for FlattenOptions {
	fn default() -> Self {
		Self {
			prefix: String::new(),
			include_private: false,
			max_depth: 32,
		}
	}
}

/// Walks nested JSON objects and produces dotted scalar attributes.
///
/// `{"user": {"id": 7, "tags": [1]}}` becomes `user.id = 7`; arrays, nulls and
/// `_`-prefixed keys (unless `include_private`) are skipped. A
/// `serde_json::Value` is a tree, so the walk cannot revisit an object; the
/// `max_depth` bound stops pathological nesting.
pub fn flatten_attributes(value: &serde_json::Value, options: &FlattenOptions) -> Attributes {
	let mut out = Attributes::new();
	match value {
		serde_json::Value::Object(_) => flatten_into(value, &options.prefix, 0, options, &mut out),
		scalar => {
			if let (Some(v), false) = (AttributeValue::from_json(scalar), options.prefix.is_empty()) {
				out.insert(options.prefix.clone(), v);
			}
		}
	}
	out
}

fn flatten_into(
	value: &serde_json::Value,
	prefix: &str,
	depth: usize,
	options: &FlattenOptions,
	out: &mut Attributes,
) {
	let serde_json::Value::Object(map) = value else {
		return;
	};
	if depth > options.max_depth {
		return;
	}
	for (key, child) in map {
		if !options.include_private && key.starts_with('_') {
			continue;
		}
		let dotted = if prefix.is_empty() {
			key.clone()
		} else {
			format!("{prefix}.{key}")
		};
		match child {
			serde_json::Value::Object(_) => flatten_into(child, &dotted, depth + 1, options, out),
			other => {
				if let Some(v) = AttributeValue::from_json(other) {
					out.insert(dotted, v);
				}
			}
		}
	}
}
