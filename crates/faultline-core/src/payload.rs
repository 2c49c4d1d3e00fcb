// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! What a report is about: an error value or a free-form message.

use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::error::Error as StdError;

/// An error captured for reporting.
///
/// `stack` holds the textual stack: a `"{name}: {message}"` header line
/// followed by frame lines, in the shape produced by
/// [`std::backtrace::Backtrace`]'s `Display`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub name: String,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

impl ErrorPayload {
	pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			message: message.into(),
			stack: None,
		}
	}

	pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
		self.stack = Some(stack.into());
		self
	}

	/// Captures `err` together with the current thread's backtrace.
	///
	/// The name is the error's type path with generic arguments removed, e.g.
	/// `std::io::error::Error`. The message is the error's `Display` with its
	/// `source()` chain appended after `": "`.
	pub fn capture<E: StdError>(err: &E) -> Self {
		let name = error_type_name(std::any::type_name::<E>());
		Self::capture_named(name, err)
	}

	/// Like [`ErrorPayload::capture`] for a trait object, whose concrete type
	/// name is not available; `name` is used instead.
	pub fn capture_dyn(name: impl Into<String>, err: &(dyn StdError + 'static)) -> Self {
		Self::capture_named(name.into(), err)
	}

	fn capture_named<E: StdError + ?Sized>(name: String, err: &E) -> Self {
		let message = message_with_sources(err);
		let stack = stack_text(&name, &message, &Backtrace::force_capture());
		Self {
			name,
			message,
			stack: Some(stack),
		}
	}
}

/// Joins a header line and a rendered backtrace into stack text.
pub fn stack_text(name: &str, message: &str, backtrace: &Backtrace) -> String {
	format!("{name}: {message}\n{backtrace}")
}

fn message_with_sources<E: StdError + ?Sized>(err: &E) -> String {
	let mut message = err.to_string();
	let mut source = err.source();
	while let Some(cause) = source {
		message.push_str(": ");
		message.push_str(&cause.to_string());
		source = cause.source();
	}
	message
}

fn error_type_name(type_name: &str) -> String {
	match type_name.find('<') {
		Some(idx) => type_name[..idx].to_string(),
		None => type_name.to_string(),
	}
}

/// The subject of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportPayload {
	Error(ErrorPayload),
	Message(String),
}

impl ReportPayload {
	pub fn is_error(&self) -> bool {
		matches!(self, ReportPayload::Error(_))
	}

	/// The text reported as `error.message`.
	pub fn message(&self) -> &str {
		match self {
			ReportPayload::Error(e) => &e.message,
			ReportPayload::Message(m) => m,
		}
	}

	/// `[name]` for errors, empty for messages.
	pub fn classifiers(&self) -> Vec<String> {
		match self {
			ReportPayload::Error(e) => vec![e.name.clone()],
			ReportPayload::Message(_) => Vec::new(),
		}
	}

	pub fn stack(&self) -> Option<&str> {
		match self {
			ReportPayload::Error(e) => e.stack.as_deref(),
			ReportPayload::Message(_) => None,
		}
	}

	pub fn as_error(&self) -> Option<&ErrorPayload> {
		match self {
			ReportPayload::Error(e) => Some(e),
			ReportPayload::Message(_) => None,
		}
	}
}

impl Default for ReportPayload {
	fn default() -> Self {
		ReportPayload::Message(String::new())
	}
}

impl From<ErrorPayload> for ReportPayload {
	fn from(value: ErrorPayload) -> Self {
		ReportPayload::Error(value)
	}
}

impl From<&str> for ReportPayload {
	fn from(value: &str) -> Self {
		ReportPayload::Message(value.to_string())
	}
}

impl From<String> for ReportPayload {
	fn from(value: String) -> Self {
		ReportPayload::Message(value)
	}
}
