// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The document submitted to a collector.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::Result;
use crate::frame::{SourceCode, StackFrame};
use crate::symbol::SymbolicationMapEntry;
use crate::value::{Annotations, Attributes};

/// Name of the only thread a report carries.
pub const MAIN_THREAD: &str = "main";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadData {
	pub name: String,
	pub fault: bool,
	pub stack: Vec<StackFrame>,
}

impl ThreadData {
	pub fn faulting(stack: Vec<StackFrame>) -> Self {
		Self {
			name: MAIN_THREAD.to_string(),
			fault: true,
			stack,
		}
	}
}

/// A finalized report, serialized as the `upload_file.json` part of a
/// submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
	pub uuid: Uuid,
	/// Seconds since the Unix epoch at report creation.
	pub timestamp: i64,
	pub lang: String,
	pub lang_version: String,
	pub agent: String,
	pub agent_version: String,
	pub main_thread: String,
	pub classifiers: Vec<String>,
	pub threads: BTreeMap<String, ThreadData>,
	pub attributes: Attributes,
	pub annotations: Annotations,
	/// Snippets keyed by the id referenced from [`StackFrame::source_code`].
	pub source_code: BTreeMap<String, SourceCode>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub symbolication: Option<String>,
	#[serde(
		default,
		rename = "symbolication_maps",
		skip_serializing_if = "Option::is_none"
	)]
	pub symbolication_maps: Option<Vec<SymbolicationMapEntry>>,
}

impl ReportData {
	pub fn main_stack(&self) -> &[StackFrame] {
		self.threads
			.get(&self.main_thread)
			.map(|t| t.stack.as_slice())
			.unwrap_or(&[])
	}

	pub fn to_json(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}
}
