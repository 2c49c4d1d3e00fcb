// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stack frames and source snippets.

use serde::{Deserialize, Serialize};

/// One frame of the faulting thread's stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
	pub func_name: String,
	/// Module or file path exactly as it appeared in the stack text.
	pub library: String,
	pub line: u32,
	pub column: u32,
	/// Key into the report's `sourceCode` map. Present only when a snippet
	/// for this file made it into the report.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source_code: Option<String>,
}

/// A 1-based line/column pair referenced by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
	pub line: u32,
	pub column: u32,
}

/// A contiguous excerpt of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCode {
	pub path: String,
	/// 1-based line number of the first line of `text`.
	pub start_line: u32,
	pub start_column: u32,
	pub text: String,
	pub tab_width: u32,
}
