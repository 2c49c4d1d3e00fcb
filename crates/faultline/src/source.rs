// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reading source snippets around the lines a stack references.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use faultline_core::{SourceCode, SourceLocation};
use futures::future::join_all;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// A half-open range of 0-based line indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineWindow {
	pub start: u32,
	pub end: u32,
}

/// Extracts one snippet per source file, covering every line referenced in
/// that file plus `context_line_count` lines on each side.
#[derive(Debug, Clone, Copy)]
pub struct SourceResolver {
	tab_width: u32,
	context_line_count: u32,
	debug: bool,
}

impl SourceResolver {
	pub fn new(tab_width: u32, context_line_count: u32, debug: bool) -> Self {
		Self {
			tab_width,
			context_line_count,
			debug,
		}
	}

	/// The window for a set of 1-based locations, or `None` when there are
	/// none. The start is clipped at the top of the file; the end may run
	/// past the last line, which simply yields fewer lines.
	pub fn window(&self, locations: &[SourceLocation]) -> Option<LineWindow> {
		let min_line = locations.iter().map(|l| l.line).min()?;
		let max_line = locations.iter().map(|l| l.line).max()?;
		Some(LineWindow {
			start: min_line
				.saturating_sub(1)
				.saturating_sub(self.context_line_count),
			end: max_line.saturating_add(self.context_line_count),
		})
	}

	/// Reads the snippet for one file. Lines keep their original line
	/// terminators.
	pub async fn read_snippet(&self, path: &Path, locations: &[SourceLocation]) -> io::Result<SourceCode> {
		let window = self.window(locations).ok_or_else(|| {
			io::Error::new(io::ErrorKind::InvalidInput, "no lines referenced")
		})?;

		let mut reader = BufReader::new(File::open(path).await?);
		let mut text = String::new();
		let mut line = String::new();
		let mut index: u32 = 0;
		while index < window.end {
			line.clear();
			if reader.read_line(&mut line).await? == 0 {
				break;
			}
			if index >= window.start {
				text.push_str(&line);
			}
			index += 1;
		}

		Ok(SourceCode {
			path: path.to_string_lossy().into_owned(),
			start_line: window.start + 1,
			start_column: 1,
			text,
			tab_width: self.tab_width,
		})
	}

	/// Reads all requested files concurrently. Files that cannot be read are
	/// left out of the result; the report goes out without them.
	pub async fn resolve_all(
		&self,
		requested: &BTreeMap<PathBuf, Vec<SourceLocation>>,
	) -> BTreeMap<String, SourceCode> {
		let reads = requested.iter().map(|(path, locations)| async move {
			(path, self.read_snippet(path, locations).await)
		});

		let mut snippets = BTreeMap::new();
		for (path, result) in join_all(reads).await {
			match result {
				Ok(snippet) => {
					snippets.insert(path.to_string_lossy().into_owned(), snippet);
				}
				Err(e) => {
					degraded!(self.debug, path = %path.display(), error = %e, "source file unreadable, omitting snippet");
				}
			}
		}
		snippets
	}
}
