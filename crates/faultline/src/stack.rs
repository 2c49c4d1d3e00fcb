// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Parsing textual stack traces into frames.
//!
//! Two frame shapes are recognised:
//!
//! ```text
//!     at render (/srv/app/src/view.rs:17:3)        single line
//!    4: app::view::render                          header line
//!              at ./src/view.rs:17:3               location line
//! ```
//!
//! The second is what [`std::backtrace::Backtrace`] prints. The first line of
//! the text is the error header and is never treated as a frame.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use faultline_core::{SourceLocation, StackFrame};
use regex::Regex;
use rustc_demangle::demangle;

static INLINE_FRAME: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^\s+at (.+) \((.+):(\d+):(\d+)\)\s*$").expect("valid inline frame pattern")
});

static FRAME_HEADER: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^\s*\d+:\s+(.+?)\s*$").expect("valid frame header pattern"));

static FRAME_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^\s*at\s+(.+):(\d+):(\d+)\s*$").expect("valid frame location pattern")
});

/// Path fragments marking third-party or toolchain code.
const DEPENDENCY_MARKERS: &[&str] = &["/.cargo/registry/", "/.cargo/git/", "/rustc/"];

/// Result of parsing one stack text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedStack {
	pub frames: Vec<StackFrame>,
	/// Readable source files referenced by the frames, keyed by canonical
	/// path, with every location each one was referenced at.
	pub requested: BTreeMap<PathBuf, Vec<SourceLocation>>,
	/// Source file of the first frame outside the library and outside
	/// third-party code. Anchors the manifest lookup.
	pub calling_module: Option<PathBuf>,
}

/// Turns stack text into [`ParsedStack`]s.
#[derive(Debug, Clone)]
pub struct StackParser {
	library_paths: Vec<PathBuf>,
	cwd: Option<PathBuf>,
}

impl StackParser {
	/// Frames whose files live under any of `library_paths` are dropped.
	pub fn new(library_paths: impl IntoIterator<Item = PathBuf>) -> Self {
		let library_paths = library_paths
			.into_iter()
			.map(|p| std::fs::canonicalize(&p).unwrap_or(p))
			.collect();
		Self {
			library_paths,
			cwd: std::env::current_dir().ok(),
		}
	}

	pub fn parse(&self, stack: &str) -> ParsedStack {
		let mut parsed = ParsedStack::default();
		let mut pending_function: Option<String> = None;

		for line in stack.lines().skip(1) {
			if let Some(caps) = INLINE_FRAME.captures(line) {
				pending_function = None;
				self.push_frame(&mut parsed, &caps[1], &caps[2], &caps[3], &caps[4]);
			} else if let Some(caps) = FRAME_HEADER.captures(line) {
				pending_function = Some(format!("{:#}", demangle(&caps[1])));
			} else if let Some(caps) = FRAME_LOCATION.captures(line) {
				if let Some(function) = pending_function.take() {
					self.push_frame(&mut parsed, &function, &caps[1], &caps[2], &caps[3]);
				}
			}
		}

		parsed
	}

	fn push_frame(&self, parsed: &mut ParsedStack, function: &str, path: &str, line: &str, column: &str) {
		let (Ok(line), Ok(column)) = (line.parse::<u32>(), column.parse::<u32>()) else {
			return;
		};
		let absolute = self.absolute(path);
		let resolved = std::fs::canonicalize(&absolute).ok();
		let located = resolved.as_deref().unwrap_or(&absolute);
		if self.is_library(located, path) {
			return;
		}

		let mut frame = StackFrame {
			func_name: function.to_string(),
			library: path.to_string(),
			line,
			column,
			source_code: None,
		};

		if let Some(file) = resolved.filter(|p| p.is_file()) {
			frame.source_code = Some(file.to_string_lossy().into_owned());
			if parsed.calling_module.is_none() && !is_dependency_path(&file) {
				parsed.calling_module = Some(file.clone());
			}
			parsed
				.requested
				.entry(file)
				.or_default()
				.push(SourceLocation { line, column });
		}

		parsed.frames.push(frame);
	}

	fn absolute(&self, path: &str) -> PathBuf {
		let path = Path::new(path);
		match (&self.cwd, path.is_absolute()) {
			(Some(cwd), false) => cwd.join(path),
			_ => path.to_path_buf(),
		}
	}

	fn is_library(&self, located: &Path, original: &str) -> bool {
		if self.library_paths.iter().any(|lib| located.starts_with(lib)) {
			return true;
		}
		// Workspace members are compiled with paths relative to the workspace
		// root, which need not be the current directory.
		let original = Path::new(original);
		if original.is_absolute() {
			return false;
		}
		let package_dir: PathBuf = original
			.components()
			.take_while(|c| c.as_os_str() != "src")
			.filter(|c| matches!(c, Component::Normal(_)))
			.collect();
		!package_dir.as_os_str().is_empty() && self.library_paths.iter().any(|lib| lib.ends_with(&package_dir))
	}
}

fn is_dependency_path(path: &Path) -> bool {
	let text = path.to_string_lossy();
	DEPENDENCY_MARKERS.iter().any(|marker| text.contains(marker))
}
