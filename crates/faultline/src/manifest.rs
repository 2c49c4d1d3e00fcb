// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Locating and reading the package manifest of the code that raised a report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use faultline_core::{AttributeValue, Attributes};
use serde_json::json;
use tracing::trace;

/// Parent directories searched above the starting directory.
pub const MANIFEST_SEARCH_DEPTH: usize = 5;

const MANIFEST_FILE: &str = "Cargo.toml";

/// Package metadata read from a `Cargo.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
	pub path: PathBuf,
	pub name: Option<String>,
	pub version: Option<String>,
	pub description: Option<String>,
	pub authors: Vec<String>,
	pub dependencies: BTreeMap<String, String>,
	pub dev_dependencies: BTreeMap<String, String>,
}

impl PackageManifest {
	/// Parses manifest text. Returns `None` for malformed TOML and for
	/// manifests without a `[package]` table (virtual workspace roots).
	pub fn parse(path: PathBuf, content: &str) -> Option<Self> {
		let doc: toml::Table = content.parse().ok()?;
		let package = doc.get("package")?.as_table()?;
		let string = |key: &str| {
			package
				.get(key)
				.and_then(|v| v.as_str())
				.map(str::to_string)
		};

		Some(Self {
			path,
			name: string("name"),
			version: string("version"),
			description: string("description"),
			authors: package
				.get("authors")
				.and_then(|v| v.as_array())
				.map(|a| {
					a.iter()
						.filter_map(|v| v.as_str().map(str::to_string))
						.collect()
				})
				.unwrap_or_default(),
			dependencies: dependency_table(doc.get("dependencies")),
			dev_dependencies: dependency_table(doc.get("dev-dependencies")),
		})
	}

	/// `application`, `version`, `description` and `author` attributes.
	pub fn attributes(&self) -> Attributes {
		let mut attributes = Attributes::new();
		let entries = [
			("application", self.name.clone()),
			("version", self.version.clone()),
			("description", self.description.clone()),
			("author", (!self.authors.is_empty()).then(|| self.authors.join(", "))),
		];
		for (key, value) in entries {
			if let Some(value) = value {
				attributes.insert(key.to_string(), AttributeValue::String(value));
			}
		}
		attributes
	}

	/// The `Dependencies` annotation body.
	pub fn dependency_annotation(&self) -> serde_json::Value {
		json!({
			"requestedVersions": self.dependencies,
			"devDependencies": self.dev_dependencies,
		})
	}
}

/// Renders each dependency requirement as a short string: the version
/// requirement when present, otherwise its `path`, `git` or workspace
/// origin.
fn dependency_table(value: Option<&toml::Value>) -> BTreeMap<String, String> {
	let Some(table) = value.and_then(|v| v.as_table()) else {
		return BTreeMap::new();
	};
	table
		.iter()
		.map(|(name, spec)| (name.clone(), dependency_requirement(spec)))
		.collect()
}

fn dependency_requirement(spec: &toml::Value) -> String {
	if let Some(version) = spec.as_str() {
		return version.to_string();
	}
	let Some(table) = spec.as_table() else {
		return spec.to_string();
	};
	if let Some(version) = table.get("version").and_then(|v| v.as_str()) {
		return version.to_string();
	}
	if table.get("workspace").and_then(|v| v.as_bool()) == Some(true) {
		return "workspace".to_string();
	}
	if let Some(path) = table.get("path").and_then(|v| v.as_str()) {
		return format!("path:{path}");
	}
	if let Some(git) = table.get("git").and_then(|v| v.as_str()) {
		return format!("git:{git}");
	}
	"*".to_string()
}

/// Finds the nearest package manifest at or above `start` (a file or
/// directory), looking at most [`MANIFEST_SEARCH_DEPTH`] parents up.
pub async fn find_manifest(start: &Path) -> Option<PackageManifest> {
	let mut dir = if tokio::fs::metadata(start).await.ok()?.is_dir() {
		start.to_path_buf()
	} else {
		start.parent()?.to_path_buf()
	};

	for _ in 0..=MANIFEST_SEARCH_DEPTH {
		let candidate = dir.join(MANIFEST_FILE);
		if let Ok(content) = tokio::fs::read_to_string(&candidate).await {
			if let Some(manifest) = PackageManifest::parse(candidate.clone(), &content) {
				trace!(path = %candidate.display(), "found package manifest");
				return Some(manifest);
			}
		}
		dir = dir.parent()?.to_path_buf();
	}
	None
}

/// Manifest for the calling module, falling back to the working directory.
pub async fn resolve_manifest(calling_module: Option<&Path>) -> Option<PackageManifest> {
	if let Some(module) = calling_module {
		if let Some(manifest) = find_manifest(module).await {
			return Some(manifest);
		}
	}
	let cwd = std::env::current_dir().ok()?;
	find_manifest(&cwd).await
}
