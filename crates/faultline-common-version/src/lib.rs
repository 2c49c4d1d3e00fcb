// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Compile-time build metadata for faultline.
//!
//! The reporting client stamps every report with the language runtime it was
//! built with (`langVersion`) and identifies itself to collectors with a
//! User-Agent derived from the platform and git SHA recorded here.

shadow_rs::shadow!(build);

#[cfg(feature = "serde")]
use serde::Serialize;

/// Platform string in `{os}-{arch}` format, e.g. "linux-x86_64".
pub const PLATFORM: &str = env!("FAULTLINE_PLATFORM");

/// Build information captured by the build script.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
	pub version: &'static str,
	pub git_sha: &'static str,
	pub build_timestamp: &'static str,
	pub platform: &'static str,
	/// Full `rustc --version` output of the compiler that built this crate.
	pub rust_version: &'static str,
}

impl BuildInfo {
	#[allow(clippy::const_is_empty)]
	pub const fn current() -> Self {
		Self {
			version: build::PKG_VERSION,
			git_sha: if build::SHORT_COMMIT.is_empty() {
				"unknown"
			} else {
				build::SHORT_COMMIT
			},
			build_timestamp: build::BUILD_TIME,
			platform: PLATFORM,
			rust_version: build::RUST_VERSION,
		}
	}

	/// The bare toolchain version, e.g. `1.82.0` out of
	/// `rustc 1.82.0 (f6e511eec 2024-10-15)`.
	pub fn rustc_semver(&self) -> &'static str {
		let trimmed = self.rust_version.trim();
		let without_prefix = trimmed.strip_prefix("rustc ").unwrap_or(trimmed);
		without_prefix
			.split_whitespace()
			.next()
			.unwrap_or(without_prefix)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn build_info_has_version() {
		let info = BuildInfo::current();
		assert!(!info.version.is_empty());
		assert!(!info.git_sha.is_empty());
	}

	#[test]
	fn platform_has_os_and_arch() {
		let parts: Vec<&str> = PLATFORM.split('-').collect();
		assert_eq!(parts.len(), 2);
	}

	#[test]
	fn rustc_semver_strips_compiler_details() {
		let info = BuildInfo {
			rust_version: "rustc 1.82.0 (f6e511eec 2024-10-15)",
			..BuildInfo::current()
		};
		assert_eq!(info.rustc_semver(), "1.82.0");
	}

	#[test]
	fn rustc_semver_of_current_toolchain_starts_with_digit() {
		let semver = BuildInfo::current().rustc_semver();
		assert!(semver.chars().next().is_some_and(|c| c.is_ascii_digit()));
	}
}
