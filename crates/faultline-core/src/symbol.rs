// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Symbolication maps.
//!
//! When symbolication is enabled a report names the source files its stack
//! touched and a content-derived id for each, so a collector can match frames
//! against previously uploaded source maps.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Value of the report's `symbolication` field when maps are attached.
pub const SOURCEMAP_SYMBOLICATION: &str = "sourcemap";

/// Pairs a source file with the id of its uploaded map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolicationMapEntry {
	pub file: String,
	pub uuid: String,
}

impl SymbolicationMapEntry {
	pub fn new(file: impl Into<String>, uuid: impl Into<String>) -> Self {
		Self {
			file: file.into(),
			uuid: uuid.into(),
		}
	}
}

/// Content-addressed id for a file: the first 16 bytes of the SHA-256 digest
/// of `bytes`, formatted 8-4-4-4-12.
///
/// Identical content always maps to the same id, regardless of path.
pub fn content_uuid(bytes: &[u8]) -> String {
	let digest = Sha256::digest(bytes);
	let mut head = [0u8; 16];
	head.copy_from_slice(&digest[..16]);
	Uuid::from_bytes(head).hyphenated().to_string()
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
	hex::encode(Sha256::digest(bytes))
}

/// Rejects maps with entries missing a file or a uuid.
pub fn validate_symbolication_map(entries: &[SymbolicationMapEntry]) -> Result<()> {
	for (index, entry) in entries.iter().enumerate() {
		if entry.file.trim().is_empty() {
			return Err(CoreError::InvalidSymbolicationMap(format!(
				"entry {index} has an empty file"
			)));
		}
		if entry.uuid.trim().is_empty() {
			return Err(CoreError::InvalidSymbolicationMap(format!(
				"entry {index} ({}) has an empty uuid",
				entry.file
			)));
		}
	}
	Ok(())
}
