// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the faultline error-reporting client.
//!
//! This crate holds the data model shared by the client SDK and anything that
//! wants to inspect what the SDK submits:
//! - [`ReportPayload`], the error or message a report is about
//! - attribute and annotation values, and the flattening rules applied to
//!   structured attributes
//! - stack frames and source snippets
//! - [`ReportData`], the JSON document submitted to a collector
//! - symbolication map entries and content-addressed file ids
//!
//! Nothing in here performs I/O except [`ErrorPayload::capture`], which walks
//! the current thread's stack.

pub mod data;
pub mod error;
pub mod frame;
pub mod payload;
pub mod symbol;
pub mod value;

pub use data::{ReportData, ThreadData, MAIN_THREAD};
pub use error::{CoreError, Result};
pub use frame::{SourceCode, SourceLocation, StackFrame};
pub use payload::{stack_text, ErrorPayload, ReportPayload};
pub use symbol::{
	content_digest, content_uuid, validate_symbolication_map, SymbolicationMapEntry,
	SOURCEMAP_SYMBOLICATION,
};
pub use value::{
	flatten_attributes, split_report_values, Annotations, AttributeValue, Attributes,
	FlattenOptions, ReportAttributes, ReportValue,
};

use std::fmt;
use std::str::FromStr;

/// Source directory of this crate. Stack frames under it belong to the SDK
/// and are left out of reports.
pub const CRATE_SOURCE_DIR: &str = env!("CARGO_MANIFEST_DIR");

use uuid::Uuid;

/// Unique identifier assigned to a report when it is created.
///
/// Serialized into the submitted document as `uuid`; collectors use it to
/// deduplicate resubmissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ReportId(pub Uuid);

impl ReportId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for ReportId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ReportId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ReportId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn report_ids_are_random_v4() {
		let a = ReportId::new();
		let b = ReportId::new();
		assert_ne!(a, b);
		assert_eq!(a.0.get_version_num(), 4);
	}

	proptest! {
		#[test]
		fn report_id_roundtrip(uuid_bytes in any::<[u8; 16]>()) {
			let id = ReportId(Uuid::from_bytes(uuid_bytes));
			let parsed: ReportId = id.to_string().parse().unwrap();
			prop_assert_eq!(id, parsed);
		}
	}
}
