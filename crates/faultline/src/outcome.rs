// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::error::SubmissionError;

/// Body of a collector's reply to an accepted report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResponse {
	#[serde(rename = "_rxid", default)]
	pub rx_id: Option<String>,
	#[serde(default)]
	pub fingerprint: Option<String>,
	#[serde(default)]
	pub response: Option<String>,
	#[serde(default)]
	pub unique: Option<bool>,
	/// The unparsed reply body.
	#[serde(skip)]
	pub raw: String,
}

impl SubmissionResponse {
	/// Parses a reply body. Bodies that are not the expected JSON still
	/// produce a response carrying `raw`.
	pub fn from_body(body: String) -> Self {
		let mut parsed: SubmissionResponse = serde_json::from_str(&body).unwrap_or_default();
		parsed.raw = body;
		parsed
	}
}

/// What happened to a report.
#[derive(Debug)]
pub enum ReportOutcome {
	/// The collector answered 200.
	Submitted(SubmissionResponse),
	/// Dropped by sampling; nothing was sent.
	SamplingHit,
	/// Dropped by the rate limit; nothing was sent.
	RateLimited,
	Failed(SubmissionError),
}

/// Payload-free summary of a [`ReportOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
	Submitted,
	SamplingHit,
	RateLimited,
	Failed,
}

impl ReportOutcome {
	pub fn kind(&self) -> OutcomeKind {
		match self {
			ReportOutcome::Submitted(_) => OutcomeKind::Submitted,
			ReportOutcome::SamplingHit => OutcomeKind::SamplingHit,
			ReportOutcome::RateLimited => OutcomeKind::RateLimited,
			ReportOutcome::Failed(_) => OutcomeKind::Failed,
		}
	}

	pub fn is_submitted(&self) -> bool {
		matches!(self, ReportOutcome::Submitted(_))
	}

	pub fn response(&self) -> Option<&SubmissionResponse> {
		match self {
			ReportOutcome::Submitted(response) => Some(response),
			_ => None,
		}
	}

	pub fn error(&self) -> Option<&SubmissionError> {
		match self {
			ReportOutcome::Failed(err) => Some(err),
			_ => None,
		}
	}
}
