// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the reporting client.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while configuring or constructing a client.
///
/// Submission failures are not errors of this kind; they are delivered as
/// [`crate::ReportOutcome::Failed`] carrying a [`SubmissionError`].
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("missing endpoint: an endpoint is required to submit reports")]
	MissingEndpoint,

	#[error("missing token: endpoint {endpoint} requires a submission token")]
	MissingToken { endpoint: String },

	#[error("invalid endpoint {endpoint}: {reason}")]
	InvalidEndpoint { endpoint: String, reason: String },

	#[error("invalid option {key}: {message}")]
	InvalidOptions { key: String, message: String },

	#[error("a global panic handler is already registered; set allow_multiple_uncaught_exception_listeners to add another")]
	HandlerAlreadyRegistered,

	#[error("no client has been initialized")]
	NotInitialized,

	#[error("failed to read config file {path}: {source}")]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file {path}: {source}")]
	ConfigParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("failed to build HTTP client: {0}")]
	HttpClient(#[from] reqwest::Error),

	#[error(transparent)]
	Core(#[from] faultline_core::CoreError),
}

/// Why a report did not reach the collector.
#[derive(Debug, Error)]
pub enum SubmissionError {
	#[error("server error (status {status}): {message}")]
	ServerError { status: u16, message: String },

	#[error("unable to send report: {endpoint} reset the connection")]
	ConnectionReset { endpoint: String },

	#[error("submission timed out")]
	Timeout,

	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	#[error("transport error: {0}")]
	Transport(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("submission worker failed: {0}")]
	Worker(String),
}

impl From<faultline_core::CoreError> for SubmissionError {
	fn from(err: faultline_core::CoreError) -> Self {
		match err {
			faultline_core::CoreError::Serialization(e) => SubmissionError::Serialization(e),
			other => SubmissionError::Transport(other.to_string()),
		}
	}
}

pub type Result<T> = std::result::Result<T, ClientError>;
