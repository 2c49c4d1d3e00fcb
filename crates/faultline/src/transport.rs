// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Submission URLs, multipart encoding and the HTTP transport.
//!
//! A report is POSTed once as `multipart/form-data`: the JSON document in an
//! `upload_file` part named `upload_file.json`, followed by one part per
//! readable attachment. There are no retries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use faultline_core::ReportData;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use tracing::debug;

use crate::error::{ClientError, SubmissionError};
use crate::outcome::{ReportOutcome, SubmissionResponse};

/// Host of the managed collection service. Endpoints on this host already
/// encode the universe and token in their path and are used verbatim.
pub const MANAGED_SUBMISSION_HOST: &str = "submit.backtrace.io";

pub const UPLOAD_FIELD: &str = "upload_file";
pub const UPLOAD_FILE_NAME: &str = "upload_file.json";

/// Length of a submission token embedded in a managed endpoint path.
const EMBEDDED_TOKEN_LEN: usize = 64;

/// Builds the URL reports are POSTed to.
///
/// Managed endpoints and endpoints that already carry a `token` query
/// parameter are used as given (a scheme-less managed endpoint gets
/// `https://`). Anything else needs `token` and becomes
/// `{endpoint}/post?format=json&token={token}`.
pub fn submission_url(endpoint: &str, token: Option<&str>) -> Result<String, ClientError> {
	let endpoint = endpoint.trim();
	if endpoint.is_empty() {
		return Err(ClientError::MissingEndpoint);
	}

	if endpoint.contains(MANAGED_SUBMISSION_HOST) {
		if endpoint.contains("://") {
			return Ok(endpoint.to_string());
		}
		return Ok(format!("https://{endpoint}"));
	}

	let parsed = Url::parse(endpoint).map_err(|e| ClientError::InvalidEndpoint {
		endpoint: endpoint.to_string(),
		reason: e.to_string(),
	})?;
	if parsed.query_pairs().any(|(k, _)| k == "token") {
		return Ok(endpoint.to_string());
	}

	let token = token
		.filter(|t| !t.is_empty())
		.ok_or_else(|| ClientError::MissingToken {
			endpoint: endpoint.to_string(),
		})?;
	let separator = if endpoint.ends_with('/') { "" } else { "/" };
	Ok(format!("{endpoint}{separator}post?format=json&token={token}"))
}

/// Universe and token identified by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointParams {
	pub universe: String,
	pub token: Option<String>,
}

/// Extracts the universe (and token, when recoverable) from an endpoint.
///
/// Managed endpoints look like `https://submit.backtrace.io/{universe}/{token}/json`
/// and must embed a 64 character token unless `token` is given. Self-hosted
/// endpoints take the universe from the first label of the host name.
pub fn endpoint_params(endpoint: &str, token: Option<&str>) -> Option<EndpointParams> {
	if endpoint.is_empty() {
		return None;
	}

	if endpoint.contains(MANAGED_SUBMISSION_HOST) {
		const MARKER: &str = "backtrace.io/";
		let start = endpoint.find(MARKER)? + MARKER.len();
		let universe_end = start + endpoint[start..].find('/')?;
		let universe = endpoint[start..universe_end].to_string();

		let token = match token {
			Some(t) => t.to_string(),
			None => {
				let last_separator = endpoint.rfind('/')?;
				if last_separator == universe_end {
					return None;
				}
				let embedded = &endpoint[universe_end + 1..last_separator];
				if embedded.len() != EMBEDDED_TOKEN_LEN {
					return None;
				}
				embedded.to_string()
			}
		};
		return Some(EndpointParams {
			universe,
			token: Some(token),
		});
	}

	let url = Url::parse(endpoint).ok()?;
	let host = url.host_str()?;
	let (universe, _) = host.split_once('.')?;
	Some(EndpointParams {
		universe: universe.to_string(),
		token: token.map(str::to_string),
	})
}

/// One file part of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
	pub field_name: String,
	pub file_name: String,
	pub bytes: Vec<u8>,
}

/// Everything sent for one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionBody {
	pub json: String,
	pub attachments: Vec<Attachment>,
}

impl SubmissionBody {
	/// Serializes `data` and reads the attachment files. Attachments that do
	/// not exist or cannot be read are skipped.
	pub async fn encode(data: &ReportData, attachments: &[PathBuf], debug: bool) -> Result<Self, SubmissionError> {
		let json = data.to_json()?;
		let mut parts = Vec::with_capacity(attachments.len());
		for path in attachments {
			let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
				degraded!(debug, path = %path.display(), "attachment has no file name, skipping");
				continue;
			};
			match tokio::fs::read(path).await {
				Ok(bytes) => parts.push(Attachment {
					field_name: format!("attachment_{file_name}"),
					file_name,
					bytes,
				}),
				Err(e) => {
					degraded!(debug, path = %path.display(), error = %e, "attachment unreadable, skipping");
				}
			}
		}
		Ok(Self {
			json,
			attachments: parts,
		})
	}
}

/// Status and body of a collector reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
	pub status: u16,
	pub body: String,
}

/// Delivers an encoded report to a URL.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn submit(&self, url: &str, body: SubmissionBody) -> Result<TransportResponse, SubmissionError>;

	/// A transport safe to drive from a short-lived runtime on another
	/// thread, if this one holds state bound to the runtime it was first used
	/// on. `None` means `self` can be shared.
	fn isolated(&self) -> Option<Arc<dyn Transport>> {
		None
	}
}

/// The default transport, backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
	client: reqwest::Client,
	timeout: Duration,
}

impl ReqwestTransport {
	pub fn new(timeout: Duration) -> reqwest::Result<Self> {
		Ok(Self {
			client: faultline_common_http::client_with_timeout(timeout)?,
			timeout,
		})
	}

	fn form(body: SubmissionBody) -> reqwest::Result<Form> {
		let report = Part::text(body.json)
			.file_name(UPLOAD_FILE_NAME)
			.mime_str("application/json")?;
		let mut form = Form::new().part(UPLOAD_FIELD, report);
		for attachment in body.attachments {
			form = form.part(
				attachment.field_name,
				Part::bytes(attachment.bytes).file_name(attachment.file_name),
			);
		}
		Ok(form)
	}
}

#[async_trait]
impl Transport for ReqwestTransport {
	async fn submit(&self, url: &str, body: SubmissionBody) -> Result<TransportResponse, SubmissionError> {
		let form = Self::form(body)?;
		debug!(url = %redact_query(url), "posting report");

		let response = self
			.client
			.post(url)
			.multipart(form)
			.send()
			.await
			.map_err(|e| classify_request_error(e, url))?;
		let status = response.status().as_u16();
		let body = response
			.text()
			.await
			.map_err(|e| classify_request_error(e, url))?;
		Ok(TransportResponse { status, body })
	}

	fn isolated(&self) -> Option<Arc<dyn Transport>> {
		// Pooled connections belong to the runtime that opened them.
		ReqwestTransport::new(self.timeout)
			.ok()
			.map(|t| Arc::new(t) as Arc<dyn Transport>)
	}
}

/// Maps a collector reply to an outcome: 200 is success, anything else is a
/// server error carrying the body.
pub fn classify_response(response: TransportResponse) -> ReportOutcome {
	if response.status == 200 {
		ReportOutcome::Submitted(SubmissionResponse::from_body(response.body))
	} else {
		ReportOutcome::Failed(SubmissionError::ServerError {
			status: response.status,
			message: response.body,
		})
	}
}

fn classify_request_error(err: reqwest::Error, url: &str) -> SubmissionError {
	if err.is_timeout() {
		return SubmissionError::Timeout;
	}
	if is_connection_reset(&err) {
		return SubmissionError::ConnectionReset {
			endpoint: redact_query(url).to_string(),
		};
	}
	SubmissionError::RequestFailed(err)
}

fn is_connection_reset(err: &(dyn std::error::Error + 'static)) -> bool {
	let mut current = Some(err);
	while let Some(e) = current {
		if let Some(io) = e.downcast_ref::<std::io::Error>() {
			if io.kind() == std::io::ErrorKind::ConnectionReset {
				return true;
			}
		}
		current = e.source();
	}
	false
}

/// Drops the query string, which carries the submission token.
pub(crate) fn redact_query(url: &str) -> &str {
	url.split_once('?').map(|(base, _)| base).unwrap_or(url)
}

#[cfg(test)]
mod tests {
	use super::*;

	const TOKEN: &str = "55555111112345eb7ae344f6e002de2e20c81fbdedf6991c2f3bb45b32b55555";

	#[test]
	fn self_hosted_endpoint_gets_post_path() {
		assert_eq!(
			submission_url("https://yolo.sp.backtrace.io:6098", Some("t")).unwrap(),
			"https://yolo.sp.backtrace.io:6098/post?format=json&token=t"
		);
		assert_eq!(
			submission_url("https://collector.example.com/", Some("t")).unwrap(),
			"https://collector.example.com/post?format=json&token=t"
		);
	}

	#[test]
	fn managed_endpoint_is_used_verbatim() {
		let endpoint = format!("https://submit.backtrace.io/universe/{TOKEN}/json");
		assert_eq!(submission_url(&endpoint, None).unwrap(), endpoint);
		assert_eq!(
			submission_url(&format!("submit.backtrace.io/universe/{TOKEN}/json"), None).unwrap(),
			format!("https://submit.backtrace.io/universe/{TOKEN}/json")
		);
	}

	#[test]
	fn endpoint_with_token_query_is_used_verbatim() {
		let endpoint = "https://collector.example.com/post?format=json&token=abc";
		assert_eq!(submission_url(endpoint, None).unwrap(), endpoint);
	}

	#[test]
	fn missing_token_is_an_error() {
		assert!(matches!(
			submission_url("https://collector.example.com", None),
			Err(ClientError::MissingToken { .. })
		));
		assert!(matches!(
			submission_url("https://collector.example.com", Some("")),
			Err(ClientError::MissingToken { .. })
		));
	}

	#[test]
	fn empty_or_unparseable_endpoints_are_errors() {
		assert!(matches!(submission_url("  ", Some("t")), Err(ClientError::MissingEndpoint)));
		assert!(matches!(
			submission_url("blah", Some("t")),
			Err(ClientError::InvalidEndpoint { .. })
		));
	}

	#[test]
	fn managed_endpoint_params() {
		let params = endpoint_params(&format!("https://submit.backtrace.io/yolo/{TOKEN}/json"), None).unwrap();
		assert_eq!(params.universe, "yolo");
		assert_eq!(params.token.as_deref(), Some(TOKEN));
	}

	#[test]
	fn managed_endpoint_with_extra_segments_is_rejected() {
		let endpoint = format!("https://submit.backtrace.io/yolo/definitely-not-a-valid-url/{TOKEN}/json");
		assert!(endpoint_params(&endpoint, None).is_none());
	}

	#[test]
	fn managed_endpoint_without_token_is_rejected() {
		assert!(endpoint_params("https://submit.backtrace.io/yolo", None).is_none());
	}

	#[test]
	fn self_hosted_endpoint_params() {
		let params = endpoint_params("https://yolo.backtrace.io/", Some(TOKEN)).unwrap();
		assert_eq!(params.universe, "yolo");
		assert_eq!(params.token.as_deref(), Some(TOKEN));

		let params = endpoint_params("https://yolo-with-sp.sp.backtrace.io/", None).unwrap();
		assert_eq!(params.universe, "yolo-with-sp");
		assert_eq!(params.token, None);
	}

	#[test]
	fn classify_by_status() {
		let ok = classify_response(TransportResponse {
			status: 200,
			body: r#"{"_rxid":"x"}"#.into(),
		});
		assert_eq!(ok.response().and_then(|r| r.rx_id.as_deref()), Some("x"));

		let failed = classify_response(TransportResponse {
			status: 500,
			body: "boom".into(),
		});
		assert!(matches!(
			failed,
			ReportOutcome::Failed(SubmissionError::ServerError { status: 500, ref message }) if message == "boom"
		));

		let redirect = classify_response(TransportResponse {
			status: 204,
			body: String::new(),
		});
		assert!(matches!(redirect, ReportOutcome::Failed(_)));
	}

	#[test]
	fn connection_reset_is_found_in_source_chain() {
		#[derive(Debug)]
		struct Wrapper(std::io::Error);
		impl std::fmt::Display for Wrapper {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				f.write_str("wrapped")
			}
		}
		impl std::error::Error for Wrapper {
			fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
				Some(&self.0)
			}
		}

		let reset = Wrapper(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
		assert!(is_connection_reset(&reset));
		let refused = Wrapper(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
		assert!(!is_connection_reset(&refused));
	}

	#[test]
	fn redaction_strips_token() {
		assert_eq!(
			redact_query("https://c.example.com/post?format=json&token=secret"),
			"https://c.example.com/post"
		);
	}

	#[tokio::test]
	async fn encoding_skips_missing_attachments() {
		let dir = tempfile::tempdir().unwrap();
		let present = dir.path().join("log.txt");
		std::fs::write(&present, b"hello").unwrap();
		let data: ReportData = serde_json::from_value(serde_json::json!({
			"uuid": "67e55044-10b1-426f-9247-bb680e5fe0c8",
			"timestamp": 0,
			"lang": "rust",
			"langVersion": "1",
			"agent": "faultline",
			"agentVersion": "0",
			"mainThread": "main",
			"classifiers": [],
			"threads": {},
			"attributes": {},
			"annotations": {},
			"sourceCode": {}
		}))
		.unwrap();

		let body = SubmissionBody::encode(&data, &[present, dir.path().join("missing.txt")], false)
			.await
			.unwrap();

		assert_eq!(body.attachments.len(), 1);
		assert_eq!(body.attachments[0].field_name, "attachment_log.txt");
		assert_eq!(body.attachments[0].bytes, b"hello");
		assert!(body.json.contains("\"langVersion\":\"1\""));
	}
}
