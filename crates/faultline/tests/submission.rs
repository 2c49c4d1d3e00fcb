// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end submission against a local collector.

use std::time::Duration;

use faultline::{CrashClient, ErrorPayload, OutcomeKind, ReportOptions, ReportOutcome, SubmissionError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const ACCEPTED: &str = r#"{"response":"ok","_rxid":"rx-42","fingerprint":"f","unique":true}"#;

async fn collector(status: u16, body: &str) -> MockServer {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/post"))
		.and(query_param("format", "json"))
		.and(query_param("token", "secret"))
		.respond_with(ResponseTemplate::new(status).set_body_string(body))
		.mount(&server)
		.await;
	server
}

fn client_for(server: &MockServer) -> faultline::CrashClientBuilder {
	CrashClient::builder()
		.endpoint(server.uri())
		.token("secret")
		.disable_global_handler(true)
}

async fn requests(server: &MockServer) -> Vec<Request> {
	server.received_requests().await.unwrap_or_default()
}

fn body_text(request: &Request) -> String {
	String::from_utf8_lossy(&request.body).into_owned()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_error_report_is_posted() {
	let server = collector(200, ACCEPTED).await;
	let client = client_for(&server).build().unwrap();

	let outcome = tokio::task::spawn_blocking(move || {
		let err = std::io::Error::other("x");
		client.report_sync(ErrorPayload::capture(&err), ReportOptions::default())
	})
	.await
	.unwrap();

	assert_eq!(outcome.response().unwrap().rx_id.as_deref(), Some("rx-42"));

	let received = requests(&server).await;
	assert_eq!(received.len(), 1);
	let body = body_text(&received[0]);
	assert!(body.contains(r#"name="upload_file""#));
	assert!(body.contains("upload_file.json"));
	assert!(body.contains(r#""error.message":"x""#));
	assert!(body.contains(r#""classifiers":["std::io::error::Error"]"#));
	assert!(body.contains(r#""lang":"rust""#));
}

#[tokio::test]
async fn async_message_report_is_posted() {
	let server = collector(200, ACCEPTED).await;
	let client = client_for(&server).attribute("service", "billing").build().unwrap();

	let outcome = client
		.report_async("disk almost full", ReportOptions::new().attribute("free_mb", 12))
		.await;
	assert!(outcome.is_submitted());

	let body = body_text(&requests(&server).await[0]);
	assert!(body.contains(r#""service":"billing""#));
	assert!(body.contains(r#""free_mb":12"#));
	assert!(body.contains(r#""error.message":"disk almost full""#));
}

#[tokio::test]
async fn sampling_zero_sends_nothing() {
	let server = collector(200, ACCEPTED).await;
	let client = client_for(&server).sampling(0.0).build().unwrap();

	for _ in 0..5 {
		assert_eq!(client.report_message("m").await.kind(), OutcomeKind::SamplingHit);
	}
	assert!(requests(&server).await.is_empty());
}

#[tokio::test]
async fn rate_limit_allows_one_per_window() {
	let server = collector(200, ACCEPTED).await;
	let client = client_for(&server).rate_limit(1).build().unwrap();

	assert!(client.report_message("first").await.is_submitted());
	assert_eq!(client.report_message("second").await.kind(), OutcomeKind::RateLimited);
	assert_eq!(requests(&server).await.len(), 1);
}

#[tokio::test]
async fn non_200_reply_is_a_server_error() {
	let server = collector(500, "collector unavailable").await;
	let client = client_for(&server).build().unwrap();

	match client.report_message("m").await {
		ReportOutcome::Failed(SubmissionError::ServerError { status, message }) => {
			assert_eq!(status, 500);
			assert_eq!(message, "collector unavailable");
		}
		other => panic!("unexpected outcome {other:?}"),
	}
}

#[tokio::test]
async fn slow_collector_times_out() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
		.mount(&server)
		.await;
	let client = client_for(&server)
		.timeout(Duration::from_millis(200))
		.build()
		.unwrap();

	let outcome = client.report_message("m").await;
	assert!(matches!(outcome, ReportOutcome::Failed(SubmissionError::Timeout)));
}

#[tokio::test]
async fn attachments_are_sent_as_parts() {
	let server = collector(200, ACCEPTED).await;
	let client = client_for(&server).build().unwrap();
	let dir = tempfile::tempdir().unwrap();
	let notes = dir.path().join("notes.txt");
	std::fs::write(&notes, "attached content").unwrap();

	let outcome = client
		.report_async(
			"with attachment",
			ReportOptions::new()
				.attachment(&notes)
				.attachment(dir.path().join("missing.txt")),
		)
		.await;
	assert!(outcome.is_submitted());

	let body = body_text(&requests(&server).await[0]);
	assert!(body.contains(r#"name="attachment_notes.txt""#));
	assert!(body.contains("attached content"));
	assert_eq!(body.matches(r#"name="attachment_"#).count(), 1);
}
