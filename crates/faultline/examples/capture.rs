// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Example: report an error, a message and a panic.
//!
//! Run with:
//!   FAULTLINE_ENDPOINT=https://submit.backtrace.io/universe/token/json \
//!   cargo run --example capture -p faultline
//!
//! Options come from `faultline.toml` in the working directory (if present)
//! and `FAULTLINE_*` environment variables.

use std::path::Path;

use faultline::{ClientEvent, ClientOptions, CrashClientBuilder, ReportOptions};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
#[error("order {order_id} could not be priced")]
struct PricingError {
	order_id: u64,
	#[source]
	source: std::num::ParseFloatError,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("faultline=debug")))
		.init();

	let options = ClientOptions::load(Some(Path::new("faultline.toml")))?;
	let client = CrashClientBuilder::from_options(options)
		.attribute("example", true)
		.handle_promises(true)
		.build()?;

	let mut events = client.subscribe();
	tokio::spawn(async move {
		while let Ok(event) = events.recv().await {
			if let ClientEvent::AfterSend { report_id, outcome } = event {
				println!("report {report_id}: {outcome:?}");
			}
		}
	});

	// Memorized attributes ride along with the next report only.
	client.memorize("request.id", "req-7781");

	let err = PricingError {
		order_id: 42,
		source: "4,20".parse::<f64>().unwrap_err(),
	};
	let outcome = client.report_error(&err).await;
	println!("error report: {:?}", outcome.kind());

	let outcome = client
		.report_async(
			"inventory sync finished with warnings",
			ReportOptions::new()
				.attribute("skipped", 3)
				.attribute("details", serde_json::json!({ "warehouse": "ams-1" })),
		)
		.await;
	println!("message report: {:?}", outcome.kind());

	// Reported by the supervising task before the handle resolves.
	client
		.spawn(async {
			panic!("background worker lost its lease");
		})
		.await?;

	Ok(())
}
