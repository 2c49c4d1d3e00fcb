// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error-reporting client SDK.
//!
//! A [`CrashClient`] turns errors, messages and panics into reports and
//! submits them to a crash collector as multipart uploads. Each report is
//! enriched before it is sent:
//! - system and process attributes
//! - metadata from the calling crate's `Cargo.toml`
//! - parsed stack frames with surrounding source lines
//! - optional symbolication ids for the referenced source files
//!
//! Sampling and a per-minute rate limit are applied before any work is done
//! for a report.
//!
//! # Example
//!
//! ```no_run
//! use faultline::{CrashClient, ReportOptions};
//!
//! # async fn run() -> faultline::Result<()> {
//! let client = CrashClient::builder()
//!     .endpoint("https://submit.backtrace.io/universe/token/json")
//!     .attribute("service", "billing")
//!     .build()?;
//!
//! let outcome = client
//!     .report_async("payment retries exhausted", ReportOptions::new().attribute("attempts", 5))
//!     .await;
//! if let Some(err) = outcome.error() {
//!     eprintln!("report not delivered: {err}");
//! }
//! # Ok(())
//! # }
//! ```

/// Logs a non-fatal collection problem at `warn` in debug mode and at
/// `debug` otherwise.
macro_rules! degraded {
	($debug:expr, $($arg:tt)+) => {
		if $debug {
			::tracing::warn!($($arg)+)
		} else {
			::tracing::debug!($($arg)+)
		}
	};
}

pub mod attributes;
mod blocking;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod global;
pub mod manifest;
pub mod outcome;
pub mod panic_hook;
pub mod report;
pub mod source;
pub mod stack;
pub mod system;
pub mod transport;

pub use client::{CrashClient, CrashClientBuilder, ReportOptions};
pub use config::{ClientOptions, ClientOptionsLayer, ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};
pub use error::{ClientError, Result, SubmissionError};
pub use events::ClientEvent;
pub use global::{client, create_report, initialize, report_async, report_sync, use_client};
pub use outcome::{OutcomeKind, ReportOutcome, SubmissionResponse};
pub use panic_hook::HandlerRegistration;
pub use report::{CollectionSettings, Report, Symbolication};
pub use system::{ProcfsSystemAttributes, SystemAttributeProvider};
pub use transport::{endpoint_params, submission_url, EndpointParams, ReqwestTransport, SubmissionBody, Transport, TransportResponse};

pub use faultline_core::{
	AttributeValue, ErrorPayload, FlattenOptions, ReportAttributes, ReportData, ReportId, ReportPayload,
	ReportValue, SymbolicationMapEntry,
};
