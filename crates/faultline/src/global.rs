// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! A process-wide default client.
//!
//! Libraries that cannot thread a [`CrashClient`] through their call graph
//! report through these functions. Every entry point returns
//! [`ClientError::NotInitialized`] until [`initialize`] or [`use_client`]
//! has been called.

use std::sync::{PoisonError, RwLock};

use faultline_core::ReportPayload;

use crate::client::{CrashClient, ReportOptions};
use crate::config::ClientOptions;
use crate::error::{ClientError, Result};
use crate::outcome::ReportOutcome;
use crate::report::Report;
use crate::CrashClientBuilder;

static GLOBAL_CLIENT: RwLock<Option<CrashClient>> = RwLock::new(None);

/// Builds a client from `options` and makes it the process default,
/// replacing any previous one.
///
/// A panic handler registered by an earlier client is never released here:
/// unless `options` disables the handler or allows multiple listeners, this
/// returns [`ClientError::HandlerAlreadyRegistered`] until that client calls
/// [`CrashClient::unregister_global_handler`]. If building fails, the
/// previous default client stays installed.
pub fn initialize(options: ClientOptions) -> Result<CrashClient> {
	let client = CrashClientBuilder::from_options(options).build()?;
	use_client(client.clone());
	Ok(client)
}

/// Installs an existing client as the process default.
pub fn use_client(client: CrashClient) {
	*GLOBAL_CLIENT.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
}

/// The process default client.
pub fn client() -> Result<CrashClient> {
	GLOBAL_CLIENT
		.read()
		.unwrap_or_else(PoisonError::into_inner)
		.clone()
		.ok_or(ClientError::NotInitialized)
}

pub async fn report_async(payload: impl Into<ReportPayload>, options: ReportOptions) -> Result<ReportOutcome> {
	let client = client()?;
	Ok(client.report_async(payload, options).await)
}

pub fn report_sync(payload: impl Into<ReportPayload>, options: ReportOptions) -> Result<ReportOutcome> {
	Ok(client()?.report_sync(payload, options))
}

pub fn create_report(payload: impl Into<ReportPayload>, options: ReportOptions) -> Result<Report> {
	Ok(client()?.create_report(payload, options))
}
