// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Running a submission to completion from synchronous code.
//!
//! Synchronous reporting must work from inside a panic hook, from plain
//! threads and from within an async runtime's worker. Nesting `block_on`
//! inside a runtime panics, so the future is driven on a dedicated thread
//! with its own current-thread runtime while the caller waits.

use std::future::Future;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use crate::error::SubmissionError;

/// Name given to submission threads. Panics on these threads are never
/// reported, which keeps the panic hook from recursing.
pub(crate) const SUBMIT_THREAD_NAME: &str = "faultline-submit";

/// Extra time the caller waits beyond the request timeout, covering report
/// finalization before the request starts.
const FINALIZE_GRACE: Duration = Duration::from_secs(5);

/// Drives the future returned by `make` on a dedicated thread and blocks
/// until it finishes or `timeout` (plus a short grace) elapses.
pub(crate) fn run_detached<F, Fut, T>(timeout: Duration, make: F) -> Result<T, SubmissionError>
where
	F: FnOnce() -> Fut + Send + 'static,
	Fut: Future<Output = T>,
	T: Send + 'static,
{
	let (tx, rx) = mpsc::sync_channel(1);

	std::thread::Builder::new()
		.name(SUBMIT_THREAD_NAME.to_string())
		.spawn(move || {
			let runtime = match tokio::runtime::Builder::new_current_thread()
				.enable_all()
				.build()
			{
				Ok(runtime) => runtime,
				Err(e) => {
					let _ = tx.send(Err(e.to_string()));
					return;
				}
			};
			let _ = tx.send(Ok(runtime.block_on(make())));
		})
		.map_err(|e| SubmissionError::Worker(e.to_string()))?;

	match rx.recv_timeout(timeout.saturating_add(FINALIZE_GRACE)) {
		Ok(Ok(value)) => Ok(value),
		Ok(Err(message)) => Err(SubmissionError::Worker(message)),
		Err(RecvTimeoutError::Timeout) => Err(SubmissionError::Timeout),
		Err(RecvTimeoutError::Disconnected) => Err(SubmissionError::Worker(
			"submission thread exited without a result".to_string(),
		)),
	}
}
