// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lifecycle notifications for reports passing through a client.

use std::sync::Arc;

use faultline_core::{ReportData, ReportId};
use tokio::sync::broadcast;

use crate::outcome::OutcomeKind;

/// Capacity of the event channel. Slow subscribers lag and skip events
/// rather than holding up submissions.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum ClientEvent {
	/// A report was created by the client.
	NewReport { report_id: ReportId },
	/// A report entered the send pipeline, before gating.
	BeforeSend { report_id: ReportId },
	/// A report passed the gate and was finalized; `data` is exactly what
	/// will be submitted.
	BeforeDataSend {
		report_id: ReportId,
		data: Arc<ReportData>,
	},
	/// Submission finished, successfully or not.
	AfterSend {
		report_id: ReportId,
		outcome: OutcomeKind,
	},
	RateLimit { report_id: ReportId },
	SamplingHit { report_id: ReportId },
}

#[derive(Debug, Clone)]
pub(crate) struct EventBus {
	sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
	pub(crate) fn new() -> Self {
		let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
		Self { sender }
	}

	pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
		self.sender.subscribe()
	}

	/// Sending with no subscribers is not an error.
	pub(crate) fn emit(&self, event: ClientEvent) {
		let _ = self.sender.send(event);
	}
}
