// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sampling and rate limiting applied before a report is finalized.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Length of a rate-limit window.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
	Pass,
	SamplingHit,
	RateLimited,
}

/// Decides whether a report may be submitted.
///
/// Sampling runs first, so a report dropped by sampling never consumes rate
/// budget. The window resets once a full [`RATE_LIMIT_WINDOW`] has elapsed
/// since it opened; until then at most `rate_limit` reports pass.
#[derive(Debug)]
pub struct RateGate {
	sampling: Option<f64>,
	rate_limit: u32,
	window: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
	opened_at: Instant,
	count: u32,
}

impl RateGate {
	pub fn new(sampling: Option<f64>, rate_limit: u32) -> Self {
		Self {
			sampling,
			rate_limit,
			window: Mutex::new(Window {
				opened_at: Instant::now(),
				count: 0,
			}),
		}
	}

	pub fn check(&self) -> GateDecision {
		self.check_with(fastrand::f64(), Instant::now())
	}

	/// `draw` is a uniform sample from `[0, 1)`; a report is dropped when it is
	/// at or above the sampling rate, so `0.0` drops everything and `1.0`
	/// keeps everything.
	pub(crate) fn check_with(&self, draw: f64, now: Instant) -> GateDecision {
		if let Some(rate) = self.sampling {
			if draw >= rate {
				return GateDecision::SamplingHit;
			}
		}
		if self.rate_limit == 0 {
			return GateDecision::Pass;
		}

		// Also consulted from the panic hook, so a poisoned lock is recovered.
		let mut window = self
			.window
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		if now.saturating_duration_since(window.opened_at) >= RATE_LIMIT_WINDOW {
			window.opened_at = now;
			window.count = 0;
		}
		if window.count >= self.rate_limit {
			return GateDecision::RateLimited;
		}
		window.count += 1;
		GateDecision::Pass
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn zero_sampling_drops_everything() {
		let gate = RateGate::new(Some(0.0), 0);
		assert_eq!(gate.check_with(0.0, Instant::now()), GateDecision::SamplingHit);
		assert_eq!(gate.check(), GateDecision::SamplingHit);
	}

	#[test]
	fn full_sampling_keeps_everything() {
		let gate = RateGate::new(Some(1.0), 0);
		assert_eq!(gate.check_with(0.999_999, Instant::now()), GateDecision::Pass);
	}

	#[test]
	fn no_limits_always_pass() {
		let gate = RateGate::new(None, 0);
		for _ in 0..100 {
			assert_eq!(gate.check(), GateDecision::Pass);
		}
	}

	#[test]
	fn rate_limit_of_one_per_window() {
		let gate = RateGate::new(None, 1);
		let start = Instant::now();
		assert_eq!(gate.check_with(0.0, start), GateDecision::Pass);
		assert_eq!(
			gate.check_with(0.0, start + Duration::from_secs(1)),
			GateDecision::RateLimited
		);
		assert_eq!(
			gate.check_with(0.0, start + Duration::from_secs(61)),
			GateDecision::Pass
		);
	}

	#[test]
	fn sampled_out_reports_do_not_consume_budget() {
		let gate = RateGate::new(Some(0.5), 1);
		let now = Instant::now();
		assert_eq!(gate.check_with(0.9, now), GateDecision::SamplingHit);
		assert_eq!(gate.check_with(0.1, now), GateDecision::Pass);
		assert_eq!(gate.check_with(0.1, now), GateDecision::RateLimited);
	}

	proptest! {
		#[test]
		fn never_more_than_limit_per_window(limit in 1u32..20, attempts in 1usize..100) {
			let gate = RateGate::new(None, limit);
			let now = Instant::now();
			let passed = (0..attempts)
				.filter(|_| gate.check_with(0.0, now) == GateDecision::Pass)
				.count();
			prop_assert_eq!(passed, attempts.min(limit as usize));
		}
	}
}
