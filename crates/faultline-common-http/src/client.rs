// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use faultline_common_version::BuildInfo;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Returns a client builder preloaded with the standard User-Agent.
///
/// # Example
/// ```ignore
/// let client = faultline_common_http::builder()
///     .timeout(Duration::from_secs(15))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Returns a client builder with a caller-supplied User-Agent.
pub fn builder_with_user_agent(user_agent: impl Into<String>) -> ClientBuilder {
	Client::builder().user_agent(user_agent.into())
}

/// Builds a client whose requests (connect, upload, response) are bounded by
/// `timeout` as a whole.
pub fn client_with_timeout(timeout: Duration) -> reqwest::Result<Client> {
	builder().timeout(timeout).build()
}

/// Format: `faultline/{platform}/{git_sha}`
pub fn user_agent() -> String {
	let info = BuildInfo::current();
	format!("faultline/{}/{}", info.platform, info.git_sha)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn user_agent_has_three_segments() {
		let ua = user_agent();
		let parts: Vec<&str> = ua.split('/').collect();
		assert_eq!(parts.len(), 3);
		assert_eq!(parts[0], "faultline");
	}

	#[test]
	fn custom_user_agent_builds() {
		assert!(builder_with_user_agent("my-agent/1.0").build().is_ok());
	}

	#[test]
	fn timeout_client_builds() {
		assert!(client_with_timeout(Duration::from_millis(250)).is_ok());
	}
}
