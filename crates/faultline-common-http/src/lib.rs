// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared HTTP client construction for faultline.
//!
//! Every client built here carries the same `faultline/{platform}/{git_sha}`
//! User-Agent so collectors can tell which build submitted a report.

mod client;

pub use client::{builder, builder_with_user_agent, client_with_timeout, user_agent};
