// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The reporting client.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use faultline_core::{
	validate_symbolication_map, ErrorPayload, ReportAttributes, ReportPayload, ReportValue,
	SymbolicationMapEntry,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::attributes::combine_client_attributes;
use crate::blocking;
use crate::config::ClientOptions;
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventBus};
use crate::gate::{GateDecision, RateGate};
use crate::outcome::ReportOutcome;
use crate::panic_hook::{self, HandlerRegistration, PanicCapture, PanicSlot};
use crate::report::{default_library_paths, CollectionSettings, Report, Symbolication};
use crate::system::{ProcfsSystemAttributes, SystemAttributeProvider};
use crate::transport::{classify_response, redact_query, submission_url, ReqwestTransport, SubmissionBody, Transport};

/// Per-call additions to a report.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
	pub attributes: ReportAttributes,
	pub attachments: Vec<PathBuf>,
}

impl ReportOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn attribute(mut self, key: impl Into<String>, value: impl Into<ReportValue>) -> Self {
		self.attributes.insert(key.into(), value.into());
		self
	}

	pub fn attachment(mut self, path: impl Into<PathBuf>) -> Self {
		self.attachments.push(path.into());
		self
	}
}

/// Builder for [`CrashClient`].
pub struct CrashClientBuilder {
	options: ClientOptions,
	library_paths: Vec<PathBuf>,
	transport: Option<Arc<dyn Transport>>,
	system: Option<Arc<dyn SystemAttributeProvider>>,
}

impl Default for CrashClientBuilder {
	fn default() -> Self {
		Self::from_options(ClientOptions::default())
	}
}

impl CrashClientBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts from already-resolved options, e.g. from
	/// [`ClientOptions::load`].
	pub fn from_options(options: ClientOptions) -> Self {
		Self {
			options,
			library_paths: default_library_paths(),
			transport: None,
			system: None,
		}
	}

	pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.options.endpoint = Some(endpoint.into());
		self
	}

	pub fn token(mut self, token: impl Into<String>) -> Self {
		self.options.token = Some(token.into());
		self
	}

	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.options.timeout = timeout;
		self
	}

	pub fn tab_width(mut self, tab_width: u32) -> Self {
		self.options.tab_width = tab_width;
		self
	}

	pub fn context_line_count(mut self, lines: u32) -> Self {
		self.options.context_line_count = lines;
		self
	}

	pub fn attribute(mut self, key: impl Into<String>, value: impl Into<ReportValue>) -> Self {
		self.options.attributes.insert(key.into(), value.into());
		self
	}

	pub fn attributes(mut self, attributes: ReportAttributes) -> Self {
		self.options.attributes.extend(attributes);
		self
	}

	pub fn disable_global_handler(mut self, disable: bool) -> Self {
		self.options.disable_global_handler = disable;
		self
	}

	/// Report panics in tasks started with [`CrashClient::spawn`].
	pub fn handle_promises(mut self, handle: bool) -> Self {
		self.options.handle_promises = handle;
		self
	}

	pub fn allow_multiple_uncaught_exception_listeners(mut self, allow: bool) -> Self {
		self.options.allow_multiple_uncaught_exception_listeners = allow;
		self
	}

	pub fn sampling(mut self, rate: f64) -> Self {
		self.options.sampling = Some(rate);
		self
	}

	pub fn rate_limit(mut self, per_minute: u32) -> Self {
		self.options.rate_limit = per_minute;
		self
	}

	pub fn enable_symbolication(mut self, enable: bool) -> Self {
		self.options.enable_symbolication = enable;
		self
	}

	pub fn debug(mut self, debug: bool) -> Self {
		self.options.debug = debug;
		self
	}

	/// Treats frames under `path` as SDK frames and drops them from reports.
	pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.library_paths.push(path.into());
		self
	}

	/// Replaces the HTTP transport.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn system_attributes(mut self, provider: Arc<dyn SystemAttributeProvider>) -> Self {
		self.system = Some(provider);
		self
	}

	pub fn build(self) -> Result<CrashClient> {
		let options = self.options;
		options.validate()?;

		let endpoint = options.endpoint.as_deref().ok_or(ClientError::MissingEndpoint)?;
		let submission_url = submission_url(endpoint, options.token.as_deref())?;

		let transport = match self.transport {
			Some(transport) => transport,
			None => Arc::new(ReqwestTransport::new(options.timeout)?),
		};

		let symbolication = if options.enable_symbolication {
			Symbolication::FromSources
		} else {
			Symbolication::Disabled
		};

		let inner = Arc::new(ClientInner {
			gate: RateGate::new(options.sampling, options.rate_limit),
			submission_url,
			transport,
			memorized: Mutex::new(ReportAttributes::new()),
			symbolication: Mutex::new(symbolication),
			library_paths: self.library_paths,
			system: self
				.system
				.unwrap_or_else(|| Arc::new(ProcfsSystemAttributes)),
			events: EventBus::new(),
			registration: Mutex::new(None),
			options,
		});

		if !inner.options.disable_global_handler {
			let registration = HandlerRegistration::acquire(
				Arc::downgrade(&inner),
				inner.options.allow_multiple_uncaught_exception_listeners,
			)?;
			*lock(&inner.registration) = Some(registration);
		}

		info!(
			endpoint = %redact_query(&inner.submission_url),
			sampling = ?inner.options.sampling,
			rate_limit = inner.options.rate_limit,
			global_handler = !inner.options.disable_global_handler,
			"crash client initialized"
		);

		Ok(CrashClient { inner })
	}
}

/// Recovers from poisoning; this state is also touched from the panic hook.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) struct ClientInner {
	options: ClientOptions,
	submission_url: String,
	transport: Arc<dyn Transport>,
	gate: RateGate,
	memorized: Mutex<ReportAttributes>,
	symbolication: Mutex<Symbolication>,
	library_paths: Vec<PathBuf>,
	system: Arc<dyn SystemAttributeProvider>,
	events: EventBus,
	registration: Mutex<Option<HandlerRegistration>>,
}

impl ClientInner {
	fn collection_settings(&self) -> CollectionSettings {
		CollectionSettings {
			tab_width: self.options.tab_width,
			context_line_count: self.options.context_line_count,
			library_paths: self.library_paths.clone(),
			symbolication: lock(&self.symbolication).clone(),
			debug: self.options.debug,
			system: Arc::clone(&self.system),
		}
	}

	/// Memorized attributes are consumed by the report created here.
	fn create_report(&self, payload: ReportPayload, options: ReportOptions) -> Report {
		let memorized = std::mem::take(&mut *lock(&self.memorized));
		let attributes = combine_client_attributes(&self.options.attributes, memorized, options.attributes);
		let report = Report::new(payload, attributes, options.attachments)
			.with_settings(self.collection_settings());
		self.events.emit(ClientEvent::NewReport {
			report_id: report.id(),
		});
		report
	}

	async fn send(&self, report: Report, transport: &dyn Transport) -> ReportOutcome {
		let report_id = report.id();
		self.events.emit(ClientEvent::BeforeSend { report_id });

		match self.gate.check() {
			GateDecision::Pass => {}
			GateDecision::SamplingHit => {
				debug!(%report_id, "report dropped by sampling");
				self.events.emit(ClientEvent::SamplingHit { report_id });
				return ReportOutcome::SamplingHit;
			}
			GateDecision::RateLimited => {
				debug!(%report_id, "report dropped by rate limit");
				self.events.emit(ClientEvent::RateLimit { report_id });
				return ReportOutcome::RateLimited;
			}
		}

		let data = Arc::new(report.to_data().await);
		self.events.emit(ClientEvent::BeforeDataSend {
			report_id,
			data: Arc::clone(&data),
		});

		let outcome = match SubmissionBody::encode(&data, report.attachments(), self.options.debug).await {
			Ok(body) => match transport.submit(&self.submission_url, body).await {
				Ok(response) => classify_response(response),
				Err(e) => ReportOutcome::Failed(e),
			},
			Err(e) => ReportOutcome::Failed(e),
		};

		match &outcome {
			ReportOutcome::Submitted(response) => {
				info!(%report_id, rx_id = ?response.rx_id, "report submitted");
			}
			ReportOutcome::Failed(e) => {
				warn!(%report_id, error = %e, "report submission failed");
			}
			_ => {}
		}

		self.events.emit(ClientEvent::AfterSend {
			report_id,
			outcome: outcome.kind(),
		});
		outcome
	}

	/// Blocks the calling thread until the report is sent or the configured
	/// timeout passes.
	fn send_blocking(self: &Arc<Self>, report: Report) -> ReportOutcome {
		let inner = Arc::clone(self);
		let transport = self
			.transport
			.isolated()
			.unwrap_or_else(|| Arc::clone(&self.transport));
		let report_id = report.id();

		match blocking::run_detached(self.options.timeout, move || async move {
			inner.send(report, transport.as_ref()).await
		}) {
			Ok(outcome) => outcome,
			Err(e) => {
				warn!(%report_id, error = %e, "synchronous submission did not complete");
				ReportOutcome::Failed(e)
			}
		}
	}

	pub(crate) fn report_panic(self: &Arc<Self>, capture: PanicCapture) -> ReportOutcome {
		let report = self.create_report(
			capture.payload.into(),
			ReportOptions {
				attributes: capture.attributes,
				attachments: Vec::new(),
			},
		);
		self.send_blocking(report)
	}
}

/// A configured reporting client. Cheap to clone; clones share memorized
/// attributes, the rate window and the panic handler registration.
#[derive(Clone)]
pub struct CrashClient {
	inner: Arc<ClientInner>,
}

impl std::fmt::Debug for CrashClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CrashClient")
			.field("endpoint", &redact_query(&self.inner.submission_url))
			.field("global_handler", &self.has_global_handler())
			.finish()
	}
}

impl CrashClient {
	pub fn builder() -> CrashClientBuilder {
		CrashClientBuilder::new()
	}

	pub fn options(&self) -> &ClientOptions {
		&self.inner.options
	}

	/// The resolved submission URL, including its token.
	pub fn submission_url(&self) -> &str {
		&self.inner.submission_url
	}

	/// Adds an attribute to the next report this client creates.
	pub fn memorize(&self, key: impl Into<String>, value: impl Into<ReportValue>) {
		lock(&self.inner.memorized).insert(key.into(), value.into());
	}

	pub fn clear_memorized_attributes(&self) {
		lock(&self.inner.memorized).clear();
	}

	pub fn check_memorized_attributes(&self) -> ReportAttributes {
		lock(&self.inner.memorized).clone()
	}

	/// Creates a report without sending it.
	pub fn create_report(&self, payload: impl Into<ReportPayload>, options: ReportOptions) -> Report {
		self.inner.create_report(payload.into(), options)
	}

	pub async fn send_async(&self, report: Report) -> ReportOutcome {
		self.inner.send(report, self.inner.transport.as_ref()).await
	}

	/// Sends from synchronous code, including from inside a runtime.
	pub fn send_sync(&self, report: Report) -> ReportOutcome {
		self.inner.send_blocking(report)
	}

	pub async fn report_async(&self, payload: impl Into<ReportPayload>, options: ReportOptions) -> ReportOutcome {
		let report = self.create_report(payload, options);
		self.send_async(report).await
	}

	pub fn report_sync(&self, payload: impl Into<ReportPayload>, options: ReportOptions) -> ReportOutcome {
		let report = self.create_report(payload, options);
		self.send_sync(report)
	}

	pub async fn report_error<E: std::error::Error>(&self, err: &E) -> ReportOutcome {
		self.report_async(ErrorPayload::capture(err), ReportOptions::default())
			.await
	}

	pub async fn report_message(&self, message: impl Into<String>) -> ReportOutcome {
		self.report_async(message.into(), ReportOptions::default())
			.await
	}

	/// Sends in the background and hands the outcome to `callback`. Outside a
	/// Tokio runtime the report is sent synchronously before returning.
	pub fn report_with_callback<F>(&self, payload: impl Into<ReportPayload>, options: ReportOptions, callback: F)
	where
		F: FnOnce(ReportOutcome) + Send + 'static,
	{
		let report = self.create_report(payload, options);
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				let client = self.clone();
				handle.spawn(async move {
					callback(client.send_async(report).await);
				});
			}
			Err(_) => callback(self.send_sync(report)),
		}
	}

	/// Switches hashing of referenced source files on or off. Replaces any
	/// map set with [`CrashClient::set_symbolication_map`].
	pub fn set_symbolication(&self, enabled: bool) {
		*lock(&self.inner.symbolication) = if enabled {
			Symbolication::FromSources
		} else {
			Symbolication::Disabled
		};
	}

	/// Submits `entries` as the symbolication map of every later report.
	pub fn set_symbolication_map(&self, entries: Vec<SymbolicationMapEntry>) -> Result<()> {
		validate_symbolication_map(&entries)?;
		*lock(&self.inner.symbolication) = Symbolication::Map(entries);
		Ok(())
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
		self.inner.events.subscribe()
	}

	pub fn has_global_handler(&self) -> bool {
		lock(&self.inner.registration)
			.as_ref()
			.is_some_and(HandlerRegistration::is_active)
	}

	/// Stops reporting panics from this client. Other clients may register
	/// afterwards.
	pub fn unregister_global_handler(&self) {
		if lock(&self.inner.registration).take().is_some() {
			info!("panic handler unregistered");
		}
	}

	/// Spawns `future` on the current runtime. With `handle_promises` set, a
	/// panic in the task is reported before the returned handle resolves.
	pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
	where
		F: Future<Output = ()> + Send + 'static,
	{
		if !self.inner.options.handle_promises {
			return tokio::spawn(future);
		}

		let client = self.clone();
		tokio::spawn(async move {
			let slot = PanicSlot::default();
			let task = tokio::spawn(panic_hook::supervise(Arc::clone(&slot), future));
			let Err(join_error) = task.await else {
				return;
			};
			if !join_error.is_panic() {
				return;
			}
			let capture = match panic_hook::take_slot(&slot) {
				Some(capture) => capture,
				None => PanicCapture::from_join_payload(join_error.into_panic().as_ref()),
			};
			let report = client.create_report(
				capture.payload,
				ReportOptions {
					attributes: capture.attributes,
					attachments: Vec::new(),
				},
			);
			let outcome = client.send_async(report).await;
			if let ReportOutcome::Failed(e) = outcome {
				warn!(error = %e, "failed to report task panic");
			}
		})
	}
}
