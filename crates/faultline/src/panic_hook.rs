// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide panic reporting.
//!
//! The first registration installs a single hook in front of whatever panic
//! hook was set before it. The hook reports the panic synchronously through
//! every registered client, then runs the previous hook so the default
//! message (or another tool's handling) is kept.
//! Panics inside tasks supervised by [`crate::CrashClient::spawn`] are handed
//! to the supervising task instead of being submitted from the hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::Cell;
use std::future::Future;
use std::panic::PanicHookInfo;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError, Weak};

use faultline_core::{stack_text, ErrorPayload, ReportAttributes, ReportValue};
use tracing::{error, info};

use crate::blocking::SUBMIT_THREAD_NAME;
use crate::client::ClientInner;
use crate::error::ClientError;
use crate::outcome::ReportOutcome;

/// Error name used for panic reports.
pub const PANIC_ERROR_NAME: &str = "panic";

/// Clients registered with the hook, across the whole process.
static REGISTRY: Mutex<Vec<Registered>> = Mutex::new(Vec::new());
static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);
static HOOK_INSTALLED: Once = Once::new();

#[cfg(test)]
static HOOK_INSTALLS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

thread_local! {
	static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

tokio::task_local! {
	static TASK_PANIC: PanicSlot;
}

/// A panic as seen by the hook, ready to become a report.
#[derive(Debug, Clone)]
pub(crate) struct PanicCapture {
	pub(crate) payload: ErrorPayload,
	pub(crate) attributes: ReportAttributes,
}

pub(crate) type PanicSlot = Arc<Mutex<Option<PanicCapture>>>;

impl PanicCapture {
	fn from_hook(info: &PanicHookInfo<'_>) -> Self {
		let message = panic_message(info.payload());
		let mut capture = Self::new(message, &Backtrace::force_capture());
		if let Some(location) = info.location() {
			capture.attributes.insert(
				"panic.location".to_string(),
				ReportValue::from(format!("{}:{}:{}", location.file(), location.line(), location.column())),
			);
		}
		capture
	}

	/// Used when a supervised task panicked without the hook filling its slot.
	pub(crate) fn from_join_payload(payload: &(dyn Any + Send)) -> Self {
		Self::new(panic_message(payload), &Backtrace::force_capture())
	}

	fn new(message: String, backtrace: &Backtrace) -> Self {
		let stack = stack_text(PANIC_ERROR_NAME, &message, backtrace);
		let mut attributes = ReportAttributes::new();
		if let Some(name) = std::thread::current().name() {
			attributes.insert("panic.thread".to_string(), ReportValue::from(name));
		}
		Self {
			payload: ErrorPayload::new(PANIC_ERROR_NAME, message).with_stack(stack),
			attributes,
		}
	}
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"Box<dyn Any>".to_string()
	}
}

/// Runs `future` with a slot the panic hook fills if the future panics.
pub(crate) async fn supervise<F: Future>(slot: PanicSlot, future: F) -> F::Output {
	TASK_PANIC.scope(slot, future).await
}

pub(crate) fn take_slot(slot: &PanicSlot) -> Option<PanicCapture> {
	slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take()
}

/// A client whose panics the process-wide hook reports.
struct Registered {
	id: u64,
	client: Weak<ClientInner>,
}

fn registry() -> MutexGuard<'static, Vec<Registered>> {
	REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Installs the one process-wide hook. It runs in front of whatever hook
/// was set before the first registration, which still runs afterwards.
fn install_hook() {
	#[cfg(test)]
	HOOK_INSTALLS.fetch_add(1, Ordering::SeqCst);

	let previous = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		let clients: Vec<Weak<ClientInner>> = registry().iter().map(|r| Weak::clone(&r.client)).collect();
		for client in &clients {
			on_panic(client, info);
		}
		previous(info);
	}));
}

/// Keeps a client in the panic hook's registry. Dropping it removes the
/// client; the hook stays installed and skips clients no longer listed.
#[derive(Debug)]
pub struct HandlerRegistration {
	id: u64,
	active: AtomicBool,
}

impl HandlerRegistration {
	/// Registers `client` with the panic hook. Unless `allow_multiple` is set,
	/// only one registration may be live in the process at a time.
	pub(crate) fn acquire(client: Weak<ClientInner>, allow_multiple: bool) -> Result<Self, ClientError> {
		let id = {
			let mut registered = registry();
			if !allow_multiple && !registered.is_empty() {
				return Err(ClientError::HandlerAlreadyRegistered);
			}
			let id = NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed);
			registered.push(Registered { id, client });
			id
		};
		HOOK_INSTALLED.call_once(install_hook);

		info!(allow_multiple, registration = id, "panic handler registered");
		Ok(Self {
			id,
			active: AtomicBool::new(true),
		})
	}

	pub fn is_active(&self) -> bool {
		self.active.load(Ordering::Acquire)
	}
}

impl Drop for HandlerRegistration {
	fn drop(&mut self) {
		if self.active.swap(false, Ordering::AcqRel) {
			registry().retain(|r| r.id != self.id);
		}
	}
}

fn on_panic(client: &Weak<ClientInner>, info: &PanicHookInfo<'_>) {
	if std::thread::current().name() == Some(SUBMIT_THREAD_NAME) {
		return;
	}
	let Some(inner) = client.upgrade() else {
		return;
	};
	if IN_HOOK.with(|flag| flag.replace(true)) {
		return;
	}

	let capture = PanicCapture::from_hook(info);
	match TASK_PANIC.try_with(Arc::clone) {
		Ok(slot) => {
			*slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(capture);
		}
		Err(_) => {
			if let ReportOutcome::Failed(e) = inner.report_panic(capture) {
				error!(error = %e, "failed to report panic");
			}
		}
	}

	IN_HOOK.with(|flag| flag.set(false));
}

#[cfg(test)]
pub(crate) fn live_registrations() -> usize {
	registry().len()
}

#[cfg(test)]
pub(crate) fn hook_installs() -> usize {
	HOOK_INSTALLS.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn message_from_str_and_string_payloads() {
		let literal: Box<dyn Any + Send> = Box::new("boom");
		let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
		let other: Box<dyn Any + Send> = Box::new(7_u8);
		assert_eq!(panic_message(literal.as_ref()), "boom");
		assert_eq!(panic_message(owned.as_ref()), "owned boom");
		assert_eq!(panic_message(other.as_ref()), "Box<dyn Any>");
	}

	#[test]
	fn capture_builds_panic_payload() {
		let payload: Box<dyn Any + Send> = Box::new("went wrong");
		let capture = PanicCapture::from_join_payload(payload.as_ref());
		assert_eq!(capture.payload.name, PANIC_ERROR_NAME);
		assert_eq!(capture.payload.message, "went wrong");
		assert!(capture
			.payload
			.stack
			.as_deref()
			.unwrap()
			.starts_with("panic: went wrong\n"));
	}

	#[tokio::test]
	async fn supervised_slot_is_scoped_to_the_task() {
		let slot = PanicSlot::default();
		let seen = supervise(Arc::clone(&slot), async { TASK_PANIC.try_with(|_| ()).is_ok() }).await;
		assert!(seen);
		assert!(TASK_PANIC.try_with(|_| ()).is_err());
		assert!(take_slot(&slot).is_none());
	}
}
