// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host and process attributes collected for every report.
//!
//! Collection is synchronous: it runs inside the panic hook, and the numbers
//! are meant to describe the process at the moment of the report. Host data
//! comes from `sysinfo`; the per-process counters it does not expose are read
//! from `/proc/self/status` on Linux.

use faultline_core::{AttributeValue, Attributes};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, ProcessesToUpdate, RefreshKind, System};

/// Supplies the lowest-precedence attribute layer of a report.
pub trait SystemAttributeProvider: Send + Sync {
	fn attributes(&self) -> Attributes;
}

/// Reads host data through `sysinfo` and process counters from procfs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsSystemAttributes;

impl SystemAttributeProvider for ProcfsSystemAttributes {
	fn attributes(&self) -> Attributes {
		let mut attributes = Attributes::new();

		attributes.insert("process.id".into(), AttributeValue::from(std::process::id()));
		attributes.insert("uname.sysname".into(), AttributeValue::from(std::env::consts::OS));
		attributes.insert("uname.machine".into(), AttributeValue::from(std::env::consts::ARCH));
		if let Ok(cpus) = std::thread::available_parallelism() {
			attributes.insert("cpu.count".into(), AttributeValue::from(cpus.get()));
		}
		if let Ok(name) = hostname::get() {
			let name = name.to_string_lossy().into_owned();
			if !name.is_empty() {
				attributes.insert("hostname".into(), AttributeValue::String(name));
			}
		}

		if sysinfo::IS_SUPPORTED_SYSTEM {
			collect_host(&mut attributes);
		}

		#[cfg(target_os = "linux")]
		collect_procfs(&mut attributes);

		attributes
	}
}

fn collect_host(attributes: &mut Attributes) {
	let mut system = System::new_with_specifics(
		RefreshKind::nothing()
			.with_memory(MemoryRefreshKind::everything())
			.with_cpu(CpuRefreshKind::nothing()),
	);

	if let Some(age) = process_age(&mut system) {
		attributes.insert("process.age".into(), AttributeValue::from(age));
	}
	if let Some(release) = System::kernel_version().filter(|r| !r.is_empty()) {
		attributes.insert("uname.version".into(), AttributeValue::String(release));
	}
	attributes.insert("uname.uptime".into(), AttributeValue::from(System::uptime()));
	if let Some(brand) = system
		.cpus()
		.first()
		.map(|cpu| cpu.brand().trim().to_string())
		.filter(|b| !b.is_empty())
	{
		attributes.insert("cpu.brand".into(), AttributeValue::String(brand));
	}

	let memory = [
		("system.memory.total", system.total_memory()),
		("system.memory.free", system.free_memory()),
		("system.memory.available", system.available_memory()),
		("system.memory.swap.total", system.total_swap()),
		("system.memory.swap.free", system.free_swap()),
	];
	for (name, bytes) in memory {
		attributes.insert(name.into(), AttributeValue::from(bytes));
	}
}

/// Seconds since this process started.
fn process_age(system: &mut System) -> Option<u64> {
	let pid = sysinfo::get_current_pid().ok()?;
	system.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
	let started = system.process(pid)?.start_time();
	Some(age_at(started, chrono::Utc::now().timestamp()))
}

/// Clock skew can put the start time after `now`; that reads as zero.
fn age_at(started_unix: u64, now_unix: i64) -> u64 {
	u64::try_from(now_unix).unwrap_or(0).saturating_sub(started_unix)
}

#[cfg(target_os = "linux")]
fn collect_procfs(attributes: &mut Attributes) {
	if let Some(guid) = read_trimmed("/etc/machine-id").or_else(|| read_trimmed("/var/lib/dbus/machine-id")) {
		attributes.insert("guid".into(), AttributeValue::String(guid));
	}
	if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
		attributes.extend(parse_process_status(&status));
	}
}

#[cfg(target_os = "linux")]
fn read_trimmed(path: &str) -> Option<String> {
	std::fs::read_to_string(path)
		.ok()
		.map(|s| s.trim().to_string())
		.filter(|s| !s.is_empty())
}

/// How a `/proc/self/status` field is converted.
#[derive(Clone, Copy)]
enum StatusUnit {
	Count,
	Kilobytes,
}

const STATUS_ATTRIBUTES: &[(&str, &str, StatusUnit)] = &[
	("nonvoluntary_ctxt_switches", "sched.cs.involuntary", StatusUnit::Count),
	("voluntary_ctxt_switches", "sched.cs.voluntary", StatusUnit::Count),
	("FDSize", "descriptor.count", StatusUnit::Count),
	("VmData", "vm.data.size", StatusUnit::Kilobytes),
	("VmLck", "vm.locked.size", StatusUnit::Kilobytes),
	("VmPTE", "vm.pte.size", StatusUnit::Kilobytes),
	("VmHWM", "vm.rss.peak", StatusUnit::Kilobytes),
	("VmRSS", "vm.rss.size", StatusUnit::Kilobytes),
	("VmLib", "vm.shared.size", StatusUnit::Kilobytes),
	("VmStk", "vm.stack.size", StatusUnit::Kilobytes),
	("VmSwap", "vm.swap.size", StatusUnit::Kilobytes),
	("VmPeak", "vm.vma.peak", StatusUnit::Kilobytes),
	("VmSize", "vm.vma.size", StatusUnit::Kilobytes),
];

/// Splits `Name:   1234 kB` into its name, number and optional unit.
fn split_field(line: &str) -> Option<(&str, u64, Option<&str>)> {
	let (name, rest) = line.split_once(':')?;
	let mut parts = rest.split_whitespace();
	let number = parts.next()?.parse().ok()?;
	Some((name.trim(), number, parts.next()))
}

/// Scheduler, descriptor and `vm.*` attributes from `/proc/self/status`.
pub fn parse_process_status(contents: &str) -> Attributes {
	let mut attributes = Attributes::new();
	for line in contents.lines() {
		let Some((name, number, unit)) = split_field(line) else {
			continue;
		};
		let Some((_, attr, kind)) = STATUS_ATTRIBUTES.iter().find(|(field, _, _)| *field == name) else {
			continue;
		};
		let value = match (kind, unit) {
			(StatusUnit::Count, _) => number,
			(StatusUnit::Kilobytes, Some("kB")) => number.saturating_mul(1024),
			(StatusUnit::Kilobytes, _) => continue,
		};
		attributes.insert((*attr).to_string(), AttributeValue::from(value));
	}
	attributes
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	const STATUS: &str = "\
Name:\tfaultline
FDSize:\t64
VmPeak:\t  120000 kB
VmRSS:\t   50000 kB
VmStk:\t     132 MB
voluntary_ctxt_switches:\t150
nonvoluntary_ctxt_switches:\t7
";

	#[test]
	fn process_status_maps_known_fields() {
		let attributes = parse_process_status(STATUS);
		assert_eq!(attributes["descriptor.count"], AttributeValue::Int(64));
		assert_eq!(attributes["vm.vma.peak"], AttributeValue::Int(120000 * 1024));
		assert_eq!(attributes["vm.rss.size"], AttributeValue::Int(50000 * 1024));
		assert_eq!(attributes["sched.cs.voluntary"], AttributeValue::Int(150));
		assert_eq!(attributes["sched.cs.involuntary"], AttributeValue::Int(7));
		assert!(!attributes.contains_key("vm.stack.size"));
		assert!(!attributes.contains_key("Name"));
	}

	#[test]
	fn age_never_goes_negative() {
		assert_eq!(age_at(1_700_000_000, 1_700_000_042), 42);
		assert_eq!(age_at(1_700_000_042, 1_700_000_000), 0);
		assert_eq!(age_at(10, -5), 0);
	}

	#[test]
	fn provider_always_reports_platform_basics() {
		let attributes = ProcfsSystemAttributes.attributes();
		assert_eq!(attributes["uname.sysname"], AttributeValue::from(std::env::consts::OS));
		assert_eq!(attributes["process.id"], AttributeValue::from(std::process::id()));
		assert!(attributes.contains_key("uname.machine"));
	}

	#[cfg(target_os = "linux")]
	#[test]
	fn host_attributes_come_from_the_running_system() {
		let attributes = ProcfsSystemAttributes.attributes();
		assert!(attributes.contains_key("uname.uptime"));
		assert!(attributes.contains_key("uname.version"));
		assert!(attributes.contains_key("hostname"));
		match (&attributes["system.memory.total"], &attributes["system.memory.free"]) {
			(AttributeValue::Int(total), AttributeValue::Int(free)) => {
				assert!(*total > 0);
				assert!(free <= total);
			}
			other => panic!("unexpected memory attributes {other:?}"),
		}
	}

	#[cfg(target_os = "linux")]
	#[test]
	fn process_age_counts_from_process_start() {
		std::thread::sleep(Duration::from_millis(2100));

		let attributes = ProcfsSystemAttributes.attributes();
		let AttributeValue::Int(age) = attributes["process.age"] else {
			panic!("process.age is not an integer: {:?}", attributes["process.age"]);
		};
		// procfs start times are whole seconds, so allow one second of slack.
		assert!(age >= 1, "process.age {age} ignores time spent before the report");
	}
}
