//! This module provides the `Progress` trait, the observer a caller hands
//! into a fetch to watch transfer progress, cancel cooperatively and
//! receive the retry-delay signal for recoverable failures.
//!
//! Transports poll the observer between chunks; returning `true` from
//! [`Progress::report`] (or `is_canceled`) aborts the transfer.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Observer for a running fetch. All methods take `&self`; implementations
/// use interior mutability so one observer can be shared across threads.
pub trait Progress: Send + Sync {
	/// Reports transferred vs. total bytes; returns `true` to cancel.
	fn report(&self, _done: u64, _total: u64) -> bool {
		false
	}

	fn is_canceled(&self) -> bool {
		false
	}

	fn cancel(&self) {}

	/// Called when a recoverable failure suggests retrying after `seconds`.
	fn set_retry_delay(&self, _seconds: f64) {}

	fn retry_delay(&self) -> Option<f64> {
		None
	}

	fn set_message(&self, _message: &str) {}

	fn message(&self) -> String {
		String::new()
	}
}

/// A progress observer that ignores everything.
#[derive(Default)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// A shareable observer tracking cancellation, retry delay and message.
#[derive(Default)]
pub struct ProgressState {
	canceled: AtomicBool,
	retry_delay: Mutex<Option<f64>>,
	message: Mutex<String>,
}

impl ProgressState {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

impl Progress for ProgressState {
	fn report(&self, _done: u64, _total: u64) -> bool {
		self.is_canceled()
	}

	fn is_canceled(&self) -> bool {
		self.canceled.load(Ordering::Relaxed)
	}

	fn cancel(&self) {
		self.canceled.store(true, Ordering::Relaxed);
	}

	fn set_retry_delay(&self, seconds: f64) {
		*self.retry_delay.lock() = Some(seconds);
	}

	fn retry_delay(&self) -> Option<f64> {
		*self.retry_delay.lock()
	}

	fn set_message(&self, message: &str) {
		*self.message.lock() = message.to_string();
	}

	fn message(&self) -> String {
		self.message.lock().clone()
	}
}
