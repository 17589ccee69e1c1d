//! Process-global, replaceable hooks: the URL rewriter applied before every
//! dispatch and the transport tuner that gets a crack at each backend
//! handle. Both default to no-ops and can be swapped at runtime.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

/// Rewrites an outgoing URL before the transport dispatches it.
pub trait UrlRewriter: Send + Sync {
	fn rewrite(&self, url: &str) -> String;
}

/// Opaque backend tuning: `on_initialize` runs once per transport handle,
/// `on_fetch` immediately before each GET. The handle is the backend's own
/// builder/agent type, downcast by tuners that know it.
pub trait TransportTuner: Send + Sync {
	fn on_initialize(&self, _handle: &mut dyn Any) {}
	fn on_fetch(&self, _handle: &mut dyn Any) {}
}

lazy_static! {
	static ref REWRITER: Mutex<Option<Arc<dyn UrlRewriter>>> = Mutex::new(None);
	static ref TUNER: Mutex<Option<Arc<dyn TransportTuner>>> = Mutex::new(None);
}

/// Installs (or with `None` removes) the global URL rewriter.
pub fn set_url_rewriter(rewriter: Option<Arc<dyn UrlRewriter>>) {
	*REWRITER.lock() = rewriter;
}

/// Runs the global rewriter, or returns the URL unchanged.
#[must_use]
pub fn rewrite_url(url: &str) -> String {
	match &*REWRITER.lock() {
		Some(rewriter) => rewriter.rewrite(url),
		None => url.to_string(),
	}
}

/// Installs (or with `None` removes) the global transport tuner.
pub fn set_transport_tuner(tuner: Option<Arc<dyn TransportTuner>>) {
	*TUNER.lock() = tuner;
}

#[must_use]
pub fn transport_tuner() -> Option<Arc<dyn TransportTuner>> {
	TUNER.lock().clone()
}
