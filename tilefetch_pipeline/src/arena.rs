//! This module provides the [`JobArena`]: a time-sliced FIFO of deferred
//! work executed on the render thread's context. Producers dispatch
//! closures and get a future back; dropping the future abandons the job,
//! which the arena observes and skips. One arena serves the whole process.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::{
	any::Any,
	collections::VecDeque,
	time::{Duration, Instant},
};
use tokio::sync::oneshot;

/// The state handed to every job: the frame counter plus whatever context
/// object the render loop installs.
#[derive(Default)]
pub struct GpuContext {
	pub frame: u64,
	user: Option<Box<dyn Any + Send>>,
}

impl GpuContext {
	#[must_use]
	pub fn new() -> GpuContext {
		GpuContext::default()
	}

	pub fn set_user<T: Any + Send>(&mut self, user: T) {
		self.user = Some(Box::new(user));
	}

	#[must_use]
	pub fn user_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
		self.user.as_mut().and_then(|user| user.downcast_mut())
	}
}

type Job = Box<dyn FnOnce(&mut GpuContext) + Send>;

/// Time-sliced FIFO of render-thread jobs; no priorities.
pub struct JobArena {
	queue: Mutex<VecDeque<Job>>,
	time_slice: Duration,
}

impl JobArena {
	#[must_use]
	pub fn new(time_slice: Duration) -> JobArena {
		JobArena {
			queue: Mutex::new(VecDeque::new()),
			time_slice,
		}
	}

	/// Enqueues a job and returns its future. Dropping the returned handle
	/// before the job runs abandons it; the arena skips abandoned jobs.
	pub fn dispatch<T, F>(&self, job: F) -> JobHandle<T>
	where
		T: Send + 'static,
		F: FnOnce(&mut GpuContext) -> T + Send + 'static,
	{
		let (tx, rx) = oneshot::channel();
		self.queue.lock().push_back(Box::new(move |context| {
			// an abandoned promise is observed here and skipped
			if tx.is_closed() {
				return;
			}
			let _ = tx.send(job(context));
		}));
		JobHandle { rx }
	}

	/// Runs queued jobs in FIFO order until the time slice is spent or the
	/// queue drains; called once per frame by the render loop. Returns the
	/// number of jobs executed.
	pub fn run_frame(&self, context: &mut GpuContext) -> usize {
		let start = Instant::now();
		let mut executed = 0;

		loop {
			let Some(job) = self.queue.lock().pop_front() else {
				break;
			};
			job(context);
			executed += 1;
			if start.elapsed() >= self.time_slice {
				break;
			}
		}

		context.frame += 1;
		executed
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.queue.lock().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.queue.lock().is_empty()
	}
}

/// Future side of a dispatched job.
pub struct JobHandle<T> {
	rx: oneshot::Receiver<T>,
}

impl<T> JobHandle<T> {
	/// Resolves to the job's output, or `None` when the job was skipped or
	/// the arena went away.
	pub async fn wait(self) -> Option<T> {
		self.rx.await.ok()
	}
}

lazy_static! {
	static ref ARENA: JobArena = JobArena::new(Duration::from_millis(4));
}

/// The process-wide arena drained by the render thread.
#[must_use]
pub fn global_arena() -> &'static JobArena {
	&ARENA
}
