// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Process-wide GPU service state.
//!
//! One [`GpuState`] is shared by every command buffer in the process. It owns
//! the GPU thread, a FIFO task runner on which all drivers execute, plus the
//! [`SyncPointManager`] and the command-buffer id allocator.
//!
//! ```text
//!  IPC thread (per command buffer)        GPU thread (shared)
//!  ───────────────────────────────        ───────────────────
//!  recv request ──── post_task ────────▶  driver.flush(..)
//!  InsertSyncPoint: answered here         driver.retire_sync_point(..)
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use fresco_core::sync::CommandBufferId;
use fresco_core::trace::{TraceSink, Tracer};
use parking_lot::Mutex;

use crate::error::{CommandBufferError, Result};
use crate::sync_point_manager::SyncPointManager;

/// A trace sink shared between service threads.
pub type SharedTraceSink = Arc<Mutex<dyn TraceSink + Send>>;

/// Unit of work executed on the GPU thread.
pub type Task = Box<dyn FnOnce() + Send>;

/// Runs `f` with a tracer bound to `sink`, or a discarding tracer.
pub fn with_tracer(sink: Option<&SharedTraceSink>, f: impl FnOnce(&mut Tracer<'_>)) {
    match sink {
        Some(sink) => {
            let mut guard = sink.lock();
            let mut tracer = Tracer::new(&mut *guard);
            f(&mut tracer);
        }
        None => f(&mut Tracer::none()),
    }
}

/// Shared GPU service state.
pub struct GpuState {
    sync_point_manager: Arc<SyncPointManager>,
    tasks: Mutex<Option<Sender<Task>>>,
    gpu_thread: Mutex<Option<JoinHandle<()>>>,
    gpu_thread_id: ThreadId,
    next_command_buffer_id: AtomicU64,
    trace_sink: Option<SharedTraceSink>,
}

impl fmt::Debug for GpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuState")
            .field("sync_point_manager", &self.sync_point_manager)
            .field("gpu_thread_id", &self.gpu_thread_id)
            .field("traced", &self.trace_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl GpuState {
    /// Starts the GPU thread.
    pub fn new() -> Result<Arc<Self>> {
        Self::start(None)
    }

    /// Starts the GPU thread, reporting service events to `sink`.
    pub fn with_trace_sink(sink: SharedTraceSink) -> Result<Arc<Self>> {
        Self::start(Some(sink))
    }

    fn start(trace_sink: Option<SharedTraceSink>) -> Result<Arc<Self>> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();
        let gpu_thread = thread::Builder::new()
            .name("fresco-gpu".into())
            .spawn(move || run_tasks(&receiver))
            .map_err(|_| CommandBufferError::ThreadSpawn("GPU"))?;
        let gpu_thread_id = gpu_thread.thread().id();
        tracing::debug!(?gpu_thread_id, "GPU thread started");

        Ok(Arc::new(Self {
            sync_point_manager: Arc::new(SyncPointManager::new()),
            tasks: Mutex::new(Some(sender)),
            gpu_thread: Mutex::new(Some(gpu_thread)),
            gpu_thread_id,
            next_command_buffer_id: AtomicU64::new(1),
            trace_sink,
        }))
    }

    /// The process-wide sync point manager.
    #[must_use]
    pub fn sync_point_manager(&self) -> &Arc<SyncPointManager> {
        &self.sync_point_manager
    }

    /// The configured trace sink, if any.
    #[must_use]
    pub fn trace_sink(&self) -> Option<&SharedTraceSink> {
        self.trace_sink.as_ref()
    }

    /// Allocates a fresh command-buffer id.
    pub fn next_command_buffer_id(&self) -> CommandBufferId {
        CommandBufferId(self.next_command_buffer_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns `true` when called on the GPU thread.
    #[must_use]
    pub fn is_gpu_thread(&self) -> bool {
        thread::current().id() == self.gpu_thread_id
    }

    /// Queues `task` behind previously posted tasks.
    ///
    /// Hands the task back if the GPU thread has shut down.
    pub fn post_task(&self, task: impl FnOnce() + Send + 'static) -> std::result::Result<(), Task> {
        let task: Task = Box::new(task);
        match &*self.tasks.lock() {
            Some(sender) => sender.send(task).map_err(|err| err.into_inner()),
            None => Err(task),
        }
    }

    /// Blocks until every task posted so far has run.
    ///
    /// Returns immediately on the GPU thread itself.
    pub fn finish(&self) {
        if self.is_gpu_thread() {
            return;
        }
        let (done, wait) = crossbeam_channel::bounded(1);
        if self
            .post_task(move || {
                _ = done.send(());
            })
            .is_ok()
        {
            _ = wait.recv();
        }
    }

    pub(crate) fn trace(&self, f: impl FnOnce(&mut Tracer<'_>)) {
        with_tracer(self.trace_sink.as_ref(), f);
    }
}

impl Drop for GpuState {
    fn drop(&mut self) {
        drop(self.tasks.lock().take());
        let Some(handle) = self.gpu_thread.lock().take() else {
            return;
        };
        if self.is_gpu_thread() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("GPU thread panicked");
        }
    }
}

fn run_tasks(receiver: &Receiver<Task>) {
    for task in receiver {
        task();
    }
    tracing::debug!("GPU thread exiting");
}
