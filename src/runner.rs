//! Step execution: entry/exit logging, skipping, and completion tracking for
//! steps that return plain values or result handles.

use crate::error::TaskError;
use crate::handle::ResultHandle;
use crate::step::{StepDescriptor, StepName, StepOutput, StepStatus};
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs step descriptors on behalf of one task.
///
/// The runner never changes what a step returns. Every log line it emits is
/// a side effect; failures stay observable through the same `Err` or
/// [`ResultHandle`] the caller already holds.
#[derive(Debug, Clone)]
pub struct StepRunner {
    task: Arc<str>,
}

impl StepRunner {
    /// Creates a runner whose log lines are tagged with `task`.
    pub fn new(task: impl Into<Arc<str>>) -> Self {
        Self { task: task.into() }
    }

    /// Name of the task this runner logs for.
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Invokes `step` against `task` with `args`.
    ///
    /// - With `skip_requested` the unit of work is not called and
    ///   [`StepOutput::Skipped`] is returned.
    /// - A synchronous failure is logged and returned unchanged.
    /// - A plain value finishes the step immediately.
    /// - Returned handles are tracked: the step is in progress once any
    ///   handle resolves, failed if any handle fails, and finished once all
    ///   of them have resolved. The handles handed back resolve to the same
    ///   results, and by the time one of them resolves its log lines have
    ///   been written. This call does not wait for them.
    pub fn run_step<C, A, T, F>(
        &self,
        step: &StepDescriptor<F>,
        task: &C,
        args: A,
        skip_requested: bool,
    ) -> Result<StepOutput<T>, TaskError>
    where
        C: ?Sized,
        F: Fn(&C, A) -> Result<StepOutput<T>, TaskError>,
        T: Clone + Send + Sync + 'static,
    {
        let name = step.name();
        if skip_requested {
            info!(
                task = %self.task,
                status = %StepStatus::Skipped,
                "Step '{}' skipped",
                name
            );
            return Ok(StepOutput::Skipped);
        }

        let mut invocation = StepInvocation::begin(self.task.clone(), name);

        match step.call(task, args) {
            Ok(output) => Ok(invocation.observe(output)),
            Err(e) => {
                invocation.fail(&e);
                invocation.finish(StepStatus::Failed);
                Err(e)
            }
        }
    }
}

/// State of one execution of a step. Owned by `run_step` and, for
/// asynchronous steps, by the [`Completion`] shared between its handles.
struct StepInvocation {
    task: Arc<str>,
    name: StepName,
    started_at: Instant,
    status: StepStatus,
}

impl StepInvocation {
    fn begin(task: Arc<str>, name: StepName) -> Self {
        info!(task = %task, "Entering step '{}'", name);
        Self {
            task,
            name,
            started_at: Instant::now(),
            status: StepStatus::Pending,
        }
    }

    fn progress(&mut self) {
        if self.status == StepStatus::Pending {
            self.status = StepStatus::Started;
            info!(task = %self.task, "Step '{}' in progress", self.name);
        }
    }

    fn fail(&mut self, e: &TaskError) {
        self.status = StepStatus::Failed;
        error!(task = %self.task, "Step '{}' failed: {}", self.name, e);
    }

    fn finish(self, status: StepStatus) {
        info!(
            task = %self.task,
            status = %status,
            elapsed_ms = self.started_at.elapsed().as_millis() as u64,
            "Step '{}' finished",
            self.name
        );
    }

    fn observe<T>(self, output: StepOutput<T>) -> StepOutput<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        match output {
            StepOutput::Handle(handle) => {
                let mut tracked = self.track(vec![handle]);
                match tracked.pop() {
                    Some(handle) => StepOutput::Handle(handle),
                    None => StepOutput::Handles(tracked),
                }
            }
            StepOutput::Handles(handles) if !handles.is_empty() => {
                StepOutput::Handles(self.track(handles))
            }
            other => {
                self.finish(StepStatus::Succeeded);
                other
            }
        }
    }

    // Wraps every handle so that resolving it records the outcome first.
    // With a runtime available the wrapped handles are also driven in the
    // background, so the step completes even if the caller never awaits.
    fn track<T>(self, handles: Vec<ResultHandle<T>>) -> Vec<ResultHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().ok();
        if runtime.is_none() {
            warn!(
                task = %self.task,
                "Step '{}' returned {} handle(s) outside a tokio runtime; completion is logged as they are awaited",
                self.name,
                handles.len()
            );
        }

        let completion = Arc::new(Completion::new(self, handles.len()));
        let tracked: Vec<ResultHandle<T>> = handles
            .into_iter()
            .map(|handle| completion.track(handle))
            .collect();

        if let Some(runtime) = runtime {
            let watched = tracked.clone();
            runtime.spawn(async move {
                join_all(watched).await;
            });
        }
        tracked
    }
}

/// Outcome bookkeeping shared by the tracked handles of one invocation.
struct Completion {
    state: Mutex<CompletionState>,
}

struct CompletionState {
    invocation: Option<StepInvocation>,
    remaining: usize,
    failed: usize,
}

impl Completion {
    fn new(invocation: StepInvocation, handles: usize) -> Self {
        Self {
            state: Mutex::new(CompletionState {
                invocation: Some(invocation),
                remaining: handles,
                failed: 0,
            }),
        }
    }

    fn track<T>(self: &Arc<Self>, handle: ResultHandle<T>) -> ResultHandle<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let completion = Arc::clone(self);
        ResultHandle::from_future(async move {
            let result = handle.await;
            completion.record(result.as_ref().err());
            result
        })
    }

    // Called once per handle; the call for the last handle finishes the step.
    fn record(&self, error: Option<&TaskError>) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;
        let Some(invocation) = state.invocation.as_mut() else {
            return;
        };

        invocation.progress();
        if let Some(e) = error {
            state.failed += 1;
            invocation.fail(e);
        }
        state.remaining = state.remaining.saturating_sub(1);
        if state.remaining > 0 {
            return;
        }

        if let Some(invocation) = state.invocation.take() {
            debug!(
                task = %invocation.task,
                failed = state.failed,
                "Step '{}' resolved all handles",
                invocation.name
            );
            let status = match invocation.status {
                StepStatus::Failed => StepStatus::Failed,
                _ => StepStatus::Succeeded,
            };
            invocation.finish(status);
        }
    }
}
