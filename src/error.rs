use crate::step::StepName;
use thiserror::Error;

/// Errors that can occur while running a task or one of its steps.
///
/// `TaskError` is `Clone` because a single failure may be observed by every
/// clone of a [`ResultHandle`](crate::ResultHandle): the caller, the step
/// runner's completion watcher, and any combinator built on top of it all see
/// the same value.
///
/// # Non-Exhaustive
///
/// Always include a wildcard arm when matching:
///
/// ```
/// use steptask::TaskError;
///
/// fn describe(error: &TaskError) -> String {
///     match error {
///         TaskError::StepFailed { step_name, details } => {
///             format!("step {} failed: {}", step_name, details)
///         }
///         TaskError::NotImplemented(task) => format!("{} has no run()", task),
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TaskError {
    /// A step's unit of work failed, either synchronously or through one of
    /// the handles it returned.
    #[error("Step failed: {step_name}, details: {details}")]
    StepFailed {
        /// The display name of the step that failed
        step_name: StepName,
        /// Details about the failure
        details: String,
    },

    /// A cache purge request failed.
    #[error("Purge failed: {0}")]
    Purge(String),

    /// The asynchronous work behind a handle panicked or was aborted before
    /// it could resolve.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Command-line arguments could not be parsed.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// The task configuration is invalid or could not be loaded.
    #[error("Invalid task configuration: {0}")]
    Configuration(String),

    /// `run()` was invoked on a task that does not implement it.
    #[error("Task '{0}' does not implement run()")]
    NotImplemented(String),
}

impl TaskError {
    /// Shorthand for a [`TaskError::StepFailed`] raised by a step's own code.
    pub fn step(step_name: impl Into<StepName>, details: impl Into<String>) -> Self {
        TaskError::StepFailed {
            step_name: step_name.into(),
            details: details.into(),
        }
    }
}
