use crate::error::TaskError;
use crate::handle::ResultHandle;
use std::fmt;

/// Type-safe step name wrapper.
///
/// Holds the display label used in logs. The machine name used on the
/// command line is derived from it, see [`StepName::machine_name`].
///
/// # Examples
///
/// ```
/// use steptask::StepName;
///
/// let name = StepName::new("Flush CDN cache");
/// assert_eq!(name.as_str(), "Flush CDN cache");
/// assert_eq!(name.machine_name(), "flush-cdn-cache");
///
/// let name: StepName = "Publish".into();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name accepted by `--skip`: lower-cased, spaces replaced with `-`.
    pub fn machine_name(&self) -> String {
        self.0.trim().to_lowercase().replace(' ', "-")
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StepName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StepName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// What a step's unit of work handed back.
///
/// Steps written as plain blocking functions return [`StepOutput::Value`];
/// non-blocking steps return one or many [`ResultHandle`]s. The runner treats
/// all shapes alike for logging and failure detection.
#[derive(Clone)]
pub enum StepOutput<T> {
    /// The step completed synchronously with this value.
    Value(T),
    /// The step started one asynchronous operation.
    Handle(ResultHandle<T>),
    /// The step started several independent asynchronous operations.
    Handles(Vec<ResultHandle<T>>),
    /// The operator asked for the step to be skipped; nothing ran.
    ///
    /// Only produced by the runner.
    Skipped,
}

impl<T> StepOutput<T> {
    /// Returns `true` when the step was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, StepOutput::Skipped)
    }

    /// Returns the synchronous value, if the step produced one.
    pub fn into_value(self) -> Option<T> {
        match self {
            StepOutput::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Normalizes the output into a list of handles.
    ///
    /// A plain value or a skipped step yields no handles.
    pub fn into_handles(self) -> Vec<ResultHandle<T>> {
        match self {
            StepOutput::Value(_) | StepOutput::Skipped => Vec::new(),
            StepOutput::Handle(handle) => vec![handle],
            StepOutput::Handles(handles) => handles,
        }
    }

    /// Borrowing variant of [`StepOutput::into_handles`].
    pub fn handles(&self) -> &[ResultHandle<T>] {
        match self {
            StepOutput::Value(_) | StepOutput::Skipped => &[],
            StepOutput::Handle(handle) => std::slice::from_ref(handle),
            StepOutput::Handles(handles) => handles,
        }
    }
}

impl<T: fmt::Debug + Clone> fmt::Debug for StepOutput<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutput::Value(value) => f.debug_tuple("Value").field(value).finish(),
            StepOutput::Handle(handle) => f.debug_tuple("Handle").field(handle).finish(),
            StepOutput::Handles(handles) => f.debug_tuple("Handles").field(handles).finish(),
            StepOutput::Skipped => write!(f, "Skipped"),
        }
    }
}

impl<T> From<ResultHandle<T>> for StepOutput<T> {
    fn from(handle: ResultHandle<T>) -> Self {
        StepOutput::Handle(handle)
    }
}

impl<T> From<Vec<ResultHandle<T>>> for StepOutput<T> {
    fn from(handles: Vec<ResultHandle<T>>) -> Self {
        StepOutput::Handles(handles)
    }
}

/// Lifecycle of a single step invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Invoked, no handle resolved yet.
    Pending,
    /// At least one handle has resolved.
    Started,
    /// Everything resolved and nothing failed.
    Succeeded,
    /// The call or at least one handle failed.
    Failed,
    /// Skipped on request; the unit of work never ran.
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::Pending => "pending",
            StepStatus::Started => "started",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        write!(f, "{}", label)
    }
}

/// A declared workflow phase: a display name bound to a unit of work.
///
/// Descriptors are immutable and usually live in a `static` declared with
/// [`define_step!`](crate::define_step), so one descriptor is shared by every
/// instance of the task type.
///
/// # Examples
///
/// ```
/// use steptask::{StepDescriptor, StepOutput, TaskError};
///
/// struct Greeter;
///
/// fn greet(_task: &Greeter, who: &str) -> Result<StepOutput<String>, TaskError> {
///     Ok(StepOutput::Value(format!("hello {}", who)))
/// }
///
/// let step = StepDescriptor::new("Greet", greet);
/// assert_eq!(step.name().as_str(), "Greet");
/// ```
pub struct StepDescriptor<F> {
    name: &'static str,
    target: F,
}

impl<F> StepDescriptor<F> {
    /// Binds `target` to the display label `name`.
    pub const fn new(name: &'static str, target: F) -> Self {
        Self { name, target }
    }

    /// Returns the display name.
    pub fn name(&self) -> StepName {
        StepName::new(self.name)
    }

    /// Calls the unit of work directly, bypassing the runner.
    pub(crate) fn call<C, A, T>(&self, task: &C, args: A) -> Result<StepOutput<T>, TaskError>
    where
        C: ?Sized,
        F: Fn(&C, A) -> Result<StepOutput<T>, TaskError>,
    {
        (self.target)(task, args)
    }
}

impl<F> fmt::Debug for StepDescriptor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("name", &self.name)
            .finish()
    }
}
