//! # steptask
//!
//! Scaffolding for command-line maintenance tasks built from named steps.
//!
//! A task owns a [`TaskBase`] (argument parsing, logging setup, step
//! routing) and implements [`Task::run`]. Methods of the task are declared
//! as steps with [`define_step!`]; calling them through
//! [`TaskBase::step`] gives every step the same behaviour:
//!
//! - entry and exit are logged
//! - the step can be skipped with `--skip <step-name>`
//! - a step may return a plain value, one [`ResultHandle`], or many of them;
//!   for handles the step is *in progress* once any handle resolves,
//!   *failed* if any handle fails, and *finished* once all have resolved
//!
//! The runner only observes. Failures reach the caller unchanged, through the
//! returned `Err` or the handles it already holds.
//!
//! ## Features
//!
//! - **Uniform step semantics** for blocking and non-blocking steps
//! - **Fan-out helpers**: [`cdn::CdnCache`] issues one purge per record and
//!   hands back one handle per record
//! - **Composable options**: services add their own options through
//!   [`ArgContributor`]
//! - **Structured errors** with `thiserror`, logging with `tracing`
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use steptask::prelude::*;
//!
//! struct Hello {
//!     base: TaskBase,
//! }
//!
//! define_step! {
//!     static GREET("Greet"): fn(&Hello, &str) -> String = Hello::greet_now;
//! }
//!
//! impl Hello {
//!     fn greet(&self, who: &str) -> Result<StepOutput<String>, TaskError> {
//!         self.base.step(&GREET, self, who)
//!     }
//!
//!     fn greet_now(&self, who: &str) -> Result<StepOutput<String>, TaskError> {
//!         let who = who.to_string();
//!         Ok(StepOutput::Handle(ResultHandle::spawn(async move {
//!             Ok(format!("hello {}", who))
//!         })))
//!     }
//! }
//!
//! #[async_trait]
//! impl Task for Hello {
//!     fn base(&self) -> &TaskBase {
//!         &self.base
//!     }
//!
//!     async fn run(&self) -> Result<(), TaskError> {
//!         for handle in self.greet("world")?.into_handles() {
//!             assert_eq!(handle.await?, "hello world");
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let task = Hello {
//!     base: TaskBase::builder("hello", "Greets the world")
//!         .step(&GREET)
//!         .argv(["hello"])
//!         .build(),
//! };
//! assert_eq!(task.main().await, Ok(0));
//! # }
//! ```
//!
//! ## Skipping Steps
//!
//! ```rust
//! use steptask::prelude::*;
//!
//! struct Publisher {
//!     base: TaskBase,
//! }
//!
//! define_step! {
//!     static PUBLISH("Publish"): fn(&Publisher, u32) -> u32 = Publisher::publish_now;
//! }
//!
//! impl Publisher {
//!     fn publish_now(&self, _repos: u32) -> Result<StepOutput<u32>, TaskError> {
//!         Err(TaskError::step("Publish", "must not run"))
//!     }
//! }
//!
//! let publisher = Publisher {
//!     base: TaskBase::builder("publish", "Publishes repos")
//!         .step(&PUBLISH)
//!         .argv(["publish", "--skip", "publish"])
//!         .build(),
//! };
//! let output = publisher.base.step(&PUBLISH, &publisher, 3).expect("skipped");
//! assert!(output.is_skipped());
//! ```

pub mod cdn;
pub mod description;
mod error;
mod handle;
pub mod logging;
mod runner;
mod step;
mod task;
pub mod tasks;

pub mod prelude;

#[cfg(test)]
mod test_support;

pub use error::TaskError;
pub use handle::ResultHandle;
pub use runner::StepRunner;
pub use step::{StepDescriptor, StepName, StepOutput, StepStatus};
pub use task::{ArgContributor, Task, TaskBase, TaskBaseBuilder};

/// Declares a `static` [`StepDescriptor`] bound to a task method.
///
/// The method takes the task by reference plus one argument (use a tuple
/// for several, `()` for none) and returns
/// `Result<StepOutput<T>, TaskError>`. Call the step through
/// [`TaskBase::step`] so it gets logging and `--skip` handling.
///
/// # Example
///
/// ```rust
/// use steptask::{define_step, StepOutput, TaskError};
///
/// struct Publisher;
///
/// impl Publisher {
///     fn publish_now(&self, repos: &[String]) -> Result<StepOutput<usize>, TaskError> {
///         Ok(StepOutput::Value(repos.len()))
///     }
/// }
///
/// define_step! {
///     /// Publishes the given repositories.
///     pub static PUBLISH("Publish"): fn(&Publisher, &[String]) -> usize = Publisher::publish_now;
/// }
///
/// assert_eq!(PUBLISH.name().as_str(), "Publish");
/// ```
#[macro_export]
macro_rules! define_step {
    ($(#[$meta:meta])* $vis:vis static $ident:ident($name:literal): fn(&$task:ty, $arg:ty) -> $out:ty = $target:path;) => {
        $(#[$meta])*
        $vis static $ident: $crate::StepDescriptor<
            fn(&$task, $arg) -> ::std::result::Result<$crate::StepOutput<$out>, $crate::TaskError>,
        > = $crate::StepDescriptor::new($name, $target);
    };
}
