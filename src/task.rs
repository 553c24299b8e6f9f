//! Scaffolding shared by every runnable task: argument parsing, logging
//! setup, and routing of step calls through the [`StepRunner`].

use crate::description::format_description;
use crate::error::TaskError;
use crate::logging;
use crate::runner::StepRunner;
use crate::step::{StepDescriptor, StepName, StepOutput};
use async_trait::async_trait;
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::ffi::OsString;
use std::fmt;
use std::sync::OnceLock;
use tracing::{warn, Level};

/// Something that registers command-line options for a task.
///
/// A task is composed from its own contributor plus any service
/// contributors (for example [`FastPurgeArgs`](crate::cdn::FastPurgeArgs)).
/// Each one gets the command in registration order and returns it with its
/// options added.
pub trait ArgContributor: Send + Sync {
    /// Adds this contributor's options to `command`.
    fn add_args(&self, command: Command) -> Command;
}

impl<F> ArgContributor for F
where
    F: Fn(Command) -> Command + Send + Sync,
{
    fn add_args(&self, command: Command) -> Command {
        self(command)
    }
}

/// Common state of a runnable task.
///
/// Owns the argument specification (parsed lazily, once), the formatted
/// description, the declared steps and the runner those steps go through.
pub struct TaskBase {
    name: String,
    description: String,
    command: Command,
    argv: Option<Vec<OsString>>,
    matches: OnceLock<ArgMatches>,
    steps: Vec<StepName>,
    runner: StepRunner,
}

impl fmt::Debug for TaskBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBase")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("parsed", &self.matches.get().is_some())
            .finish()
    }
}

impl TaskBase {
    /// Starts building the base for a task called `name`, documented by
    /// `doc`.
    pub fn builder(name: impl Into<String>, doc: impl Into<String>) -> TaskBaseBuilder {
        TaskBaseBuilder::new(name, doc)
    }

    /// Task name, used as the program name and to tag log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description derived from the task documentation. Shown in `--help`.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Full help text, as printed by `--help`. Used for generated docs.
    pub fn render_help(&self) -> String {
        self.command.clone().render_long_help().to_string()
    }

    /// Steps declared for this task, in declaration order.
    pub fn steps(&self) -> &[StepName] {
        &self.steps
    }

    /// Runner that every [`TaskBase::step`] call goes through.
    pub fn runner(&self) -> &StepRunner {
        &self.runner
    }

    /// Parsed command-line arguments.
    ///
    /// Parsed on first use and cached for the lifetime of the task.
    /// `--help` and `--version` print and exit the process the way clap
    /// does; any other parse error is returned.
    pub fn args(&self) -> Result<&ArgMatches, TaskError> {
        if let Some(matches) = self.matches.get() {
            return Ok(matches);
        }

        let command = self.command.clone();
        let parsed = match &self.argv {
            Some(argv) => command.try_get_matches_from(argv.clone()),
            None => command.try_get_matches(),
        };
        let matches = match parsed {
            Ok(matches) => matches,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::DisplayHelp
                        | ErrorKind::DisplayVersion
                        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) =>
            {
                e.exit()
            }
            Err(e) => return Err(TaskError::Arguments(e.to_string().trim().to_string())),
        };

        Ok(self.matches.get_or_init(|| matches))
    }

    /// `true` when `--verbose` was given.
    pub fn verbose(&self) -> Result<bool, TaskError> {
        Ok(self.args()?.get_flag("verbose"))
    }

    /// `true` when `--debug` was given.
    pub fn debug(&self) -> Result<bool, TaskError> {
        Ok(self.args()?.get_flag("debug"))
    }

    /// `true` when the operator asked for `step` to be skipped.
    pub fn skip_requested(&self, step: &StepName) -> Result<bool, TaskError> {
        let machine_name = step.machine_name();
        let skipped = self
            .args()?
            .get_many::<String>("skip")
            .map_or(false, |mut names| names.any(|n| n.trim() == machine_name));
        Ok(skipped)
    }

    /// Installs logging at INFO, or DEBUG with `--debug`.
    pub fn setup_logging(&self) -> Result<Level, TaskError> {
        let level = logging::level_for(self.debug()?);
        Ok(logging::init(level))
    }

    /// Runs `step` for `task` through the step runner, honouring `--skip`.
    pub fn step<C, A, T, F>(
        &self,
        step: &StepDescriptor<F>,
        task: &C,
        args: A,
    ) -> Result<StepOutput<T>, TaskError>
    where
        C: ?Sized,
        F: Fn(&C, A) -> Result<StepOutput<T>, TaskError>,
        T: Clone + Send + Sync + 'static,
    {
        let skip = self.skip_requested(&step.name())?;
        self.runner.run_step(step, task, args, skip)
    }

    /// Warns about `--skip` names that match no declared step.
    ///
    /// Called by [`Task::main`] once logging is set up.
    pub fn warn_unknown_skips(&self) -> Result<(), TaskError> {
        let Some(requested) = self.args()?.get_many::<String>("skip") else {
            return Ok(());
        };
        let known: Vec<String> = self.steps.iter().map(StepName::machine_name).collect();
        for name in requested.map(|n| n.trim()).filter(|n| !n.is_empty()) {
            if !known.iter().any(|k| k == name) {
                warn!(task = %self.name, "Unknown step '{}' passed to --skip", name);
            }
        }
        Ok(())
    }
}

/// Builder for [`TaskBase`].
pub struct TaskBaseBuilder {
    name: String,
    doc: String,
    contributors: Vec<Box<dyn ArgContributor>>,
    steps: Vec<StepName>,
    argv: Option<Vec<OsString>>,
}

impl TaskBaseBuilder {
    /// Same as [`TaskBase::builder`].
    pub fn new(name: impl Into<String>, doc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: doc.into(),
            contributors: Vec::new(),
            steps: Vec::new(),
            argv: None,
        }
    }

    /// Adds an option contributor. Contributors run in the order added,
    /// after the basic options.
    pub fn contributor(mut self, contributor: impl ArgContributor + 'static) -> Self {
        self.contributors.push(Box::new(contributor));
        self
    }

    /// Declares a step so it is listed in `--skip` help.
    pub fn step<F>(mut self, step: &StepDescriptor<F>) -> Self {
        self.steps.push(step.name());
        self
    }

    /// Parses `argv` instead of the process arguments. The first item is
    /// the program name.
    pub fn argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.argv = Some(argv.into_iter().map(Into::into).collect());
        self
    }

    /// Builds the command line: basic options first, then each
    /// contributor's. Nothing is parsed until [`TaskBase::args`].
    pub fn build(self) -> TaskBase {
        let description = format_description(&self.doc);
        let command = Command::new(self.name.clone()).about(description.clone());
        let command = basic_args(command, &self.steps);
        let command = self
            .contributors
            .iter()
            .fold(command, |command, contributor| contributor.add_args(command));

        TaskBase {
            runner: StepRunner::new(self.name.as_str()),
            name: self.name,
            description,
            command,
            argv: self.argv,
            matches: OnceLock::new(),
            steps: self.steps,
        }
    }
}

// Options every task understands.
fn basic_args(command: Command, steps: &[StepName]) -> Command {
    let mut skip_help = String::from("skip the given steps (comma-separated)");
    if !steps.is_empty() {
        let names: Vec<String> = steps.iter().map(StepName::machine_name).collect();
        skip_help.push_str(&format!("; one of: {}", names.join(", ")));
    }

    command
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("show logs"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("show debug statements. Used along --verbose"),
        )
        .arg(
            Arg::new("skip")
                .long("skip")
                .value_name("STEPS")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .help(skip_help),
        )
}

/// A runnable task.
///
/// Implementors own a [`TaskBase`] and provide [`Task::run`]. The provided
/// [`Task::main`] is the entry point used by binaries.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use steptask::{Task, TaskBase, TaskError};
///
/// struct Hello {
///     base: TaskBase,
/// }
///
/// #[async_trait]
/// impl Task for Hello {
///     fn base(&self) -> &TaskBase {
///         &self.base
///     }
///
///     async fn run(&self) -> Result<(), TaskError> {
///         Ok(())
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() {
/// let task = Hello {
///     base: TaskBase::builder("hello", "Says hello").argv(["hello"]).build(),
/// };
/// assert_eq!(task.main().await, Ok(0));
/// # }
/// ```
#[async_trait]
pub trait Task: Send + Sync {
    fn base(&self) -> &TaskBase;

    /// The task's workflow. Must be provided by concrete tasks.
    async fn run(&self) -> Result<(), TaskError> {
        Err(TaskError::NotImplemented(self.base().name().to_string()))
    }

    /// Parses arguments, sets up logging when `--verbose` was given, runs
    /// the task and returns the process exit code.
    async fn main(&self) -> Result<i32, TaskError> {
        let base = self.base();
        if base.verbose()? {
            base.setup_logging()?;
        }
        base.warn_unknown_skips()?;
        self.run().await?;
        Ok(0)
    }
}
