//! Commonly used types and traits

pub use crate::define_step;
pub use crate::error::TaskError;
pub use crate::handle::ResultHandle;
pub use crate::step::{StepDescriptor, StepName, StepOutput, StepStatus};
pub use crate::task::{ArgContributor, Task, TaskBase};
