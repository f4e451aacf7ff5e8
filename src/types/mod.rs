// ABOUTME: Validated domain types shared by config and the deploy engine.
// ABOUTME: Environment names, variable names, and git revision references.

mod environment_name;
mod revision;
mod variable_name;

pub use environment_name::{EnvironmentName, EnvironmentNameError};
pub use revision::{ParseRevisionError, RevisionRef};
pub use variable_name::{VariableName, VariableNameError};
