// ABOUTME: Deployment coordination: per-host type-state pipelines under bounded fan-out.
// ABOUTME: Exports the coordinator, run records, report, lock, and error taxonomy.

mod coordinator;
mod error;
mod lock;
mod pipeline;
mod report;
mod run;
mod state;

pub use coordinator::{Coordinator, RunOptions};
pub use error::{DeployError, ErrorKind};
pub use lock::{DeployLock, LockInfo};
pub use pipeline::{HostContext, HostPipeline};
pub use report::{HostReport, RunReport, RunStatus, StageFailure};
pub use run::{DeploymentRun, HostPhase, HostRecord, HostStatus, HostTracker, RunMode};
pub use state::{Connected, Materialized, PostDeployed, Reloaded, SetUp, Synced};
