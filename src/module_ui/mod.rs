pub mod descriptor;
pub mod namespace;
pub mod registry;

pub use descriptor::{ExplorerUi, ModuleDescriptor, ModuleStatus, ModuleStatuses, RunningModules};
pub use registry::{ModuleUiRegistry, PollOutcome, ReconcileReport, UiSource};
