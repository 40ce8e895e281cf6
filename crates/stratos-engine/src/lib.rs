mod cancel;
mod discovery;
mod engine;
mod error;
mod executor;
mod graph;
mod module;
mod pipeline;
mod program;
mod stack;
mod state;
mod workspace;

pub use cancel::{CancelDispatch, CancelSource, NeverCancelled, install_signal_scope};
#[cfg(target_os = "linux")]
pub use cancel::SignalScope;
pub use discovery::{DiscoveredStack, discover_stacks};
pub use engine::{
    DEFAULT_ENGINE_BINARY, Engine, OperationRequest, OperationSummary, ProcessEngine,
};
pub use error::{
    DiscoveryError, EngineError, GraphError, ModuleError, PipelineError, SettingsError, StackError,
};
pub use executor::{ExecutorOptions, execute};
pub use graph::{
    DependencyGraph, GraphOptions, build_dependency_graph, detect_cycle, topological_sort,
};
pub use module::{ANONYMOUS_MODULE, ModuleDescriptor, ModuleFactory};
pub use pipeline::{ComponentOutcome, run_component};
pub use program::{DeclaredResource, ProgramBuilder, ProgramManifest};
pub use stack::{ManagerOptions, Stack, StackConfig, StackManager, StackProgram};
pub use state::{ROOT_RESOURCE_TYPE, StackState};
pub use workspace::{
    ConfigValue, PROGRAM_MANIFEST_FILE, PROJECT_SETTINGS_FILE, ProjectSettings, RuntimeDescriptor,
    StackSettings, default_backend_url, flatten_config, read_stack_settings,
    stack_name_from_settings_file, stack_settings_file_name, validate_secrets_provider,
};
