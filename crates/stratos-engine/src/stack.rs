use std::collections::BTreeMap;
use std::path::PathBuf;

use stratos_domain::{
    ComponentName, DebugLevel, EnvironmentId, OperationKind, OperationReport, StackName, Urn,
};

use crate::cancel::{CancelSource, install_signal_scope};
use crate::engine::{Engine, OperationRequest};
use crate::error::{EngineError, StackError};
use crate::pipeline::{ComponentOutcome, PipelineError};
use crate::state::StackState;
use crate::workspace::{
    ConfigValue, ProjectSettings, StackSettings, default_backend_url, validate_secrets_provider,
    write_program_manifest, write_project_settings, write_stack_settings_if_changed,
};

/// Closure that re-derives one stack's resource program. Invoked before
/// every lifecycle operation so the engine always sees a freshly generated
/// graph for that specific stack.
pub type StackProgram = Box<dyn Fn() -> Result<ComponentOutcome, PipelineError>>;

/// Per-stack workspace inputs for [`StackManager::create_or_select`].
#[derive(Default)]
pub struct StackConfig {
    pub secrets_provider: Option<String>,
    pub config: BTreeMap<String, ConfigValue>,
    /// Overrides the manager's default working directory for this stack.
    pub workdir: Option<PathBuf>,
}

/// A created-or-selected deployment stack, ready for lifecycle operations.
pub struct Stack {
    pub name: StackName,
    pub workdir: PathBuf,
    program: Option<StackProgram>,
}

#[derive(Debug, Clone, Default)]
pub struct ManagerOptions {
    /// Backend URL recorded in the project settings; a `file://` backend
    /// under the user's home directory when unset.
    pub backend: Option<String>,
    /// Elevates engine/provider log verbosity and keeps engine temp dirs.
    pub debug: Option<DebugLevel>,
}

/// Creates and drives deployment stacks against the underlying engine.
///
/// Project settings are persisted at most once per manager; stack settings
/// are rewritten only when their content changed.
pub struct StackManager<'engine> {
    engine: &'engine dyn Engine,
    project: String,
    default_workdir: PathBuf,
    options: ManagerOptions,
    project_settings_saved: bool,
}

impl<'engine> StackManager<'engine> {
    #[must_use]
    pub fn new(
        engine: &'engine dyn Engine,
        project: impl Into<String>,
        default_workdir: PathBuf,
        options: ManagerOptions,
    ) -> Self {
        Self {
            engine,
            project: project.into(),
            default_workdir,
            options,
            project_settings_saved: false,
        }
    }

    /// Idempotently create or select the stack for one environment/component
    /// pair, assembling its workspace settings on the way.
    ///
    /// # Errors
    ///
    /// Returns an error when settings validation/persistence fails or the
    /// engine can neither select nor create the stack.
    pub fn create_or_select(
        &mut self,
        environment: &EnvironmentId,
        component: &ComponentName,
        config: StackConfig,
        program: Option<StackProgram>,
    ) -> Result<Stack, StackError> {
        let name = StackName::for_component(environment, component);
        let workdir = config
            .workdir
            .unwrap_or_else(|| self.default_workdir.clone());

        self.persist_project_settings(&workdir)?;

        if let Some(uri) = &config.secrets_provider {
            validate_secrets_provider(uri)?;
        }
        let settings = StackSettings {
            secrets_provider: config.secrets_provider,
            config: config.config,
        };
        let _ = write_stack_settings_if_changed(&workdir, &name, &settings)?;

        self.engine.ensure_stack(&workdir, &name)?;
        Ok(Stack {
            name,
            workdir,
            program,
        })
    }

    /// Wrap an already-discovered stack (settings on disk, no program).
    #[must_use]
    pub fn adopt(&self, name: StackName, workdir: PathBuf) -> Stack {
        Stack {
            name,
            workdir,
            program: None,
        }
    }

    fn persist_project_settings(&mut self, workdir: &std::path::Path) -> Result<(), StackError> {
        if self.project_settings_saved {
            return Ok(());
        }
        let backend = match &self.options.backend {
            Some(value) => value.clone(),
            None => default_backend_url()?.to_string(),
        };
        let settings = ProjectSettings::new(self.project.clone(), Some(backend))?;
        write_project_settings(workdir, &settings)?;
        self.project_settings_saved = true;
        Ok(())
    }

    /// Run one lifecycle operation with OS interrupt/termination signals
    /// wired to a one-shot cancellation of the in-flight engine call.
    pub fn run_operation(
        &self,
        stack: &Stack,
        operation: OperationKind,
        targets: &[Urn],
        target_dependents: bool,
        on_output: &mut dyn FnMut(&str),
    ) -> OperationReport {
        match install_signal_scope() {
            Ok(mut scope) => self.run_operation_with(
                stack,
                operation,
                targets,
                target_dependents,
                &mut scope,
                on_output,
            ),
            Err(error) => failed_report(stack, operation, targets, false, &error.to_string()),
        }
    }

    /// Run one lifecycle operation against an explicit cancellation source.
    pub fn run_operation_with(
        &self,
        stack: &Stack,
        operation: OperationKind,
        targets: &[Urn],
        target_dependents: bool,
        cancel: &mut dyn CancelSource,
        on_output: &mut dyn FnMut(&str),
    ) -> OperationReport {
        if let Err(error) = self.refresh_program(stack, on_output) {
            return failed_report(stack, operation, targets, false, &error.to_string());
        }

        let request = OperationRequest {
            operation,
            stack: stack.name.clone(),
            targets: targets.to_vec(),
            target_dependents,
            debug: self.options.debug,
        };

        match self
            .engine
            .run_operation(&stack.workdir, &request, cancel, on_output)
        {
            Ok(summary) => OperationReport {
                stack: stack.name.clone(),
                operation,
                targets: targets.to_vec(),
                success: true,
                cancelled: summary.cancelled,
                error: None,
            },
            Err(error) => {
                let cancelled = matches!(error, EngineError::Cancelled { .. });
                failed_report(stack, operation, targets, cancelled, &error.to_string())
            }
        }
    }

    /// Export the stack's current resource state for target selection.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine export fails.
    pub fn export_state(&self, stack: &Stack) -> Result<StackState, StackError> {
        Ok(self.engine.export_state(&stack.workdir, &stack.name)?)
    }

    fn refresh_program(
        &self,
        stack: &Stack,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<(), StackError> {
        let Some(program) = &stack.program else {
            return Ok(());
        };
        let outcome = program()?;
        for warning in &outcome.report.warnings {
            on_output(&format!("warn: {warning}"));
        }
        if outcome.report.has_failures() {
            return Err(StackError::ProgramFailed {
                stack: stack.name.clone(),
                details: outcome.report.errors.join("\n  - "),
            });
        }
        write_program_manifest(&stack.workdir, &outcome.manifest)?;
        Ok(())
    }
}

fn failed_report(
    stack: &Stack,
    operation: OperationKind,
    targets: &[Urn],
    cancelled: bool,
    error: &str,
) -> OperationReport {
    OperationReport {
        stack: stack.name.clone(),
        operation,
        targets: targets.to_vec(),
        success: false,
        cancelled,
        error: Some(error.to_string()),
    }
}

#[cfg(test)]
mod tests;
