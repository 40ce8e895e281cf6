#![allow(clippy::expect_used)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use stratos_domain::{Capability, ComponentName, EnvironmentId, ModuleMeta, ModuleName, OperationKind, StackName};

use super::{ManagerOptions, StackConfig, StackManager, StackProgram};
use crate::cancel::NeverCancelled;
use crate::engine::{Engine, OperationRequest, OperationSummary};
use crate::error::EngineError;
use crate::executor::ExecutorOptions;
use crate::graph::GraphOptions;
use crate::module::ModuleDescriptor;
use crate::pipeline::run_component;
use crate::state::StackState;
use crate::workspace::{ConfigValue, PROGRAM_MANIFEST_FILE, PROJECT_SETTINGS_FILE};

#[derive(Default)]
struct MockEngine {
    calls: RefCell<Vec<String>>,
    fail_operations: bool,
}

impl Engine for MockEngine {
    fn ensure_stack(&self, _workdir: &Path, stack: &StackName) -> Result<(), EngineError> {
        self.calls.borrow_mut().push(format!("ensure:{stack}"));
        Ok(())
    }

    fn run_operation(
        &self,
        _workdir: &Path,
        request: &OperationRequest,
        _cancel: &mut dyn crate::cancel::CancelSource,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<OperationSummary, EngineError> {
        self.calls
            .borrow_mut()
            .push(format!("{}:{}", request.operation, request.stack));
        if self.fail_operations {
            return Err(EngineError::Spawn {
                binary: "vega".to_string(),
                source: std::io::Error::other("engine unavailable"),
            });
        }
        on_output("done");
        Ok(OperationSummary { cancelled: false })
    }

    fn export_state(&self, _workdir: &Path, stack: &StackName) -> Result<StackState, EngineError> {
        self.calls.borrow_mut().push(format!("export:{stack}"));
        Ok(StackState::default())
    }

    fn cancel_operation(&self, _workdir: &Path, stack: &StackName) -> Result<(), EngineError> {
        self.calls.borrow_mut().push(format!("cancel:{stack}"));
        Ok(())
    }
}

fn environment() -> EnvironmentId {
    EnvironmentId::try_from("prod").expect("environment")
}

fn component(name: &str) -> ComponentName {
    ComponentName::try_from(name).expect("component")
}

fn network_program(runs: Rc<RefCell<usize>>) -> StackProgram {
    Box::new(move || {
        *runs.borrow_mut() += 1;
        let mut meta = ModuleMeta::new(ModuleName::try_from("net").expect("module name"));
        meta.provides = vec![Capability::Network];
        let modules = vec![ModuleDescriptor::typed(meta, |_, program| {
            program.declare("gcp:network:vpc", "main", &[]).map(Some)
        })];
        run_component(
            environment(),
            component("network"),
            modules,
            GraphOptions::default(),
            ExecutorOptions::default(),
        )
    })
}

#[test]
fn project_settings_are_persisted_once_across_stacks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = MockEngine::default();
    let mut manager = StackManager::new(
        &engine,
        "infra",
        temp.path().to_path_buf(),
        ManagerOptions::default(),
    );

    let config = StackConfig {
        secrets_provider: Some("passphrase://".to_string()),
        config: BTreeMap::from([("gcp:region".to_string(), ConfigValue::plain("europe-west4"))]),
        workdir: None,
    };
    let first = manager
        .create_or_select(&environment(), &component("network"), config, None)
        .expect("first stack");
    let project_file = temp.path().join(PROJECT_SETTINGS_FILE);
    assert!(project_file.exists());
    let written = std::fs::metadata(&project_file).expect("metadata").modified().expect("mtime");

    let second = manager
        .create_or_select(
            &environment(),
            &component("platform"),
            StackConfig::default(),
            None,
        )
        .expect("second stack");

    assert_eq!(first.name.as_str(), "prod-network");
    assert_eq!(second.name.as_str(), "prod-platform");
    assert_eq!(
        std::fs::metadata(&project_file).expect("metadata").modified().expect("mtime"),
        written,
        "project settings must not be rewritten"
    );
    assert!(temp.path().join("Vega.prod-network.json").exists());
    assert!(temp.path().join("Vega.prod-platform.json").exists());
    assert_eq!(
        *engine.calls.borrow(),
        vec!["ensure:prod-network", "ensure:prod-platform"]
    );
}

#[test]
fn operations_rederive_the_program_each_time() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = MockEngine::default();
    let mut manager = StackManager::new(
        &engine,
        "infra",
        temp.path().to_path_buf(),
        ManagerOptions::default(),
    );
    let runs = Rc::new(RefCell::new(0_usize));
    let stack = manager
        .create_or_select(
            &environment(),
            &component("network"),
            StackConfig::default(),
            Some(network_program(Rc::clone(&runs))),
        )
        .expect("stack");

    let mut lines = Vec::new();
    let preview = manager.run_operation_with(
        &stack,
        OperationKind::Preview,
        &[],
        false,
        &mut NeverCancelled,
        &mut |line| lines.push(line.to_string()),
    );
    let up = manager.run_operation_with(
        &stack,
        OperationKind::Up,
        &[],
        false,
        &mut NeverCancelled,
        &mut |_| {},
    );

    assert!(preview.success);
    assert!(up.success);
    assert_eq!(*runs.borrow(), 2, "program must be re-derived per operation");
    assert!(temp.path().join(PROGRAM_MANIFEST_FILE).exists());
    assert_eq!(lines, vec!["done"]);
}

#[test]
fn engine_failures_are_attributed_to_the_stack() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = MockEngine {
        fail_operations: true,
        ..MockEngine::default()
    };
    let mut manager = StackManager::new(
        &engine,
        "infra",
        temp.path().to_path_buf(),
        ManagerOptions::default(),
    );
    let stack = manager
        .create_or_select(&environment(), &component("network"), StackConfig::default(), None)
        .expect("stack");

    let report = manager.run_operation_with(
        &stack,
        OperationKind::Up,
        &[],
        false,
        &mut NeverCancelled,
        &mut |_| {},
    );

    assert!(!report.success);
    assert!(!report.cancelled);
    let error = report.error.expect("error message");
    assert!(error.contains("vega"), "error: {error}");
}

#[test]
fn failing_program_blocks_the_engine_operation() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = MockEngine::default();
    let mut manager = StackManager::new(
        &engine,
        "infra",
        temp.path().to_path_buf(),
        ManagerOptions::default(),
    );

    let program: StackProgram = Box::new(|| {
        let mut meta = ModuleMeta::new(ModuleName::try_from("net").expect("module name"));
        meta.provides = vec![Capability::Network];
        let modules = vec![ModuleDescriptor::typed(meta, |_, _| {
            Err(crate::error::ModuleError::Invariant {
                message: "quota exceeded".to_string(),
            })
        })];
        run_component(
            environment(),
            component("network"),
            modules,
            GraphOptions::default(),
            ExecutorOptions::default(),
        )
    });

    let stack = manager
        .create_or_select(&environment(), &component("network"), StackConfig::default(), Some(program))
        .expect("stack");
    let report = manager.run_operation_with(
        &stack,
        OperationKind::Up,
        &[],
        false,
        &mut NeverCancelled,
        &mut |_| {},
    );

    assert!(!report.success);
    let error = report.error.expect("error message");
    assert!(error.contains("prod-network"), "error: {error}");
    assert!(error.contains("quota exceeded"), "error: {error}");
    assert!(
        !engine
            .calls
            .borrow()
            .iter()
            .any(|call| call.starts_with("up:")),
        "engine must not run an operation for a failing program"
    );
}
