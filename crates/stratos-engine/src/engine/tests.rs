#![allow(clippy::expect_used)]
#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use stratos_domain::{OperationKind, StackName, Urn};

use super::{Engine, OperationRequest, ProcessEngine};
use crate::cancel::{CancelSource, NeverCancelled};
use crate::error::EngineError;

struct AlwaysCancelled;

impl CancelSource for AlwaysCancelled {
    fn cancel_requested(&mut self) -> bool {
        true
    }
}

fn stack() -> StackName {
    StackName::parse("prod-network".to_string()).expect("stack name")
}

fn request(operation: OperationKind) -> OperationRequest {
    OperationRequest {
        operation,
        stack: stack(),
        targets: Vec::new(),
        target_dependents: false,
        debug: None,
    }
}

/// Write a fake engine script that records its invocations under `dir`.
fn fake_engine(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
dir="{dir}"
case "$1" in
  stack)
    case "$2" in
      select) [ -f "$dir/exists" ] && exit 0; exit 1 ;;
      init) touch "$dir/exists"; exit 0 ;;
      export) printf '%s' '{{"resources":[{{"urn":"urn:prod-network::gcp:network:vpc::main","type":"gcp:network:vpc","name":"main","composite":false}}]}}'; exit 0 ;;
    esac ;;
  preview) echo "previewing stack"; echo "no changes"; exit 0 ;;
  up) echo "provisioning" ; echo "quota exceeded" >&2; exit 3 ;;
  refresh)
    i=0
    while [ ! -f "$dir/cancelled" ]; do
      i=$((i+1))
      [ "$i" -gt 200 ] && exit 7
      sleep 0.05
    done
    exit 2 ;;
  cancel) echo cancel >> "$dir/cancel.log"; touch "$dir/cancelled"; exit 0 ;;
esac
exit 64
"#,
        dir = dir.display()
    );

    let path = dir.join("vega");
    fs::write(&path, script).expect("write fake engine");
    let mut permissions = fs::metadata(&path).expect("metadata").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("chmod");
    path
}

#[test]
fn ensure_stack_initializes_then_selects() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = ProcessEngine::with_binary(fake_engine(temp.path()));

    engine
        .ensure_stack(temp.path(), &stack())
        .expect("init on first ensure");
    assert!(temp.path().join("exists").exists());

    engine
        .ensure_stack(temp.path(), &stack())
        .expect("select on second ensure");
}

#[test]
fn run_operation_streams_output_lines() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = ProcessEngine::with_binary(fake_engine(temp.path()));

    let mut lines = Vec::new();
    let summary = engine
        .run_operation(
            temp.path(),
            &request(OperationKind::Preview),
            &mut NeverCancelled,
            &mut |line| lines.push(line.to_string()),
        )
        .expect("preview succeeds");

    assert!(!summary.cancelled);
    assert_eq!(lines, vec!["previewing stack", "no changes"]);
}

#[test]
fn failed_operation_carries_stream_tails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = ProcessEngine::with_binary(fake_engine(temp.path()));

    let error = engine
        .run_operation(
            temp.path(),
            &request(OperationKind::Up),
            &mut NeverCancelled,
            &mut |_| {},
        )
        .expect_err("up must fail");

    assert!(matches!(error, EngineError::OperationFailed { .. }));
    let rendered = error.to_string();
    assert!(rendered.contains("prod-network"));
    assert!(rendered.contains("provisioning"), "rendered: {rendered}");
    assert!(rendered.contains("quota exceeded"), "rendered: {rendered}");
}

#[test]
fn repeated_cancel_requests_issue_one_engine_cancel() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = ProcessEngine::with_binary(fake_engine(temp.path()));

    let error = engine
        .run_operation(
            temp.path(),
            &request(OperationKind::Refresh),
            &mut AlwaysCancelled,
            &mut |_| {},
        )
        .expect_err("cancelled refresh must fail");
    assert!(matches!(error, EngineError::Cancelled { .. }));

    let log = fs::read_to_string(temp.path().join("cancel.log")).expect("cancel log");
    assert_eq!(log.lines().count(), 1, "log: {log:?}");
}

#[test]
fn export_state_decodes_resources() {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = ProcessEngine::with_binary(fake_engine(temp.path()));

    let state = engine.export_state(temp.path(), &stack()).expect("export");
    assert_eq!(state.resources.len(), 1);
    assert_eq!(
        state.resources[0].urn,
        Urn::try_from("urn:prod-network::gcp:network:vpc::main").expect("urn")
    );
    assert!(!state.resources[0].composite);
}

#[test]
fn missing_binary_is_reported_by_name() {
    let error = ProcessEngine::resolve(Some("definitely-not-a-real-engine"))
        .expect_err("must fail");
    assert!(error.to_string().contains("definitely-not-a-real-engine"));
}
