use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use stratos_domain::{
    Capability, DomainValidationError, ModuleName, OperationKind, StackName, Urn,
};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("dependency cycle detected: {cycle}")]
    CycleDetected { cycle: String },
    #[error(
        "capability \"{capability}\" provided by both \"{first}\" and \"{second}\" (collisions are denied)"
    )]
    CapabilityCollision {
        capability: Capability,
        first: ModuleName,
        second: ModuleName,
    },
}

/// Errors a module factory may surface while declaring resources.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("{message}")]
    Invariant { message: String },
    #[error("resource already declared: {urn}")]
    DuplicateResource { urn: Urn },
    #[error(transparent)]
    Validation(#[from] DomainValidationError),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode settings as JSON")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode settings file: {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid backend URL \"{value}\"")]
    InvalidBackendUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid secrets provider URI: expected scheme://path, got \"{uri}\"")]
    InvalidSecretsUri { uri: String },
    #[error("unsupported scheme \"{scheme}\" in secrets provider URI \"{uri}\"")]
    UnsupportedSecretsScheme { scheme: String, uri: String },
    #[error("cannot determine a home directory for the default file backend")]
    NoHomeDirectory,
    #[error("cannot express {path} as a file backend URL")]
    HomeBackendPath { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine binary \"{binary}\" not found on PATH")]
    BinaryNotFound { binary: String },
    #[error("failed to execute engine binary \"{binary}\"")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("signal handling failed: {message}")]
    Signal { message: String },
    #[error(
        "{stack}: {operation} failed (exit: {status})\n[stdout]\n{stdout}\n[stderr]\n{stderr}"
    )]
    OperationFailed {
        operation: OperationKind,
        stack: StackName,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    #[error("{stack}: {operation} cancelled by operator")]
    Cancelled {
        operation: OperationKind,
        stack: StackName,
    },
    #[error("{stack}: {action} failed (exit: {status}): {stderr}")]
    StackCommandFailed {
        action: &'static str,
        stack: StackName,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{stack}: failed to decode exported stack state")]
    StateDecode {
        stack: StackName,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("workspace root does not exist: {root}")]
    RootDoesNotExist { root: PathBuf },
    #[error("workspace root must be a directory: {root}")]
    RootIsNotDirectory { root: PathBuf },
    #[error("failed while walking workspace directory")]
    Walk {
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Error)]
pub enum StackError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{stack}: program failed:\n  - {details}")]
    ProgramFailed { stack: StackName, details: String },
}
