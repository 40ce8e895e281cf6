use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    ArgumentParse(#[from] clap::Error),
    #[error(transparent)]
    Prompt(#[from] dialoguer::Error),
    #[error(transparent)]
    Domain(#[from] stratos_domain::DomainValidationError),
    #[error(transparent)]
    Discovery(#[from] stratos_engine::DiscoveryError),
    #[error(transparent)]
    Engine(#[from] stratos_engine::EngineError),
    #[error(transparent)]
    Stack(#[from] stratos_engine::StackError),
    #[error(transparent)]
    Settings(#[from] stratos_engine::SettingsError),
    #[error(transparent)]
    Report(#[from] stratos_report::ReportError),
    #[error("no stacks found under {workspace} (expected Vega.<stack>.json settings files)")]
    NoStacks { workspace: PathBuf },
}
