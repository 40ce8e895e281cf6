use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainValidationError {
    #[error("environment id must not be empty")]
    EmptyEnvironmentId,
    #[error("environment id must not contain '-', ':' or whitespace: {value}")]
    InvalidEnvironmentId { value: String },
    #[error("component name must not be empty")]
    EmptyComponentName,
    #[error("component name must not contain ':' or whitespace: {value}")]
    InvalidComponentName { value: String },
    #[error("module name must not be empty")]
    EmptyModuleName,
    #[error("resource urn must not be empty")]
    EmptyUrn,
    #[error("stack name must be of the form <environment>-<component>: {value}")]
    InvalidStackName { value: String },
    #[error("unknown operation \"{value}\" (expected preview, up, destroy or refresh)")]
    UnknownOperation { value: String },
    #[error("unknown capability \"{value}\"")]
    UnknownCapability { value: String },
    #[error("unknown debug level \"{value}\" (expected debug or trace)")]
    UnknownDebugLevel { value: String },
}

/// Environment identifier (`prod`, `staging`, ...).
///
/// The `-` separator is reserved for stack names, so environment ids may not
/// contain it: `StackName` splits on the first dash to recover the
/// environment of a discovered stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnvironmentId(String);

impl EnvironmentId {
    /// Create an environment id wrapper, rejecting blank or malformed values.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` is empty after trimming or contains a
    /// reserved character.
    pub fn new(value: String) -> Result<Self, DomainValidationError> {
        if value.trim().is_empty() {
            return Err(DomainValidationError::EmptyEnvironmentId);
        }
        if value.contains(['-', ':']) || value.contains(char::is_whitespace) {
            return Err(DomainValidationError::InvalidEnvironmentId { value });
        }
        Ok(Self(value.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EnvironmentId {
    type Error = DomainValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for EnvironmentId {
    type Error = DomainValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl AsRef<str> for EnvironmentId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for EnvironmentId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<EnvironmentId> for String {
    fn from(value: EnvironmentId) -> Self {
        value.0
    }
}

/// Component name within an environment (`network`, `platform`,
/// `addon-cert-manager`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentName(String);

impl ComponentName {
    /// Create a component name wrapper, rejecting blank or malformed values.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` is empty after trimming or contains a
    /// reserved character.
    pub fn new(value: String) -> Result<Self, DomainValidationError> {
        if value.trim().is_empty() {
            return Err(DomainValidationError::EmptyComponentName);
        }
        if value.contains(':') || value.contains(char::is_whitespace) {
            return Err(DomainValidationError::InvalidComponentName { value });
        }
        Ok(Self(value.to_lowercase()))
    }

    /// Component name for a cluster add-on (`addon-<id>`).
    ///
    /// # Errors
    ///
    /// Returns an error when `addon_id` is empty or malformed.
    pub fn addon(addon_id: &str) -> Result<Self, DomainValidationError> {
        Self::new(format!("addon-{addon_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ComponentName {
    type Error = DomainValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ComponentName {
    type Error = DomainValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl AsRef<str> for ComponentName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for ComponentName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<ComponentName> for String {
    fn from(value: ComponentName) -> Self {
        value.0
    }
}

/// Name of an infrastructure module with declared capability metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleName(String);

impl ModuleName {
    /// Create a module name wrapper, rejecting blank names.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` is empty after trimming.
    pub fn new(value: String) -> Result<Self, DomainValidationError> {
        if value.trim().is_empty() {
            Err(DomainValidationError::EmptyModuleName)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModuleName {
    type Error = DomainValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ModuleName {
    type Error = DomainValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<ModuleName> for String {
    fn from(value: ModuleName) -> Self {
        value.0
    }
}

/// Canonical name of a deployment stack: `{environment}-{component}`,
/// lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StackName(String);

impl StackName {
    #[must_use]
    pub fn for_component(environment: &EnvironmentId, component: &ComponentName) -> Self {
        Self(format!("{environment}-{component}"))
    }

    /// Parse a discovered stack name back into its parts.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` does not contain a `-` separator or
    /// either side fails validation.
    pub fn parse(value: String) -> Result<Self, DomainValidationError> {
        let lowered = value.to_lowercase();
        let Some((environment, component)) = lowered.split_once('-') else {
            return Err(DomainValidationError::InvalidStackName { value });
        };
        let environment = EnvironmentId::new(environment.to_string())?;
        let component = ComponentName::new(component.to_string())?;
        Ok(Self::for_component(&environment, &component))
    }

    /// The environment part (everything before the first `-`).
    #[must_use]
    pub fn environment(&self) -> &str {
        self.0.split_once('-').map_or(self.0.as_str(), |(env, _)| env)
    }

    /// The component part (everything after the first `-`).
    #[must_use]
    pub fn component(&self) -> &str {
        self.0
            .split_once('-')
            .map_or(self.0.as_str(), |(_, component)| component)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StackName {
    type Error = DomainValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<StackName> for String {
    fn from(value: StackName) -> Self {
        value.0
    }
}

/// Globally unique resource identifier inside a stack's exported state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Urn(String);

impl Urn {
    /// Create a urn wrapper, rejecting blank values.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` is empty after trimming.
    pub fn new(value: String) -> Result<Self, DomainValidationError> {
        if value.trim().is_empty() {
            Err(DomainValidationError::EmptyUrn)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Urn {
    type Error = DomainValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Urn {
    type Error = DomainValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<Urn> for String {
    fn from(value: Urn) -> Self {
        value.0
    }
}

/// Opaque dependency token handed from one executed module to the modules
/// that require its capabilities. The orchestration core assumes nothing
/// about it beyond identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(Urn);

impl ResourceHandle {
    #[must_use]
    pub const fn new(urn: Urn) -> Self {
        Self(urn)
    }

    #[must_use]
    pub const fn urn(&self) -> &Urn {
        &self.0
    }
}

/// Capability a module provides or requires, used purely for execution-order
/// inference between modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Network,
    Dns,
    Cluster,
    Database,
    Registry,
    Secrets,
    Storage,
    Mesh,
}

impl Capability {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Dns => "dns",
            Self::Cluster => "cluster",
            Self::Database => "database",
            Self::Registry => "registry",
            Self::Secrets => "secrets",
            Self::Storage => "storage",
            Self::Mesh => "mesh",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = DomainValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "network" => Ok(Self::Network),
            "dns" => Ok(Self::Dns),
            "cluster" => Ok(Self::Cluster),
            "database" => Ok(Self::Database),
            "registry" => Ok(Self::Registry),
            "secrets" => Ok(Self::Secrets),
            "storage" => Ok(Self::Storage),
            "mesh" => Ok(Self::Mesh),
            _ => Err(DomainValidationError::UnknownCapability {
                value: value.to_string(),
            }),
        }
    }
}

/// Capability metadata attached to a module descriptor. Descriptors without
/// metadata are "legacy" modules: they never participate in dependency
/// ordering and cannot be depended upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMeta {
    pub name: ModuleName,
    pub provides: Vec<Capability>,
    pub requires: Vec<Capability>,
}

impl ModuleMeta {
    #[must_use]
    pub const fn new(name: ModuleName) -> Self {
        Self {
            name,
            provides: Vec::new(),
            requires: Vec::new(),
        }
    }
}

/// Lifecycle operation against a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Preview,
    Up,
    Destroy,
    Refresh,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Up => "up",
            Self::Destroy => "destroy",
            Self::Refresh => "refresh",
        }
    }

    /// Destroy is the only operation that reverses multi-stack processing
    /// order.
    #[must_use]
    pub const fn reverses_stack_order(self) -> bool {
        matches!(self, Self::Destroy)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = DomainValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "preview" => Ok(Self::Preview),
            "up" => Ok(Self::Up),
            "destroy" => Ok(Self::Destroy),
            "refresh" => Ok(Self::Refresh),
            _ => Err(DomainValidationError::UnknownOperation {
                value: value.to_string(),
            }),
        }
    }
}

/// Verbosity passed through to the engine and its embedded providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugLevel {
    Debug,
    Trace,
}

impl DebugLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for DebugLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for DebugLevel {
    type Err = DomainValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(DomainValidationError::UnknownDebugLevel {
                value: value.to_string(),
            }),
        }
    }
}

/// One concrete resource inside a stack's exported state, flattened for
/// interactive target selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub urn: Urn,
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Urn>,
    #[serde(default)]
    pub composite: bool,
}

/// Outcome of invoking one module during an orchestration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRunResult {
    pub module: String,
    pub legacy: bool,
    pub success: bool,
    pub error: Option<String>,
}

/// Report for one orchestration pass over a component's modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub order: Vec<String>,
    pub results: Vec<ModuleRunResult>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ExecutionReport {
    /// Whether the pass failed. Tolerated legacy-module failures land in
    /// `results` and `warnings` only; anything in `errors` invalidates the
    /// pass.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Outcome of one lifecycle operation against one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReport {
    pub stack: StackName,
    pub operation: OperationKind,
    pub targets: Vec<Urn>,
    pub success: bool,
    pub cancelled: bool,
    pub error: Option<String>,
}

/// Report for one CLI run across the selected stacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub operation: OperationKind,
    pub operations: Vec<OperationReport>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl RunReport {
    #[must_use]
    pub const fn new(operation: OperationKind) -> Self {
        Self {
            operation,
            operations: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty() || self.operations.iter().any(|op| !op.success)
    }
}
