use serde::{Deserialize, Serialize};

use stratos_domain::{ComponentName, EnvironmentId, ResourceHandle, StackName, Urn};

use crate::error::ModuleError;

/// One resource declared into a stack's program, with the ordering
/// constraints threaded from resolved dependency handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredResource {
    pub urn: Urn,
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Urn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<Urn>,
    #[serde(default)]
    pub composite: bool,
}

/// The resource graph for one named stack, as consumed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramManifest {
    pub stack: StackName,
    pub resources: Vec<DeclaredResource>,
}

/// Explicit per-pass context module factories declare resources into.
///
/// Each orchestration pass constructs a fresh builder; factories receive it
/// as a parameter, so there is no ambient "current component" state and the
/// executor stays re-entrant.
#[derive(Debug)]
pub struct ProgramBuilder {
    environment: EnvironmentId,
    component: ComponentName,
    stack: StackName,
    resources: Vec<DeclaredResource>,
}

impl ProgramBuilder {
    #[must_use]
    pub fn new(environment: EnvironmentId, component: ComponentName) -> Self {
        let stack = StackName::for_component(&environment, &component);
        Self {
            environment,
            component,
            stack,
            resources: Vec::new(),
        }
    }

    #[must_use]
    pub const fn environment(&self) -> &EnvironmentId {
        &self.environment
    }

    #[must_use]
    pub const fn component(&self) -> &ComponentName {
        &self.component
    }

    #[must_use]
    pub const fn stack(&self) -> &StackName {
        &self.stack
    }

    #[must_use]
    pub fn resources(&self) -> &[DeclaredResource] {
        &self.resources
    }

    /// Declare a leaf resource.
    ///
    /// # Errors
    ///
    /// Returns an error when the type/name pair was already declared in this
    /// pass or fails urn validation.
    pub fn declare(
        &mut self,
        ty: &str,
        name: &str,
        depends_on: &[ResourceHandle],
    ) -> Result<ResourceHandle, ModuleError> {
        self.declare_inner(ty, name, None, depends_on, false)
    }

    /// Declare a composite (group) resource that other resources can be
    /// parented under.
    ///
    /// # Errors
    ///
    /// Returns an error when the type/name pair was already declared in this
    /// pass or fails urn validation.
    pub fn declare_composite(
        &mut self,
        ty: &str,
        name: &str,
        depends_on: &[ResourceHandle],
    ) -> Result<ResourceHandle, ModuleError> {
        self.declare_inner(ty, name, None, depends_on, true)
    }

    /// Declare a resource owned by a previously declared composite.
    ///
    /// # Errors
    ///
    /// Returns an error when the type/name pair was already declared in this
    /// pass or fails urn validation.
    pub fn declare_child(
        &mut self,
        parent: &ResourceHandle,
        ty: &str,
        name: &str,
        depends_on: &[ResourceHandle],
    ) -> Result<ResourceHandle, ModuleError> {
        self.declare_inner(ty, name, Some(parent.urn().clone()), depends_on, false)
    }

    fn declare_inner(
        &mut self,
        ty: &str,
        name: &str,
        parent: Option<Urn>,
        depends_on: &[ResourceHandle],
        composite: bool,
    ) -> Result<ResourceHandle, ModuleError> {
        let urn = Urn::new(format!("urn:{}::{ty}::{name}", self.stack))?;
        if self.resources.iter().any(|resource| resource.urn == urn) {
            return Err(ModuleError::DuplicateResource { urn });
        }

        self.resources.push(DeclaredResource {
            urn: urn.clone(),
            ty: ty.to_string(),
            name: name.to_string(),
            parent,
            depends_on: depends_on.iter().map(|handle| handle.urn().clone()).collect(),
            composite,
        });
        Ok(ResourceHandle::new(urn))
    }

    #[must_use]
    pub fn into_manifest(self) -> ProgramManifest {
        ProgramManifest {
            stack: self.stack,
            resources: self.resources,
        }
    }
}
