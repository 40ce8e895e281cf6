use std::fmt;

use stratos_domain::{ModuleMeta, ResourceHandle};

use crate::error::ModuleError;
use crate::program::ProgramBuilder;

/// Display name used for modules without metadata.
pub const ANONYMOUS_MODULE: &str = "<anonymous>";

/// Factory closure performing one module's resource declarations. Receives
/// the resolved dependency handles (in `requires` declaration order) and the
/// program builder for the enclosing component; may return a handle later
/// modules can depend on.
pub type ModuleFactory =
    Box<dyn FnOnce(&[ResourceHandle], &mut ProgramBuilder) -> Result<Option<ResourceHandle>, ModuleError>>;

/// A named unit of infrastructure work, consumed exactly once per
/// orchestration pass. Descriptors without metadata are "legacy": they never
/// participate in dependency ordering and cannot be depended upon.
pub struct ModuleDescriptor {
    meta: Option<ModuleMeta>,
    factory: ModuleFactory,
}

impl ModuleDescriptor {
    pub fn typed<F>(meta: ModuleMeta, factory: F) -> Self
    where
        F: FnOnce(&[ResourceHandle], &mut ProgramBuilder) -> Result<Option<ResourceHandle>, ModuleError>
            + 'static,
    {
        Self {
            meta: Some(meta),
            factory: Box::new(factory),
        }
    }

    pub fn legacy<F>(factory: F) -> Self
    where
        F: FnOnce(&[ResourceHandle], &mut ProgramBuilder) -> Result<Option<ResourceHandle>, ModuleError>
            + 'static,
    {
        Self {
            meta: None,
            factory: Box::new(factory),
        }
    }

    #[must_use]
    pub const fn meta(&self) -> Option<&ModuleMeta> {
        self.meta.as_ref()
    }

    /// Module name for diagnostics; `<anonymous>` for legacy descriptors.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.meta
            .as_ref()
            .map_or(ANONYMOUS_MODULE, |meta| meta.name.as_str())
    }

    pub(crate) fn into_parts(self) -> (Option<ModuleMeta>, ModuleFactory) {
        (self.meta, self.factory)
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ModuleDescriptor")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
