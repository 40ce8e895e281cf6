use std::collections::BTreeMap;

use stratos_domain::{ExecutionReport, ModuleName, ModuleRunResult, ResourceHandle};

use crate::graph::DependencyGraph;
use crate::module::{ANONYMOUS_MODULE, ModuleDescriptor};
use crate::program::ProgramBuilder;

/// Failure policy for one orchestration pass.
///
/// The default (`fail_fast` on, `strict_legacy` off) aborts the pass on a
/// typed-module failure but tolerates legacy-module failures as warnings.
/// Setting both flags the same way yields a uniform policy in either
/// direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub fail_fast: bool,
    pub strict_legacy: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            fail_fast: true,
            strict_legacy: false,
        }
    }
}

/// Invoke each module factory in sorted order, threading resolved dependency
/// handles into the invocation.
///
/// A typed module's returned handle is stored under its name so later
/// modules that require its capabilities receive it. Legacy modules run with
/// no dependencies and their results are discarded.
#[must_use]
pub fn execute(
    modules: Vec<ModuleDescriptor>,
    graph: &DependencyGraph,
    program: &mut ProgramBuilder,
    options: ExecutorOptions,
) -> ExecutionReport {
    let total = modules.len();
    let mut instances: BTreeMap<ModuleName, ResourceHandle> = BTreeMap::new();
    let mut order = Vec::with_capacity(total);
    let mut results = Vec::with_capacity(total);
    let mut warnings: Vec<String> = graph.warnings().to_vec();
    let mut errors = Vec::new();

    for (index, module) in modules.into_iter().enumerate() {
        let display_name = module.display_name().to_string();
        order.push(display_name.clone());
        let (meta, factory) = module.into_parts();

        match meta {
            Some(meta) => {
                let dependencies: Vec<ResourceHandle> = meta
                    .requires
                    .iter()
                    .filter_map(|capability| graph.provider_of(*capability))
                    .filter(|provider| **provider != meta.name)
                    .filter_map(|provider| instances.get(provider).cloned())
                    .collect();

                match factory(&dependencies, program) {
                    Ok(handle) => {
                        if let Some(handle) = handle {
                            instances.insert(meta.name.clone(), handle);
                        }
                        results.push(ModuleRunResult {
                            module: display_name,
                            legacy: false,
                            success: true,
                            error: None,
                        });
                    }
                    Err(error) => {
                        let message = error.to_string();
                        errors.push(format!("module \"{display_name}\" failed: {message}"));
                        results.push(ModuleRunResult {
                            module: display_name,
                            legacy: false,
                            success: false,
                            error: Some(message),
                        });
                        if options.fail_fast {
                            push_abort_message(&mut errors, index, total);
                            break;
                        }
                    }
                }
            }
            None => match factory(&[], program) {
                Ok(_) => results.push(ModuleRunResult {
                    module: display_name,
                    legacy: true,
                    success: true,
                    error: None,
                }),
                Err(error) => {
                    let message = error.to_string();
                    results.push(ModuleRunResult {
                        module: display_name.clone(),
                        legacy: true,
                        success: false,
                        error: Some(message.clone()),
                    });
                    if options.strict_legacy {
                        errors.push(format!("module \"{ANONYMOUS_MODULE}\" failed: {message}"));
                        if options.fail_fast {
                            push_abort_message(&mut errors, index, total);
                            break;
                        }
                    } else {
                        warnings
                            .push(format!("module \"{ANONYMOUS_MODULE}\" failed (continuing): {message}"));
                    }
                }
            },
        }
    }

    ExecutionReport {
        order,
        results,
        warnings,
        errors,
    }
}

fn push_abort_message(errors: &mut Vec<String>, failed_index: usize, total: usize) {
    let remaining = total.saturating_sub(failed_index + 1);
    errors.push(format!(
        "pass aborted after first failure ({remaining} module(s) not attempted)"
    ));
}
