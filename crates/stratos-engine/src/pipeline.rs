use stratos_domain::{ComponentName, EnvironmentId, ExecutionReport, ModuleName};

use crate::error::GraphError;
pub use crate::error::PipelineError;
use crate::executor::{ExecutorOptions, execute};
use crate::graph::{GraphOptions, build_dependency_graph, detect_cycle, topological_sort};
use crate::module::ModuleDescriptor;
use crate::program::{ProgramBuilder, ProgramManifest};

/// Result of one orchestration pass: the generated resource program plus
/// the per-module execution report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentOutcome {
    pub manifest: ProgramManifest,
    pub report: ExecutionReport,
}

/// Run one orchestration pass for a component: build the capability graph,
/// reject cycles, sort, and execute every module into a fresh program
/// builder.
///
/// Module failures land in the returned report per the executor options; a
/// dependency cycle (or a denied capability collision) aborts the pass.
///
/// # Errors
///
/// Returns an error when the dependency graph is unusable.
pub fn run_component(
    environment: EnvironmentId,
    component: ComponentName,
    modules: Vec<ModuleDescriptor>,
    graph_options: GraphOptions,
    executor_options: ExecutorOptions,
) -> Result<ComponentOutcome, PipelineError> {
    let graph = build_dependency_graph(&modules, graph_options)?;
    if let Some(cycle) = detect_cycle(&graph) {
        let cycle = cycle
            .iter()
            .map(ModuleName::as_str)
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(GraphError::CycleDetected { cycle }.into());
    }

    let sorted = topological_sort(modules, &graph);
    let mut program = ProgramBuilder::new(environment, component);
    let report = execute(sorted, &graph, &mut program, executor_options);
    Ok(ComponentOutcome {
        manifest: program.into_manifest(),
        report,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use stratos_domain::{Capability, ComponentName, EnvironmentId, ModuleMeta, ModuleName};

    use super::run_component;
    use crate::executor::ExecutorOptions;
    use crate::graph::GraphOptions;
    use crate::module::ModuleDescriptor;

    fn meta(module: &str, provides: &[Capability], requires: &[Capability]) -> ModuleMeta {
        let mut meta = ModuleMeta::new(ModuleName::try_from(module).expect("module name"));
        meta.provides = provides.to_vec();
        meta.requires = requires.to_vec();
        meta
    }

    #[test]
    fn modules_execute_in_capability_order_regardless_of_input_order() {
        let modules = vec![
            ModuleDescriptor::typed(
                meta("appMod", &[], &[Capability::Database, Capability::Network]),
                |dependencies, program| {
                    program.declare("k8s:app:deployment", "web", dependencies)?;
                    Ok(None)
                },
            ),
            ModuleDescriptor::typed(
                meta(
                    "dbMod",
                    &[Capability::Database],
                    &[Capability::Network],
                ),
                |dependencies, program| {
                    program
                        .declare("gcp:sql:instance", "primary", dependencies)
                        .map(Some)
                },
            ),
            ModuleDescriptor::typed(meta("netMod", &[Capability::Network], &[]), |_, program| {
                program.declare("gcp:network:vpc", "main", &[]).map(Some)
            }),
        ];

        let outcome = run_component(
            EnvironmentId::try_from("prod").expect("environment"),
            ComponentName::try_from("platform").expect("component"),
            modules,
            GraphOptions::default(),
            ExecutorOptions::default(),
        )
        .expect("pass succeeds");

        assert_eq!(outcome.report.order, vec!["netMod", "dbMod", "appMod"]);
        assert!(!outcome.report.has_failures());
        assert_eq!(outcome.manifest.stack.as_str(), "prod-platform");
        assert_eq!(outcome.manifest.resources.len(), 3);

        let deployment = &outcome.manifest.resources[2];
        assert_eq!(deployment.name, "web");
        assert_eq!(deployment.depends_on.len(), 2);
    }

    #[test]
    fn dependency_cycle_aborts_the_pass_with_the_full_path() {
        let modules = vec![
            ModuleDescriptor::typed(
                meta("a", &[Capability::Network], &[Capability::Database]),
                |_, _| Ok(None),
            ),
            ModuleDescriptor::typed(
                meta("b", &[Capability::Database], &[Capability::Network]),
                |_, _| Ok(None),
            ),
        ];

        let error = run_component(
            EnvironmentId::try_from("prod").expect("environment"),
            ComponentName::try_from("platform").expect("component"),
            modules,
            GraphOptions::default(),
            ExecutorOptions::default(),
        )
        .expect_err("cycle must abort");

        let rendered = error.to_string();
        assert!(rendered.contains("cycle"), "rendered: {rendered}");
        assert!(rendered.contains("a"), "rendered: {rendered}");
        assert!(rendered.contains("b"), "rendered: {rendered}");
    }
}
