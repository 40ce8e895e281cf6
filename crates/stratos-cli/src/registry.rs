//! Builtin component registry.
//!
//! Maps known component names to their module sets so a discovered stack can
//! re-derive its resource program before each operation. The module bodies
//! here are representative wiring; the orchestration core treats them as
//! opaque factories.

use std::collections::BTreeMap;

use stratos_domain::{Capability, ComponentName, EnvironmentId, ModuleMeta, ModuleName};
use stratos_engine::{
    ConfigValue, ExecutorOptions, GraphOptions, ModuleDescriptor, StackConfig, StackProgram,
    flatten_config, run_component,
};

pub struct ComponentSetup {
    pub config: StackConfig,
    pub program: StackProgram,
}

/// Look up the builtin setup for a component. `None` means the stack is
/// operated on as-is, without program re-derivation.
#[must_use]
pub fn setup(environment: &EnvironmentId, component: &ComponentName) -> Option<ComponentSetup> {
    match component.as_str() {
        "network" => network_setup(environment.clone(), component.clone()),
        "platform" => platform_setup(environment.clone(), component.clone()),
        _ => None,
    }
}

fn module(name: &str) -> Option<ModuleName> {
    ModuleName::try_from(name).ok()
}

fn plain_config(namespace: &str, document: &serde_json::Value) -> BTreeMap<String, ConfigValue> {
    flatten_config(namespace, document)
        .into_iter()
        .map(|(key, value)| (key, ConfigValue::plain(value)))
        .collect()
}

fn network_setup(
    environment: EnvironmentId,
    component: ComponentName,
) -> Option<ComponentSetup> {
    let mut net_meta = ModuleMeta::new(module("net")?);
    net_meta.provides = vec![Capability::Network];
    let mut dns_meta = ModuleMeta::new(module("dns")?);
    dns_meta.provides = vec![Capability::Dns];
    dns_meta.requires = vec![Capability::Network];

    let config = StackConfig {
        secrets_provider: Some("passphrase://".to_string()),
        config: plain_config(
            "gcp",
            &serde_json::json!({
                "region": "europe-west4",
                "dns": { "zone": "internal.example" },
            }),
        ),
        workdir: None,
    };

    let program: StackProgram = Box::new(move || {
        let modules = vec![
            ModuleDescriptor::typed(net_meta.clone(), |_, program| {
                let group = program.declare_composite("stratos:component:network", "network", &[])?;
                let vpc = program.declare_child(&group, "gcp:network:vpc", "main", &[])?;
                let _ = program.declare_child(
                    &group,
                    "gcp:network:subnet",
                    "workers",
                    std::slice::from_ref(&vpc),
                )?;
                Ok(Some(group))
            }),
            ModuleDescriptor::typed(dns_meta.clone(), |dependencies, program| {
                program.declare("gcp:dns:zone", "internal", dependencies).map(Some)
            }),
        ];
        run_component(
            environment.clone(),
            component.clone(),
            modules,
            GraphOptions::default(),
            ExecutorOptions::default(),
        )
    });

    Some(ComponentSetup { config, program })
}

fn platform_setup(
    environment: EnvironmentId,
    component: ComponentName,
) -> Option<ComponentSetup> {
    let mut cluster_meta = ModuleMeta::new(module("cluster")?);
    cluster_meta.provides = vec![Capability::Cluster];
    let mut registry_meta = ModuleMeta::new(module("registry")?);
    registry_meta.provides = vec![Capability::Registry];
    registry_meta.requires = vec![Capability::Cluster];

    let config = StackConfig {
        secrets_provider: Some("passphrase://".to_string()),
        config: plain_config(
            "gcp",
            &serde_json::json!({
                "region": "europe-west4",
                "cluster": { "nodes": 3, "channel": "regular" },
            }),
        ),
        workdir: None,
    };

    let program: StackProgram = Box::new(move || {
        let modules = vec![
            ModuleDescriptor::typed(cluster_meta.clone(), |_, program| {
                let group = program.declare_composite("stratos:component:platform", "platform", &[])?;
                let cluster = program.declare_child(&group, "gcp:container:cluster", "main", &[])?;
                let _ = program.declare_child(
                    &group,
                    "gcp:container:nodepool",
                    "workers",
                    std::slice::from_ref(&cluster),
                )?;
                Ok(Some(group))
            }),
            ModuleDescriptor::typed(registry_meta.clone(), |dependencies, program| {
                program
                    .declare("gcp:artifacts:registry", "images", dependencies)
                    .map(Some)
            }),
            // Pre-metadata monitoring definition kept as a legacy module; its
            // result is deliberately discarded.
            ModuleDescriptor::legacy(|_, program| {
                program.declare("gcp:monitoring:dashboard", "ops", &[])?;
                Ok(None)
            }),
        ];
        run_component(
            environment.clone(),
            component.clone(),
            modules,
            GraphOptions::default(),
            ExecutorOptions::default(),
        )
    });

    Some(ComponentSetup { config, program })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use stratos_domain::{ComponentName, EnvironmentId};

    use super::setup;

    fn environment() -> EnvironmentId {
        EnvironmentId::try_from("prod").expect("environment")
    }

    #[test]
    fn unknown_components_have_no_setup() {
        let component = ComponentName::try_from("data-lake").expect("component");
        assert!(setup(&environment(), &component).is_none());
    }

    #[test]
    fn network_program_rederives_the_same_manifest() {
        let component = ComponentName::try_from("network").expect("component");
        let built = setup(&environment(), &component).expect("setup");

        let first = (built.program)().expect("first pass");
        let second = (built.program)().expect("second pass");

        assert!(!first.report.has_failures(), "errors: {:?}", first.report.errors);
        assert_eq!(first.manifest, second.manifest);
        assert_eq!(first.manifest.stack.as_str(), "prod-network");
        assert_eq!(first.report.order, vec!["net", "dns"]);
        assert!(first.manifest.resources.iter().any(|resource| resource.composite));
    }

    #[test]
    fn platform_program_runs_its_legacy_module_last() {
        let component = ComponentName::try_from("platform").expect("component");
        let built = setup(&environment(), &component).expect("setup");

        let outcome = (built.program)().expect("pass");
        assert_eq!(
            outcome.report.order,
            vec!["cluster", "registry", "<anonymous>"]
        );
        assert!(
            outcome
                .manifest
                .resources
                .iter()
                .any(|resource| resource.ty == "gcp:monitoring:dashboard")
        );
    }
}
