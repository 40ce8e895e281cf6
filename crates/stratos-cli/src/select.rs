//! `--select` token matching against discovered stacks.

use stratos_engine::DiscoveredStack;

/// Resolve a `--select` expression against the discovered stacks,
/// preserving discovery order.
///
/// The expression is comma-separated; each token is either `env:name`
/// (matching one environment/component pair), a bare component `name`
/// (matching it in every environment), or the literal `all`. Matching is
/// case-sensitive against the canonical (lower-cased) stack names.
#[must_use]
pub fn select_stacks<'stacks>(
    stacks: &'stacks [DiscoveredStack],
    expression: &str,
) -> Vec<&'stacks DiscoveredStack> {
    let tokens: Vec<&str> = expression
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect();

    if tokens.iter().any(|token| *token == "all") {
        return stacks.iter().collect();
    }

    stacks
        .iter()
        .filter(|stack| {
            tokens.iter().any(|token| match token.split_once(':') {
                Some((environment, component)) => {
                    stack.name.environment() == environment
                        && stack.name.component() == component
                }
                None => stack.name.component() == *token,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use std::path::PathBuf;

    use stratos_domain::StackName;
    use stratos_engine::DiscoveredStack;

    use super::select_stacks;

    fn stack(name: &str) -> DiscoveredStack {
        DiscoveredStack {
            name: StackName::parse(name.to_string()).expect("stack name"),
            workdir: PathBuf::from("/workspace"),
            settings_path: PathBuf::from(format!("/workspace/Vega.{name}.json")),
        }
    }

    fn names(selected: &[&DiscoveredStack]) -> Vec<String> {
        selected
            .iter()
            .map(|stack| stack.name.to_string())
            .collect()
    }

    #[test]
    fn all_token_selects_everything() {
        let stacks = vec![stack("dev-network"), stack("prod-network")];
        assert_eq!(
            names(&select_stacks(&stacks, "all")),
            vec!["dev-network", "prod-network"]
        );
    }

    #[test]
    fn env_qualified_token_matches_one_stack() {
        let stacks = vec![stack("dev-network"), stack("prod-network")];
        assert_eq!(
            names(&select_stacks(&stacks, "prod:network")),
            vec!["prod-network"]
        );
    }

    #[test]
    fn bare_name_matches_across_environments() {
        let stacks = vec![
            stack("dev-network"),
            stack("prod-network"),
            stack("prod-platform"),
        ];
        assert_eq!(
            names(&select_stacks(&stacks, "network")),
            vec!["dev-network", "prod-network"]
        );
    }

    #[test]
    fn matching_is_case_sensitive() {
        let stacks = vec![stack("prod-network")];
        assert!(select_stacks(&stacks, "Network").is_empty());
        assert!(select_stacks(&stacks, "PROD:network").is_empty());
    }

    #[test]
    fn multiple_tokens_preserve_discovery_order() {
        let stacks = vec![
            stack("dev-network"),
            stack("prod-network"),
            stack("prod-platform"),
        ];
        assert_eq!(
            names(&select_stacks(&stacks, "platform,dev:network")),
            vec!["dev-network", "prod-platform"]
        );
    }
}
