use std::path::PathBuf;

use walkdir::WalkDir;

use stratos_domain::{EnvironmentId, StackName};

use crate::error::DiscoveryError;
use crate::workspace::stack_name_from_settings_file;

/// One stack found in a workspace tree. The workdir is the directory holding
/// the stack's settings file; engine operations run from there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredStack {
    pub name: StackName,
    pub workdir: PathBuf,
    pub settings_path: PathBuf,
}

/// Recursively discover stack settings files (`Vega.<stack>.json`) under a
/// workspace root, optionally restricted to one environment.
///
/// Returns the stacks in a deterministic discovery order (sorted by workdir,
/// then stack name) plus warnings for settings files whose names do not
/// parse as stack names.
///
/// # Errors
///
/// Returns an error when `root` is invalid or directory walking fails.
pub fn discover_stacks(
    root: &std::path::Path,
    environment: Option<&EnvironmentId>,
) -> Result<(Vec<DiscoveredStack>, Vec<String>), DiscoveryError> {
    if !root.exists() {
        return Err(DiscoveryError::RootDoesNotExist {
            root: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(DiscoveryError::RootIsNotDirectory {
            root: root.to_path_buf(),
        });
    }

    let mut stacks = Vec::new();
    let mut warnings = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(value) => value,
            Err(source) => return Err(DiscoveryError::Walk { source }),
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(raw_name) = stack_name_from_settings_file(file_name) else {
            continue;
        };

        let name = match StackName::parse(raw_name.to_string()) {
            Ok(name) => name,
            Err(error) => {
                warnings.push(format!(
                    "ignoring settings file {}: {error}",
                    entry.path().display()
                ));
                continue;
            }
        };

        if let Some(environment) = environment
            && name.environment() != environment.as_str()
        {
            continue;
        }

        let workdir = entry
            .path()
            .parent()
            .map_or_else(|| root.to_path_buf(), std::path::Path::to_path_buf);
        stacks.push(DiscoveredStack {
            name,
            workdir,
            settings_path: entry.path().to_path_buf(),
        });
    }

    stacks.sort_by(|left, right| {
        (&left.workdir, &left.name).cmp(&(&right.workdir, &right.name))
    });
    Ok((stacks, warnings))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use std::fs;

    use stratos_domain::EnvironmentId;

    use super::discover_stacks;

    #[test]
    fn finds_stack_settings_in_sorted_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("network")).expect("mkdir");
        fs::create_dir_all(root.join("platform")).expect("mkdir");
        fs::write(root.join("network/Vega.json"), "{}").expect("write");
        fs::write(root.join("network/Vega.prod-network.json"), "{}").expect("write");
        fs::write(root.join("network/Vega.dev-network.json"), "{}").expect("write");
        fs::write(root.join("platform/Vega.prod-platform.json"), "{}").expect("write");
        fs::write(root.join("platform/notes.txt"), "").expect("write");

        let (stacks, warnings) = discover_stacks(root, None).expect("discover");
        let names: Vec<&str> = stacks.iter().map(|stack| stack.name.as_str()).collect();
        assert_eq!(names, vec!["dev-network", "prod-network", "prod-platform"]);
        assert!(warnings.is_empty());
        assert!(stacks[0].workdir.ends_with("network"));
    }

    #[test]
    fn environment_filter_restricts_results() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::write(root.join("Vega.prod-network.json"), "{}").expect("write");
        fs::write(root.join("Vega.dev-network.json"), "{}").expect("write");

        let environment = EnvironmentId::try_from("prod").expect("environment");
        let (stacks, _) = discover_stacks(root, Some(&environment)).expect("discover");
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].name.as_str(), "prod-network");
    }

    #[test]
    fn unparseable_stack_names_become_warnings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::write(root.join("Vega.noseparator.json"), "{}").expect("write");

        let (stacks, warnings) = discover_stacks(root, None).expect("discover");
        assert!(stacks.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("noseparator"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("absent");
        let error = discover_stacks(&missing, None).expect_err("must fail");
        assert!(error.to_string().contains("does not exist"));
    }
}
