use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use stratos_domain::StackName;

use crate::error::SettingsError;
use crate::program::ProgramManifest;

/// Engine project settings file inside a stack workspace.
pub const PROJECT_SETTINGS_FILE: &str = "Vega.json";
/// Resource program consumed by the engine during operations.
pub const PROGRAM_MANIFEST_FILE: &str = "program.json";

const STACK_SETTINGS_PREFIX: &str = "Vega.";
const STACK_SETTINGS_SUFFIX: &str = ".json";
const SUPPORTED_SECRETS_SCHEMES: [&str; 4] = ["passphrase", "gcpkms", "awskms", "vault"];

#[must_use]
pub fn stack_settings_file_name(stack: &StackName) -> String {
    format!("{STACK_SETTINGS_PREFIX}{stack}{STACK_SETTINGS_SUFFIX}")
}

/// Extract the raw stack name from a settings file name
/// (`Vega.<stack>.json`). Returns `None` for the project file and anything
/// else that does not match the layout.
#[must_use]
pub fn stack_name_from_settings_file(file_name: &str) -> Option<&str> {
    let raw = file_name
        .strip_prefix(STACK_SETTINGS_PREFIX)?
        .strip_suffix(STACK_SETTINGS_SUFFIX)?;
    if raw.is_empty() { None } else { Some(raw) }
}

/// Execution runtime recorded in the project settings so the engine knows
/// how the program manifest was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Default for RuntimeDescriptor {
    fn default() -> Self {
        Self {
            name: "stratos".to_string(),
            version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub name: String,
    pub runtime: RuntimeDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

impl ProjectSettings {
    /// Build project settings, validating the backend URL when present.
    ///
    /// # Errors
    ///
    /// Returns an error when `backend` is not a parseable URL.
    pub fn new(name: String, backend: Option<String>) -> Result<Self, SettingsError> {
        if let Some(value) = &backend {
            let _ = Url::parse(value).map_err(|source| SettingsError::InvalidBackendUrl {
                value: value.clone(),
                source,
            })?;
        }
        Ok(Self {
            name,
            runtime: RuntimeDescriptor::default(),
            backend,
        })
    }
}

/// One flattened configuration entry. Secret values are redacted from
/// rendered output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

impl ConfigValue {
    #[must_use]
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: false,
        }
    }

    #[must_use]
    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StackSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_provider: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,
}

/// Validate a secrets-provider URI against the schemes the engine supports.
///
/// # Errors
///
/// Returns an error when the URI has no `scheme://` separator or an
/// unsupported scheme.
pub fn validate_secrets_provider(uri: &str) -> Result<(), SettingsError> {
    let Some((scheme, _path)) = uri.split_once("://") else {
        return Err(SettingsError::InvalidSecretsUri {
            uri: uri.to_string(),
        });
    };

    if SUPPORTED_SECRETS_SCHEMES.contains(&scheme) {
        Ok(())
    } else {
        Err(SettingsError::UnsupportedSecretsScheme {
            scheme: scheme.to_string(),
            uri: uri.to_string(),
        })
    }
}

/// Default `file://` backend under the user's home directory, used when no
/// backend URL is configured.
///
/// # Errors
///
/// Returns an error when no home directory can be determined or it cannot be
/// expressed as a URL.
pub fn default_backend_url() -> Result<Url, SettingsError> {
    let home = dirs::home_dir().ok_or(SettingsError::NoHomeDirectory)?;
    let state_dir = home.join(".stratos");
    Url::from_directory_path(&state_dir)
        .map_err(|()| SettingsError::HomeBackendPath { path: state_dir })
}

/// Flatten a nested configuration document into `a:b:c` keys.
///
/// Objects nest with `:`, arrays index numerically, scalars stringify.
#[must_use]
pub fn flatten_config(namespace: &str, value: &serde_json::Value) -> BTreeMap<String, String> {
    let mut flattened = BTreeMap::new();
    flatten_into(namespace, value, &mut flattened);
    flattened
}

fn flatten_into(key: &str, value: &serde_json::Value, output: &mut BTreeMap<String, String>) {
    match value {
        serde_json::Value::Object(entries) => {
            for (child, nested) in entries {
                let nested_key = if key.is_empty() {
                    child.clone()
                } else {
                    format!("{key}:{child}")
                };
                flatten_into(&nested_key, nested, output);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(&format!("{key}:{index}"), nested, output);
            }
        }
        serde_json::Value::Null => {
            output.insert(key.to_string(), String::new());
        }
        serde_json::Value::Bool(flag) => {
            output.insert(key.to_string(), flag.to_string());
        }
        serde_json::Value::Number(number) => {
            output.insert(key.to_string(), number.to_string());
        }
        serde_json::Value::String(text) => {
            output.insert(key.to_string(), text.clone());
        }
    }
}

/// Write the project settings file, creating the workspace directory when
/// missing.
///
/// # Errors
///
/// Returns an error when encoding or writing fails.
pub fn write_project_settings(
    workdir: &Path,
    settings: &ProjectSettings,
) -> Result<(), SettingsError> {
    write_settings_document(&workdir.join(PROJECT_SETTINGS_FILE), settings)
}

/// Write a stack's settings file only when its content changed.
///
/// Returns whether a write happened.
///
/// # Errors
///
/// Returns an error when encoding, reading the existing file, or writing
/// fails.
pub fn write_stack_settings_if_changed(
    workdir: &Path,
    stack: &StackName,
    settings: &StackSettings,
) -> Result<bool, SettingsError> {
    let path = workdir.join(stack_settings_file_name(stack));
    let encoded = encode_settings(settings)?;

    if path.exists() {
        let current = fs::read(&path).map_err(|source| SettingsError::Io {
            context: format!("failed to read settings file: {}", path.display()),
            source,
        })?;
        if current == encoded {
            return Ok(false);
        }
    }

    write_bytes(&path, &encoded)?;
    Ok(true)
}

/// Read a stack settings file.
///
/// # Errors
///
/// Returns an error when the file cannot be read or decoded.
pub fn read_stack_settings(path: &Path) -> Result<StackSettings, SettingsError> {
    let payload = fs::read(path).map_err(|source| SettingsError::Io {
        context: format!("failed to read settings file: {}", path.display()),
        source,
    })?;
    serde_json::from_slice(&payload).map_err(|source| SettingsError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the resource program the engine consumes during operations.
///
/// # Errors
///
/// Returns an error when encoding or writing fails.
pub fn write_program_manifest(
    workdir: &Path,
    manifest: &ProgramManifest,
) -> Result<(), SettingsError> {
    write_settings_document(&workdir.join(PROGRAM_MANIFEST_FILE), manifest)
}

fn write_settings_document<T: Serialize>(path: &Path, document: &T) -> Result<(), SettingsError> {
    let encoded = encode_settings(document)?;
    write_bytes(path, &encoded)
}

fn encode_settings<T: Serialize>(document: &T) -> Result<Vec<u8>, SettingsError> {
    let mut encoded = serde_json::to_vec_pretty(document)
        .map_err(|source| SettingsError::Encode { source })?;
    encoded.push(b'\n');
    Ok(encoded)
}

fn write_bytes(path: &Path, payload: &[u8]) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
            context: format!("failed to create workspace directory: {}", parent.display()),
            source,
        })?;
    }
    fs::write(path, payload).map_err(|source| SettingsError::Io {
        context: format!("failed to write settings file: {}", path.display()),
        source,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use std::collections::BTreeMap;

    use stratos_domain::StackName;

    use super::{
        ConfigValue, ProjectSettings, StackSettings, flatten_config, stack_name_from_settings_file,
        stack_settings_file_name, validate_secrets_provider, write_stack_settings_if_changed,
    };

    #[test]
    fn settings_file_name_round_trips() {
        let stack = StackName::parse("prod-network".to_string()).expect("stack");
        let file_name = stack_settings_file_name(&stack);
        assert_eq!(file_name, "Vega.prod-network.json");
        assert_eq!(
            stack_name_from_settings_file(&file_name),
            Some("prod-network")
        );
    }

    #[test]
    fn project_file_is_not_a_stack_file() {
        assert_eq!(stack_name_from_settings_file("Vega.json"), None);
        assert_eq!(stack_name_from_settings_file("program.json"), None);
        assert_eq!(stack_name_from_settings_file("Vega..json"), None);
    }

    #[test]
    fn backend_url_is_validated() {
        let error = ProjectSettings::new("infra".to_string(), Some("not a url".to_string()))
            .expect_err("must fail");
        assert!(error.to_string().contains("invalid backend URL"));

        let settings = ProjectSettings::new(
            "infra".to_string(),
            Some("gs://infra-state/stacks".to_string()),
        )
        .expect("valid backend");
        assert_eq!(settings.backend.as_deref(), Some("gs://infra-state/stacks"));
    }

    #[test]
    fn secrets_provider_schemes_are_checked() {
        validate_secrets_provider("gcpkms://projects/infra/keys/state").expect("supported");
        validate_secrets_provider("passphrase://").expect("supported");

        let error = validate_secrets_provider("rot13://state").expect_err("must fail");
        assert!(error.to_string().contains("unsupported scheme"));
        let error = validate_secrets_provider("no-scheme").expect_err("must fail");
        assert!(error.to_string().contains("expected scheme://path"));
    }

    #[test]
    fn flatten_config_joins_keys_with_colons() {
        let document = serde_json::json!({
            "region": "europe-west4",
            "cluster": { "nodes": 3, "preemptible": true },
            "zones": ["a", "b"],
        });

        let flattened = flatten_config("gcp", &document);
        let expected: BTreeMap<String, String> = [
            ("gcp:region", "europe-west4"),
            ("gcp:cluster:nodes", "3"),
            ("gcp:cluster:preemptible", "true"),
            ("gcp:zones:0", "a"),
            ("gcp:zones:1", "b"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
        assert_eq!(flattened, expected);
    }

    #[test]
    fn stack_settings_write_is_skipped_when_unchanged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let stack = StackName::parse("prod-network".to_string()).expect("stack");
        let settings = StackSettings {
            secrets_provider: Some("passphrase://".to_string()),
            config: BTreeMap::from([(
                "gcp:region".to_string(),
                ConfigValue::plain("europe-west4"),
            )]),
        };

        assert!(write_stack_settings_if_changed(temp.path(), &stack, &settings).expect("write"));
        assert!(!write_stack_settings_if_changed(temp.path(), &stack, &settings).expect("rewrite"));

        let changed = StackSettings {
            secrets_provider: settings.secrets_provider.clone(),
            config: BTreeMap::from([(
                "gcp:region".to_string(),
                ConfigValue::plain("europe-west1"),
            )]),
        };
        assert!(write_stack_settings_if_changed(temp.path(), &stack, &changed).expect("update"));
    }
}
