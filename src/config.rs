use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use stackgraph::{Parameters, TypeCatalog};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Project config file names, in lookup order
pub const CONFIG_FILE_NAMES: [&str; 2] = ["stackplan.toml", "stackplan.json"];

/// Prefix of environment variables that supply parameters
pub const PARAM_ENV_PREFIX: &str = "STACKPLAN_PARAM_";

// ============================================================================
// Project Config
// ============================================================================

/// Contents of `stackplan.toml` / `stackplan.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Where applied state is kept, relative to the project root
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Parameter defaults
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,

    /// Explicit stack list; discovered when empty
    #[serde(default)]
    pub stacks: Vec<StackEntry>,

    /// Attributes exposed by each resource type
    #[serde(default)]
    pub types: BTreeMap<String, TypeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackEntry {
    /// Overrides the name declared in the file
    #[serde(default)]
    pub name: Option<String>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeEntry {
    #[serde(default)]
    pub attributes: Vec<String>,
}

fn default_state_dir() -> String {
    ".stackplan".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            parameters: BTreeMap::new(),
            stacks: Vec::new(),
            types: BTreeMap::new(),
        }
    }
}

impl ProjectConfig {
    /// Load the project config from `root`, or the default if there is none
    pub fn load(root: &Path) -> Result<Self> {
        let Some(path) = CONFIG_FILE_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file())
        else {
            log::debug!("No project config in {}, using defaults", root.display());
            return Ok(Self::default());
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid project config: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Invalid project config: {}", path.display()))?
        };

        log::debug!("Loaded project config from {}", path.display());
        Ok(config)
    }

    /// Expanded path of the state file
    pub fn state_path(&self, root: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(&self.state_dir);
        root.join(expanded.as_ref()).join("state.json")
    }

    /// Attribute catalog built from the `[types]` table
    pub fn catalog(&self) -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        for (type_tag, entry) in &self.types {
            catalog.insert(type_tag.clone(), entry.attributes.iter().cloned());
        }
        catalog
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Parse a `KEY=VALUE` pair as given to `--param`
pub fn parse_param(arg: &str) -> Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{arg}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{arg}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Interpret a textual parameter value
///
/// JSON literals keep their type (`3`, `true`, `["a"]`); anything else is a
/// plain string.
pub fn param_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Merge parameters from config, environment and command line
///
/// Later sources win. Environment names have [`PARAM_ENV_PREFIX`] stripped
/// and are lowercased, so `STACKPLAN_PARAM_STAGE` supplies `stage`.
pub fn merge_parameters<E>(config: &ProjectConfig, env: E, cli: &[(String, String)]) -> Parameters
where
    E: IntoIterator<Item = (String, String)>,
{
    let mut params = config.parameters.clone();

    for (key, value) in env {
        if let Some(name) = key.strip_prefix(PARAM_ENV_PREFIX)
            && !name.is_empty()
        {
            log::debug!("Parameter '{}' from environment", name.to_lowercase());
            params.insert(name.to_lowercase(), param_value(&value));
        }
    }

    for (key, value) in cli {
        params.insert(key.clone(), param_value(value));
    }

    params
}

/// Reject stack entries that would load the same file twice
pub fn check_entries(config: &ProjectConfig) -> Result<()> {
    let mut seen = std::collections::BTreeSet::new();
    for entry in &config.stacks {
        if !seen.insert(&entry.path) {
            bail!("Stack file listed twice in project config: {}", entry.path.display());
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_default() {
        let dir = TempDir::new().unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.state_dir, ".stackplan");
        assert!(config.stacks.is_empty());
        assert_eq!(
            config.state_path(dir.path()),
            dir.path().join(".stackplan").join("state.json")
        );
    }

    #[test]
    fn test_load_toml_config() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("stackplan.toml"),
            r#"
state_dir = "state"

[parameters]
stage = "dev"
replicas = 2

[[stacks]]
name = "network"
path = "network/stack.toml"

[types."aws:ec2:vpc"]
attributes = ["CidrBlock", "VpcId"]
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.parameters["replicas"], json!(2));
        assert_eq!(config.stacks[0].name.as_deref(), Some("network"));
        assert_eq!(config.types["aws:ec2:vpc"].attributes.len(), 2);
        assert!(!config.catalog().is_empty());
        assert!(check_entries(&config).is_ok());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stackplan.json"), r#"{"stack_dir": "x"}"#).unwrap();
        assert!(ProjectConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("stage=prod").unwrap(),
            ("stage".to_string(), "prod".to_string())
        );
        assert_eq!(
            parse_param("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_param("stage").is_err());
        assert!(parse_param("=prod").is_err());
    }

    #[test]
    fn test_param_value_keeps_json_types() {
        assert_eq!(param_value("3"), json!(3));
        assert_eq!(param_value("true"), json!(true));
        assert_eq!(param_value("prod"), json!("prod"));
        assert_eq!(param_value(r#"["a"]"#), json!(["a"]));
    }

    #[test]
    fn test_later_sources_win() {
        let mut config = ProjectConfig::default();
        config.parameters.insert("stage".into(), json!("dev"));
        config.parameters.insert("region".into(), json!("eu"));
        config.parameters.insert("size".into(), json!(1));

        let env = vec![
            ("STACKPLAN_PARAM_STAGE".to_string(), "staging".to_string()),
            ("STACKPLAN_PARAM_SIZE".to_string(), "2".to_string()),
            ("PATH".to_string(), "/bin".to_string()),
        ];
        let cli = vec![("stage".to_string(), "prod".to_string())];

        let params = merge_parameters(&config, env, &cli);
        assert_eq!(params["stage"], json!("prod"));
        assert_eq!(params["size"], json!(2));
        assert_eq!(params["region"], json!("eu"));
        assert!(!params.contains_key("path"));
    }

    #[test]
    fn test_duplicate_entries_are_rejected() {
        let mut config = ProjectConfig::default();
        for name in ["a", "b"] {
            config.stacks.push(StackEntry {
                name: Some(name.into()),
                path: PathBuf::from("stack.toml"),
            });
        }
        assert!(check_entries(&config).is_err());
    }
}
