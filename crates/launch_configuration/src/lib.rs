//! Launch configuration management
//!
//! Reads VS Code `launch.json` and `.code-workspace` files so the path
//! mappings an IDE already uses can configure bridge sessions.

use std::path::{Path, PathBuf};

use eyre::WrapErr;
use paths::MappingRule;
use serde::Deserialize;

mod variables;

pub use variables::Workspace;

/// Handle choosing a specific launch configuration, or if the user has not specified one, then
/// present a list of launch configurations they can choose from
#[derive(Debug)]
pub enum ChosenLaunchConfiguration {
    /// A specific launch configuration is available
    Specific(LaunchConfiguration),
    /// The specified launch configuration was not found
    NotFound,
    /// The user did not request a specific launch configuration, so present available options
    ToBeChosen(Vec<String>),
}

#[derive(Deserialize)]
struct VsCodeLaunchConfiguration {
    #[serde(rename = "version")]
    _version: Option<String>,
    configurations: Vec<LaunchConfiguration>,
}

#[derive(Deserialize)]
struct WorkspaceFolder {
    path: String,
    name: Option<String>,
}

/// Deserializable model for the launch configuration
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFormat {
    VsCode(VsCodeLaunchConfiguration),
    VsCodeWorkspace {
        #[serde(default)]
        folders: Vec<WorkspaceFolder>,
        launch: VsCodeLaunchConfiguration,
    },
}

/// One entry of `configurations`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfiguration {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub request: String,
    pub connect: Option<ConnectionDetails>,
    pub program: Option<String>,
    /// The debuggee's working directory
    pub cwd: Option<String>,
    #[serde(default)]
    pub path_mappings: Vec<MappingRule>,
    #[serde(rename = "clientOS")]
    pub client_os: Option<String>,
    #[serde(default)]
    pub debug_options: Vec<String>,
    pub just_my_code: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionDetails {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl ConnectionDetails {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl LaunchConfiguration {
    /// Expand workspace variables and `~` in the local side of every mapping.
    pub fn resolve(&mut self, workspace: &Workspace) {
        for mapping in &mut self.path_mappings {
            mapping.local_root = workspace.expand(&mapping.local_root);
        }
    }

    /// The keys of a `launch` / `attach` request that configure path mapping.
    pub fn session_arguments(&self) -> serde_json::Value {
        let mut arguments = serde_json::Map::new();
        if !self.path_mappings.is_empty() {
            arguments.insert(
                "pathMappings".to_string(),
                serde_json::json!(self.path_mappings),
            );
        }
        if let Some(client_os) = &self.client_os {
            arguments.insert("clientOS".to_string(), client_os.clone().into());
        }
        if !self.debug_options.is_empty() {
            arguments.insert(
                "debugOptions".to_string(),
                serde_json::json!(self.debug_options),
            );
        }
        if let Some(cwd) = &self.cwd {
            arguments.insert("cwd".to_string(), cwd.clone().into());
        }
        serde_json::Value::Object(arguments)
    }
}

pub fn load(
    name: Option<&str>,
    mut r: impl std::io::Read,
) -> eyre::Result<ChosenLaunchConfiguration> {
    let mut contents = String::new();
    r.read_to_string(&mut contents)
        .wrap_err("reading configuration contents")?;
    let (configurations, _) = parse(&contents).wrap_err("parsing launch configuration")?;
    Ok(choose(name, configurations))
}

/// Load a configuration file and resolve variables against its workspace.
///
/// For a `.code-workspace` file the workspace is the file's folders; for
/// `<root>/.vscode/launch.json` it is `<root>`.
pub fn load_from_path(
    name: Option<&str>,
    path: impl AsRef<Path>,
) -> eyre::Result<ChosenLaunchConfiguration> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    let (configurations, folders) = parse(&contents)
        .wrap_err_with(|| format!("parsing launch configuration {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let workspace = match folders {
        Some(folders) => Workspace::from_folders(
            base,
            folders
                .into_iter()
                .map(|f| (f.name, PathBuf::from(f.path))),
        ),
        None if base.file_name().is_some_and(|n| n == ".vscode") => {
            Workspace::new(base.parent().unwrap_or(base))
        }
        None => Workspace::new(base),
    };

    Ok(match choose(name, configurations) {
        ChosenLaunchConfiguration::Specific(mut configuration) => {
            configuration.resolve(&workspace);
            ChosenLaunchConfiguration::Specific(configuration)
        }
        other => other,
    })
}

fn parse(
    contents: &str,
) -> eyre::Result<(Vec<LaunchConfiguration>, Option<Vec<WorkspaceFolder>>)> {
    Ok(match jsonc_to_serde(contents)? {
        ConfigFormat::VsCode(VsCodeLaunchConfiguration { configurations, .. }) => {
            (configurations, None)
        }
        ConfigFormat::VsCodeWorkspace {
            folders,
            launch: VsCodeLaunchConfiguration { configurations, .. },
        } => (configurations, Some(folders)),
    })
}

fn choose(name: Option<&str>, configurations: Vec<LaunchConfiguration>) -> ChosenLaunchConfiguration {
    match name {
        Some(name) => configurations
            .into_iter()
            .find(|c| c.name == name)
            .map(ChosenLaunchConfiguration::Specific)
            .unwrap_or(ChosenLaunchConfiguration::NotFound),
        None => ChosenLaunchConfiguration::ToBeChosen(
            configurations.into_iter().map(|c| c.name).collect(),
        ),
    }
}

fn jsonc_to_serde(input: &str) -> eyre::Result<ConfigFormat> {
    let value = jsonc_parser::parse_to_serde_value(input, &Default::default())
        .wrap_err("parsing jsonc configuration")?;
    let Some(config_format_value) = value else {
        eyre::bail!("no configuration found");
    };

    let config_format =
        serde_json::from_value(config_format_value).wrap_err("deserializing jsonc::Value value")?;
    Ok(config_format)
}
