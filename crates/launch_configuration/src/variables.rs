use std::path::{Path, PathBuf};

const WORKSPACE_FOLDER: &str = "${workspaceFolder}";
const NAMED_WORKSPACE_FOLDER: &str = "${workspaceFolder:";

/// Folders that `${workspaceFolder}` variables refer to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    folders: Vec<(String, PathBuf)>,
}

impl Workspace {
    /// A single-folder workspace rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let folders = folder_name(&root)
            .map(|name| vec![(name, root.clone())])
            .unwrap_or_default();
        Self { root, folders }
    }

    /// A multi-root workspace; relative folder paths are taken from `base`.
    ///
    /// A folder without a name is known by its last path component. The
    /// first folder is also `${workspaceFolder}`.
    pub fn from_folders(
        base: impl AsRef<Path>,
        folders: impl IntoIterator<Item = (Option<String>, PathBuf)>,
    ) -> Self {
        let base = base.as_ref();
        let folders: Vec<(String, PathBuf)> = folders
            .into_iter()
            .filter_map(|(name, path)| {
                let path = base.join(path);
                let name = name.or_else(|| folder_name(&path))?;
                Some((name, path))
            })
            .collect();
        let root = folders
            .first()
            .map(|(_, path)| path.clone())
            .unwrap_or_else(|| base.to_path_buf());
        Self { root, folders }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder(&self, name: &str) -> Option<&Path> {
        self.folders
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.as_path())
    }

    /// Expand `${workspaceFolder}`, `${workspaceFolder:<name>}` and a leading `~`.
    ///
    /// Unknown folder names are left in place.
    pub fn expand(&self, value: &str) -> String {
        let mut expanded = value.replace(WORKSPACE_FOLDER, &self.root.display().to_string());

        let mut search_from = 0;
        while let Some(offset) = expanded[search_from..].find(NAMED_WORKSPACE_FOLDER) {
            let start = search_from + offset;
            let name_start = start + NAMED_WORKSPACE_FOLDER.len();
            let Some(name_len) = expanded[name_start..].find('}') else {
                break;
            };
            let name = &expanded[name_start..name_start + name_len];
            match self.folder(name) {
                Some(folder) => {
                    let folder = folder.display().to_string();
                    expanded.replace_range(start..name_start + name_len + 1, &folder);
                    search_from = start + folder.len();
                }
                None => {
                    tracing::warn!(%name, "unknown workspace folder");
                    search_from = name_start + name_len + 1;
                }
            }
        }

        expand_home(&expanded)
    }
}

fn folder_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn expand_home(value: &str) -> String {
    let rest = match value.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
        _ => return value.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{rest}", home.display()),
        None => value.to_string(),
    }
}
