use crate::config::get_config;
use anyhow::{bail, Result};
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One export JSON file and the folder name it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSource {
    pub name: String,
    pub path: PathBuf,
}

/// Locates export files, either from explicit paths or from the configured
/// source directory. An export folder `<dir>/H1` holds its export as
/// `<dir>/H1/H1.json`.
pub struct FileDiscovery {
    source_base_dir: PathBuf,
    folders: Vec<String>,
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl FileDiscovery {
    pub fn new() -> Self {
        let config = get_config();
        Self::with_base(&config.paths.source_base_dir, &config.paths.folders)
    }

    pub fn with_base(source_base_dir: &Path, folders: &[String]) -> Self {
        Self {
            source_base_dir: source_base_dir.to_path_buf(),
            folders: folders.to_vec(),
        }
    }

    /// Resolve explicit input paths, or fall back to the configured folders
    /// when none are given.
    pub fn discover(&self, inputs: &[PathBuf]) -> Result<Vec<ExportSource>> {
        let sources = if inputs.is_empty() {
            self.configured_sources()?
        } else {
            inputs
                .iter()
                .map(|p| self.resolve_path(p))
                .collect::<Result<Vec<_>>>()?
        };

        if sources.is_empty() {
            bail!(
                "No export files found (source directory: {})",
                self.source_base_dir.display()
            );
        }
        Ok(sources)
    }

    /// A JSON file is taken as is; a directory must contain `<name>.json` or,
    /// failing that, exactly one `*.json` file.
    pub fn resolve_path(&self, path: &Path) -> Result<ExportSource> {
        if path.is_file() {
            let name = path
                .parent()
                .and_then(|p| p.file_name())
                .or_else(|| path.file_stem())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            return Ok(ExportSource {
                name,
                path: path.to_path_buf(),
            });
        }

        if !path.is_dir() {
            bail!("Export path does not exist: {}", path.display());
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let conventional = path.join(format!("{}.json", name));
        if conventional.is_file() {
            return Ok(ExportSource {
                name,
                path: conventional,
            });
        }

        let candidates = json_files_in(path);
        match candidates.as_slice() {
            [only] => Ok(ExportSource {
                name,
                path: only.clone(),
            }),
            [] => bail!("No export JSON found in {}", path.display()),
            _ => bail!(
                "{} JSON files in {}, expected {}.json",
                candidates.len(),
                path.display(),
                name
            ),
        }
    }

    /// Configured folders under the source directory. Folders missing on disk
    /// are skipped with a warning. With no folders configured, every
    /// sub-directory following the `<name>/<name>.json` convention is used.
    pub fn configured_sources(&self) -> Result<Vec<ExportSource>> {
        if self.folders.is_empty() {
            return Ok(self.scan_base_dir());
        }

        let mut sources = Vec::new();
        for folder in &self.folders {
            let dir = self.source_base_dir.join(folder);
            if !dir.is_dir() {
                warn!(folder = %folder, path = %dir.display(), "Export folder missing, skipping");
                continue;
            }
            sources.push(self.resolve_path(&dir)?);
        }
        Ok(sources)
    }

    fn scan_base_dir(&self) -> Vec<ExportSource> {
        let pattern = self.source_base_dir.join("*").join("*.json");
        let mut sources: Vec<ExportSource> = match glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths
                .flatten()
                .filter_map(|file| {
                    let folder = file.parent()?.file_name()?.to_string_lossy().into_owned();
                    let stem = file.file_stem()?.to_string_lossy().into_owned();
                    (folder == stem).then_some(ExportSource {
                        name: folder,
                        path: file.clone(),
                    })
                })
                .collect(),
            Err(e) => {
                warn!(pattern = %pattern.display(), error = %e, "Invalid glob pattern");
                Vec::new()
            }
        };
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = sources.len(), "Discovered export folders");
        sources
    }
}

fn json_files_in(dir: &Path) -> Vec<PathBuf> {
    let pattern = dir.join("*.json");
    let mut files: Vec<PathBuf> = glob(&pattern.to_string_lossy())
        .map(|paths| paths.flatten().collect())
        .unwrap_or_default();
    files.sort();
    files
}
