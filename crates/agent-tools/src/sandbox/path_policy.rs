use std::path::{Component, Path, PathBuf};

use super::SandboxError;

/// Canonical sandbox root. Every path handed out by this type is a
/// descendant of it.
#[derive(Debug, Clone)]
pub struct SandboxRoot {
    root: PathBuf,
}

impl SandboxRoot {
    /// Create the root directory if needed and canonicalize it.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(path)?;
        Ok(Self {
            root: path.canonicalize()?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path under `base` without touching the filesystem.
    ///
    /// Absolute paths, drive prefixes and `..` segments that climb above the
    /// root are policy violations. Every existing component is then checked
    /// without following links: a symlink must resolve to a target that
    /// exists inside the root, so dangling links cannot redirect a write.
    pub fn resolve(&self, base: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
        let candidate = Path::new(relative.trim());

        let mut resolved = base.to_path_buf();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if resolved == self.root || !resolved.pop() {
                        return Err(escape(relative));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(SandboxError::PolicyViolation(format!(
                        "absolute path '{}' is not allowed; use a path relative to the sandbox",
                        relative
                    )))
                }
            }
        }

        if !resolved.starts_with(&self.root) {
            return Err(escape(relative));
        }

        self.check_links(&resolved, relative)?;
        Ok(resolved)
    }

    fn check_links(&self, resolved: &Path, relative: &str) -> Result<(), SandboxError> {
        let Ok(inside) = resolved.strip_prefix(&self.root) else {
            return Err(escape(relative));
        };

        let mut current = self.root.clone();
        for component in inside.components() {
            current.push(component);
            let metadata = match std::fs::symlink_metadata(&current) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    return Err(SandboxError::Other(format!(
                        "cannot resolve '{}': {}",
                        relative, e
                    )))
                }
            };
            if !metadata.file_type().is_symlink() {
                continue;
            }
            match current.canonicalize() {
                Ok(target) if target.starts_with(&self.root) => {}
                Ok(_) => return Err(escape(relative)),
                Err(_) => {
                    return Err(SandboxError::PolicyViolation(format!(
                        "path '{}' goes through a dangling symlink",
                        relative
                    )))
                }
            }
        }
        Ok(())
    }

    /// Resolve an optional working directory. `None` or empty means the root.
    pub fn resolve_dir(&self, relative: Option<&str>) -> Result<PathBuf, SandboxError> {
        match relative.map(str::trim).filter(|value| !value.is_empty()) {
            Some(relative) => self.resolve(&self.root, relative),
            None => Ok(self.root.clone()),
        }
    }

    /// Path relative to the root, using `/` separators.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_else(|_| path.display().to_string())
    }
}

fn escape(relative: &str) -> SandboxError {
    SandboxError::PolicyViolation(format!("path '{}' escapes the sandbox root", relative))
}
