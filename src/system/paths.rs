//! Workspace path safety checks.
//!
//! The clean step deletes the workspace root recursively, so the root is
//! checked before anything touches it: it must be absolute, it must not be a
//! filesystem root or the user's home directory, and it must not contain the
//! project directory the packaging tool runs in.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path, dropping `.` and folding `..`.
///
/// Does not touch the filesystem, so it works for paths that do not exist yet.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Validate that `workspace` is safe to delete and recreate.
///
/// # Arguments
/// * `workspace` - Workspace root about to be cleaned
/// * `project_dir` - Directory that must survive the clean
///
/// # Returns
/// `Err(String)` describing the first violated rule
pub fn validate_workspace_root(workspace: &Path, project_dir: &Path) -> Result<(), String> {
    if !workspace.is_absolute() {
        return Err(format!(
            "workspace root must be an absolute path: {}",
            workspace.display()
        ));
    }

    let workspace = normalize_lexically(workspace);
    if workspace.parent().is_none() {
        return Err(format!(
            "refusing to use filesystem root as workspace: {}",
            workspace.display()
        ));
    }

    if let Some(home) = dirs::home_dir() {
        if normalize_lexically(&home) == workspace {
            return Err(format!(
                "refusing to use the home directory as workspace: {}",
                workspace.display()
            ));
        }
    }

    let project_dir = normalize_lexically(project_dir);
    if project_dir.starts_with(&workspace) {
        return Err(format!(
            "workspace root {} contains the project directory {}",
            workspace.display(),
            project_dir.display()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_lexically(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn test_valid_workspace() {
        assert!(validate_workspace_root(Path::new("/srv/build/libs"), Path::new("/srv/build")).is_ok());
    }

    #[test]
    fn test_relative_workspace_rejected() {
        assert!(validate_workspace_root(Path::new("libs"), Path::new("/srv")).is_err());
    }

    #[test]
    fn test_root_workspace_rejected() {
        assert!(validate_workspace_root(Path::new("/"), Path::new("/srv")).is_err());
        assert!(validate_workspace_root(Path::new("/tmp/.."), Path::new("/srv")).is_err());
    }

    #[test]
    fn test_workspace_containing_project_rejected() {
        let err = validate_workspace_root(Path::new("/srv/build/."), Path::new("/srv/build/app"))
            .unwrap_err();
        assert!(err.contains("contains the project directory"));
    }

    #[test]
    fn test_home_workspace_rejected() {
        if let Some(home) = dirs::home_dir() {
            if home.parent().is_some() {
                assert!(validate_workspace_root(&home, Path::new("/nonexistent/project")).is_err());
            }
        }
    }
}
