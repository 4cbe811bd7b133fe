//! Root registry and virtual path resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::AppError;
use crate::path_encoding::{decode_to_bytes, encode_osstr, EncodedName};

/// Maps virtual root names (the byte-safe-encoded basename of each
/// configured directory) to absolute, canonical directories.
#[derive(Debug)]
pub struct RootRegistry {
    roots: HashMap<String, PathBuf>,
    /// Preserves configuration order for tree enumeration.
    order: Vec<String>,
}

impl RootRegistry {
    /// Build the registry from configured directories. Fails if any two
    /// directories encode to the same virtual name.
    pub fn build(dirs: &[PathBuf]) -> anyhow::Result<Self> {
        let mut roots = HashMap::new();
        let mut order = Vec::new();
        for dir in dirs {
            let canonical = dir
                .canonicalize()
                .map_err(|e| anyhow::anyhow!("not a directory: {dir:?} ({e})"))?;
            let name = canonical
                .file_name()
                .map(encode_osstr)
                .ok_or_else(|| anyhow::anyhow!("root has no basename: {canonical:?}"))?;
            if roots.contains_key(&name) {
                anyhow::bail!("duplicate directory names not allowed: {name}");
            }
            order.push(name.clone());
            roots.insert(name, canonical);
        }
        Ok(Self { roots, order })
    }

    /// Resolve a virtual path of the form `<root>/<rest>` to an absolute,
    /// canonical path contained within the registered root.
    pub fn resolve(&self, virtual_path: &str) -> Result<PathBuf, AppError> {
        let decoded = decode_to_bytes(virtual_path).map_err(|_| AppError::InvalidPath)?;
        #[cfg(unix)]
        let decoded_str = {
            use std::os::unix::ffi::OsStrExt;
            std::ffi::OsStr::from_bytes(&decoded)
                .to_str()
                .map(str::to_string)
        };
        #[cfg(not(unix))]
        let decoded_str = String::from_utf8(decoded).ok();
        let decoded_str = decoded_str.ok_or(AppError::InvalidPath)?;

        let mut parts = decoded_str.splitn(2, '/');
        let root_name = parts.next().ok_or(AppError::InvalidPath)?;
        let rest = parts.next();

        let root = self.roots.get(root_name).ok_or(AppError::InvalidPath)?;

        let candidate = match rest {
            None | Some("") => root.clone(),
            Some(rest) => {
                let joined = root.join(rest);
                joined.canonicalize().map_err(|_| AppError::InvalidPath)?
            }
        };

        if !candidate.starts_with(root) {
            return Err(AppError::InvalidPath);
        }

        Ok(candidate)
    }

    /// Build the recursive directory tree for every root, skipping
    /// dot-prefixed entries, sorted lexicographically at every level.
    pub fn build_trees(&self) -> Vec<TreeNode> {
        self.order
            .iter()
            .filter_map(|name| self.roots.get(name).map(|p| walk(p)))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub name: EncodedName,
    pub dirs: Vec<TreeNode>,
}

fn walk(dir: &Path) -> TreeNode {
    let name = dir
        .file_name()
        .map(encode_osstr)
        .unwrap_or_else(|| encode_osstr(dir.as_os_str()));

    let mut children: Vec<(String, PathBuf)> = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let is_dotted = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|s| s.starts_with('.'))
                .unwrap_or(false);
            if is_dotted {
                continue;
            }
            if path.is_dir() {
                let sort_key = path.file_name().map(|n| n.to_string_lossy().into_owned());
                if let Some(key) = sort_key {
                    children.push((key, path));
                }
            }
        }
    }
    children.sort_by(|a, b| a.0.cmp(&b.0));

    TreeNode {
        name,
        dirs: children.into_iter().map(|(_, p)| walk(&p)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn resolve_rejects_escape() {
        let base = tempdir().unwrap();
        let pics = base.path().join("pics");
        fs::create_dir(&pics).unwrap();
        let registry = RootRegistry::build(&[pics.clone()]).unwrap();

        let result = registry.resolve("pics/../../etc/passwd");
        assert!(matches!(result, Err(AppError::InvalidPath)));
    }

    #[test]
    fn resolve_root_itself() {
        let base = tempdir().unwrap();
        let pics = base.path().join("pics");
        fs::create_dir(&pics).unwrap();
        let registry = RootRegistry::build(&[pics.clone()]).unwrap();

        let resolved = registry.resolve("pics").unwrap();
        assert_eq!(resolved, pics.canonicalize().unwrap());
    }

    #[test]
    fn duplicate_basenames_are_fatal() {
        let base = tempdir().unwrap();
        let a = base.path().join("a/pics");
        let b = base.path().join("b/pics");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        let err = RootRegistry::build(&[a, b]).unwrap_err();
        assert!(err.to_string().contains("pics"));
    }

    #[test]
    fn tree_skips_dotfiles_and_sorts() {
        let base = tempdir().unwrap();
        let root = base.path().join("root");
        fs::create_dir_all(root.join("zeta")).unwrap();
        fs::create_dir_all(root.join("alpha")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        let registry = RootRegistry::build(&[root]).unwrap();

        let trees = registry.build_trees();
        assert_eq!(trees.len(), 1);
        let names: Vec<_> = trees[0].dirs.iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
