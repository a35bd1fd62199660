//! Hierarchy labels derived from a file's position under its ingestion root.
//!
//! A root declares ordered level names (e.g. `["module", "submodule"]`); the
//! file's directory components relative to the root fill them in order.
//! Deeper directories than declared levels are ignored, shallower files leave
//! the remaining levels unset.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::RootConfig;

pub fn derive_hierarchy(root: &RootConfig, file: &Path) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();

    let Ok(relative) = file.strip_prefix(&root.path) else {
        return labels;
    };

    // Directory components only; the file name itself never labels a level.
    let components: Vec<String> = relative
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();

    for (level, component) in root.hierarchy.iter().zip(components) {
        labels.insert(level.clone(), component);
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn root(levels: &[&str]) -> RootConfig {
        RootConfig {
            path: PathBuf::from("/corpus/claims"),
            app: "claims".to_string(),
            hierarchy: levels.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_two_levels() {
        let labels = derive_hierarchy(
            &root(&["module", "submodule"]),
            Path::new("/corpus/claims/billing/refunds/policy.md"),
        );
        assert_eq!(labels.get("module").unwrap(), "billing");
        assert_eq!(labels.get("submodule").unwrap(), "refunds");
    }

    #[test]
    fn test_shallow_file_leaves_levels_unset() {
        let labels = derive_hierarchy(
            &root(&["module", "submodule"]),
            Path::new("/corpus/claims/billing/policy.md"),
        );
        assert_eq!(labels.get("module").unwrap(), "billing");
        assert!(!labels.contains_key("submodule"));
    }

    #[test]
    fn test_file_at_root_has_no_labels() {
        let labels = derive_hierarchy(
            &root(&["module"]),
            Path::new("/corpus/claims/policy.md"),
        );
        assert!(labels.is_empty());
    }

    #[test]
    fn test_deeper_dirs_than_levels_ignored() {
        let labels = derive_hierarchy(
            &root(&["module"]),
            Path::new("/corpus/claims/billing/refunds/deep/policy.md"),
        );
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("module").unwrap(), "billing");
    }

    #[test]
    fn test_file_outside_root() {
        let labels = derive_hierarchy(
            &root(&["module"]),
            Path::new("/elsewhere/billing/policy.md"),
        );
        assert!(labels.is_empty());
    }
}
