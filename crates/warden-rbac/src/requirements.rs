//! Requirements authority: the operator-curated allow-list oracle.
//!
//! Backed by a YAML file (possibly multi-document) of shape
//! `{service: {rule_name: [role, ...]}}`. Selected instead of the policy
//! authority when `test_custom_requirements` is configured.
use crate::errors::{RbacError, RbacResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

type Document = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Debug)]
pub struct RequirementsAuthority {
    service: String,
    rules: BTreeMap<String, Vec<String>>,
}

impl RequirementsAuthority {
    /// Load and memoize the mapping for one service.
    pub fn load(path: &Path, service: &str) -> RbacResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            RbacError::SetupFailed(format!(
                "read requirements file {}: {err}",
                path.display()
            ))
        })?;

        let mut rules: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut section_found = false;
        for document in serde_yaml::Deserializer::from_str(&contents) {
            let document = Document::deserialize(document).map_err(|err| {
                RbacError::SetupFailed(format!(
                    "parse requirements file {}: {err}",
                    path.display()
                ))
            })?;
            if let Some(section) = document.get(service) {
                section_found = true;
                rules.extend(section.clone());
            }
        }

        if !section_found {
            return Err(RbacError::Misconfigured(service.to_string()));
        }
        tracing::debug!(service, rules = rules.len(), "requirements loaded");
        Ok(Self {
            service: service.to_string(),
            rules,
        })
    }

    pub fn allowed(&self, rule_name: &str, role: &str) -> RbacResult<bool> {
        let Some(roles) = self.rules.get(rule_name) else {
            return Err(RbacError::UnknownRequirement {
                service: self.service.clone(),
                rule: rule_name.to_string(),
            });
        };
        Ok(roles.iter().any(|name| name == role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_requirements(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("requirements.yaml");
        let mut file = fs::File::create(&path).expect("create requirements");
        file.write_all(contents.as_bytes()).expect("write requirements");
        (dir, path)
    }

    #[test]
    fn membership_decides_allow() {
        let (_dir, path) = write_requirements("svc:\n  act:\n    - member\n");
        let authority = RequirementsAuthority::load(&path, "svc").expect("load");
        assert!(authority.allowed("act", "member").expect("allowed"));
        assert!(!authority.allowed("act", "admin").expect("allowed"));
    }

    #[test]
    fn missing_rule_is_unknown_requirement() {
        let (_dir, path) = write_requirements("svc:\n  act:\n    - member\n");
        let authority = RequirementsAuthority::load(&path, "svc").expect("load");
        let err = authority.allowed("missing_act", "member").expect_err("unknown");
        assert!(matches!(err, RbacError::UnknownRequirement { .. }));
    }

    #[test]
    fn missing_service_section_is_misconfigured() {
        let (_dir, path) = write_requirements("other:\n  act:\n    - member\n");
        let err = RequirementsAuthority::load(&path, "svc").expect_err("misconfigured");
        assert!(matches!(err, RbacError::Misconfigured(_)));
    }

    #[test]
    fn multi_document_files_merge() {
        let (_dir, path) = write_requirements(
            "svc:\n  act:\n    - member\n---\nsvc:\n  other_act:\n    - admin\n",
        );
        let authority = RequirementsAuthority::load(&path, "svc").expect("load");
        assert!(authority.allowed("act", "member").expect("allowed"));
        assert!(authority.allowed("other_act", "admin").expect("allowed"));
    }

    #[test]
    fn stable_across_repeated_queries() {
        let (_dir, path) = write_requirements("svc:\n  act:\n    - member\n");
        let authority = RequirementsAuthority::load(&path, "svc").expect("load");
        for _ in 0..3 {
            assert!(authority.allowed("act", "member").expect("allowed"));
        }
    }
}
