//! The install plan: a deduplicated set of resolved modules.

use crate::spec::ModuleSpec;
use semver::Version;
use std::collections::HashSet;

/// A set of required specs with download URIs, as produced by the resolver.
///
/// Membership is structural on `(name, guid, min, max)`; iteration through
/// [`InstallPlan::members`] is sorted for deterministic output.
#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    members: HashSet<ModuleSpec>,
}

impl InstallPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolved spec; returns `false` when an equal member is already
    /// present.
    pub fn add(&mut self, spec: ModuleSpec) -> bool {
        self.members.insert(spec)
    }

    #[must_use]
    pub fn contains(&self, spec: &ModuleSpec) -> bool {
        self.members.contains(spec)
    }

    pub fn remove(&mut self, spec: &ModuleSpec) -> bool {
        self.members.remove(spec)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Unordered iteration over the members.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleSpec> {
        self.members.iter()
    }

    /// Members sorted by name, then version.
    #[must_use]
    pub fn members(&self) -> Vec<&ModuleSpec> {
        let mut members: Vec<&ModuleSpec> = self.members.iter().collect();
        members.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.min.cmp(&b.min)));
        members
    }

    /// Planned versions for a module name (case-insensitive), highest first.
    #[must_use]
    pub fn planned_versions(&self, name: &str) -> Vec<&Version> {
        let mut versions: Vec<&Version> = self
            .members
            .iter()
            .filter(|member| member.name.eq_ignore_ascii_case(name))
            .filter_map(ModuleSpec::required)
            .collect();
        versions.sort_by(|a, b| b.cmp_precedence(a));
        versions
    }
}

impl<'a> IntoIterator for &'a InstallPlan {
    type Item = &'a ModuleSpec;
    type IntoIter = std::collections::hash_set::Iter<'a, ModuleSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::parse_either;

    fn resolved(name: &str, version: &str) -> ModuleSpec {
        ModuleSpec::exact(name, parse_either(version).unwrap())
            .with_download_uri(format!("https://example.test/{name}.{version}.nupkg"))
    }

    #[test]
    fn add_deduplicates_structurally() {
        let mut plan = InstallPlan::new();
        assert!(plan.add(resolved("Pester", "5.5.0")));
        assert!(!plan.add(resolved("Pester", "5.5.0")));
        assert!(plan.add(resolved("Pester", "5.6.0")));
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn members_are_sorted() {
        let mut plan = InstallPlan::new();
        plan.add(resolved("Zeta", "1.0.0"));
        plan.add(resolved("Alpha", "2.0.0"));
        plan.add(resolved("Alpha", "1.0.0"));

        let names: Vec<String> = plan
            .members()
            .iter()
            .map(|member| member.to_string())
            .collect();
        assert_eq!(names, ["Alpha@1.0.0", "Alpha@2.0.0", "Zeta@1.0.0"]);
    }

    #[test]
    fn planned_versions_descend_case_insensitively() {
        let mut plan = InstallPlan::new();
        plan.add(resolved("Pester", "4.10.1"));
        plan.add(resolved("pester", "5.5.0"));

        let versions: Vec<String> = plan
            .planned_versions("PESTER")
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(versions, ["5.5.0", "4.10.1"]);
    }
}
