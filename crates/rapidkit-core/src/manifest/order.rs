//! Dependency ordering of modules (Kahn's algorithm)

use super::ModuleManifest;
use crate::error::{DependencyCycleError, ManifestError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Order manifests so that every module follows its dependencies.
///
/// Dependencies naming modules outside `manifests` are ignored. The ready set
/// is kept sorted, so the result is deterministic for a given input.
pub fn topological_sort(
    manifests: &[ModuleManifest],
    profile: Option<&str>,
) -> std::result::Result<Vec<String>, DependencyCycleError> {
    let known: BTreeSet<&str> = manifests.iter().map(|m| m.name.as_str()).collect();

    let mut in_degree: BTreeMap<&str, usize> = known.iter().map(|name| (*name, 0)).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for manifest in manifests {
        let deps = manifest.dependencies_for(profile);
        for dep in &deps {
            let Some(dep) = known.get(dep.as_str()) else {
                continue;
            };
            if *dep == manifest.name {
                continue;
            }
            dependents.entry(*dep).or_default().push(manifest.name.as_str());
            *in_degree.entry(manifest.name.as_str()).or_default() += 1;
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(known.len());

    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        if let Some(children) = dependents.get(name) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*child);
                    }
                }
            }
        }
    }

    if order.len() != known.len() {
        let remaining = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        return Err(DependencyCycleError { modules: remaining });
    }

    Ok(order)
}

/// Install order for `targets` including their transitive dependencies
pub fn compute_install_order(
    targets: &[String],
    manifests: &[ModuleManifest],
    profile: Option<&str>,
) -> Result<Vec<String>> {
    let by_name: BTreeMap<&str, &ModuleManifest> =
        manifests.iter().map(|m| (m.name.as_str(), m)).collect();

    let mut selected: BTreeMap<&str, &ModuleManifest> = BTreeMap::new();
    let mut stack: Vec<(String, Option<String>)> =
        targets.iter().map(|t| (t.clone(), None)).collect();

    while let Some((name, required_by)) = stack.pop() {
        if selected.contains_key(name.as_str()) {
            continue;
        }
        let Some(&manifest) = by_name.get(name.as_str()) else {
            return Err(ManifestError::UnknownDependency {
                module: required_by.unwrap_or_else(|| "<target>".to_string()),
                dependency: name,
            }
            .into());
        };
        selected.insert(manifest.name.as_str(), manifest);
        for dep in manifest.dependencies_for(profile) {
            if !selected.contains_key(dep.as_str()) {
                stack.push((dep, Some(manifest.name.clone())));
            }
        }
    }

    let closure: Vec<ModuleManifest> = selected.into_values().cloned().collect();
    Ok(topological_sort(&closure, profile)?)
}
