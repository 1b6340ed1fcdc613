//! Dependency resolution.
//!
//! Depth-first traversal over the dependency graph with an explicit frame
//! stack, producing a post-order (dependencies first) load order. The
//! graph is never stored: every call walks the descriptor snapshot it was
//! given.

use std::collections::btree_map;
use std::collections::{HashMap, HashSet};

use tracing::debug;
use trellis_core::{PluginId, VersionReq};

use crate::descriptor::PluginDescriptor;
use crate::error::{PluginError, PluginResult};

/// Computes load orders over a snapshot of descriptors.
#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver<'a> {
    descriptors: &'a HashMap<PluginId, PluginDescriptor>,
}

struct Frame<'a> {
    id: &'a PluginId,
    dependencies: btree_map::Iter<'a, PluginId, String>,
}

impl<'a> DependencyResolver<'a> {
    /// Resolve against `descriptors`.
    #[must_use]
    pub fn new(descriptors: &'a HashMap<PluginId, PluginDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Ordered list of ids to load before (and including) `root`.
    ///
    /// Every dependency appears strictly before its dependents and `root`
    /// is last. Siblings are visited in id order, so the result is
    /// deterministic.
    ///
    /// # Errors
    ///
    /// Checked per edge, in this order:
    /// - [`PluginError::MissingDependency`] if the target is not registered
    /// - [`PluginError::CyclicDependency`] if the target is on the current path
    /// - [`PluginError::UnsupportedVersionSpec`] if the requirement is not
    ///   one of the supported forms
    /// - [`PluginError::VersionIncompatible`] if the target's version does
    ///   not satisfy the requirement
    ///
    /// No partial order is ever returned.
    pub fn resolve(&self, root: &PluginId) -> PluginResult<Vec<PluginId>> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        self.visit(root, &mut done, &mut order)?;
        debug!(plugin_id = %root, order = ?order, "Resolved load order");
        Ok(order)
    }

    /// Load order for every descriptor in the snapshot.
    ///
    /// Roots are taken in id order; each plugin appears once.
    ///
    /// # Errors
    ///
    /// Fails on the first graph error, as [`resolve`](Self::resolve) does.
    pub fn resolve_all(&self) -> PluginResult<Vec<PluginId>> {
        let descriptors: &'a HashMap<PluginId, PluginDescriptor> = self.descriptors;
        let mut roots: Vec<&'a PluginId> = descriptors.keys().collect();
        roots.sort();
        let mut order = Vec::new();
        let mut done = HashSet::new();
        for root in roots {
            if !done.contains(root) {
                self.visit(root, &mut done, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        root: &PluginId,
        done: &mut HashSet<&'a PluginId>,
        order: &mut Vec<PluginId>,
    ) -> PluginResult<()> {
        let descriptors: &'a HashMap<PluginId, PluginDescriptor> = self.descriptors;
        let (root, root_descriptor) = descriptors
            .get_key_value(root)
            .ok_or_else(|| PluginError::NotFound(root.clone()))?;

        // `path` mirrors `stack` and gives the cycle / chain for errors.
        let mut path: Vec<&PluginId> = vec![root];
        let mut on_path: HashSet<&PluginId> = HashSet::from([root]);
        let mut stack = vec![Frame {
            id: root,
            dependencies: root_descriptor.dependencies().iter(),
        }];

        while let Some(frame) = stack.last_mut() {
            let Some((dependency, requirement)) = frame.dependencies.next() else {
                let finished = frame.id;
                stack.pop();
                path.pop();
                on_path.remove(finished);
                if done.insert(finished) {
                    order.push(finished.clone());
                }
                continue;
            };
            let dependent = frame.id;

            let Some((key, target)) = descriptors.get_key_value(dependency) else {
                let mut chain: Vec<PluginId> = path.iter().map(|id| (*id).clone()).collect();
                chain.push(dependency.clone());
                return Err(PluginError::MissingDependency {
                    dependent: dependent.clone(),
                    dependency: dependency.clone(),
                    chain,
                });
            };

            if on_path.contains(dependency) {
                let start = path.iter().position(|id| *id == dependency).unwrap_or(0);
                let mut cycle: Vec<PluginId> =
                    path.iter().skip(start).map(|id| (*id).clone()).collect();
                cycle.push(dependency.clone());
                return Err(PluginError::CyclicDependency { cycle });
            }

            let required =
                VersionReq::parse(requirement).map_err(|_| PluginError::UnsupportedVersionSpec {
                    dependent: dependent.clone(),
                    dependency: dependency.clone(),
                    spec: requirement.clone(),
                })?;
            if !required.matches(&target.version()) {
                return Err(PluginError::VersionIncompatible {
                    dependent: dependent.clone(),
                    dependency: dependency.clone(),
                    required: requirement.clone(),
                    installed: target.version().to_string(),
                });
            }

            if done.contains(dependency) {
                continue;
            }
            path.push(key);
            on_path.insert(key);
            stack.push(Frame {
                id: key,
                dependencies: target.dependencies().iter(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use trellis_core::Version;

    use super::*;

    fn graph(edges: &[(&str, &str, &[(&str, &str)])]) -> HashMap<PluginId, PluginDescriptor> {
        edges
            .iter()
            .map(|(id, version, deps)| {
                let mut descriptor = PluginDescriptor::new(
                    PluginId::from_static(id),
                    *id,
                    Version::parse(version).unwrap(),
                );
                for (dep, req) in *deps {
                    descriptor = descriptor.with_dependency(PluginId::from_static(dep), *req);
                }
                (PluginId::from_static(id), descriptor)
            })
            .collect()
    }

    fn ids(names: &[&str]) -> Vec<PluginId> {
        names.iter().map(|n| PluginId::from_static(n)).collect()
    }

    fn position(order: &[PluginId], id: &str) -> usize {
        order.iter().position(|p| p.as_str() == id).unwrap()
    }

    #[test]
    fn dependency_comes_first() {
        let g = graph(&[("A", "1.0.0", &[("B", "1.0.0")]), ("B", "1.0.0", &[])]);
        let order = DependencyResolver::new(&g).resolve(&PluginId::from_static("A")).unwrap();
        assert_eq!(order, ids(&["B", "A"]));
    }

    #[test]
    fn plugin_without_dependencies_resolves_to_itself() {
        let g = graph(&[("A", "1.0.0", &[])]);
        let order = DependencyResolver::new(&g).resolve(&PluginId::from_static("A")).unwrap();
        assert_eq!(order, ids(&["A"]));
    }

    #[test]
    fn diamond_lists_shared_dependency_once() {
        let g = graph(&[
            ("A", "1.0.0", &[("B", "^1.0.0"), ("C", "^1.0.0")]),
            ("B", "1.0.0", &[("D", ">=1.0.0")]),
            ("C", "1.1.0", &[("D", ">=1.0.0")]),
            ("D", "2.0.0", &[]),
        ]);
        let order = DependencyResolver::new(&g).resolve(&PluginId::from_static("A")).unwrap();
        assert_eq!(order, ids(&["D", "B", "C", "A"]));
    }

    #[test]
    fn every_edge_points_forward_in_resolve_all() {
        let g = graph(&[
            ("app", "1.0.0", &[("ui", "^1.0.0"), ("net", "^1.0.0")]),
            ("ui", "1.2.0", &[("core", "^1.0.0")]),
            ("net", "1.0.3", &[("core", "^1.0.0")]),
            ("core", "1.0.0", &[]),
            ("lonely", "0.1.0", &[]),
        ]);
        let order = DependencyResolver::new(&g).resolve_all().unwrap();
        assert_eq!(order.len(), g.len());
        for (id, descriptor) in &g {
            for dep in descriptor.dependencies().keys() {
                assert!(position(&order, dep.as_str()) < position(&order, id.as_str()));
            }
        }
    }

    #[test]
    fn two_node_cycle_names_full_path() {
        let g = graph(&[("A", "1.0.0", &[("B", "1.0.0")]), ("B", "1.0.0", &[("A", "1.0.0")])]);
        let resolver = DependencyResolver::new(&g);

        match resolver.resolve(&PluginId::from_static("A")) {
            Err(PluginError::CyclicDependency { cycle }) => assert_eq!(cycle, ids(&["A", "B", "A"])),
            other => panic!("unexpected: {other:?}"),
        }
        match resolver.resolve(&PluginId::from_static("B")) {
            Err(PluginError::CyclicDependency { cycle }) => assert_eq!(cycle, ids(&["B", "A", "B"])),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn cycle_below_root_excludes_root() {
        let g = graph(&[
            ("A", "1.0.0", &[("B", "1.0.0")]),
            ("B", "1.0.0", &[("C", "1.0.0")]),
            ("C", "1.0.0", &[("B", "1.0.0")]),
        ]);
        match DependencyResolver::new(&g).resolve(&PluginId::from_static("A")) {
            Err(PluginError::CyclicDependency { cycle }) => assert_eq!(cycle, ids(&["B", "C", "B"])),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let g = graph(&[("A", "1.0.0", &[("A", "1.0.0")])]);
        assert!(matches!(
            DependencyResolver::new(&g).resolve(&PluginId::from_static("A")),
            Err(PluginError::CyclicDependency { cycle }) if cycle == ids(&["A", "A"])
        ));
    }

    #[test]
    fn missing_dependency_reports_chain() {
        let g = graph(&[("A", "1.0.0", &[("B", "1.0.0")]), ("B", "1.0.0", &[("X", "1.0.0")])]);
        match DependencyResolver::new(&g).resolve(&PluginId::from_static("A")) {
            Err(PluginError::MissingDependency {
                dependent,
                dependency,
                chain,
            }) => {
                assert_eq!(dependent.as_str(), "B");
                assert_eq!(dependency.as_str(), "X");
                assert_eq!(chain, ids(&["A", "B", "X"]));
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn incompatible_version_is_rejected() {
        let g = graph(&[("A", "1.0.0", &[("B", "^1.2.0")]), ("B", "2.0.0", &[])]);
        match DependencyResolver::new(&g).resolve(&PluginId::from_static("A")) {
            Err(PluginError::VersionIncompatible {
                required, installed, ..
            }) => {
                assert_eq!(required, "^1.2.0");
                assert_eq!(installed, "2.0.0");
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unsupported_requirement_is_an_error() {
        let g = graph(&[("A", "1.0.0", &[("B", "~1.0.0")]), ("B", "1.0.0", &[])]);
        assert!(matches!(
            DependencyResolver::new(&g).resolve(&PluginId::from_static("A")),
            Err(PluginError::UnsupportedVersionSpec { spec, .. }) if spec == "~1.0.0"
        ));
    }

    #[test]
    fn unknown_root_is_not_found() {
        let g = graph(&[]);
        assert!(matches!(
            DependencyResolver::new(&g).resolve(&PluginId::from_static("A")),
            Err(PluginError::NotFound(_))
        ));
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let names: Vec<String> = (0..5000).map(|n| format!("p{n}")).collect();
        let mut g = HashMap::new();
        for (n, name) in names.iter().enumerate() {
            let mut descriptor =
                PluginDescriptor::new(PluginId::new(name.as_str()).unwrap(), name, Version::new(1, 0, 0));
            if let Some(next) = names.get(n.saturating_add(1)) {
                descriptor = descriptor.with_dependency(PluginId::new(next.as_str()).unwrap(), "1.0.0");
            }
            g.insert(descriptor.id().clone(), descriptor);
        }
        let order = DependencyResolver::new(&g).resolve(&PluginId::from_static("p0")).unwrap();
        assert_eq!(order.len(), 5000);
        assert_eq!(order[0].as_str(), "p4999");
        assert_eq!(order[4999].as_str(), "p0");
    }
}
