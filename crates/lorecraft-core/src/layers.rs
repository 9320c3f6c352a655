//! # Layer DAG
//!
//! Validated view over the configured layer set. Checks at construction:
//! no blank or duplicate names (case-insensitive), every `depends_on` target
//! exists, no dependency cycles, and canonical layers depend only on
//! canonical layers.
//!
//! `resolve_canonical` walks `depends_on` depth-first in declaration order
//! and returns the first canonical ancestor. With multiple canonical
//! ancestors at equal depth, declaration order is the tiebreak; authors who
//! need deterministic resolution across complex DAGs should avoid ambiguous
//! multi-parent canonical graphs.

use std::collections::{HashMap, HashSet};

use crate::config::Layer;
use crate::error::LoreError;

/// The validated layer DAG. Read-only after construction and cheap to clone
/// into the store backends.
#[derive(Debug, Clone, Default)]
pub struct LayerDag {
    layers: Vec<Layer>,
    index: HashMap<String, usize>,
}

impl LayerDag {
    /// Validate the configured layers and build the DAG.
    pub fn new(layers: &[Layer]) -> Result<Self, LoreError> {
        let mut index = HashMap::new();
        for (i, layer) in layers.iter().enumerate() {
            if layer.name.trim().is_empty() {
                return Err(LoreError::ConfigInvalid(format!(
                    "layer {i} name is required"
                )));
            }
            if index.insert(layer.name.to_lowercase(), i).is_some() {
                return Err(LoreError::ConfigInvalid(format!(
                    "duplicate layer name: {}",
                    layer.name
                )));
            }
        }

        for layer in layers {
            for dep in &layer.depends_on {
                if !index.contains_key(&dep.to_lowercase()) {
                    return Err(LoreError::ConfigInvalid(format!(
                        "layer {} depends on unknown layer: {dep}",
                        layer.name
                    )));
                }
                if layer.canonical {
                    let dep_layer = &layers[index[&dep.to_lowercase()]];
                    if !dep_layer.canonical {
                        return Err(LoreError::ConfigInvalid(format!(
                            "canonical layer {} may not depend on non-canonical layer {}",
                            layer.name, dep_layer.name
                        )));
                    }
                }
            }
        }

        let dag = Self {
            layers: layers.to_vec(),
            index,
        };
        dag.check_cycles()?;
        Ok(dag)
    }

    /// Depth-first cycle check with visiting/visited sets.
    fn check_cycles(&self) -> Result<(), LoreError> {
        let mut visited: HashSet<usize> = HashSet::new();
        for start in 0..self.layers.len() {
            if visited.contains(&start) {
                continue;
            }
            let mut visiting = HashSet::new();
            self.visit(start, &mut visiting, &mut visited)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        node: usize,
        visiting: &mut HashSet<usize>,
        visited: &mut HashSet<usize>,
    ) -> Result<(), LoreError> {
        if visited.contains(&node) {
            return Ok(());
        }
        if !visiting.insert(node) {
            return Err(LoreError::ConfigInvalid(format!(
                "layer dependency cycle involving {}",
                self.layers[node].name
            )));
        }
        for dep in &self.layers[node].depends_on {
            let next = self.index[&dep.to_lowercase()];
            self.visit(next, visiting, visited)?;
        }
        visiting.remove(&node);
        visited.insert(node);
        Ok(())
    }

    /// The configured layers, in declaration order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Look up a layer by name, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.index
            .get(&name.to_lowercase())
            .map(|&i| &self.layers[i])
    }

    /// Resolve the canonical base layer for `layer`.
    ///
    /// A canonical layer resolves to itself. Otherwise the first canonical
    /// ancestor found by a depth-first walk over `depends_on` (in declaration
    /// order) wins.
    pub fn resolve_canonical(&self, layer: &str) -> Result<&str, LoreError> {
        let start = self
            .get(layer)
            .ok_or_else(|| LoreError::UnknownLayer(layer.to_string()))?;
        if start.canonical {
            return Ok(&start.name);
        }
        self.find_canonical(start)
            .ok_or_else(|| LoreError::NoCanonicalLayer(layer.to_string()))
    }

    fn find_canonical(&self, layer: &Layer) -> Option<&str> {
        for dep in &layer.depends_on {
            let dep_layer = &self.layers[*self.index.get(&dep.to_lowercase())?];
            if dep_layer.canonical {
                return Some(&dep_layer.name);
            }
            if let Some(found) = self.find_canonical(dep_layer) {
                return Some(found);
            }
        }
        None
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &str, canonical: bool, depends_on: &[&str]) -> Layer {
        Layer {
            name: name.into(),
            paths: vec!["./x".into()],
            canonical,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn valid_dag_builds() {
        let dag = LayerDag::new(&[
            layer("setting", true, &[]),
            layer("campaign", false, &["setting"]),
        ])
        .expect("dag");
        assert_eq!(dag.layers().len(), 2);
        assert!(dag.get("SETTING").is_some());
    }

    #[test]
    fn duplicate_names_rejected() {
        assert!(LayerDag::new(&[layer("a", true, &[]), layer("A", true, &[])]).is_err());
    }

    #[test]
    fn unknown_dependency_rejected() {
        assert!(LayerDag::new(&[layer("campaign", false, &["setting"])]).is_err());
    }

    #[test]
    fn cycle_rejected() {
        let result = LayerDag::new(&[
            layer("a", false, &["b"]),
            layer("b", false, &["c"]),
            layer("c", false, &["a"]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn self_cycle_rejected() {
        assert!(LayerDag::new(&[layer("a", false, &["a"])]).is_err());
    }

    #[test]
    fn canonical_depending_on_derived_rejected() {
        let result = LayerDag::new(&[
            layer("events", false, &[]),
            layer("setting", true, &["events"]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn resolve_canonical_self() {
        let dag = LayerDag::new(&[layer("setting", true, &[])]).expect("dag");
        assert_eq!(dag.resolve_canonical("setting").unwrap(), "setting");
    }

    #[test]
    fn resolve_canonical_one_hop() {
        let dag = LayerDag::new(&[
            layer("setting", true, &[]),
            layer("campaign", false, &["setting"]),
        ])
        .expect("dag");
        assert_eq!(dag.resolve_canonical("campaign").unwrap(), "setting");
    }

    #[test]
    fn resolve_canonical_transitive() {
        let dag = LayerDag::new(&[
            layer("setting", true, &[]),
            layer("campaign", false, &["setting"]),
            layer("session", false, &["campaign"]),
        ])
        .expect("dag");
        assert_eq!(dag.resolve_canonical("session").unwrap(), "setting");
    }

    #[test]
    fn resolve_canonical_declaration_order_tiebreak() {
        let dag = LayerDag::new(&[
            layer("east", true, &[]),
            layer("west", true, &[]),
            layer("campaign", false, &["east", "west"]),
        ])
        .expect("dag");
        assert_eq!(dag.resolve_canonical("campaign").unwrap(), "east");
    }

    #[test]
    fn resolve_canonical_unknown_layer() {
        let dag = LayerDag::new(&[layer("setting", true, &[])]).expect("dag");
        assert!(matches!(
            dag.resolve_canonical("nope"),
            Err(LoreError::UnknownLayer(_))
        ));
    }

    #[test]
    fn resolve_canonical_no_base() {
        let dag = LayerDag::new(&[layer("floating", false, &[])]).expect("dag");
        assert!(matches!(
            dag.resolve_canonical("floating"),
            Err(LoreError::NoCanonicalLayer(_))
        ));
    }
}
