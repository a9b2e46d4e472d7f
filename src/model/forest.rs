use std::path::Path;
use serde::{Deserialize, Serialize};
use super::{feature_index, Classifier, FeatureRow};
use crate::{Result, DetectorError};

// Per tree, node 0 is the root and a split sends the sample left when
// `value <= threshold`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestExport {
    pub classes: Vec<String>,
    pub trees: Vec<TreeExport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeExport {
    pub nodes: Vec<NodeExport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeExport {
    Split {
        feature: String,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        distribution: Vec<f64>,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn compile(index: usize, export: &TreeExport, class_count: usize) -> Result<Self> {
        if export.nodes.is_empty() {
            return Err(invalid(index, 0, "tree has no nodes"));
        }

        let node_count = export.nodes.len();
        let mut nodes = Vec::with_capacity(node_count);

        for (pos, node) in export.nodes.iter().enumerate() {
            let compiled = match node {
                NodeExport::Split { feature, threshold, left, right } => {
                    let feature = feature_index(feature)
                        .ok_or_else(|| invalid(index, pos, &format!("unknown feature '{}'", feature)))?;
                    // Children always follow their parent, so every walk terminates.
                    for child in [*left, *right] {
                        if child <= pos || child >= node_count {
                            return Err(invalid(index, pos, &format!("invalid child index {}", child)));
                        }
                    }
                    Node::Split {
                        feature,
                        threshold: *threshold,
                        left: *left,
                        right: *right,
                    }
                }
                NodeExport::Leaf { value } => {
                    if value.len() != class_count {
                        return Err(invalid(
                            index,
                            pos,
                            &format!("leaf has {} weights for {} classes", value.len(), class_count),
                        ));
                    }
                    if value.iter().any(|w| !w.is_finite() || *w < 0.0) {
                        return Err(invalid(index, pos, "leaf weights must be finite and non-negative"));
                    }
                    let total: f64 = value.iter().sum();
                    if total <= 0.0 {
                        return Err(invalid(index, pos, "leaf has zero total weight"));
                    }
                    Node::Leaf {
                        distribution: value.iter().map(|w| w / total).collect(),
                    }
                }
            };
            nodes.push(compiled);
        }

        Ok(Self { nodes })
    }

    fn leaf(&self, row: &FeatureRow) -> &[f64] {
        let values = row.values();
        let mut pos = 0;
        loop {
            match &self.nodes[pos] {
                Node::Split { feature, threshold, left, right } => {
                    pos = if values[*feature] <= *threshold { *left } else { *right };
                }
                Node::Leaf { distribution } => return distribution,
            }
        }
    }
}

fn invalid(tree: usize, node: usize, reason: &str) -> DetectorError {
    DetectorError::Model(format!("tree {} node {}: {}", tree, node, reason))
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    classes: Vec<String>,
    trees: Vec<Tree>,
}

impl RandomForest {
    pub fn from_export(export: &ForestExport) -> Result<Self> {
        if export.classes.is_empty() {
            return Err(DetectorError::Model("model declares no classes".to_string()));
        }
        if export.trees.is_empty() {
            return Err(DetectorError::Model("model contains no trees".to_string()));
        }

        let trees = export
            .trees
            .iter()
            .enumerate()
            .map(|(idx, tree)| Tree::compile(idx, tree, export.classes.len()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            classes: export.classes.clone(),
            trees,
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let export: ForestExport = serde_json::from_str(content)?;
        Self::from_export(&export)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DetectorError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let forest = Self::from_json(&content)?;
        log::info!(
            "Loaded random forest with {} trees and classes {:?} from {}",
            forest.trees.len(),
            forest.classes,
            path.display()
        );
        Ok(forest)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Mean class distribution across all trees.
    pub fn predict_proba(&self, row: &FeatureRow) -> Vec<f64> {
        let mut totals = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (total, weight) in totals.iter_mut().zip(tree.leaf(row)) {
                *total += weight;
            }
        }

        let count = self.trees.len() as f64;
        totals.iter().map(|total| total / count).collect()
    }
}

impl Classifier for RandomForest {
    fn predict(&self, row: &FeatureRow) -> Result<String> {
        let proba = self.predict_proba(row);

        let mut best = 0;
        for (idx, p) in proba.iter().enumerate().skip(1) {
            if *p > proba[best] {
                best = idx;
            }
        }

        Ok(self.classes[best].clone())
    }
}
