//! Score ranking and label mapping

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Result;

/// Index of the highest score; the first one wins on ties, NaN never wins
pub fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, &s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((i, s)),
        })
        .map(|(i, _)| i)
}

/// The `k` highest scores with their class indices, best first
pub fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, s)| !s.is_nan())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

/// Maps class indices to display labels
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    /// Labels given in class-index order
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Parse newline-separated labels, skipping blank lines
    pub fn parse(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Load a label file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let map = Self::parse(&std::fs::read_to_string(path)?);
        info!("Loaded {} labels from {}", map.len(), path.display());
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label for `index`, falling back to "Class N" (1-based)
    pub fn label(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Class {}", index + 1))
    }
}

/// Best class of one classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Winning class index
    pub index: usize,
    /// Display label of the winning class
    pub label: String,
    /// Winning score
    pub score: f32,
    /// Highest-ranked classes, best first
    pub ranked: Vec<(usize, f32)>,
    /// Every class score in model order
    pub scores: Vec<f32>,
}

impl Prediction {
    /// Rank `scores`; `None` when there is no comparable score
    pub fn from_scores(scores: Vec<f32>, labels: &LabelMap, k: usize) -> Option<Self> {
        let index = argmax(&scores)?;
        Some(Self {
            index,
            label: labels.label(index),
            score: scores[index],
            ranked: top_k(&scores, k),
            scores,
        })
    }
}
