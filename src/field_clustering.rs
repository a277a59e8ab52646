//! Field usage clustering (PCA-lite)
//!
//! Builds the method × field usage matrix of a struct, takes the covariance
//! between fields and estimates how many latent responsibilities the
//! spectrum shows. Eigenvalues come from plain power iteration with a
//! diagonal-shift deflation between extractions, so the result is a
//! heuristic signal rather than an exact decomposition.

use serde::Serialize;

use crate::config::{CompiledConfig, PcaConfig};
use crate::facts::StructFacts;

/// Field clustering outcome for a struct
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldClusterResult {
    /// Bare names of the non-utility methods, one per matrix row
    pub method_names: Vec<String>,
    /// Field names in declaration order, one per matrix column
    pub field_names: Vec<String>,
    /// Usage weights 0-3
    pub matrix: Vec<Vec<u8>>,
    pub estimated_clusters: usize,
    pub explained_variance: Vec<f64>,
    pub has_multiple_responsibilities: bool,
    pub recommendation: String,
}

/// Run the analysis, or `None` when the struct has too little data
pub fn analyze_struct(facts: &StructFacts, config: &CompiledConfig) -> Option<FieldClusterResult> {
    let pca = &config.pca;
    if facts.fields.len() < pca.min_fields {
        return None;
    }

    let methods: Vec<_> = facts.methods.iter().filter(|m| !m.is_utility).collect();
    if methods.len() < pca.min_methods {
        return None;
    }

    let matrix: Vec<Vec<u8>> = methods
        .iter()
        .map(|m| facts.fields.iter().map(|f| m.usage_of(f).weight()).collect())
        .collect();
    if matrix.len() < 2 || matrix[0].len() < 3 {
        return None;
    }

    let (estimated_clusters, explained_variance) = estimate_clusters(&matrix, pca);
    let recommendation = recommendation(
        estimated_clusters,
        methods.len(),
        facts.fields.len(),
        &explained_variance,
    );

    Some(FieldClusterResult {
        method_names: methods.iter().map(|m| m.bare_name().to_string()).collect(),
        field_names: facts.fields.clone(),
        matrix,
        estimated_clusters,
        explained_variance,
        has_multiple_responsibilities: estimated_clusters >= 2,
        recommendation,
    })
}

/// Estimated cluster count and per-component explained variance
pub fn estimate_clusters(matrix: &[Vec<u8>], pca: &PcaConfig) -> (usize, Vec<f64>) {
    let data: Vec<Vec<f64>> = matrix
        .iter()
        .map(|row| row.iter().map(|&w| f64::from(w)).collect())
        .collect();

    let centered = center_columns(&data);
    let covariance = covariance_matrix(&centered);
    let eigenvalues = top_eigenvalues(&covariance, pca);

    let total: f64 = eigenvalues.iter().filter(|&&ev| ev > 0.0).sum();
    let explained: Vec<f64> = eigenvalues
        .iter()
        .map(|&ev| if total > 0.0 { ev / total } else { 0.0 })
        .collect();

    (estimate_cluster_count(&eigenvalues, &explained, pca), explained)
}

fn center_columns(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(first) = matrix.first() else {
        return Vec::new();
    };
    let rows = matrix.len() as f64;
    let means: Vec<f64> = (0..first.len())
        .map(|j| matrix.iter().map(|row| row[j]).sum::<f64>() / rows)
        .collect();

    matrix
        .iter()
        .map(|row| row.iter().zip(&means).map(|(v, mean)| v - mean).collect())
        .collect()
}

/// Sample covariance between columns of an already centered matrix
fn covariance_matrix(centered: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(first) = centered.first() else {
        return Vec::new();
    };
    let cols = first.len();
    let denominator = (centered.len().saturating_sub(1)).max(1) as f64;

    let mut cov = vec![vec![0.0; cols]; cols];
    for i in 0..cols {
        for j in i..cols {
            let sum: f64 = centered.iter().map(|row| row[i] * row[j]).sum();
            cov[i][j] = sum / denominator;
            cov[j][i] = cov[i][j];
        }
    }
    cov
}

/// Up to `max_components` eigenvalues, largest first in extraction order
fn top_eigenvalues(matrix: &[Vec<f64>], pca: &PcaConfig) -> Vec<f64> {
    let k = pca.max_components.min(matrix.len());
    let mut work = matrix.to_vec();
    let mut eigenvalues = Vec::with_capacity(k);

    for _ in 0..k {
        let eigenvalue = power_iteration(&work, pca.power_iterations);
        if eigenvalue <= pca.eigen_epsilon {
            break;
        }
        eigenvalues.push(eigenvalue);

        // Shift the diagonal instead of removing the eigenvector
        for (i, row) in work.iter_mut().enumerate() {
            row[i] -= eigenvalue * pca.deflation_factor;
        }
    }

    eigenvalues
}

/// Absolute value of the dominant eigenvalue (Rayleigh quotient)
fn power_iteration(matrix: &[Vec<f64>], max_iterations: usize) -> f64 {
    let n = matrix.len();
    if n == 0 {
        return 0.0;
    }

    let mut v = vec![1.0 / (n as f64).sqrt(); n];
    let mut eigenvalue = 0.0;

    for _ in 0..max_iterations {
        let next: Vec<f64> = matrix
            .iter()
            .map(|row| row.iter().zip(&v).map(|(a, b)| a * b).sum())
            .collect();

        let numerator: f64 = next.iter().zip(&v).map(|(a, b)| a * b).sum();
        let denominator: f64 = v.iter().map(|x| x * x).sum();
        if denominator > 0.0 {
            eigenvalue = numerator / denominator;
        }

        let norm = next.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm < 1e-10 {
            break;
        }
        v = next.into_iter().map(|x| x / norm).collect();
    }

    eigenvalue.abs()
}

/// Combine Kaiser, elbow and cumulative-variance estimates
fn estimate_cluster_count(eigenvalues: &[f64], explained: &[f64], pca: &PcaConfig) -> usize {
    if eigenvalues.is_empty() {
        return 1;
    }

    let kaiser = eigenvalues
        .iter()
        .filter(|&&ev| ev > pca.kaiser_threshold)
        .count();

    // The last component never extends the elbow
    let mut elbow = 1;
    for (i, &ratio) in explained.iter().enumerate().take(explained.len().saturating_sub(1)) {
        if ratio > pca.elbow_threshold {
            elbow = i + 1;
        } else {
            break;
        }
    }

    let mut cumulative = 0.0;
    let mut variance_count = 0;
    for (i, &ratio) in explained.iter().enumerate() {
        cumulative += ratio;
        variance_count = i + 1;
        if cumulative >= pca.cumulative_threshold {
            break;
        }
    }

    kaiser
        .max(elbow)
        .min(variance_count)
        .clamp(1, pca.max_clusters.max(1))
}

/// Human-readable advice for the estimated cluster count
pub fn recommendation(
    clusters: usize,
    method_count: usize,
    field_count: usize,
    explained: &[f64],
) -> String {
    if clusters <= 1 {
        return format!(
            "Analysis suggests a single cohesive responsibility. \
             The {} methods work together on {} fields in a unified way. \
             This is a good sign of high cohesion.",
            method_count, field_count
        );
    }

    let strength = match explained.first() {
        Some(&lead) if lead > 0.5 => "strong",
        Some(&lead) if lead < 0.3 => "weak",
        _ => "moderate",
    };

    let mut top: Vec<f64> = explained.iter().take(clusters).copied().collect();
    top.sort_by(|a, b| b.total_cmp(a));
    let variances = top
        .iter()
        .map(|v| format!("{:.1}%", v * 100.0))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Analysis detects {} distinct responsibility clusters (variance explained: {}). \
         The primary cluster shows {} separation. \
         Consider splitting this struct into {} smaller, focused structs, \
         each handling one specific responsibility. \
         Group methods and fields based on which cluster they belong to.",
        clusters, variances, strength, clusters
    )
}
