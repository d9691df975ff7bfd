use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;

use crate::config::defs::{tp_columns, PipelineError, RunConfig};
use crate::utils::plotting::{heatmap, line_chart};
use crate::utils::stats::{dtw_distance, mean, zscore_row};
use crate::utils::table::{fmt_f64, parse_f64, Table};

pub const AVG_MATRIX_FILE: &str = "all_genes_avg_matrix.tsv";
pub const ZSCORE_MATRIX_FILE: &str = "all_genes_avg_matrix_zscore.tsv";
pub const CLUSTERS_FILE: &str = "all_genes_clusters.csv";
pub const CLUSTER_AVERAGES_FILE: &str = "cluster_average_zscores.tsv";
pub const TRAJECTORY_PLOT: &str = "cluster_trajectories.png";
pub const HEATMAP_PLOT: &str = "all_genes_zscore_heatmap.png";

const MAX_ITERS: usize = 50;
/// Sampling interval between consecutive timepoints, in minutes.
const MINUTES_PER_TP: f64 = 30.0;

/// Parses a bracketed TimePoints cell back into per-timepoint averages.
/// `['tp1, 54455.75, 12651.32', 'tp2, NA, NA']` yields `[("tp1", Some(54455.75)), ("tp2", None)]`.
pub fn parse_timepoints_cell(cell: &str) -> Vec<(String, Option<f64>)> {
    cell.split('\'')
        .skip(1)
        .step_by(2)
        .filter_map(|entry| {
            let mut parts = entry.split(", ");
            let tp = parts.next()?.trim().to_string();
            let avg = parts.next().map(str::trim).and_then(parse_f64);
            Some((tp, avg))
        })
        .collect()
}

/// Gene x timepoint averages from the stats-attached gene table. Missing
/// timepoints come back as NaN.
pub fn build_avg_matrix(
    table: &Table,
    tp_names: &[String],
    file: &std::path::Path,
) -> Result<(Vec<String>, Vec<Vec<f64>>), PipelineError> {
    let gene_col = table.require_column("Geneid", file)?;
    let tp_col = table.require_column("TimePoints", file)?;

    let mut genes = Vec::with_capacity(table.rows.len());
    let mut matrix = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        // Ragged rows are skipped, not errors
        let (Some(gene), Some(cell)) = (row.get(gene_col), row.get(tp_col)) else {
            continue;
        };
        let entries = parse_timepoints_cell(cell);
        let values: Vec<f64> = tp_names
            .iter()
            .map(|tp| {
                entries
                    .iter()
                    .find(|(name, _)| name == tp)
                    .and_then(|(_, avg)| *avg)
                    .unwrap_or(f64::NAN)
            })
            .collect();
        genes.push(gene.clone());
        matrix.push(values);
    }
    if matrix.is_empty() {
        return Err(PipelineError::EmptyTable(format!("{:?} has no gene rows", file)));
    }
    Ok((genes, matrix))
}

/// log10(x + 1) with missing values treated as zero counts, then a per-gene
/// z-score so clustering compares trajectory shapes, not expression levels.
pub fn zscore_matrix(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    matrix
        .iter()
        .map(|row| {
            let logged: Vec<f64> = row
                .iter()
                .map(|v| {
                    let x = if v.is_nan() { 0.0 } else { *v };
                    (x + 1.0).log10()
                })
                .collect();
            zscore_row(&logged)
        })
        .collect()
}

/// K-means over DTW distance: centroids are element-wise means, assignment is
/// nearest centroid under DTW. Returns 0-based labels.
pub fn dtw_kmeans(rows: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<usize> {
    if rows.is_empty() || k == 0 {
        return vec![0; rows.len()];
    }
    let k = k.min(rows.len());

    let mut centroids: Vec<Vec<f64>> = sample(rng, rows.len(), k)
        .into_iter()
        .map(|i| rows[i].clone())
        .collect();
    let mut labels = vec![0usize; rows.len()];

    for _ in 0..MAX_ITERS {
        let mut changed = false;
        for (i, row) in rows.iter().enumerate() {
            let mut best = 0usize;
            let mut best_dist = f64::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let dist = dtw_distance(row, centroid);
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            if labels[i] != best {
                labels[i] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let width = rows[0].len();
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = rows
                .iter()
                .zip(&labels)
                .filter(|(_, l)| **l == c)
                .map(|(r, _)| r)
                .collect();
            if members.is_empty() {
                continue;
            }
            *centroid = (0..width)
                .map(|j| mean(&members.iter().map(|r| r[j]).collect::<Vec<f64>>()))
                .collect();
        }
    }
    labels
}

fn matrix_table(genes: &[String], matrix: &[Vec<f64>], tp_names: &[String]) -> Table {
    let mut table = Table::new(
        std::iter::once("Geneid".to_string())
            .chain(tp_names.iter().cloned())
            .collect(),
    );
    for (gene, row) in genes.iter().zip(matrix) {
        let mut cells = vec![gene.clone()];
        cells.extend(row.iter().map(|v| {
            if v.is_nan() { "NA".to_string() } else { fmt_f64(*v) }
        }));
        table.rows.push(cells);
    }
    table
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let input = config
        .args
        .counts
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("cluster requires --counts".to_string()))?;

    let table = Table::read(&input, b',')?;
    let tp_names = tp_columns(config.args.timepoints);
    let (genes, avg_matrix) = build_avg_matrix(&table, &tp_names, &input)?;
    info!("Built {}x{} average matrix", genes.len(), tp_names.len());

    matrix_table(&genes, &avg_matrix, &tp_names)
        .write(&config.out_dir.join(AVG_MATRIX_FILE), b'\t')?;

    let zscores = zscore_matrix(&avg_matrix);
    matrix_table(&genes, &zscores, &tp_names)
        .write(&config.out_dir.join(ZSCORE_MATRIX_FILE), b'\t')?;

    let k = config.args.n_clusters;
    let mut rng = match config.args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let labels = dtw_kmeans(&zscores, k, &mut rng);

    let mut clusters = Table::new(vec!["Geneid".to_string(), "Cluster".to_string()]);
    for (gene, label) in genes.iter().zip(&labels) {
        clusters.rows.push(vec![gene.clone(), (label + 1).to_string()]);
    }
    clusters.write(&config.out_dir.join(CLUSTERS_FILE), b',')?;

    // Per-cluster mean trajectory
    let mut averages = Table::new(
        std::iter::once("Cluster".to_string())
            .chain(tp_names.iter().cloned())
            .collect(),
    );
    let mut series: Vec<(String, Vec<(f64, f64)>)> = Vec::with_capacity(k);
    for c in 0..k {
        let members: Vec<&Vec<f64>> = zscores
            .iter()
            .zip(&labels)
            .filter(|(_, l)| **l == c)
            .map(|(r, _)| r)
            .collect();
        if members.is_empty() {
            warn!("Cluster {} is empty", c + 1);
            continue;
        }
        let centroid: Vec<f64> = (0..tp_names.len())
            .map(|j| mean(&members.iter().map(|r| r[j]).collect::<Vec<f64>>()))
            .collect();

        let mut row = vec![(c + 1).to_string()];
        row.extend(centroid.iter().map(|v| fmt_f64(*v)));
        averages.rows.push(row);

        let points: Vec<(f64, f64)> = centroid
            .iter()
            .enumerate()
            .map(|(j, v)| ((j as f64 + 1.0) * MINUTES_PER_TP, *v))
            .collect();
        series.push((format!("Cluster {} (n={})", c + 1, members.len()), points));
    }
    averages.write(&config.out_dir.join(CLUSTER_AVERAGES_FILE), b'\t')?;

    line_chart(
        &series,
        "Cluster average trajectories",
        "Time (min)",
        "Z-score of log10(count + 1)",
        &config.out_dir.join(TRAJECTORY_PLOT),
    )
    .map_err(|e| PipelineError::Other(anyhow!(e)))?;

    // Heatmap rows grouped by cluster, brightest genes first within each
    let mut order: Vec<usize> = (0..genes.len()).collect();
    order.sort_by(|&a, &b| {
        labels[a]
            .cmp(&labels[b])
            .then_with(|| mean(&zscores[b]).total_cmp(&mean(&zscores[a])))
    });
    let sorted_matrix: Vec<Vec<f64>> = order.iter().map(|&i| zscores[i].clone()).collect();
    let sorted_labels: Vec<usize> = order.iter().map(|&i| labels[i] + 1).collect();
    heatmap(
        &sorted_matrix,
        &tp_names,
        &sorted_labels,
        "Gene expression z-scores by cluster",
        &config.out_dir.join(HEATMAP_PLOT),
    )
    .map_err(|e| PipelineError::Other(anyhow!(e)))?;

    info!(
        "Clustered {} genes into {} clusters; outputs in {:?}",
        genes.len(),
        k,
        config.out_dir
    );
    Ok(())
}
