use anyhow::Result;
use plotters::prelude::*;
use std::path::Path;

/// Draws a bar chart of (position, count) pairs.
///
/// # Arguments
///
/// * `bars` - Position/value pairs; need not be sorted.
/// * `x_range` - Inclusive x window; bars outside it are dropped.
/// * `y_max` - Optional fixed y limit; defaults to 1.1 * max bar in window.
pub fn bar_chart(
    bars: &[(i64, f64)],
    title: &str,
    x_label: &str,
    y_label: &str,
    x_range: (i64, i64),
    y_max: Option<f64>,
    output_path: &Path,
) -> Result<()> {
    let in_window: Vec<(i64, f64)> = bars
        .iter()
        .copied()
        .filter(|(x, _)| *x >= x_range.0 && *x <= x_range.1)
        .collect();
    if in_window.is_empty() {
        return Err(anyhow::anyhow!("No data inside plotting window for {}", title));
    }

    let max_val = y_max.unwrap_or_else(|| {
        in_window
            .iter()
            .map(|(_, v)| *v)
            .fold(0.0_f64, f64::max)
            .max(1.0)
            * 1.1
    });

    let root = BitMapBackend::new(output_path, (1000, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range.0..x_range.1 + 1, 0.0..max_val)?;

    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .draw()?;

    chart.draw_series(in_window.iter().map(|(x, v)| {
        Rectangle::new([(*x, 0.0), (*x + 1, *v)], BLUE.filled())
    }))?;

    root.present()?;
    Ok(())
}

/// Draws one line per labelled series, markers at each point.
pub fn line_chart(
    series: &[(String, Vec<(f64, f64)>)],
    title: &str,
    x_label: &str,
    y_label: &str,
    output_path: &Path,
) -> Result<()> {
    let all_points: Vec<(f64, f64)> = series.iter().flat_map(|(_, pts)| pts.iter().copied()).collect();
    if all_points.is_empty() {
        return Err(anyhow::anyhow!("No data available for plotting"));
    }
    let x_min = all_points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let x_max = all_points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let y_min = all_points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let y_max = all_points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    let y_pad = ((y_max - y_min).abs() * 0.1).max(0.1);

    let root = BitMapBackend::new(output_path, (800, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(60)
        .margin(10)
        .build_cartesian_2d(x_min..x_max, (y_min - y_pad)..(y_max + y_pad))?;

    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .draw()?;

    for (idx, (label, points)) in series.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?
            .label(label.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], color.stroke_width(2)));
        chart.draw_series(points.iter().map(|p| Circle::new(*p, 3, color.filled())))?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Draws a row-major matrix as a heatmap, one filled rectangle per cell, with
/// a colour strip on the left mapping rows to their 1-based cluster labels.
pub fn heatmap(
    matrix: &[Vec<f64>],
    col_labels: &[String],
    row_clusters: &[usize],
    title: &str,
    output_path: &Path,
) -> Result<()> {
    if matrix.is_empty() || matrix[0].is_empty() {
        return Err(anyhow::anyhow!("Empty matrix for heatmap {}", title));
    }
    let n_rows = matrix.len();
    let n_cols = matrix[0].len();

    let v_min = matrix
        .iter()
        .flatten()
        .copied()
        .fold(f64::INFINITY, f64::min);
    let v_max = matrix
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let span = (v_max - v_min).max(1e-12);

    let height = (n_rows as u32 * 6).clamp(400, 2400);
    let root = BitMapBackend::new(output_path, (900, height + 80)).into_drawing_area();
    root.fill(&WHITE)?;

    // f64 axes: plotters' integer key-point search overflows (multiply with
    // overflow) regardless of width; the float path has no integer pow
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-1.0f64..n_cols as f64, 0.0f64..n_rows as f64)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n_cols)
        .x_label_formatter(&|x| {
            if *x >= 0.0 && (*x as usize) < col_labels.len() {
                col_labels[*x as usize].clone()
            } else {
                String::new()
            }
        })
        .y_labels(0)
        .x_desc("Timepoint")
        .y_desc("Genes (grouped by cluster)")
        .draw()?;

    chart.draw_series((0..n_rows).flat_map(|r| {
        let row = &matrix[r];
        (0..n_cols).map(move |c| {
            let t = ((row[c] - v_min) / span).clamp(0.0, 1.0);
            let color = viridis_like(t);
            Rectangle::new(
                [(c as f64, r as f64), (c as f64 + 1.0, r as f64 + 1.0)],
                color.filled(),
            )
        })
    }))?;

    // Cluster strip
    chart.draw_series((0..n_rows.min(row_clusters.len())).map(|r| {
        let color = Palette99::pick(row_clusters[r].saturating_sub(1)).to_rgba();
        Rectangle::new([(-1.0f64, r as f64), (0.0f64, r as f64 + 1.0)], color.filled())
    }))?;

    root.present()?;
    Ok(())
}

/// Dark-blue to yellow ramp approximating the usual expression colormap.
fn viridis_like(t: f64) -> RGBColor {
    let r = (255.0 * t.powf(1.5)) as u8;
    let g = (255.0 * t) as u8;
    let b = (180.0 * (1.0 - t) + 40.0) as u8;
    RGBColor(r, g, b)
}
