use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::debug;

use crate::config::ChartStyle;
use crate::models::{ChartArtifact, SummaryTable, MISSING_LABEL};

const CHART_SIZE: (u32, u32) = (800, 500);

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("unable to draw chart {}: {message}", path.display())]
    Draw { path: PathBuf, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A summary table reshaped for plotting: one category per x position and
/// one series per value of the second key. Keys stay `None` when the answer
/// was missing so they never merge with a literal answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    pub categories: Vec<Option<String>>,
    pub series: Vec<Option<String>>,
    pub values: Vec<Vec<u64>>,
}

impl Pivot {
    fn stacked_max(&self) -> u64 {
        self.values
            .iter()
            .map(|row| row.iter().sum::<u64>())
            .max()
            .unwrap_or(0)
    }

    fn cell_max(&self) -> u64 {
        self.values.iter().flatten().copied().max().unwrap_or(0)
    }

    fn category_label(&self, index: usize) -> String {
        self.categories
            .get(index)
            .map(|key| key_label(key).to_string())
            .unwrap_or_default()
    }
}

fn key_label(key: &Option<String>) -> &str {
    key.as_deref().unwrap_or(MISSING_LABEL)
}

/// Pivots a two-key summary, keeping the order in which keys first appear.
/// Missing cells become zero.
pub fn pivot(summary: &SummaryTable) -> Pivot {
    let mut categories: Vec<Option<String>> = Vec::new();
    let mut series: Vec<Option<String>> = Vec::new();

    for row in &summary.rows {
        let category = row.keys.first().cloned().flatten();
        if !categories.contains(&category) {
            categories.push(category);
        }
        let name = row.keys.get(1).cloned().flatten();
        if !series.contains(&name) {
            series.push(name);
        }
    }

    let mut values = vec![vec![0u64; series.len()]; categories.len()];
    for row in &summary.rows {
        let category = row.keys.first().cloned().flatten();
        let name = row.keys.get(1).cloned().flatten();
        let (Some(c), Some(s)) = (
            categories.iter().position(|key| *key == category),
            series.iter().position(|key| *key == name),
        ) else {
            continue;
        };
        values[c][s] += row.count.max(0) as u64;
    }

    Pivot {
        categories,
        series,
        values,
    }
}

/// One bar per summary row, labelled by all of its keys.
fn flatten(summary: &SummaryTable) -> (Vec<String>, Vec<u64>) {
    summary
        .rows
        .iter()
        .map(|row| {
            let label = (0..summary.keys.len())
                .map(|index| row.label(index))
                .collect::<Vec<_>>()
                .join(" / ");
            (label, row.count.max(0) as u64)
        })
        .unzip()
}

/// Renders `summary` as an SVG bar chart at `path`, replacing any existing file.
pub fn render_chart(
    summary: &SummaryTable,
    title: &str,
    path: &Path,
    style: ChartStyle,
) -> Result<PathBuf, ChartError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let draw_error = |message: String| ChartError::Draw {
        path: path.to_path_buf(),
        message,
    };

    let result = if summary.keys.len() < 2 || style == ChartStyle::Simple {
        let (labels, counts) = flatten(summary);
        draw_simple(path, title, &labels, &counts)
    } else {
        let pivot = pivot(summary);
        match style {
            ChartStyle::Grouped => draw_grouped(path, title, &summary.keys[1], &pivot),
            _ => draw_stacked(path, title, &summary.keys[1], &pivot),
        }
    };
    result.map_err(draw_error)?;

    debug!(chart = %path.display(), rows = summary.rows.len(), "rendered chart");
    Ok(path.to_path_buf())
}

pub fn render_all(
    summaries: &[SummaryTable],
    chart_dir: &Path,
    style: ChartStyle,
) -> Result<Vec<ChartArtifact>, ChartError> {
    summaries
        .iter()
        .map(|summary| {
            let path = chart_dir.join(format!("{}.svg", summary.name));
            render_chart(summary, &summary.title, &path, style).map(|path| ChartArtifact {
                name: summary.name.clone(),
                path,
            })
        })
        .collect()
}

fn axis_top(max: u64) -> u64 {
    max + max / 10 + 1
}

fn draw_simple(path: &Path, title: &str, labels: &[String], counts: &[u64]) -> Result<(), String> {
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|err| err.to_string())?;

    let slots = labels.len().max(1);
    let top = axis_top(counts.iter().copied().max().unwrap_or(0));

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d((0..slots).into_segmented(), 0u64..top)
        .map_err(|err| err.to_string())?;

    let formatter = |value: &SegmentValue<usize>| match value {
        SegmentValue::CenterOf(index) => labels.get(*index).cloned().unwrap_or_default(),
        _ => String::new(),
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(slots)
        .x_label_formatter(&formatter)
        .y_desc("Number of Respondents")
        .draw()
        .map_err(|err| err.to_string())?;

    chart
        .draw_series(counts.iter().enumerate().map(|(index, &count)| {
            let color = Palette99::pick(index).mix(0.8);
            let mut bar = Rectangle::new(
                [
                    (SegmentValue::Exact(index), 0),
                    (SegmentValue::Exact(index + 1), count),
                ],
                color.filled(),
            );
            bar.set_margin(0, 0, 15, 15);
            bar
        }))
        .map_err(|err| err.to_string())?;

    root.present().map_err(|err| err.to_string())
}

fn draw_stacked(path: &Path, title: &str, legend_title: &str, pivot: &Pivot) -> Result<(), String> {
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|err| err.to_string())?;

    let slots = pivot.categories.len().max(1);
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d((0..slots).into_segmented(), 0u64..axis_top(pivot.stacked_max()))
        .map_err(|err| err.to_string())?;

    let formatter = |value: &SegmentValue<usize>| match value {
        SegmentValue::CenterOf(index) => pivot.category_label(*index),
        _ => String::new(),
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(slots)
        .x_label_formatter(&formatter)
        .y_desc("Number of Respondents")
        .draw()
        .map_err(|err| err.to_string())?;

    let mut base = vec![0u64; pivot.categories.len()];
    for (series_index, name) in pivot.series.iter().enumerate() {
        let color = Palette99::pick(series_index).mix(0.8);
        let bars: Vec<Rectangle<(SegmentValue<usize>, u64)>> = pivot
            .values
            .iter()
            .enumerate()
            .map(|(category, row)| {
                let bottom = base[category];
                let top = bottom + row[series_index];
                base[category] = top;
                let mut bar = Rectangle::new(
                    [
                        (SegmentValue::Exact(category), bottom),
                        (SegmentValue::Exact(category + 1), top),
                    ],
                    color.filled(),
                );
                bar.set_margin(0, 0, 15, 15);
                bar
            })
            .collect();

        chart
            .draw_series(bars)
            .map_err(|err| err.to_string())?
            .label(format!("{legend_title}: {}", key_label(name)))
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|err| err.to_string())?;
    root.present().map_err(|err| err.to_string())
}

fn draw_grouped(path: &Path, title: &str, legend_title: &str, pivot: &Pivot) -> Result<(), String> {
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|err| err.to_string())?;

    // Each category gets one slot per series plus a spacer slot.
    let width = pivot.series.len().max(1) + 1;
    let slots = (pivot.categories.len() * width).max(1);
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d((0..slots).into_segmented(), 0u64..axis_top(pivot.cell_max()))
        .map_err(|err| err.to_string())?;

    let label_slot = (width - 1) / 2;
    let formatter = |value: &SegmentValue<usize>| match value {
        SegmentValue::CenterOf(index) if index % width == label_slot => {
            pivot.category_label(index / width)
        }
        _ => String::new(),
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(slots)
        .x_label_formatter(&formatter)
        .y_desc("Number of Respondents")
        .draw()
        .map_err(|err| err.to_string())?;

    for (series_index, name) in pivot.series.iter().enumerate() {
        let color = Palette99::pick(series_index).mix(0.8);
        let bars = pivot.values.iter().enumerate().map(|(category, row)| {
            let slot = category * width + series_index;
            let mut bar = Rectangle::new(
                [
                    (SegmentValue::Exact(slot), 0),
                    (SegmentValue::Exact(slot + 1), row[series_index]),
                ],
                color.filled(),
            );
            bar.set_margin(0, 0, 2, 2);
            bar
        });

        chart
            .draw_series(bars)
            .map_err(|err| err.to_string())?
            .label(format!("{legend_title}: {}", key_label(name)))
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|err| err.to_string())?;
    root.present().map_err(|err| err.to_string())
}
