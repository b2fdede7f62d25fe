use chrono::{Duration, NaiveDate};
use market_core::DashboardError;
use plotters::prelude::*;

use crate::{Figure, TraceKind};

fn render_err<E: std::fmt::Display>(e: E) -> DashboardError {
    DashboardError::Render(e.to_string())
}

/// Draw `figure` as an SVG document of `size` pixels.
pub fn render_svg(figure: &Figure, size: (u32, u32)) -> Result<String, DashboardError> {
    let (first, last, y_min, y_max) = figure
        .bounds()
        .ok_or_else(|| DashboardError::Render(format!("'{}' has no data", figure.title)))?;

    let origin = first;
    let x_of = move |d: NaiveDate| (d - origin).num_days() as f64;
    let x_max = x_of(last).max(1.0);
    let pad = ((y_max - y_min).abs() * 0.05).max(1e-6);

    let mut buf = String::new();
    {
        let root = SVGBackend::with_string(&mut buf, size).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&figure.title, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..x_max, (y_min - pad)..(y_max + pad))
            .map_err(render_err)?;

        let date_label = move |x: &f64| {
            (origin + Duration::days(x.round() as i64))
                .format("%Y-%m-%d")
                .to_string()
        };
        chart
            .configure_mesh()
            .x_desc(figure.x_title.as_str())
            .y_desc(figure.y_title.as_str())
            .x_labels(6)
            .x_label_formatter(&date_label)
            .draw()
            .map_err(render_err)?;

        for (i, trace) in figure.traces.iter().enumerate() {
            let color = Palette99::pick(i).to_rgba();
            let points: Vec<(f64, f64)> = trace
                .points
                .iter()
                .filter(|(_, y)| y.is_finite())
                .map(|(d, y)| (x_of(*d), *y))
                .collect();

            let anno = match trace.kind {
                TraceKind::Line => chart
                    .draw_series(LineSeries::new(points, color.stroke_width(2)))
                    .map_err(render_err)?,
                TraceKind::Markers => chart
                    .draw_series(points.into_iter().map(|p| Circle::new(p, 2, color.filled())))
                    .map_err(render_err)?,
                TraceKind::Band => {
                    let mut outline = points;
                    outline.extend(
                        trace
                            .upper
                            .iter()
                            .rev()
                            .filter(|(_, y)| y.is_finite())
                            .map(|(d, y)| (x_of(*d), *y)),
                    );
                    chart
                        .draw_series(std::iter::once(Polygon::new(outline, color.mix(0.2).filled())))
                        .map_err(render_err)?
                }
            };
            anno.label(trace.name.clone()).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
        }

        chart
            .configure_series_labels()
            .border_style(&BLACK)
            .background_style(&WHITE.mix(0.8))
            .draw()
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
    }

    tracing::debug!("Rendered '{}' ({} bytes of SVG)", figure.title, buf.len());
    Ok(buf)
}
