use dpdce_traits::BoxError;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

const SIZE: (u32, u32) = (640, 480);
const LINE_COLORS: [RGBColor; 3] = [BLUE, RED, GREEN];

/// Write a PNG with one polyline per entry of `lines` and markers at `points`.
pub(crate) fn draw(
    path: &Path,
    lines: &[Vec<(f32, f32)>],
    points: &[(f32, f32)],
) -> Result<(), BoxError> {
    let (xs, ys) = bounds(lines.iter().flatten().chain(points));
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(xs, ys)?;
    for (line, color) in lines.iter().zip(LINE_COLORS.iter().cycle()) {
        chart.draw_series(LineSeries::new(line.iter().copied(), color))?;
    }
    chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, BLACK.filled())))?;
    root.present()?;
    Ok(())
}

fn bounds<'a>(pts: impl Iterator<Item = &'a (f32, f32)>) -> (Range<f32>, Range<f32>) {
    let init = (f32::INFINITY, f32::NEG_INFINITY, f32::INFINITY, f32::NEG_INFINITY);
    let (x0, x1, y0, y1) = pts
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .fold(init, |(x0, x1, y0, y1), &(x, y)| {
            (x0.min(x), x1.max(x), y0.min(y), y1.max(y))
        });
    (padded(x0, x1), padded(y0, y1))
}

fn padded(lo: f32, hi: f32) -> Range<f32> {
    if lo > hi {
        return 0.0..1.0;
    }
    let pad = ((hi - lo) * 0.05).max(1e-3);
    (lo - pad)..(hi + pad)
}
