/// Rotating-frame markup
///
/// Every edge carries a band of five blocks (solid, faded, two blank, then a double
/// solid block) that slides along the edge as the rotation fraction grows. Each edge is
/// drawn twice, once from each end of the band, so the band wraps around the corner
/// without a visible reset.
use std::fmt::Write;

use crate::page::{FramePlacement, ImageElement};
use super::svg::{push_line, stroke_style, Rgb};

pub const DEFAULT_FRAME_LINE_WIDTH: f64 = 20.0;
pub const DEFAULT_FRAME_COLOR: Rgb = Rgb::new(179, 221, 202);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Horizontal { y: f64 },
    Vertical { x: f64 },
}

/// One stroke of a band, in coordinates along the edge
#[derive(Debug, Clone, Copy, PartialEq)]
struct BandSegment {
    from: f64,
    to: f64,
    faded: bool,
}

/// Segments of a band starting at `offset` from `min` (or from `max` when reversed),
/// clamped to the edge. Zero-length segments are dropped.
fn band_segments(min: f64, max: f64, offset: f64, reverse: bool) -> Vec<BandSegment> {
    let block = (max - min) / 5.0;
    let mut start = if reverse { max - offset } else { min + offset };
    let step = if reverse { -block } else { block };
    let clamp = |v: f64| v.min(max).max(min);

    let mut segments = Vec::with_capacity(3);
    let mut push = |from: f64, to: f64, faded: bool| {
        let (from, to) = (clamp(from), clamp(to));
        if from != to {
            segments.push(BandSegment { from, to, faded });
        }
    };

    push(start, start + step, false);
    start += step;
    push(start, start + step, true);
    start += 2.0 * step;
    push(start, start + 2.0 * step, false);

    segments
}

fn push_band(svg: &mut String, axis: Axis, min: f64, max: f64, offset: f64, line_width: f64, color: Rgb, reverse: bool) {
    let solid = stroke_style(&color.css(), line_width);
    let faded = stroke_style(&color.with_alpha(0.5), line_width);

    for segment in band_segments(min, max, offset, reverse) {
        let style = if segment.faded { &faded } else { &solid };
        match axis {
            Axis::Horizontal { y } => push_line(svg, style, segment.from, y, segment.to, y),
            Axis::Vertical { x } => push_line(svg, style, x, segment.from, x, segment.to),
        }
    }
}

pub fn draw_horz_line(svg: &mut String, min_x: f64, max_x: f64, offset_x: f64, y: f64, line_width: f64, color: Rgb, reverse: bool) {
    push_band(svg, Axis::Horizontal { y }, min_x, max_x, offset_x, line_width, color, reverse);
}

pub fn draw_vert_line(svg: &mut String, min_y: f64, max_y: f64, offset_y: f64, x: f64, line_width: f64, color: Rgb, reverse: bool) {
    push_band(svg, Axis::Vertical { x }, min_y, max_y, offset_y, line_width, color, reverse);
}

/// Frame lines without the enclosing `<svg>`. The bottom and left edges run reversed
/// so the band travels clockwise.
pub fn frame_inner_svg(left: f64, top: f64, right: f64, bottom: f64, line_width: f64, color: Rgb, fraction: f64) -> String {
    let width = right - left;
    let height = bottom - top;
    let ext = line_width / 2.0;
    let mut svg = String::new();

    // Top
    draw_horz_line(&mut svg, left - ext, right + ext, width * fraction, top, line_width, color, false);
    draw_horz_line(&mut svg, left - ext, right + ext, -width * (1.0 - fraction), top, line_width, color, false);

    // Bottom
    draw_horz_line(&mut svg, left - ext, right + ext, width * fraction, bottom, line_width, color, true);
    draw_horz_line(&mut svg, left - ext, right + ext, -width * (1.0 - fraction), bottom, line_width, color, true);

    // Right
    draw_vert_line(&mut svg, top - ext, bottom + ext, height * fraction, right, line_width, color, false);
    draw_vert_line(&mut svg, top - ext, bottom + ext, -height * (1.0 - fraction), right, line_width, color, false);

    // Left
    draw_vert_line(&mut svg, top - ext, bottom + ext, height * fraction, left, line_width, color, true);
    draw_vert_line(&mut svg, top - ext, bottom + ext, -height * (1.0 - fraction), left, line_width, color, true);

    svg
}

pub fn frame_svg(view_width: f64, view_height: f64, left: f64, top: f64, right: f64, bottom: f64,
                 line_width: f64, color: Rgb, fraction: f64) -> String {
    let mut svg = String::new();
    let _ = write!(svg, "<svg viewBox=\"0 0 {} {}\">", view_width, view_height);
    svg.push_str(&frame_inner_svg(left, top, right, bottom, line_width, color, fraction));
    svg.push_str("</svg>");
    svg
}

/// A frame filling its own overlay box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatingFrame {
    pub width: f64,
    pub height: f64,
    pub line_width: f64,
    pub color: Rgb,
}

impl RotatingFrame {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            line_width: DEFAULT_FRAME_LINE_WIDTH,
            color: DEFAULT_FRAME_COLOR,
        }
    }

    pub fn svg(&self, fraction: f64) -> String {
        frame_svg(self.width, self.height, 0.0, 0.0, self.width, self.height, self.line_width, self.color, fraction)
    }
}

/// Positions the overlay for a `[left, top, right, bottom]` box, anchored to the right
/// edge of the image and widened by the stroke.
pub fn place_rotating_frame(image: &ImageElement, bbox: [f64; 4], line_width: f64) -> FramePlacement {
    let [left, top, right, bottom] = bbox;
    FramePlacement {
        top,
        right: image.width - right - line_width,
        width: right - left,
        height: bottom - top,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_at_rest() {
        let segments = band_segments(0.0, 100.0, 0.0, false);
        assert_eq!(segments, vec![
            BandSegment { from: 0.0, to: 20.0, faded: false },
            BandSegment { from: 20.0, to: 40.0, faded: true },
            BandSegment { from: 60.0, to: 100.0, faded: false },
        ]);
    }

    #[test]
    fn test_band_is_clamped_to_edge() {
        // Halfway along only the first solid block and its faded tail fit
        let segments = band_segments(0.0, 100.0, 50.0, false);
        assert_eq!(segments, vec![
            BandSegment { from: 50.0, to: 70.0, faded: false },
            BandSegment { from: 70.0, to: 90.0, faded: true },
        ]);
    }

    #[test]
    fn test_trailing_draw_fills_the_wrap() {
        // The complementary draw starts before the edge and shows the band's tail
        let segments = band_segments(0.0, 100.0, -50.0, false);
        assert_eq!(segments, vec![BandSegment { from: 10.0, to: 50.0, faded: false }]);
    }

    #[test]
    fn test_reversed_band_runs_from_max() {
        let segments = band_segments(0.0, 100.0, 0.0, true);
        assert_eq!(segments[0], BandSegment { from: 100.0, to: 80.0, faded: false });
        assert_eq!(segments[1], BandSegment { from: 80.0, to: 60.0, faded: true });
        assert_eq!(segments[2], BandSegment { from: 40.0, to: 0.0, faded: false });
    }

    #[test]
    fn test_frame_markup() {
        let frame = RotatingFrame::new(200.0, 100.0);
        let svg = frame.svg(0.0);
        assert!(svg.starts_with("<svg viewBox=\"0 0 200 100\">"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("stroke:rgb(179, 221, 202);stroke-width:20"));
        assert!(svg.contains("stroke:rgba(179, 221, 202, 0.5);stroke-width:20"));
    }

    #[test]
    fn test_frame_changes_with_fraction() {
        let frame = RotatingFrame::new(200.0, 100.0);
        assert_ne!(frame.svg(0.0), frame.svg(0.25));
    }

    #[test]
    fn test_placement() {
        let image = ImageElement::new("img.png", 640.0, 480.0, 640.0, 480.0);
        let placement = place_rotating_frame(&image, [100.0, 50.0, 300.0, 250.0], DEFAULT_FRAME_LINE_WIDTH);
        assert_eq!(placement, FramePlacement { top: 50.0, right: 320.0, width: 200.0, height: 200.0 });
    }
}
