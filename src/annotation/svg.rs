/// Small SVG building helpers shared by the mask and frame renderers
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `rgb(r, g, b)`
    pub fn css(&self) -> String {
        format!("rgb({}, {}, {})", self.r, self.g, self.b)
    }

    /// `rgba(r, g, b, alpha)`
    pub fn with_alpha(&self, alpha: f64) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, alpha)
    }
}

/// Stroke style attribute for a line segment
pub fn stroke_style(color: &str, line_width: f64) -> String {
    format!("style=\"stroke:{};stroke-width:{}\"", color, line_width)
}

pub fn push_line(svg: &mut String, style: &str, x1: f64, y1: f64, x2: f64, y2: f64) {
    // Writing into a String cannot fail
    let _ = write!(svg, "<line {} x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\"/>", style, x1, y1, x2, y2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_formats() {
        let color = Rgb::new(179, 221, 202);
        assert_eq!(color.css(), "rgb(179, 221, 202)");
        assert_eq!(color.with_alpha(0.5), "rgba(179, 221, 202, 0.5)");
    }

    #[test]
    fn test_line_markup() {
        let mut svg = String::new();
        push_line(&mut svg, &stroke_style("red", 2.5), 0.0, 1.0, 10.0, 1.0);
        assert_eq!(svg, "<line style=\"stroke:red;stroke-width:2.5\" x1=\"0\" y1=\"1\" x2=\"10\" y2=\"1\"/>");
    }
}
