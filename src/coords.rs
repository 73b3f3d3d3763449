/// Mapping from natural image pixels to displayed pixels
use crate::page::ImageElement;
use crate::prediction::Prediction;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    pub x_ratio: f64,
    pub y_ratio: f64,
}

impl CoordinateMapper {
    /// Returns None while the element has no layout (zero displayed size) or no source size,
    /// callers skip rendering in that case.
    pub fn new(displayed_width: f64, displayed_height: f64, natural_width: f64, natural_height: f64) -> Option<Self> {
        let sizes = [displayed_width, displayed_height, natural_width, natural_height];
        if sizes.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return None;
        }

        Some(Self {
            x_ratio: displayed_width / natural_width,
            y_ratio: displayed_height / natural_height,
        })
    }

    pub fn for_image(image: &ImageElement) -> Option<Self> {
        Self::new(image.width, image.height, image.natural_width, image.natural_height)
    }

    /// Normalizes unordered corners and scales them into displayed space
    pub fn map_corners(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> BoxRect {
        BoxRect {
            left: x1.min(x2) * self.x_ratio,
            top: y1.min(y2) * self.y_ratio,
            width: (x1 - x2).abs() * self.x_ratio,
            height: (y1 - y2).abs() * self.y_ratio,
        }
    }

    pub fn map_prediction(&self, prediction: &Prediction) -> BoxRect {
        self.map_corners(prediction.x_min, prediction.y_min, prediction.x_max, prediction.y_max)
    }
}

/// Axis-aligned box in displayed pixels, width and height never negative
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoxRect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios() {
        let mapper = CoordinateMapper::new(320.0, 240.0, 640.0, 480.0).unwrap();
        assert_eq!(mapper.x_ratio, 0.5);
        assert_eq!(mapper.y_ratio, 0.5);
    }

    #[test]
    fn test_unlaid_out_element_is_unmappable() {
        assert!(CoordinateMapper::new(0.0, 240.0, 640.0, 480.0).is_none());
        assert!(CoordinateMapper::new(320.0, 0.0, 640.0, 480.0).is_none());
        assert!(CoordinateMapper::new(320.0, 240.0, 0.0, 480.0).is_none());
    }

    #[test]
    fn test_corner_order_does_not_matter() {
        let mapper = CoordinateMapper::new(200.0, 100.0, 400.0, 400.0).unwrap();
        let ordered = mapper.map_corners(10.0, 20.0, 110.0, 220.0);
        let swapped_x = mapper.map_corners(110.0, 20.0, 10.0, 220.0);
        let swapped_both = mapper.map_corners(110.0, 220.0, 10.0, 20.0);

        assert_eq!(ordered, swapped_x);
        assert_eq!(ordered, swapped_both);
        assert_eq!(ordered, BoxRect { left: 5.0, top: 5.0, width: 50.0, height: 50.0 });
    }

    #[test]
    fn test_extents_never_negative() {
        let mapper = CoordinateMapper::new(100.0, 100.0, 100.0, 100.0).unwrap();
        for &(x1, y1, x2, y2) in &[(5.0, 5.0, 1.0, 1.0), (-3.0, 7.0, -9.0, 2.0), (4.0, 4.0, 4.0, 4.0)] {
            let rect = mapper.map_corners(x1, y1, x2, y2);
            assert!(rect.width >= 0.0 && rect.height >= 0.0);
        }
    }
}
