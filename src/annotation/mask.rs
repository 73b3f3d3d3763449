/// Static "mask" rendering of detection results
///
/// Darkens the whole result image except the detected boxes, then draws a partial
/// corner frame and a label per box. The raw image is hidden while the mask is shown.
use std::fmt::Write;
use log::debug;

use crate::coords::{BoxRect, CoordinateMapper};
use crate::page::{escape_html, ImageElement, MaskElement, Page};
use crate::prediction::{sort_by_confidence, Prediction};
use super::svg::{push_line, stroke_style, Rgb};

/// Box colours, assigned by render order
pub const PALETTE: [Rgb; 3] = [
    Rgb::new(179, 221, 202),
    Rgb::new(204, 223, 120),
    Rgb::new(164, 221, 239),
];

/// Above this many boxes corner frames are replaced by plain rectangles
pub const PLAIN_RECT_THRESHOLD: usize = 15;

const MASK_ID: &str = "mask";
const LABEL_FONT_SIZE_PX: u32 = 12;

/// Upper bound for the frame stroke, thinner as boxes get denser
pub fn max_line_width(box_count: usize) -> f64 {
    if box_count > 10 {
        5.0
    } else if box_count > 5 {
        8.0
    } else {
        15.0
    }
}

pub fn line_width_for(rect: &BoxRect, box_count: usize) -> f64 {
    max_line_width(box_count).min(rect.width / 10.0)
}

/// Builds the mask overlay for predictions already in render order.
///
/// Returns None when the image is not laid out or there is nothing to draw.
pub fn build_mask_svg(image: &ImageElement, predictions: &[Prediction]) -> Option<String> {
    let mapper = CoordinateMapper::for_image(image)?;
    if predictions.is_empty() {
        return None;
    }

    let rects: Vec<BoxRect> = predictions.iter().map(|p| mapper.map_prediction(p)).collect();
    let count = rects.len();

    let mut svg = String::new();
    let _ = write!(svg,
        "<svg viewBox=\"0 0 {w} {h}\"><defs><mask id=\"{MASK_ID}\"><rect fill=\"#999\" x=\"0\" y=\"0\" width=\"{w}\" height=\"{h}\"></rect>",
        w = image.width, h = image.height);

    for rect in &rects {
        let _ = write!(svg, "<rect fill=\"#ffffff\" x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\"></rect>",
            rect.left, rect.top, rect.width, rect.height);
    }

    let _ = write!(svg,
        "</mask></defs><image mask=\"url(#{MASK_ID})\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" xlink:href=\"{}\" width=\"{}\" height=\"{}\"></image>",
        escape_html(&image.src), image.width, image.height);

    for (index, (prediction, rect)) in predictions.iter().zip(&rects).enumerate() {
        let color = PALETTE[index % PALETTE.len()];
        let line_width = line_width_for(rect, count);

        let _ = write!(svg,
            "<text x=\"{}\" y=\"{}\" style=\"stroke: none; fill:{};font-size:{}px\">{}</text>",
            rect.left, rect.top - line_width, color.with_alpha(1.0), LABEL_FONT_SIZE_PX,
            escape_html(prediction.display_label()));

        if count > PLAIN_RECT_THRESHOLD {
            let _ = write!(svg,
                "<rect stroke=\"{}\" stroke-width=\"1px\" fill=\"transparent\" x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\"></rect>",
                color.css(), rect.left, rect.top, rect.width, rect.height);
            continue;
        }

        push_corner_frame(&mut svg, rect, line_width, color);
    }

    svg.push_str("</svg>");
    Some(svg)
}

/// Each edge is five blocks: solid, half-opacity and gaps, arranged so the
/// corners carry the solid strokes.
fn push_corner_frame(svg: &mut String, rect: &BoxRect, line_width: f64, color: Rgb) {
    let block_width = (rect.width - line_width) / 5.0;
    let block_height = (rect.height - line_width) / 5.0;
    let solid = stroke_style(&color.with_alpha(1.0), line_width);
    let faded = stroke_style(&color.with_alpha(0.5), line_width);

    let (left, top, right, bottom) = (rect.left, rect.top, rect.right(), rect.bottom());
    let ext = line_width / 2.0;

    // Top, left to right
    let mut x = left - ext;
    push_line(svg, &solid, x, top, x + block_width + line_width, top);
    x += block_width + line_width;
    push_line(svg, &faded, x, top, x + block_width, top);
    x += 2.0 * block_width;
    push_line(svg, &solid, x, top, x + 2.0 * block_width + line_width, top);

    // Right, top to bottom
    let mut y = top - ext;
    push_line(svg, &solid, right, y, right, y + block_height + line_width);
    y += block_height + line_width;
    push_line(svg, &faded, right, y, right, y + block_height);
    y += 2.0 * block_height;
    push_line(svg, &solid, right, y, right, y + 2.0 * block_height + line_width);

    // Bottom, left to right
    x = left - ext;
    push_line(svg, &solid, x, bottom, x + 2.0 * block_width + line_width, bottom);
    x += 3.0 * block_width + line_width;
    push_line(svg, &faded, x, bottom, x + block_width, bottom);
    x += block_width;
    push_line(svg, &solid, x, bottom, x + block_width + line_width, bottom);

    // Left, top to bottom
    y = top - ext;
    push_line(svg, &solid, left, y, left, y + 2.0 * block_height + line_width);
    y += 3.0 * block_height + line_width;
    push_line(svg, &faded, left, y, left, y + block_height);
    y += block_height;
    push_line(svg, &solid, left, y, left, y + block_height + line_width);
}

/// Draws predictions over the result image (or the preview image when there is no
/// result image), shows the mask and hides the raw image.
///
/// Returns false without touching the page when there is no laid out image or no
/// predictions.
pub fn show_results_bounding_boxes(page: &mut Page, predictions: &[Prediction], sort: bool) -> bool {
    let use_result = page.result_image.is_some();
    let image = if use_result { page.result_image.as_ref() } else { page.preview_image.as_ref() };

    let Some(image) = image else {
        debug!("No image element to draw bounding boxes on");
        return false;
    };
    if !image.is_laid_out() {
        debug!("Image not laid out yet, skipping bounding boxes");
        return false;
    }
    if predictions.is_empty() {
        return false;
    }

    let mut ordered = predictions.to_vec();
    if sort {
        sort_by_confidence(&mut ordered);
    }

    let Some(markup) = build_mask_svg(image, &ordered) else {
        return false;
    };
    let (width, height) = (image.width, image.height);

    page.mask = MaskElement { markup, width, height, visible: true };

    let target = if use_result { page.result_image.as_mut() } else { page.preview_image.as_mut() };
    if let Some(image) = target {
        image.visible = false;
    }

    debug!("Rendered {} bounding boxes", ordered.len());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImageElement {
        ImageElement::new("result.png", 1000.0, 1000.0, 1000.0, 1000.0)
    }

    fn wide_boxes(count: usize) -> Vec<Prediction> {
        (0..count)
            .map(|i| Prediction::new(&format!("obj{i}"), 0.5, 0.0, 0.0, 200.0, 200.0))
            .collect()
    }

    #[test]
    fn test_max_line_width_by_density() {
        assert_eq!(max_line_width(5), 15.0);
        assert_eq!(max_line_width(6), 8.0);
        assert_eq!(max_line_width(8), 8.0);
        assert_eq!(max_line_width(10), 8.0);
        assert_eq!(max_line_width(12), 5.0);
    }

    #[test]
    fn test_line_width_limited_by_box_width() {
        let narrow = BoxRect { left: 0.0, top: 0.0, width: 40.0, height: 40.0 };
        assert_eq!(line_width_for(&narrow, 1), 4.0);
    }

    #[test]
    fn test_density_policy_in_markup() {
        let svg = build_mask_svg(&image(), &wide_boxes(5)).unwrap();
        assert!(svg.contains("stroke-width:15\""));

        let svg = build_mask_svg(&image(), &wide_boxes(8)).unwrap();
        assert!(svg.contains("stroke-width:8\""));

        let svg = build_mask_svg(&image(), &wide_boxes(12)).unwrap();
        assert!(svg.contains("stroke-width:5\""));
        assert_eq!(svg.matches("<line ").count(), 12 * 12);
    }

    #[test]
    fn test_many_boxes_fall_back_to_plain_rectangles() {
        let svg = build_mask_svg(&image(), &wide_boxes(16)).unwrap();
        assert!(!svg.contains("<line "));
        assert_eq!(svg.matches("stroke-width=\"1px\"").count(), 16);
        // Labels keep their usual offset
        assert_eq!(svg.matches("<text x=\"0\" y=\"-5\"").count(), 16);
    }

    #[test]
    fn test_mask_has_one_cutout_per_box() {
        let svg = build_mask_svg(&image(), &wide_boxes(3)).unwrap();
        assert_eq!(svg.matches("fill=\"#ffffff\"").count(), 3);
        assert!(svg.contains("xlink:href=\"result.png\""));
    }

    #[test]
    fn test_colors_follow_render_order() {
        let predictions = vec![
            Prediction::new("low", 0.2, 0.0, 0.0, 100.0, 100.0),
            Prediction::new("high", 0.9, 0.0, 0.0, 100.0, 100.0),
        ];
        let mut page = Page::new();
        page.result_image = Some(image());
        assert!(show_results_bounding_boxes(&mut page, &predictions, true));

        let svg = &page.mask.markup;
        let high = svg.find(">high</text>").unwrap();
        let low = svg.find(">low</text>").unwrap();
        assert!(high < low);
        assert!(svg.contains("fill:rgba(179, 221, 202, 1);font-size:12px\">high"));
        assert!(svg.contains("fill:rgba(204, 223, 120, 1);font-size:12px\">low"));
    }

    #[test]
    fn test_mask_replaces_raw_image() {
        let mut page = Page::new();
        page.result_image = Some(image());
        assert!(show_results_bounding_boxes(&mut page, &wide_boxes(1), true));
        assert!(page.mask.visible);
        assert_eq!(page.mask.width, 1000.0);
        assert!(!page.result_image.as_ref().unwrap().visible);
    }

    #[test]
    fn test_falls_back_to_preview_image() {
        let mut page = Page::new();
        page.preview_image = Some(image());
        assert!(show_results_bounding_boxes(&mut page, &wide_boxes(1), false));
        assert!(!page.preview_image.as_ref().unwrap().visible);
    }

    #[test]
    fn test_unlaid_out_image_is_skipped() {
        let mut page = Page::new();
        page.result_image = Some(ImageElement::new("result.png", 0.0, 0.0, 640.0, 480.0));
        assert!(!show_results_bounding_boxes(&mut page, &wide_boxes(2), true));
        assert!(!page.mask.visible);
        assert!(page.result_image.as_ref().unwrap().visible);
    }

    #[test]
    fn test_missing_label_uses_fallback() {
        let prediction = Prediction { confidence: Some(0.7), x_max: 50.0, y_max: 50.0, ..Prediction::default() };
        let svg = build_mask_svg(&image(), &[prediction]).unwrap();
        assert!(svg.contains(">Face</text>"));
    }
}
