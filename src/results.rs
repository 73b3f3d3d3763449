/// Results panel and result image handling
use std::fmt::Write;
use log::debug;

use crate::annotation::show_results_bounding_boxes;
use crate::page::{escape_html, ImageElement, Page};
use crate::prediction::{confidence, sort_by_confidence, ModuleResponse};

/// Timing table for the metadata the server attaches to every response.
/// Absent or zero values get no row.
pub fn processing_metadata_html(data: &ModuleResponse) -> String {
    let mut html = String::from("<table class='timing-table'>");

    let text_rows = [
        ("Processed by", data.module_id.as_deref()),
        ("Processed on", data.processed_by.as_deref()),
    ];
    for (caption, value) in text_rows {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            let _ = write!(html, "<tr><td>{}</td><td>{}</td></tr>", caption, escape_html(value));
        }
    }

    let timing_rows = [
        ("Analysis round trip", data.analysis_round_trip_ms),
        ("Processing", data.process_ms),
        ("Inference", data.inference_ms),
    ];
    for (caption, value) in timing_rows {
        if let Some(ms) = value.filter(|v| *v != 0.0) {
            let _ = write!(html, "<tr><td>{}</td><td>{} ms</td></tr>", caption, ms);
        }
    }

    html.push_str("</table>");
    html
}

/// Baseline display of a response: outcome, error or message, then metadata.
/// Default failure handler of the transport client.
pub fn display_base_results(page: &mut Page, data: Option<&ModuleResponse>) {
    let Some(data) = data else {
        page.set_results_html("No results returned".to_string());
        return;
    };

    let mut html = String::from(if data.success { "Operation successful" } else { "Operation failed" });

    if let Some(error) = &data.error {
        let _ = write!(html, "<div font=red>{}</div>", escape_html(error));
    } else if let Some(message) = &data.message {
        let _ = write!(html, "<div>{}</div>", escape_html(message));
    }

    html.push_str(&processing_metadata_html(data));
    page.set_results_html(html);
}

pub fn show_prediction_summary(page: &mut Page, data: Option<&ModuleResponse>, sort: bool) {
    let Some(data) = data.filter(|d| !d.predictions().is_empty()) else {
        page.set_results_html("No predictions returned".to_string());
        return;
    };

    let mut predictions = data.predictions().to_vec();
    if sort {
        sort_by_confidence(&mut predictions);
    }

    let mut html = String::from("<table style='width:100%'><tr><th>#</th><th>Label</th><th>Confidence</th></tr>");
    for (i, prediction) in predictions.iter().enumerate() {
        let _ = write!(html, "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            i, escape_html(prediction.display_label()), confidence(prediction.confidence));
    }
    html.push_str("</table>");
    html.push_str(&processing_metadata_html(data));

    page.set_results_html(html);
}

fn result_target(page: &mut Page) -> Option<&mut ImageElement> {
    if page.result_image.is_some() {
        page.result_image.as_mut()
    } else {
        page.preview_image.as_mut()
    }
}

pub fn show_preview_image(page: &mut Page, image: ImageElement) {
    clear_image_preview(page);
    page.preview_image = Some(ImageElement { visible: true, ..image });
}

/// Hides the preview. Without a result image the preview doubles as the result, so
/// the mask goes too.
pub fn clear_image_preview(page: &mut Page) {
    if let Some(preview) = page.preview_image.as_mut() {
        preview.visible = false;
    }
    if page.result_image.is_none() {
        page.mask.markup.clear();
        page.mask.visible = false;
    }
}

pub fn clear_image_result(page: &mut Page) {
    page.mask.markup.clear();
    page.mask.visible = false;

    if let Some(image) = result_target(page) {
        image.visible = false;
        image.src.clear();
    }
}

/// Sizes the mask element to the displayed result image
pub fn adjust_overlay_to_fit_result_image(page: &mut Page) {
    let size = result_target(page).map(|image| (image.width, image.height));
    if let Some((width, height)) = size {
        page.mask.width = width;
        page.mask.height = height;
    }
}

/// Shows the image a module returned (base64 PNG) and draws its predictions over it.
/// Returns true when bounding boxes were drawn.
pub fn show_results_image_data(page: &mut Page, data: &ModuleResponse, sort: bool) -> bool {
    clear_image_result(page);

    let Some(image) = result_target(page) else {
        debug!("No image element for result image data");
        return false;
    };

    if let Some(encoded) = &data.image_base64 {
        image.src = format!("data:image/png;base64,{}", encoded);
    }
    image.visible = true;

    adjust_overlay_to_fit_result_image(page);

    match &data.predictions {
        Some(predictions) => show_results_bounding_boxes(page, predictions, sort),
        None => false,
    }
}
