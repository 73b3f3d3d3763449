/// Module processing responses and the detections they carry
///
/// Field names follow the server's JSON (camelCase envelope, snake_case box corners).
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Label drawn when a prediction has neither a label nor a user id
pub const FALLBACK_LABEL: &str = "Face";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Prediction {
    #[serde(default)]
    pub label: Option<String>,
    /// Identity of a recognised face, used when `label` is absent
    #[serde(default)]
    pub userid: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    // Corners are not ordered: x_min may be greater than x_max
    #[serde(default)]
    pub x_min: f64,
    #[serde(default)]
    pub y_min: f64,
    #[serde(default)]
    pub x_max: f64,
    #[serde(default)]
    pub y_max: f64,
}

impl Prediction {
    pub fn new(label: &str, confidence: f64, x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            label: Some(label.to_string()),
            userid: None,
            confidence: Some(confidence),
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Label, then user id, then "Face"
    pub fn display_label(&self) -> &str {
        self.label.as_deref()
            .filter(|l| !l.is_empty())
            .or_else(|| self.userid.as_deref().filter(|u| !u.is_empty()))
            .unwrap_or(FALLBACK_LABEL)
    }
}

/// Formats a confidence in [0, 1] as a whole percentage. Absent values render empty.
pub fn confidence(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{}%", (v * 100.0).round() as i64),
        _ => String::new(),
    }
}

/// Stable sort, highest confidence first. Missing confidences go last.
pub fn sort_by_confidence(predictions: &mut [Prediction]) {
    predictions.sort_by(|a, b| {
        let a = a.confidence.unwrap_or(f64::NEG_INFINITY);
        let b = b.confidence.unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });
}

/// Response of `POST v1/{route}/{operation}`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleResponse {
    #[serde(default)]
    pub success: bool,
    pub error: Option<String>,
    pub message: Option<String>,
    pub module_id: Option<String>,
    pub module_name: Option<String>,
    pub processed_by: Option<String>,
    pub analysis_round_trip_ms: Option<f64>,
    pub process_ms: Option<f64>,
    pub inference_ms: Option<f64>,
    pub predictions: Option<Vec<Prediction>>,
    pub image_base64: Option<String>,
    /// Module-specific fields this client does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModuleResponse {
    pub fn predictions(&self) -> &[Prediction] {
        self.predictions.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_formatting() {
        assert_eq!(confidence(Some(0.8734)), "87%");
        assert_eq!(confidence(Some(1.0)), "100%");
        assert_eq!(confidence(Some(0.0)), "0%");
        assert_eq!(confidence(None), "");
        assert_eq!(confidence(Some(f64::NAN)), "");
    }

    #[test]
    fn test_display_label_fallbacks() {
        let mut p = Prediction::new("dog", 0.5, 0.0, 0.0, 1.0, 1.0);
        assert_eq!(p.display_label(), "dog");

        p.label = None;
        p.userid = Some("alice".to_string());
        assert_eq!(p.display_label(), "alice");

        p.userid = None;
        assert_eq!(p.display_label(), "Face");
    }

    #[test]
    fn test_sort_is_descending_and_stable() {
        let mut predictions = vec![
            Prediction::new("a", 0.5, 0.0, 0.0, 1.0, 1.0),
            Prediction::new("b", 0.9, 0.0, 0.0, 1.0, 1.0),
            Prediction::new("c", 0.5, 0.0, 0.0, 1.0, 1.0),
            Prediction { label: Some("d".to_string()), ..Prediction::default() },
        ];
        sort_by_confidence(&mut predictions);
        let order: Vec<_> = predictions.iter().map(|p| p.display_label()).collect();
        assert_eq!(order, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "success": true,
            "moduleId": "ObjectDetectionYOLOv8",
            "processedBy": "localhost",
            "inferenceMs": 12,
            "predictions": [
                {"label": "person", "confidence": 0.91, "x_min": 40, "y_min": 10, "x_max": 5, "y_max": 90}
            ],
            "count": 1
        }"#;
        let response: ModuleResponse = serde_json::from_str(json).unwrap();
        assert!(response.success);
        assert_eq!(response.module_id.as_deref(), Some("ObjectDetectionYOLOv8"));
        assert_eq!(response.inference_ms, Some(12.0));
        assert_eq!(response.predictions().len(), 1);
        assert_eq!(response.predictions()[0].x_max, 5.0);
        assert_eq!(response.extra.get("count"), Some(&Value::from(1)));
    }
}
