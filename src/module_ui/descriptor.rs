/// Module lists reported by the inference server
use serde::{Deserialize, Serialize};

/// Value of `ModuleStatus::status` for a running module
pub const STATUS_STARTED: &str = "Started";

/// UI fragment a module ships for the explorer
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ExplorerUi {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub css: Option<String>,
}

impl ExplorerUi {
    /// A fragment needs both markup and behavior to be injected at all
    pub fn is_renderable(&self) -> bool {
        let present = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.is_empty());
        present(&self.html) && present(&self.script)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub module_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default, rename = "explorerUI")]
    pub explorer_ui: Option<ExplorerUi>,
}

impl ModuleDescriptor {
    pub fn renderable_ui(&self) -> Option<&ExplorerUi> {
        self.explorer_ui.as_ref().filter(|ui| ui.is_renderable())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.module_id)
    }
}

/// `GET module/list/running`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RunningModules {
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    pub module_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub queue: Option<String>,
}

impl ModuleStatus {
    pub fn is_running(&self) -> bool {
        self.status == STATUS_STARTED
    }
}

/// `GET module/list/status`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ModuleStatuses {
    #[serde(default)]
    pub statuses: Vec<ModuleStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_running_modules() {
        let json = r#"{
            "modules": [
                {
                    "moduleId": "ObjectDetectionYOLOv8",
                    "name": "Object Detection (YOLOv8)",
                    "category": "Computer Vision",
                    "queue": "objectdetection_queue",
                    "explorerUI": {"html": "<div id='_MID_x'></div>", "script": "let x;", "css": null}
                },
                {"moduleId": "FaceProcessing", "explorerUI": {"html": "", "script": "x"}}
            ]
        }"#;
        let list: RunningModules = serde_json::from_str(json).unwrap();
        assert_eq!(list.modules.len(), 2);
        assert!(list.modules[0].renderable_ui().is_some());
        assert_eq!(list.modules[0].queue.as_deref(), Some("objectdetection_queue"));
        assert!(list.modules[1].renderable_ui().is_none());
        assert_eq!(list.modules[1].display_name(), "FaceProcessing");
    }

    #[test]
    fn test_missing_script_is_not_renderable() {
        let ui = ExplorerUi { html: Some("<p></p>".to_string()), script: None, css: Some("p{}".to_string()) };
        assert!(!ui.is_renderable());
    }

    #[test]
    fn test_status_running() {
        let json = r#"{"statuses": [
            {"moduleId": "A", "status": "Started", "queue": "a_queue"},
            {"moduleId": "B", "status": "Stopped", "queue": "b_queue"}
        ]}"#;
        let statuses: ModuleStatuses = serde_json::from_str(json).unwrap();
        assert!(statuses.statuses[0].is_running());
        assert!(!statuses.statuses[1].is_running());
    }
}
