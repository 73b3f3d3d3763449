/// Per-module namespacing of UI fragments
///
/// Module authors write `_MID_` wherever an identifier must be unique on the page.
/// Every occurrence becomes `{key}_`, where the key is the module id with all
/// non-alphanumeric characters removed.
use once_cell::sync::Lazy;
use regex::Regex;

use super::descriptor::ExplorerUi;

pub const NAMESPACE_TOKEN: &str = "_MID_";

static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^a-zA-Z0-9]+").unwrap()
});

pub fn sanitize_module_id(module_id: &str) -> String {
    NON_ALPHANUMERIC.replace_all(module_id, "").to_string()
}

pub fn substitute_token(fragment: &str, key: &str) -> String {
    fragment.replace(NAMESPACE_TOKEN, &format!("{}_", key))
}

pub fn behavior_block_id(key: &str) -> String {
    format!("script_{}", key)
}

pub fn style_block_id(key: &str) -> String {
    format!("style_{}", key)
}

/// Fragments with the token already substituted
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleFragments {
    pub html: String,
    pub script: String,
    pub css: String,
}

impl ModuleFragments {
    pub fn namespaced(ui: &ExplorerUi, key: &str) -> Self {
        let part = |s: &Option<String>| substitute_token(s.as_deref().unwrap_or_default(), key);
        Self {
            html: part(&ui.html),
            script: part(&ui.script),
            css: part(&ui.css),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_module_id("Object-Detection YOLOv8 (v1.2)"), "ObjectDetectionYOLOv8v12");
        assert_eq!(sanitize_module_id("___"), "");
    }

    #[test]
    fn test_every_token_replaced_once() {
        let html = "<div id='_MID_a'><input id='_MID_b'/><label for='_MID_b'></label></div>";
        let key = sanitize_module_id("Text-Summary");
        let substituted = substitute_token(html, &key);

        assert_eq!(substituted.matches("TextSummary_").count(), 3);
        assert_eq!(substituted.matches(NAMESPACE_TOKEN).count(), 0);
        assert_eq!(substitute_token(&substituted, &key), substituted);
    }

    #[test]
    fn test_fragments_and_block_ids() {
        let ui = ExplorerUi {
            html: Some("<p id='_MID_p'></p>".to_string()),
            script: Some("document.getElementById('_MID_p')".to_string()),
            css: None,
        };
        let fragments = ModuleFragments::namespaced(&ui, "Mod1");
        assert_eq!(fragments.html, "<p id='Mod1_p'></p>");
        assert_eq!(fragments.script, "document.getElementById('Mod1_p')");
        assert_eq!(fragments.css, "");
        assert_eq!(behavior_block_id("Mod1"), "script_Mod1");
        assert_eq!(style_block_id("Mod1"), "style_Mod1");
    }
}
