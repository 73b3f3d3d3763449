/// In-memory model of the explorer page
///
/// Holds everything the explorer mutates on the host page: the category tab strip and
/// its panes, module cards, behavior/style blocks, the status line, the results panel,
/// the result and preview images with their mask, and positioned frame overlays.
/// A browser host mirrors these operations onto its DOM; natively the page is
/// snapshotted with `to_html`.
use std::collections::BTreeMap;
use log::{debug, info, warn, error};

/// Tab that absorbs modules whose category has no tab of its own
pub const OTHER_CATEGORY: &str = "Other";

pub const DEFAULT_TAB_CATEGORIES: &[&str] = &[
    "Computer Vision",
    "Face Recognition",
    "Image Processing",
    "Natural Language",
    "Audio",
    "Generative AI",
    "Benchmarking",
    OTHER_CATEGORY,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusVariant {
    Info,
    Warn,
    Error,
    Success,
}

impl StatusVariant {
    fn css_class(&self) -> &'static str {
        match self {
            StatusVariant::Info => "text-info",
            StatusVariant::Warn => "text-warn",
            StatusVariant::Error => "text-error",
            StatusVariant::Success => "text-success",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub text: String,
    pub variant: Option<StatusVariant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageElement {
    pub src: String,
    /// Rendered size, zero until laid out
    pub width: f64,
    pub height: f64,
    /// Source resolution
    pub natural_width: f64,
    pub natural_height: f64,
    pub visible: bool,
}

impl ImageElement {
    pub fn new(src: &str, width: f64, height: f64, natural_width: f64, natural_height: f64) -> Self {
        Self {
            src: src.to_string(),
            width,
            height,
            natural_width,
            natural_height,
            visible: true,
        }
    }

    pub fn is_laid_out(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskElement {
    pub markup: String,
    pub width: f64,
    pub height: f64,
    pub visible: bool,
}

/// Absolute placement of a frame overlay relative to its image wrapper
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlacement {
    pub top: f64,
    pub right: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameOverlayElement {
    pub placement: FramePlacement,
    pub markup: String,
    /// Token of the animation that attached this element
    pub owner: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tab {
    pub category: String,
    pub visible: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// Set for cards composed from a module's UI fragment, None for static cards
    pub module_id: Option<String>,
    /// Queue name, used as a class to match statuses to static cards
    pub queue: String,
    pub markup: String,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Behavior,
    Style,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: String,
    pub kind: BlockKind,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    tabs: Vec<Tab>,
    panes: BTreeMap<String, Vec<Card>>,
    blocks: Vec<Block>,
    status: Option<StatusMessage>,
    results_html: String,
    pub result_image: Option<ImageElement>,
    pub preview_image: Option<ImageElement>,
    pub mask: MaskElement,
    overlays: BTreeMap<String, FrameOverlayElement>,
    next_overlay_owner: u64,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page with one hidden tab and pane per category, first tab active
    pub fn with_tabs(categories: &[&str]) -> Self {
        let mut page = Self::new();
        for (i, category) in categories.iter().enumerate() {
            page.tabs.push(Tab {
                category: category.to_string(),
                visible: false,
                active: i == 0,
            });
            page.panes.insert(category.to_string(), Vec::new());
        }
        page
    }

    pub fn explorer_layout() -> Self {
        Self::with_tabs(DEFAULT_TAB_CATEGORIES)
    }

    // Tabs ====================================================================

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn has_tab(&self, category: &str) -> bool {
        self.tabs.iter().any(|t| t.category == category)
    }

    pub fn is_tab_visible(&self, category: &str) -> bool {
        self.tabs.iter().any(|t| t.category == category && t.visible)
    }

    /// Category whose tab should hold a module card, falling back to "Other"
    pub fn resolve_category(&self, category: &str) -> String {
        if self.has_tab(category) {
            category.to_string()
        } else {
            OTHER_CATEGORY.to_string()
        }
    }

    pub fn set_tab_visible(&mut self, category: &str, visible: bool) {
        match self.tabs.iter_mut().find(|t| t.category == category) {
            Some(tab) => tab.visible = visible,
            None => warn!("No tab for category '{}'", category),
        }
    }

    pub fn hide_all_tabs_except(&mut self, pinned: &[String]) {
        for tab in &mut self.tabs {
            tab.visible = pinned.iter().any(|p| *p == tab.category);
        }
    }

    pub fn active_tab(&self) -> Option<&str> {
        self.tabs.iter().find(|t| t.active).map(|t| t.category.as_str())
    }

    pub fn activate_tab(&mut self, category: &str) {
        if !self.has_tab(category) {
            warn!("Cannot activate missing tab '{}'", category);
            return;
        }
        for tab in &mut self.tabs {
            tab.active = tab.category == category;
        }
    }

    /// Keeps a visible active tab if there is one, otherwise activates the first visible
    /// tab. Returns the active category.
    pub fn ensure_active_tab(&mut self) -> Option<String> {
        if let Some(tab) = self.tabs.iter().find(|t| t.active && t.visible) {
            return Some(tab.category.clone());
        }

        let first_visible = self.tabs.iter().find(|t| t.visible).map(|t| t.category.clone());
        match &first_visible {
            Some(category) => {
                debug!("Active tab hidden, switching to '{}'", category);
                self.activate_tab(category);
            }
            None => {
                for tab in &mut self.tabs {
                    tab.active = false;
                }
            }
        }
        first_visible
    }

    // Cards ===================================================================

    pub fn cards(&self, category: &str) -> &[Card] {
        self.panes.get(category).map(|c| c.as_slice()).unwrap_or(&[])
    }

    pub(crate) fn insert_card(&mut self, category: &str, card: Card) {
        self.panes.entry(category.to_string()).or_default().push(card);
    }

    pub fn add_static_card(&mut self, category: &str, queue: &str, markup: &str) {
        self.insert_card(category, Card {
            module_id: None,
            queue: queue.to_string(),
            markup: markup.to_string(),
            visible: true,
        });
    }

    pub fn has_module_card(&self, module_id: &str) -> bool {
        self.panes.values()
            .flatten()
            .any(|c| c.module_id.as_deref() == Some(module_id))
    }

    pub fn module_card(&self, module_id: &str) -> Option<&Card> {
        self.panes.values()
            .flatten()
            .find(|c| c.module_id.as_deref() == Some(module_id))
    }

    pub fn module_card_ids(&self) -> Vec<String> {
        self.panes.values()
            .flatten()
            .filter_map(|c| c.module_id.clone())
            .collect()
    }

    pub(crate) fn remove_module_card(&mut self, module_id: &str) -> bool {
        let mut removed = false;
        for cards in self.panes.values_mut() {
            let before = cards.len();
            cards.retain(|c| c.module_id.as_deref() != Some(module_id));
            removed |= cards.len() != before;
        }
        removed
    }

    pub fn set_static_cards_visible(&mut self, visible: bool) {
        for card in self.panes.values_mut().flatten().filter(|c| c.module_id.is_none()) {
            card.visible = visible;
        }
    }

    /// Shows the static cards of a queue, returning the categories that hold them
    pub fn show_static_cards_for_queue(&mut self, queue: &str) -> Vec<String> {
        let mut categories = Vec::new();
        for (category, cards) in self.panes.iter_mut() {
            for card in cards.iter_mut().filter(|c| c.module_id.is_none() && c.queue == queue) {
                card.visible = true;
                if !categories.contains(category) {
                    categories.push(category.clone());
                }
            }
        }
        categories
    }

    // Behavior and style blocks ===============================================

    pub fn has_block(&self, id: &str) -> bool {
        self.blocks.iter().any(|b| b.id == id)
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub(crate) fn append_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub(crate) fn remove_block(&mut self, id: &str) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|b| b.id != id);
        self.blocks.len() != before
    }

    // Status line and results =================================================

    /// Sets the single-line status. Empty text clears it.
    pub fn show_log_output(&mut self, text: &str, variant: Option<StatusVariant>) {
        if text.is_empty() {
            self.status = None;
            return;
        }

        match variant {
            Some(StatusVariant::Warn) => warn!("{}", text),
            Some(StatusVariant::Error) => error!("{}", text),
            _ => info!("{}", text),
        }

        self.status = Some(StatusMessage {
            text: text.to_string(),
            variant,
        });
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn set_results_html(&mut self, html: String) {
        self.results_html = html;
    }

    pub fn results_html(&self) -> &str {
        &self.results_html
    }

    // Frame overlays ==========================================================

    /// Adds or replaces an overlay and returns the owner token of the new element.
    /// A replaced element's previous owner no longer matches.
    pub fn set_overlay(&mut self, id: &str, placement: FramePlacement) -> u64 {
        self.next_overlay_owner += 1;
        let owner = self.next_overlay_owner;
        self.overlays.insert(id.to_string(), FrameOverlayElement {
            placement,
            markup: String::new(),
            owner,
        });
        owner
    }

    /// Replaces an overlay's markup, false if the overlay is gone or now belongs to
    /// another owner
    pub fn update_overlay(&mut self, id: &str, owner: u64, markup: String) -> bool {
        match self.overlays.get_mut(id) {
            Some(overlay) if overlay.owner == owner => {
                overlay.markup = markup;
                true
            }
            _ => false,
        }
    }

    /// Removes the overlay only while `owner` still holds it
    pub fn remove_owned_overlay(&mut self, id: &str, owner: u64) -> bool {
        if self.overlays.get(id).map(|o| o.owner) == Some(owner) {
            self.overlays.remove(id);
            return true;
        }
        false
    }

    pub fn overlay(&self, id: &str) -> Option<&FrameOverlayElement> {
        self.overlays.get(id)
    }

    pub fn remove_overlay(&mut self, id: &str) -> bool {
        self.overlays.remove(id).is_some()
    }

    // Snapshot ================================================================

    pub fn to_html(&self) -> String {
        let mut html = String::new();

        html.push_str("<div id=\"status\">");
        if let Some(status) = &self.status {
            let class = status.variant.map(|v| v.css_class()).unwrap_or("");
            html.push_str(&format!("<span class=\"{}\">{}</span>", class, escape_html(&status.text)));
        }
        html.push_str("</div>\n<ul id=\"DemoTabs\">\n");

        for tab in &self.tabs {
            let mut classes = vec!["nav-item"];
            if !tab.visible {
                classes.push("d-none");
            }
            if tab.active {
                classes.push("active");
            }
            html.push_str(&format!("  <li class=\"{}\" data-category=\"{}\">{}</li>\n",
                classes.join(" "), escape_html(&tab.category), escape_html(&tab.category)));
        }
        html.push_str("</ul>\n");

        for (category, cards) in &self.panes {
            html.push_str(&format!("<div class=\"tab-pane\" data-category=\"{}\">\n", escape_html(category)));
            for card in cards {
                if card.module_id.is_some() {
                    html.push_str(&card.markup);
                } else {
                    let display = if card.visible { "d-flex" } else { "d-none" };
                    html.push_str(&format!("<div class=\"card {} {}\">{}</div>", card.queue, display, card.markup));
                }
                html.push('\n');
            }
            html.push_str("</div>\n");
        }

        html.push_str(&format!("<div id=\"results\">{}</div>\n", self.results_html));

        if self.mask.visible {
            html.push_str(&format!("<div id=\"imgMask\" style=\"width:{}px;height:{}px\">{}</div>\n",
                self.mask.width, self.mask.height, self.mask.markup));
        }

        for (id, overlay) in &self.overlays {
            let p = overlay.placement;
            html.push_str(&format!(
                "<div id=\"{}\" class=\"svg-frame\" style=\"position:absolute;top:{}px;right:{}px;width:{}px;height:{}px\">{}</div>\n",
                escape_html(id), p.top, p.right, p.width, p.height, overlay.markup));
        }

        for block in &self.blocks {
            let tag = match block.kind {
                BlockKind::Behavior => "script",
                BlockKind::Style => "style",
            };
            html.push_str(&format!("<{tag} id=\"{}\">{}</{tag}>\n", escape_html(&block.id), block.content));
        }

        html
    }
}

/// Escapes text for use in markup content or attribute values
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaced_overlay_rejects_previous_owner() {
        let mut page = Page::new();
        let placement = FramePlacement { top: 0.0, right: 0.0, width: 10.0, height: 10.0 };
        let old = page.set_overlay("frame", placement);
        let new = page.set_overlay("frame", placement);
        assert_ne!(old, new);

        assert!(!page.update_overlay("frame", old, "<svg/>".to_string()));
        assert!(!page.remove_owned_overlay("frame", old));
        assert!(page.update_overlay("frame", new, "<svg/>".to_string()));
        assert!(page.remove_owned_overlay("frame", new));
        assert!(page.overlay("frame").is_none());
    }

    fn visible_page() -> Page {
        let mut page = Page::with_tabs(&["Vision", "Audio", OTHER_CATEGORY]);
        for category in ["Vision", "Audio", OTHER_CATEGORY] {
            page.set_tab_visible(category, true);
        }
        page
    }

    #[test]
    fn test_active_tab_kept_when_visible() {
        let mut page = visible_page();
        page.activate_tab("Audio");
        page.set_tab_visible("Vision", false);
        assert_eq!(page.ensure_active_tab().as_deref(), Some("Audio"));
        assert_eq!(page.active_tab(), Some("Audio"));
    }

    #[test]
    fn test_hidden_active_tab_moves_to_first_visible() {
        let mut page = visible_page();
        page.activate_tab("Vision");
        page.set_tab_visible("Vision", false);
        assert_eq!(page.ensure_active_tab().as_deref(), Some("Audio"));
        assert_eq!(page.tabs().iter().filter(|t| t.active).count(), 1);
    }

    #[test]
    fn test_no_visible_tabs_means_no_active_tab() {
        let mut page = visible_page();
        page.hide_all_tabs_except(&[]);
        assert_eq!(page.ensure_active_tab(), None);
        assert_eq!(page.active_tab(), None);
    }

    #[test]
    fn test_unknown_category_resolves_to_other() {
        let page = visible_page();
        assert_eq!(page.resolve_category("Vision"), "Vision");
        assert_eq!(page.resolve_category("Robotics"), OTHER_CATEGORY);
    }

    #[test]
    fn test_status_line_clears_on_empty_text() {
        let mut page = Page::new();
        page.show_log_output("Sending request", Some(StatusVariant::Info));
        assert_eq!(page.status().unwrap().text, "Sending request");
        page.show_log_output("", None);
        assert!(page.status().is_none());
    }

    #[test]
    fn test_static_cards_for_queue() {
        let mut page = visible_page();
        page.add_static_card("Vision", "objectdetection_queue", "<p>detect</p>");
        page.add_static_card("Audio", "soundclassifier_queue", "<p>sound</p>");
        page.set_static_cards_visible(false);

        let categories = page.show_static_cards_for_queue("objectdetection_queue");
        assert_eq!(categories, vec!["Vision".to_string()]);
        assert!(page.cards("Vision")[0].visible);
        assert!(!page.cards("Audio")[0].visible);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
