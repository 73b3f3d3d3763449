/// Keeps the page's module UI in line with the modules the server reports
///
/// In server-composed mode each poll fetches the running modules and their UI
/// fragments, reveals the tabs of their categories, injects missing cards and
/// behavior/style blocks, removes the UI of modules that are gone and finally makes
/// sure a visible tab is active. In status-only mode a poll only toggles the
/// visibility of pre-rendered cards.
///
/// Polls may overlap on a slow network. Each poll takes a generation number when it
/// starts; results are applied under one lock and only if no newer poll has been
/// applied already.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::page::{escape_html, Block, BlockKind, Card, Page, OTHER_CATEGORY};
use crate::transport::{TransportClient, TransportError};
use super::descriptor::{ExplorerUi, ModuleDescriptor, ModuleStatus, ModuleStatuses, RunningModules};
use super::namespace::{behavior_block_id, sanitize_module_id, style_block_id, ModuleFragments};

pub const RUNNING_MODULES_PATH: &str = "module/list/running";
pub const MODULE_STATUS_PATH: &str = "module/list/status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiSource {
    /// Cards are composed from the fragments modules ship
    FromServer,
    /// Cards are static; polls only show or hide them
    StatusOnly,
}

impl UiSource {
    pub fn from_flag(ui_from_server: bool) -> Self {
        if ui_from_server { UiSource::FromServer } else { UiSource::StatusOnly }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollTicket {
    generation: u64,
}

impl PollTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Card, behavior block and style block owned for one module
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedModuleUi {
    pub module_id: String,
    pub key: String,
    pub category: String,
    /// False when another module with the same key inserted the blocks first
    pub owns_blocks: bool,
}

impl InjectedModuleUi {
    pub fn behavior_block_id(&self) -> String {
        behavior_block_id(&self.key)
    }

    pub fn style_block_id(&self) -> String {
        style_block_id(&self.key)
    }
}

/// Difference between the module UI on the page and the latest poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

/// `injected`: ids with UI on the page. `running`: every id in the poll.
/// `renderable`: running ids whose UI can be injected.
pub fn plan_reconciliation(
    injected: &BTreeSet<String>,
    running: &BTreeSet<String>,
    renderable: &BTreeSet<String>,
) -> ReconcilePlan {
    ReconcilePlan {
        added: renderable.difference(injected).cloned().collect(),
        removed: injected.difference(running).cloned().collect(),
        unchanged: injected.intersection(running).cloned().collect(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Parts re-inserted for modules that already had UI
    pub healed: usize,
    pub skipped: Vec<String>,
    pub visible_tabs: Vec<String>,
    pub active_tab: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Applied(ReconcileReport),
    /// A newer poll was applied first
    Stale,
    Failed(TransportError),
}

#[derive(Debug, Default)]
struct RegistryState {
    applied_generation: u64,
    injected: BTreeMap<String, InjectedModuleUi>,
}

pub fn card_markup(module: &ModuleDescriptor, html: &str) -> String {
    format!(
        "<div class=\"card mt-3 moduleui {}\" data-moduleid=\"{}\"><div class=\"card-header h3\">{}</div><div class=\"card-body\">{}</div></div>",
        escape_html(module.queue.as_deref().unwrap_or_default()),
        escape_html(&module.module_id),
        escape_html(module.display_name()),
        html
    )
}

/// Inserts whichever of the card, behavior block and style block is missing.
/// Returns the entry and the number of parts inserted.
fn ensure_injected(page: &mut Page, module: &ModuleDescriptor, ui: &ExplorerUi) -> (InjectedModuleUi, usize) {
    let key = sanitize_module_id(&module.module_id);
    let category = page.resolve_category(module.category.as_deref().unwrap_or(OTHER_CATEGORY));
    let fragments = ModuleFragments::namespaced(ui, &key);
    let mut inserted = 0;

    if !page.has_module_card(&module.module_id) {
        page.insert_card(&category, Card {
            module_id: Some(module.module_id.clone()),
            queue: module.queue.clone().unwrap_or_default(),
            markup: card_markup(module, &fragments.html),
            visible: true,
        });
        inserted += 1;
    }

    let mut owns_blocks = false;
    let script_id = behavior_block_id(&key);
    if !page.has_block(&script_id) {
        page.append_block(Block { id: script_id, kind: BlockKind::Behavior, content: fragments.script });
        inserted += 1;
        owns_blocks = true;
    }

    let style_id = style_block_id(&key);
    if !page.has_block(&style_id) {
        page.append_block(Block { id: style_id, kind: BlockKind::Style, content: fragments.css });
        inserted += 1;
        owns_blocks = true;
    }

    (InjectedModuleUi { module_id: module.module_id.clone(), key, category, owns_blocks }, inserted)
}

/// Removes a module's card and both blocks together. When another injected module
/// shares the key the blocks stay, rewritten with that module's fragments if the
/// departing module had written them.
fn remove_module_ui(
    page: &mut Page,
    injected: &mut BTreeMap<String, InjectedModuleUi>,
    module_id: &str,
    renderable: &[(&ModuleDescriptor, &ExplorerUi)],
) {
    let departing = injected.remove(module_id);
    let key = departing.as_ref()
        .map(|e| e.key.clone())
        .unwrap_or_else(|| sanitize_module_id(module_id));
    let owned = departing.map(|e| e.owns_blocks).unwrap_or(true);
    page.remove_module_card(module_id);

    let script_id = behavior_block_id(&key);
    let style_id = style_block_id(&key);
    let Some(heir) = injected.values_mut().find(|e| e.key == key) else {
        page.remove_block(&script_id);
        page.remove_block(&style_id);
        return;
    };
    if !owned || heir.owns_blocks {
        return;
    }

    if let Some((_, ui)) = renderable.iter().find(|(m, _)| m.module_id == heir.module_id) {
        debug!("Blocks for key '{}' handed from {} to {}", key, module_id, heir.module_id);
        let fragments = ModuleFragments::namespaced(ui, &key);
        page.remove_block(&script_id);
        page.remove_block(&style_id);
        page.append_block(Block { id: script_id, kind: BlockKind::Behavior, content: fragments.script });
        page.append_block(Block { id: style_id, kind: BlockKind::Style, content: fragments.css });
    }
    heir.owns_blocks = true;
}

/// One server-composed reconciliation pass
fn reconcile(
    page: &mut Page,
    injected: &mut BTreeMap<String, InjectedModuleUi>,
    modules: &[ModuleDescriptor],
    pinned_tabs: &[String],
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let mut renderable: Vec<(&ModuleDescriptor, &ExplorerUi)> = Vec::new();
    for module in modules {
        match module.renderable_ui() {
            Some(ui) => renderable.push((module, ui)),
            None => report.skipped.push(module.module_id.clone()),
        }
    }
    if !report.skipped.is_empty() {
        debug!("Modules without explorer UI: {:?}", report.skipped);
    }

    let running: BTreeSet<String> = modules.iter().map(|m| m.module_id.clone()).collect();
    let renderable_ids: BTreeSet<String> = renderable.iter().map(|(m, _)| m.module_id.clone()).collect();
    // Cards the registry lost track of are reconciled too
    let on_page: BTreeSet<String> = injected.keys().cloned().chain(page.module_card_ids()).collect();
    let plan = plan_reconciliation(&on_page, &running, &renderable_ids);

    // Tab visibility
    page.hide_all_tabs_except(pinned_tabs);
    for (module, _) in &renderable {
        let category = page.resolve_category(module.category.as_deref().unwrap_or(OTHER_CATEGORY));
        page.set_tab_visible(&category, true);
    }

    // Insert
    for (module, ui) in &renderable {
        let (mut entry, inserted) = ensure_injected(page, module, ui);
        entry.owns_blocks |= injected.get(&module.module_id).map(|e| e.owns_blocks).unwrap_or(false);
        if plan.added.contains(&module.module_id) {
            info!("Added UI for module {}", module.module_id);
            report.added.push(module.module_id.clone());
        } else if inserted > 0 {
            debug!("Restored {} UI parts for module {}", inserted, module.module_id);
            report.healed += inserted;
        }
        injected.insert(module.module_id.clone(), entry);
    }

    // Remove stale
    for module_id in &plan.removed {
        info!("Removed UI for module {}", module_id);
        remove_module_ui(page, injected, module_id, &renderable);
        report.removed.push(module_id.clone());
    }

    report.active_tab = page.ensure_active_tab();
    report.visible_tabs = visible_tabs(page);
    report
}

/// Status-only pass: shows the static cards of started modules and their tabs
fn apply_status_visibility(page: &mut Page, statuses: &[ModuleStatus], pinned_tabs: &[String]) -> ReconcileReport {
    page.set_static_cards_visible(false);
    page.hide_all_tabs_except(pinned_tabs);

    for status in statuses.iter().filter(|s| s.is_running()) {
        let Some(queue) = status.queue.as_deref().filter(|q| !q.is_empty()) else {
            continue;
        };
        for category in page.show_static_cards_for_queue(queue) {
            page.set_tab_visible(&category, true);
        }
    }

    ReconcileReport {
        active_tab: page.ensure_active_tab(),
        visible_tabs: visible_tabs(page),
        ..ReconcileReport::default()
    }
}

fn visible_tabs(page: &Page) -> Vec<String> {
    page.tabs().iter().filter(|t| t.visible).map(|t| t.category.clone()).collect()
}

pub struct ModuleUiRegistry {
    page: Arc<Mutex<Page>>,
    transport: Arc<TransportClient>,
    source: UiSource,
    pinned_tabs: Vec<String>,
    next_generation: AtomicU64,
    state: tokio::sync::Mutex<RegistryState>,
}

impl ModuleUiRegistry {
    pub fn new(transport: Arc<TransportClient>, source: UiSource, pinned_tabs: Vec<String>) -> Self {
        Self {
            page: Arc::clone(transport.page()),
            transport,
            source,
            pinned_tabs,
            next_generation: AtomicU64::new(0),
            state: tokio::sync::Mutex::new(RegistryState::default()),
        }
    }

    pub fn source(&self) -> UiSource {
        self.source
    }

    /// Generations start at 1 and increase with every poll started
    pub fn begin_poll(&self) -> PollTicket {
        PollTicket { generation: self.next_generation.fetch_add(1, Ordering::SeqCst) + 1 }
    }

    pub async fn injected_ids(&self) -> Vec<String> {
        self.state.lock().await.injected.keys().cloned().collect()
    }

    pub async fn injected(&self, module_id: &str) -> Option<InjectedModuleUi> {
        self.state.lock().await.injected.get(module_id).cloned()
    }

    pub async fn poll_once(&self) -> PollOutcome {
        let ticket = self.begin_poll();

        match self.source {
            UiSource::FromServer => {
                match self.transport.get_json::<RunningModules>(RUNNING_MODULES_PATH).await {
                    Ok(list) => self.apply_running(ticket, &list.modules).await,
                    Err(e) => {
                        warn!("Module list poll {} failed: {}", ticket.generation, e);
                        PollOutcome::Failed(e)
                    }
                }
            }
            UiSource::StatusOnly => {
                match self.transport.get_json::<ModuleStatuses>(MODULE_STATUS_PATH).await {
                    Ok(list) => self.apply_statuses(ticket, &list.statuses).await,
                    Err(e) => {
                        warn!("Module status poll {} failed: {}", ticket.generation, e);
                        PollOutcome::Failed(e)
                    }
                }
            }
        }
    }

    /// Applies a running-module list fetched under `ticket`
    pub async fn apply_running(&self, ticket: PollTicket, modules: &[ModuleDescriptor]) -> PollOutcome {
        let mut state = self.state.lock().await;
        if ticket.generation <= state.applied_generation {
            debug!("Dropping poll {} (poll {} already applied)", ticket.generation, state.applied_generation);
            return PollOutcome::Stale;
        }
        state.applied_generation = ticket.generation;

        let mut page = self.page.lock().unwrap();
        let report = reconcile(&mut page, &mut state.injected, modules, &self.pinned_tabs);
        PollOutcome::Applied(report)
    }

    pub async fn apply_statuses(&self, ticket: PollTicket, statuses: &[ModuleStatus]) -> PollOutcome {
        let mut state = self.state.lock().await;
        if ticket.generation <= state.applied_generation {
            debug!("Dropping status poll {} (poll {} already applied)", ticket.generation, state.applied_generation);
            return PollOutcome::Stale;
        }
        state.applied_generation = ticket.generation;

        let mut page = self.page.lock().unwrap();
        PollOutcome::Applied(apply_status_visibility(&mut page, statuses, &self.pinned_tabs))
    }

    /// Polls every `interval` until cancelled. Each poll runs in its own task so a
    /// slow response does not delay the next tick.
    pub fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let registry = Arc::clone(&self);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                outcome = registry.poll_once() => {
                                    if let PollOutcome::Applied(report) = outcome {
                                        if !report.added.is_empty() || !report.removed.is_empty() {
                                            debug!("Module UI: +{:?} -{:?}", report.added, report.removed);
                                        }
                                    }
                                }
                            }
                        });
                    }
                }
            }
            debug!("Module UI polling stopped");
        })
    }
}
