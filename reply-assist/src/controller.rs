//! The overlay engine: owns every piece of page-bound state and routes host
//! events and timer tasks through the components.

use tracing::{debug, info, warn};

use crate::classifier::ContextClassifier;
use crate::config::{CompiledSelectors, OverlayConfig};
use crate::dom::{HostDom, NodeId, is_visible};
use crate::error::AppError;
use crate::extract::{ExtractionInput, Extractor};
use crate::input::{InsertPhase, InsertionSynchronizer, Progress, SyncStep, resolve_target};
use crate::metrics::{DiagnosticsReport, OverlayMetrics};
use crate::navigation::NavigationWatcher;
use crate::panel::{Panel, PanelContent, PopupState};
use crate::reconcile::{ReconcileOutcome, Reconciler, button_is_live, is_button_target};
use crate::scheduler::{Scheduler, TriggerClass};
use crate::settings::Settings;
use crate::state::{OverlayButton, SessionState};
use crate::transform::transform;

/// Notifications the host page delivers to the overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Some subtree of the document changed.
    Mutation,
    Scroll,
    FocusIn { target: NodeId },
    /// A click, seen during the capture phase.
    Click { target: NodeId },
    KeyDown { target: Option<NodeId>, key: String },
    /// History navigation; the new path is read from the host.
    LocationChanged,
    SettingsChanged(Settings),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Reconcile,
    StartupReconcile { attempt: usize },
    HealthCheck,
    DismissPanel,
    Insert(SyncStep),
}

pub struct Overlay<D: HostDom> {
    dom: D,
    config: OverlayConfig,
    selectors: CompiledSelectors,
    extractor: Extractor<D>,
    settings: Settings,
    scheduler: Scheduler<Task>,
    state: SessionState,
    panel: Panel,
    sync: InsertionSynchronizer,
    watcher: NavigationWatcher,
    metrics: OverlayMetrics,
}

impl<D: HostDom> Overlay<D> {
    pub fn new(dom: D, config: OverlayConfig, settings: Settings) -> Result<Self, AppError> {
        let config = config.normalized().validated()?;
        let selectors = config.compile()?;
        let extractor = Extractor::new(&selectors, &config.extraction);
        let panel = Panel::new(config.panel.clone(), config.quick_replies.clone());
        let sync = InsertionSynchronizer::new(&config.timings)
            .with_reply_inputs(selectors.reply_inputs.clone());

        Ok(Self {
            dom,
            config,
            selectors,
            extractor,
            settings,
            scheduler: Scheduler::new(),
            state: SessionState::default(),
            panel,
            sync,
            watcher: NavigationWatcher::new(),
            metrics: OverlayMetrics::new(),
        })
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    /// Direct access to the host, for drivers that apply host-side changes
    /// between events.
    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    pub fn into_dom(self) -> D {
        self.dom
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn session(&self) -> &SessionState {
        &self.state
    }

    pub fn popup(&self) -> &PopupState {
        self.panel.state()
    }

    pub fn panel_node(&self) -> Option<NodeId> {
        self.panel.node()
    }

    pub fn insertion_phase(&self) -> Option<InsertPhase> {
        self.sync.phase()
    }

    pub fn now_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    /// Virtual time of the earliest pending task.
    pub fn next_deadline(&self) -> Option<u64> {
        self.scheduler.next_due_ms()
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending_count()
    }

    pub fn diagnostics(&self) -> DiagnosticsReport {
        self.metrics.report()
    }

    /// Records the initial location, runs a first pass and arms the startup
    /// retries and the health poll.
    pub fn start(&mut self) {
        let path = self.dom.location_path();
        self.watcher.observe(&path);
        info!(path = %path, enabled = self.settings.enabled, "overlay started");
        self.reconcile();
        self.arm_timers();
    }

    /// Routes one host event. Returns `true` when the overlay consumed it
    /// and the host should not handle it.
    pub fn handle_event(&mut self, event: HostEvent) -> bool {
        self.check_navigation();
        let timings = &self.config.timings;

        match event {
            HostEvent::Mutation => {
                self.scheduler.debounce(
                    TriggerClass::Mutation,
                    timings.mutation_debounce_ms,
                    Task::Reconcile,
                );
                false
            }
            HostEvent::Scroll => {
                self.scheduler.debounce(
                    TriggerClass::Scroll,
                    timings.scroll_debounce_ms,
                    Task::Reconcile,
                );
                if self.panel.is_visible() {
                    self.scheduler.debounce(
                        TriggerClass::PanelScroll,
                        timings.dismiss_scroll_debounce_ms,
                        Task::DismissPanel,
                    );
                }
                false
            }
            HostEvent::FocusIn { target } => {
                if self.is_reply_input(target) {
                    self.state.last_input = Some(target);
                }
                self.scheduler.debounce(
                    TriggerClass::Focus,
                    timings.focus_debounce_ms,
                    Task::Reconcile,
                );
                false
            }
            HostEvent::Click { target } => self.handle_click(target),
            HostEvent::KeyDown { target, key } => self.handle_key(target, &key),
            HostEvent::LocationChanged => false,
            HostEvent::SettingsChanged(settings) => {
                self.apply_settings(settings);
                false
            }
        }
    }

    /// Runs every task due at or before `now_ms`, in order, then moves the
    /// clock to `now_ms`.
    pub fn advance_to(&mut self, now_ms: u64) {
        while let Some(task) = self.scheduler.pop_due(now_ms) {
            if self.check_navigation() {
                // The reset cancelled everything scheduled for the old page.
                continue;
            }
            self.run_task(task);
        }
        self.scheduler.advance_clock(now_ms);
    }

    pub fn apply_settings(&mut self, settings: Settings) {
        info!(
            enabled = settings.enabled,
            mode = ?settings.process_mode,
            "settings applied"
        );
        self.settings = settings;
        if !self.settings.enabled {
            self.panel.hide(&mut self.dom);
        }
        self.reconcile();
    }

    /// Opens the panel for the tracked button, or closes it if it is already
    /// showing for that button.
    pub fn toggle_panel(&mut self) {
        let Some(button) = self.state.button else {
            return;
        };
        if self.panel.is_showing_for(&button) {
            self.panel.hide(&mut self.dom);
        } else {
            self.open_panel(button);
        }
    }

    /// Writes `text` into the active reply input.
    pub fn insert_text(&mut self, text: &str) {
        let target = resolve_target(
            &self.dom,
            self.state.last_input,
            &self.selectors.reply_inputs,
        );
        let Some(field) = target else {
            warn!("no reply input to insert into");
            return;
        };
        match self.sync.begin(&mut self.dom, field, text) {
            Ok(progress) => self.apply_progress(progress),
            Err(err) => warn!(%field, "insertion rejected: {err}"),
        }
    }

    fn classifier(&self) -> ContextClassifier<'_> {
        ContextClassifier::new(&self.selectors, &self.config.detail_path_segment)
    }

    fn is_reply_input(&self, node: NodeId) -> bool {
        self.selectors
            .reply_inputs
            .iter()
            .any(|selector| self.dom.matches(node, selector))
    }

    fn arm_timers(&mut self) {
        let timings = &self.config.timings;
        for (attempt, delay_ms) in timings.startup_backoff_ms.iter().enumerate() {
            self.scheduler
                .schedule(*delay_ms, Task::StartupReconcile { attempt });
        }
        self.scheduler
            .schedule(timings.health_check_interval_ms, Task::HealthCheck);
    }

    /// Tears down every page-bound piece of state when the path changed.
    /// Returns whether a reset happened.
    fn check_navigation(&mut self) -> bool {
        let path = self.dom.location_path();
        if self.watcher.observe(&path).is_none() {
            return false;
        }

        let cancelled = self.scheduler.cancel_all();
        self.sync.reset();
        let classifier = ContextClassifier::new(&self.selectors, &self.config.detail_path_segment);
        let removed = Reconciler::new(classifier, &self.selectors.button)
            .remove_all(&mut self.dom, &mut self.state);
        self.metrics.record_buttons_removed(removed.len());
        self.state.reset();
        self.panel.reset(&mut self.dom);
        self.metrics.record_navigation_reset();
        info!(path = %path, cancelled, removed = removed.len(), "session reset after navigation");

        self.arm_timers();
        true
    }

    fn run_task(&mut self, task: Task) {
        match task {
            Task::Reconcile => self.reconcile(),
            Task::StartupReconcile { attempt } => {
                if !button_is_live(&self.dom, &self.state) {
                    debug!(attempt, "startup retry");
                    self.reconcile();
                }
            }
            Task::HealthCheck => {
                if !button_is_live(&self.dom, &self.state) {
                    if self.state.button_present() {
                        info!("overlay button vanished; rebuilding");
                    }
                    self.reconcile();
                }
                self.scheduler.schedule(
                    self.config.timings.health_check_interval_ms,
                    Task::HealthCheck,
                );
            }
            Task::DismissPanel => self.panel.hide(&mut self.dom),
            Task::Insert(step) => {
                let submit = self.classifier().find_any_primary_action(&self.dom);
                let progress = self.sync.step(&mut self.dom, step, submit);
                self.apply_progress(progress);
            }
        }
    }

    fn reconcile(&mut self) {
        let classifier = ContextClassifier::new(&self.selectors, &self.config.detail_path_segment);
        let report = Reconciler::new(classifier, &self.selectors.button).reconcile(
            &mut self.dom,
            &mut self.state,
            self.settings.enabled,
        );
        debug!(outcome = ?report.outcome, removed = report.removed.len(), "reconciled");

        self.metrics.record_buttons_removed(report.removed.len());
        if let ReconcileOutcome::Inserted(_) = report.outcome {
            self.metrics.record_button_inserted();
        }
        let source = self.panel.state().source_button;
        if source.is_some_and(|source| report.removed.contains(&source)) {
            self.panel.hide(&mut self.dom);
        }
    }

    fn handle_click(&mut self, target: NodeId) -> bool {
        if is_button_target(&self.dom, &self.state, target) {
            self.toggle_panel();
            return true;
        }

        if self.panel.contains(&self.dom, target) {
            if let Some(text) = self.panel.action_text(&self.dom, target) {
                self.panel.hide(&mut self.dom);
                self.insert_text(&text);
            }
            return true;
        }

        if self.panel.is_visible() {
            self.panel.hide(&mut self.dom);
        }
        false
    }

    fn handle_key(&mut self, target: Option<NodeId>, key: &str) -> bool {
        match key {
            "Escape" if self.panel.is_visible() => {
                self.panel.hide(&mut self.dom);
                true
            }
            "Enter" | " " => match target {
                Some(target) if is_button_target(&self.dom, &self.state, target) => {
                    self.toggle_panel();
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn open_panel(&mut self, button: OverlayButton) {
        let input = self.classifier().find_reply_input(&self.dom);
        let button_rect = self.dom.bounding_rect(button.node);
        let anchor = if is_visible(&self.dom, button.node) {
            button_rect
        } else {
            input
                .map(|input| self.dom.bounding_rect(input))
                .unwrap_or(button_rect)
        };

        let mut excluded = vec![button.node];
        excluded.extend(self.panel.node());
        excluded.extend(input);
        let path = self.dom.location_path();
        let extraction = self.extractor.extract(
            &self.dom,
            &ExtractionInput {
                anchor,
                anchor_node: Some(button.node),
                excluded: &excluded,
                view_mode: self.classifier().view_mode(&self.dom),
                path: &path,
            },
        );
        self.metrics
            .record_extraction(extraction.method, extraction.elapsed_ms);

        let processed = transform(self.settings.process_mode, &extraction.text);
        let content = PanelContent {
            extraction,
            processed,
        };
        if let Err(err) = self.panel.show(&mut self.dom, anchor, &button, content) {
            warn!(context = %button.context_id, "failed to show panel: {err}");
            self.panel.hide(&mut self.dom);
        }
    }

    fn apply_progress(&mut self, progress: Progress) {
        if let Some(outcome) = progress.finished {
            self.metrics.record_insertion(outcome);
        }
        if let Some(next) = progress.next {
            self.scheduler.schedule(next.delay_ms, Task::Insert(next.step));
        }
    }
}
