//! Decides whether the overlay button should exist and where.
//!
//! A pass is idempotent: running it twice against an unchanged page leaves
//! the page untouched the second time.

use tracing::{debug, info, warn};

use crate::classifier::{ContextClassifier, ReplyContext};
use crate::config::{BUTTON_CONTEXT_ATTR, BUTTON_MARKER_ATTR};
use crate::dom::{DomError, HostDom, NodeId, Selector};
use crate::state::{OverlayButton, SessionState};

const BUTTON_LABEL: &str = "+";
const BUTTON_ARIA_LABEL: &str = "Open quick replies";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Overlay switched off in settings.
    Disabled,
    /// No visible reply input.
    Absent,
    /// The existing button is still valid.
    Kept,
    /// A reply input exists but no container resolved; retried next pass.
    NoContainer,
    Inserted(OverlayButton),
    /// Building the button failed; retried next pass.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub outcome: ReconcileOutcome,
    /// Button nodes detached during the pass.
    pub removed: Vec<NodeId>,
}

pub struct Reconciler<'a> {
    classifier: ContextClassifier<'a>,
    button_selector: &'a Selector,
}

impl<'a> Reconciler<'a> {
    pub fn new(classifier: ContextClassifier<'a>, button_selector: &'a Selector) -> Self {
        Self {
            classifier,
            button_selector,
        }
    }

    pub fn reconcile<D: HostDom + ?Sized>(
        &self,
        dom: &mut D,
        state: &mut SessionState,
        enabled: bool,
    ) -> ReconcileReport {
        if !enabled {
            let removed = self.remove_all(dom, state);
            return report(ReconcileOutcome::Disabled, removed);
        }

        if self.classifier.find_reply_input(dom).is_none() {
            let removed = self.remove_all(dom, state);
            if !removed.is_empty() {
                info!(count = removed.len(), "reply context gone; button removed");
            }
            return report(ReconcileOutcome::Absent, removed);
        }

        let view_mode = self.classifier.view_mode(dom);
        let context = self.classifier.classify(dom);

        let live = state.button.is_some_and(|button| {
            dom.is_connected(button.node)
                && dom.is_connected(button.container)
                && context.is_none_or(|context| context.container == button.container)
        });
        if live && state.view_mode == Some(view_mode) {
            let removed = self.remove_strays(dom, state);
            return report(ReconcileOutcome::Kept, removed);
        }

        let Some(context) = context else {
            debug!("reply input has no resolvable container yet");
            return report(ReconcileOutcome::NoContainer, Vec::new());
        };

        let removed = self.remove_all(dom, state);
        match self.insert(dom, state, &context) {
            Ok(button) => {
                info!(
                    button = %button.node,
                    context = %button.context_id,
                    container = %button.container,
                    view_mode = ?context.view_mode,
                    "overlay button inserted"
                );
                state.button = Some(button);
                state.view_mode = Some(context.view_mode);
                report(ReconcileOutcome::Inserted(button), removed)
            }
            Err(err) => {
                warn!("failed to insert overlay button: {err}");
                report(ReconcileOutcome::Failed, removed)
            }
        }
    }

    /// Detaches every button instance on the page, tracked or not.
    pub fn remove_all<D: HostDom + ?Sized>(
        &self,
        dom: &mut D,
        state: &mut SessionState,
    ) -> Vec<NodeId> {
        let mut removed = dom.query_all(self.button_selector);
        if let Some(button) = state.button.take() {
            if !removed.contains(&button.node) && dom.is_connected(button.node) {
                removed.push(button.node);
            }
        }
        for node in &removed {
            dom.remove(*node);
        }
        state.view_mode = None;
        removed
    }

    /// Copies of the button the host cloned or re-rendered.
    fn remove_strays<D: HostDom + ?Sized>(
        &self,
        dom: &mut D,
        state: &SessionState,
    ) -> Vec<NodeId> {
        let current = state.button.map(|button| button.node);
        let strays: Vec<NodeId> = dom
            .query_all(self.button_selector)
            .into_iter()
            .filter(|node| Some(*node) != current)
            .collect();
        for node in &strays {
            dom.remove(*node);
        }
        if !strays.is_empty() {
            debug!(count = strays.len(), "removed stray button copies");
        }
        strays
    }

    fn insert<D: HostDom + ?Sized>(
        &self,
        dom: &mut D,
        state: &mut SessionState,
        context: &ReplyContext,
    ) -> Result<OverlayButton, DomError> {
        let context_id = state.next_context_id();
        let node = dom.create_element("div");
        dom.set_attribute(node, BUTTON_MARKER_ATTR, "true")?;
        dom.set_attribute(node, BUTTON_CONTEXT_ATTR, &context_id.to_string())?;
        dom.set_attribute(node, "role", "button")?;
        dom.set_attribute(node, "tabindex", "0")?;
        dom.set_attribute(node, "aria-label", BUTTON_ARIA_LABEL)?;
        dom.set_text(node, BUTTON_LABEL)?;

        let before = self
            .classifier
            .find_primary_action_in(dom, context.container);
        match before {
            Some(action) => dom.insert_before(action, node)?,
            None => dom.append_child(context.container, node)?,
        }

        Ok(OverlayButton {
            node,
            context_id,
            container: context.container,
        })
    }
}

fn report(outcome: ReconcileOutcome, removed: Vec<NodeId>) -> ReconcileReport {
    ReconcileReport { outcome, removed }
}

/// Whether the tracked button is still attached.
pub fn button_is_live<D: HostDom + ?Sized>(dom: &D, state: &SessionState) -> bool {
    state
        .button
        .is_some_and(|button| dom.is_connected(button.node))
}

/// Whether `node` lies inside the tracked button.
pub fn is_button_target<D: HostDom + ?Sized>(dom: &D, state: &SessionState, node: NodeId) -> bool {
    state
        .button
        .is_some_and(|button| dom.contains(button.node, node))
}
