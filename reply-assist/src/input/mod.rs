pub mod injector;
pub mod protocol;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Timings;
use crate::dom::{DomError, HostDom, NodeId, Selector, SyntheticEvent, first_visible, is_visible};

pub use injector::FieldWriter;
pub use protocol::{EventProtocol, HostCompositionProtocol};

pub const MAX_TEXT_LENGTH: usize = 10_000;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("node {0} is not an editable field")]
    NotEditable(NodeId),
    #[error("host rejected the write: {0}")]
    Dom(#[from] DomError),
    #[error("invalid text: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("text exceeds maximum length of {MAX_TEXT_LENGTH} characters")]
    TooLong,
}

/// Removes control characters other than whitespace. Over-long text is
/// rejected rather than truncated.
pub fn validate_text(text: &str) -> Result<String, ValidationError> {
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ValidationError::TooLong);
    }

    Ok(text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect())
}

/// The field an insertion writes into: the last focused reply input while it
/// is still live, otherwise the first visible reply input.
pub fn resolve_target<D: HostDom + ?Sized>(
    dom: &D,
    last_focused: Option<NodeId>,
    reply_inputs: &[Selector],
) -> Option<NodeId> {
    last_focused
        .filter(|field| is_visible(dom, *field))
        .or_else(|| first_visible(dom, reply_inputs))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InsertPhase {
    Writing,
    Verifying,
    Retrying,
    Succeeded,
    GivenUp,
}

/// Attempt lifecycle of one insertion.
///
/// `Writing -> Verifying -> Succeeded`, or `Verifying -> Retrying -> Writing`
/// while attempts remain, and `Verifying -> GivenUp` once they are spent.
/// Calls that do not fit the current phase leave it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionAttempts {
    phase: InsertPhase,
    attempt: u32,
    max: u32,
}

impl InsertionAttempts {
    pub fn new(max: u32) -> Self {
        Self {
            phase: InsertPhase::Writing,
            attempt: 1,
            max: max.max(1),
        }
    }

    pub fn phase(&self) -> InsertPhase {
        self.phase
    }

    /// 1-based number of the current attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, InsertPhase::Succeeded | InsertPhase::GivenUp)
    }

    pub fn written(&mut self) -> InsertPhase {
        if self.phase == InsertPhase::Writing {
            self.phase = InsertPhase::Verifying;
        }
        self.phase
    }

    pub fn verified(&mut self, matched: bool) -> InsertPhase {
        if self.phase == InsertPhase::Verifying {
            self.phase = if matched {
                InsertPhase::Succeeded
            } else if self.attempt >= self.max {
                InsertPhase::GivenUp
            } else {
                InsertPhase::Retrying
            };
        }
        self.phase
    }

    pub fn retry(&mut self) -> InsertPhase {
        if self.phase == InsertPhase::Retrying {
            self.attempt += 1;
            self.phase = InsertPhase::Writing;
        }
        self.phase
    }
}

/// Follow-up work for an insertion; stale steps from a superseded insertion
/// are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    Dispatch { session: u64, index: usize },
    Verify { session: u64 },
    UnlockSubmit { session: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub delay_ms: u64,
    pub step: SyncStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum InsertOutcome {
    Succeeded { attempts: u32 },
    GaveUp { attempts: u32 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub next: Option<Scheduled>,
    pub finished: Option<InsertOutcome>,
}

impl Progress {
    fn then(delay_ms: u64, step: SyncStep) -> Self {
        Self {
            next: Some(Scheduled { delay_ms, step }),
            finished: None,
        }
    }
}

#[derive(Debug)]
struct Insertion {
    session: u64,
    field: NodeId,
    text: String,
    events: Vec<SyntheticEvent>,
    attempts: InsertionAttempts,
}

/// Writes text into a host field and replays events until the host agrees
/// the field holds it.
pub struct InsertionSynchronizer<P = HostCompositionProtocol> {
    protocol: P,
    writer: FieldWriter,
    stagger_ms: u64,
    verify_delay_ms: u64,
    unlock_delay_ms: u64,
    max_attempts: u32,
    reply_inputs: Vec<Selector>,
    active: Option<Insertion>,
    next_session: u64,
}

impl InsertionSynchronizer<HostCompositionProtocol> {
    pub fn new(timings: &Timings) -> Self {
        Self::with_protocol(HostCompositionProtocol, timings)
    }
}

impl<P: EventProtocol> InsertionSynchronizer<P> {
    pub fn with_protocol(protocol: P, timings: &Timings) -> Self {
        Self {
            protocol,
            writer: FieldWriter,
            stagger_ms: timings.event_stagger_ms,
            verify_delay_ms: timings.verify_delay_ms,
            unlock_delay_ms: timings.unlock_delay_ms,
            max_attempts: timings.max_insert_attempts,
            reply_inputs: Vec::new(),
            active: None,
            next_session: 0,
        }
    }

    /// Selectors used to find the live reply input again when the host
    /// replaced the field between attempts.
    pub fn with_reply_inputs(mut self, reply_inputs: Vec<Selector>) -> Self {
        self.reply_inputs = reply_inputs;
        self
    }

    pub fn phase(&self) -> Option<InsertPhase> {
        self.active.as_ref().map(|insertion| insertion.attempts.phase())
    }

    pub fn target(&self) -> Option<NodeId> {
        self.active.as_ref().map(|insertion| insertion.field)
    }

    /// Drops any insertion in flight. Its pending steps become no-ops.
    pub fn reset(&mut self) {
        self.active = None;
    }

    /// Starts a new insertion into `field`, superseding any in flight. The
    /// first write and first event happen immediately.
    pub fn begin<D: HostDom + ?Sized>(
        &mut self,
        dom: &mut D,
        field: NodeId,
        text: &str,
    ) -> Result<Progress, InputError> {
        let text = validate_text(text)?;
        if text.trim().is_empty() {
            debug!("nothing to insert");
            return Ok(Progress::default());
        }

        self.next_session += 1;
        let session = self.next_session;
        let events = self.protocol.insertion_events(&text);
        info!(%field, session, chars = text.chars().count(), "inserting text");

        self.active = Some(Insertion {
            session,
            field,
            text,
            events,
            attempts: InsertionAttempts::new(self.max_attempts),
        });
        Ok(self.write_attempt(dom))
    }

    /// Runs one scheduled step. `submit` is the host's primary action
    /// control, consulted only when unlocking.
    pub fn step<D: HostDom + ?Sized>(
        &mut self,
        dom: &mut D,
        step: SyncStep,
        submit: Option<NodeId>,
    ) -> Progress {
        let session = match step {
            SyncStep::Dispatch { session, .. }
            | SyncStep::Verify { session }
            | SyncStep::UnlockSubmit { session } => session,
        };
        if self.active.as_ref().map(|insertion| insertion.session) != Some(session) {
            debug!(session, "dropping step of superseded insertion");
            return Progress::default();
        }

        match step {
            SyncStep::Dispatch { index, .. } => self.dispatch_from(dom, index),
            SyncStep::Verify { .. } => self.verify(dom),
            SyncStep::UnlockSubmit { .. } => {
                self.unlock_submit(dom, submit);
                Progress::default()
            }
        }
    }

    fn write_attempt<D: HostDom + ?Sized>(&mut self, dom: &mut D) -> Progress {
        let Some(insertion) = self.active.as_ref() else {
            return Progress::default();
        };
        if let Err(err) = self.writer.write(dom, insertion.field, &insertion.text) {
            warn!(
                field = %insertion.field,
                attempt = insertion.attempts.attempt(),
                "write attempt failed: {err}"
            );
        }
        self.dispatch_from(dom, 0)
    }

    fn dispatch_from<D: HostDom + ?Sized>(&mut self, dom: &mut D, index: usize) -> Progress {
        let Some(insertion) = self.active.as_mut() else {
            return Progress::default();
        };
        if let Some(event) = insertion.events.get(index) {
            if let Err(err) = dom.dispatch(insertion.field, event) {
                warn!(field = %insertion.field, "synthetic event not delivered: {err}");
            }
        }

        if index + 1 < insertion.events.len() {
            return Progress::then(
                self.stagger_ms,
                SyncStep::Dispatch {
                    session: insertion.session,
                    index: index + 1,
                },
            );
        }
        insertion.attempts.written();
        Progress::then(
            self.verify_delay_ms,
            SyncStep::Verify {
                session: insertion.session,
            },
        )
    }

    fn verify<D: HostDom + ?Sized>(&mut self, dom: &mut D) -> Progress {
        let Some(insertion) = self.active.as_mut() else {
            return Progress::default();
        };
        let matched = self.writer.holds(dom, insertion.field, &insertion.text);
        let attempt = insertion.attempts.attempt();

        let outcome = match insertion.attempts.verified(matched) {
            InsertPhase::Succeeded => {
                info!(attempt, "insertion verified");
                InsertOutcome::Succeeded { attempts: attempt }
            }
            InsertPhase::GivenUp => {
                warn!(attempts = attempt, "field never held the inserted text; giving up");
                InsertOutcome::GaveUp { attempts: attempt }
            }
            InsertPhase::Retrying => {
                debug!(attempt, "field does not hold the inserted text; retrying");
                insertion.attempts.retry();
                match resolve_target(dom, Some(insertion.field), &self.reply_inputs) {
                    Some(field) if field != insertion.field => {
                        info!(from = %insertion.field, to = %field, "host replaced the field; retargeting");
                        insertion.field = field;
                    }
                    _ => {}
                }
                return self.write_attempt(dom);
            }
            InsertPhase::Writing | InsertPhase::Verifying => return Progress::default(),
        };

        for event in self.protocol.unlock_events(&insertion.text) {
            if let Err(err) = dom.dispatch(insertion.field, &event) {
                warn!(field = %insertion.field, "unlock event not delivered: {err}");
            }
        }

        let mut progress = Progress::then(
            self.unlock_delay_ms,
            SyncStep::UnlockSubmit {
                session: insertion.session,
            },
        );
        progress.finished = Some(outcome);
        progress
    }

    fn unlock_submit<D: HostDom + ?Sized>(&mut self, dom: &mut D, submit: Option<NodeId>) {
        self.active = None;
        let Some(submit) = submit else {
            debug!("no submit control to unlock");
            return;
        };
        if !dom.is_disabled(submit) {
            return;
        }

        if let Err(err) = dom.set_disabled(submit, false) {
            warn!(%submit, "failed to enable submit control: {err}");
            return;
        }
        for event in self.protocol.submit_events() {
            if let Err(err) = dom.dispatch(submit, &event) {
                warn!(%submit, "submit event not delivered: {err}");
            }
        }
        info!(%submit, "submit control force-enabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{EventKind, MemoryDom};
    use crate::geometry::{Rect, Size};

    /// Runs the insertion to completion, returning the elapsed virtual time.
    fn drive(
        sync: &mut InsertionSynchronizer,
        dom: &mut MemoryDom,
        mut progress: Progress,
        submit: Option<NodeId>,
    ) -> (u64, Option<InsertOutcome>) {
        let mut elapsed = 0;
        let mut finished = progress.finished;
        while let Some(next) = progress.next {
            elapsed += next.delay_ms;
            progress = sync.step(dom, next.step, submit);
            finished = finished.or(progress.finished);
        }
        (elapsed, finished)
    }

    fn page() -> (MemoryDom, NodeId, NodeId) {
        let mut dom = MemoryDom::new("/home", Size::new(1280.0, 800.0));
        let body = dom.body();
        let field = dom.element(body, "div", &[("contenteditable", "true")]);
        let submit = dom.element(body, "button", &[("aria-disabled", "true")]);
        dom.set_rect(field, Rect::new(0.0, 0.0, 400.0, 40.0));
        (dom, field, submit)
    }

    #[test]
    fn validation_strips_controls_and_rejects_long_text() {
        assert_eq!(validate_text("a\u{7}b\tc\n").unwrap(), "ab\tc\n");
        let long = "x".repeat(MAX_TEXT_LENGTH + 1);
        assert_eq!(validate_text(&long), Err(ValidationError::TooLong));
    }

    #[test]
    fn attempts_walk_through_retry_to_give_up() {
        let mut attempts = InsertionAttempts::new(3);
        for expected in 1..=2 {
            assert_eq!(attempts.attempt(), expected);
            assert_eq!(attempts.written(), InsertPhase::Verifying);
            assert_eq!(attempts.verified(false), InsertPhase::Retrying);
            assert_eq!(attempts.retry(), InsertPhase::Writing);
        }
        attempts.written();
        assert_eq!(attempts.verified(false), InsertPhase::GivenUp);
        assert!(attempts.is_finished());
        assert_eq!(attempts.retry(), InsertPhase::GivenUp);
        assert_eq!(attempts.attempt(), 3);
    }

    #[test]
    fn verification_success_finishes_first_attempt() {
        let mut attempts = InsertionAttempts::new(3);
        assert_eq!(attempts.verified(true), InsertPhase::Writing);
        attempts.written();
        assert_eq!(attempts.verified(true), InsertPhase::Succeeded);
    }

    #[test]
    fn successful_insertion_replays_sequence_and_unlocks() {
        let (mut dom, field, submit) = page();
        dom.bind_submit(field, submit);
        let mut sync = InsertionSynchronizer::new(&Timings::default());

        let progress = sync.begin(&mut dom, field, "Hello world").unwrap();
        let (elapsed, outcome) = drive(&mut sync, &mut dom, progress, Some(submit));

        assert_eq!(outcome, Some(InsertOutcome::Succeeded { attempts: 1 }));
        assert_eq!(dom.text_content(field), "Hello world");
        assert_eq!(
            dom.dispatched_on(field),
            vec![
                EventKind::BeforeInput,
                EventKind::Input,
                EventKind::Change,
                EventKind::KeyDown,
                EventKind::KeyUp,
                EventKind::Input,
                EventKind::Change,
            ]
        );
        // 4 staggers, the verification delay, then the unlock delay.
        assert_eq!(elapsed, 4 * 10 + 50 + 100);
        // The host unlocked the control itself, so nothing is forced.
        assert!(!dom.is_disabled(submit));
        assert!(dom.dispatched_on(submit).is_empty());
        assert_eq!(sync.phase(), None);
    }

    #[test]
    fn reverting_field_is_written_three_times_then_given_up() {
        let (mut dom, field, submit) = page();
        dom.revert_writes(field);
        let mut sync = InsertionSynchronizer::new(&Timings::default());

        let progress = sync.begin(&mut dom, field, "Hello world").unwrap();
        let (_, outcome) = drive(&mut sync, &mut dom, progress, Some(submit));

        assert_eq!(dom.write_count(field), 3);
        assert_eq!(outcome, Some(InsertOutcome::GaveUp { attempts: 3 }));
        // The submit control is still forced open after giving up.
        assert!(!dom.is_disabled(submit));
        assert_eq!(dom.dispatched_on(submit), vec![EventKind::Change]);
    }

    fn composer(dom: &mut MemoryDom) -> NodeId {
        let body = dom.body();
        let field = dom.element(
            body,
            "div",
            &[("data-testid", "tweetTextarea_0"), ("contenteditable", "true")],
        );
        dom.set_rect(field, Rect::new(0.0, 0.0, 400.0, 40.0));
        field
    }

    fn composer_sync() -> InsertionSynchronizer {
        let inputs = vec![Selector::parse(r#"[data-testid="tweetTextarea_0"]"#).unwrap()];
        InsertionSynchronizer::new(&Timings::default()).with_reply_inputs(inputs)
    }

    #[test]
    fn rerendered_field_is_retargeted_on_retry() {
        let mut dom = MemoryDom::new("/home", Size::new(1280.0, 800.0));
        let stale = composer(&mut dom);
        let mut sync = composer_sync();

        let progress = sync.begin(&mut dom, stale, "Thank you").unwrap();
        // The host swaps the composer for a fresh node mid-insertion.
        dom.remove(stale);
        let fresh = composer(&mut dom);
        let (_, outcome) = drive(&mut sync, &mut dom, progress, None);

        assert_eq!(outcome, Some(InsertOutcome::Succeeded { attempts: 2 }));
        assert_eq!(dom.text_content(fresh), "Thank you");
        assert_eq!(dom.write_count(stale), 1);
        assert_eq!(dom.write_count(fresh), 1);
    }

    #[test]
    fn detached_field_without_replacement_is_never_a_success() {
        let mut dom = MemoryDom::new("/home", Size::new(1280.0, 800.0));
        let field = composer(&mut dom);
        let mut sync = composer_sync();

        let progress = sync.begin(&mut dom, field, "Thank you").unwrap();
        dom.remove(field);
        let (_, outcome) = drive(&mut sync, &mut dom, progress, None);

        assert_eq!(outcome, Some(InsertOutcome::GaveUp { attempts: 3 }));
        assert_eq!(dom.write_count(field), 3);
    }

    #[test]
    fn superseded_steps_are_ignored() {
        let (mut dom, field, _) = page();
        let mut sync = InsertionSynchronizer::new(&Timings::default());

        let stale = sync.begin(&mut dom, field, "first").unwrap().next.unwrap();
        sync.begin(&mut dom, field, "second").unwrap();
        let progress = sync.step(&mut dom, stale.step, None);

        assert_eq!(progress, Progress::default());
        assert_eq!(dom.text_content(field), "second");
    }

    #[test]
    fn blank_text_is_a_no_op() {
        let (mut dom, field, _) = page();
        let mut sync = InsertionSynchronizer::new(&Timings::default());
        let progress = sync.begin(&mut dom, field, "  \u{7} ").unwrap();
        assert_eq!(progress, Progress::default());
        assert_eq!(dom.write_count(field), 0);
    }

    #[test]
    fn target_prefers_live_last_focused_input() {
        let (mut dom, field, _) = page();
        let body = dom.body();
        let other = dom.element(body, "textarea", &[("data-testid", "tweetTextarea_0")]);
        dom.set_rect(other, Rect::new(0.0, 100.0, 400.0, 40.0));
        let inputs = vec![Selector::parse(r#"[data-testid="tweetTextarea_0"]"#).unwrap()];

        assert_eq!(resolve_target(&dom, Some(field), &inputs), Some(field));
        dom.remove(field);
        assert_eq!(resolve_target(&dom, Some(field), &inputs), Some(other));
        assert_eq!(resolve_target(&dom, None, &inputs), Some(other));
    }
}
