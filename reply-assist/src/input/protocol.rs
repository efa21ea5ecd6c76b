use crate::dom::{EventKind, SyntheticEvent};

/// The synthetic event sequences a host needs to notice a programmatic write.
pub trait EventProtocol {
    /// Replayed after every write attempt, one event per stagger interval.
    fn insertion_events(&self, text: &str) -> Vec<SyntheticEvent>;
    /// Replayed on the field once the write cycle is over.
    fn unlock_events(&self, text: &str) -> Vec<SyntheticEvent>;
    /// Dispatched on a submit control after force-enabling it.
    fn submit_events(&self) -> Vec<SyntheticEvent>;
}

/// Mimics an IME composition commit: input events carry the inserted text
/// and the key events report the `Process` key with keyCode 229.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCompositionProtocol;

const COMPOSITION_KEY: &str = "Process";
const COMPOSITION_KEY_CODE: u32 = 229;
const INSERT_TEXT: &str = "insertText";

fn text_event(kind: EventKind, text: &str, cancelable: bool) -> SyntheticEvent {
    SyntheticEvent {
        cancelable,
        input_type: Some(INSERT_TEXT.to_string()),
        data: Some(text.to_string()),
        ..SyntheticEvent::bubbling(kind)
    }
}

fn key_event(kind: EventKind) -> SyntheticEvent {
    SyntheticEvent {
        cancelable: true,
        key: Some(COMPOSITION_KEY.to_string()),
        key_code: Some(COMPOSITION_KEY_CODE),
        ..SyntheticEvent::bubbling(kind)
    }
}

impl EventProtocol for HostCompositionProtocol {
    fn insertion_events(&self, text: &str) -> Vec<SyntheticEvent> {
        vec![
            text_event(EventKind::BeforeInput, text, true),
            text_event(EventKind::Input, text, false),
            SyntheticEvent::bubbling(EventKind::Change),
            key_event(EventKind::KeyDown),
            key_event(EventKind::KeyUp),
        ]
    }

    fn unlock_events(&self, text: &str) -> Vec<SyntheticEvent> {
        vec![
            text_event(EventKind::Input, text, false),
            SyntheticEvent::bubbling(EventKind::Change),
        ]
    }

    fn submit_events(&self) -> Vec<SyntheticEvent> {
        vec![SyntheticEvent::bubbling(EventKind::Change)]
    }
}
