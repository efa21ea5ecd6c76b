use tracing::warn;

use crate::dom::{FieldKind, HostDom, NodeId};
use crate::input::InputError;

/// Writes text straight into a host-owned field, bypassing the host's own
/// editing pipeline. The caller replays events afterwards.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldWriter;

impl FieldWriter {
    pub fn write<D: HostDom + ?Sized>(
        &self,
        dom: &mut D,
        field: NodeId,
        text: &str,
    ) -> Result<FieldKind, InputError> {
        let kind = dom.field_kind(field).ok_or(InputError::NotEditable(field))?;

        match kind {
            FieldKind::ContentEditable => {
                dom.set_text(field, text)?;
                dom.focus(field)?;
                // The host keeps its own selection model; a failed caret move
                // leaves the text in place.
                if let Err(err) = dom.collapse_selection_to_end(field) {
                    warn!(%field, "failed to move caret to end of field: {err}");
                }
            }
            FieldKind::Value => {
                dom.set_field_value(field, text)?;
                dom.focus(field)?;
                let end = text.chars().count();
                if let Err(err) = dom.set_selection_range(field, end, end) {
                    warn!(%field, "failed to place caret after inserted text: {err}");
                }
            }
        }

        Ok(kind)
    }

    /// Whether the field is still on the page and shows exactly `expected`.
    /// A detached field is never a match: the host re-rendered it and the
    /// user is looking at another node.
    pub fn holds<D: HostDom + ?Sized>(&self, dom: &D, field: NodeId, expected: &str) -> bool {
        dom.is_connected(field) && dom.field_text(field).is_some_and(|current| current == expected)
    }
}
