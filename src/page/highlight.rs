use std::collections::HashMap;

use crate::ids::HighlightId;
use crate::surface::HighlightOverlay;

/// A highlight rectangle in intrinsic (unscaled) page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HighlightRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

pub(crate) struct Highlight {
    pub(crate) rect: HighlightRect,
    pub(crate) color: String,
    pub(crate) opacity: f32,
    /// Present only while the page is materialized; the rect/color/opacity
    /// source survives rerender and eviction.
    pub(crate) overlay: Option<Box<dyn HighlightOverlay>>,
}

/// Highlight definitions keyed by caller-opaque ids, independent of the
/// page's render state.
#[derive(Default)]
pub(crate) struct HighlightSet {
    entries: HashMap<HighlightId, Highlight>,
}

impl HighlightSet {
    pub(crate) fn insert(&mut self, rect: HighlightRect, color: &str, opacity: f32) -> HighlightId {
        let id = HighlightId::generate("hl");
        self.entries.insert(
            id.clone(),
            Highlight {
                rect,
                color: color.to_string(),
                opacity,
                overlay: None,
            },
        );
        id
    }

    pub(crate) fn get_mut(&mut self, id: &HighlightId) -> Option<&mut Highlight> {
        self.entries.get_mut(id)
    }

    pub(crate) fn ids(&self) -> Vec<HighlightId> {
        self.entries.keys().cloned().collect()
    }

    /// Detaches the overlay; with `delete_source` the definition is
    /// forgotten as well. Unknown ids are a no-op.
    pub(crate) fn remove(&mut self, id: &HighlightId, delete_source: bool) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        if let Some(mut overlay) = entry.overlay.take() {
            overlay.detach();
        }
        if delete_source {
            self.entries.remove(id);
        }
    }

    pub(crate) fn remove_all(&mut self, delete_source: bool) {
        for id in self.ids() {
            self.remove(&id, delete_source);
        }
    }

    pub(crate) fn detach_all(&mut self) {
        self.remove_all(false);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn attached_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.overlay.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::{HighlightRect, HighlightSet};
    use crate::ids::HighlightId;

    fn rect() -> HighlightRect {
        HighlightRect {
            x: 10.0,
            y: 10.0,
            width: 50.0,
            height: 20.0,
        }
    }

    #[test]
    fn insert_assigns_fresh_ids_and_keeps_sources() {
        let mut set = HighlightSet::default();
        let first = set.insert(rect(), "yellow", 0.5);
        let second = set.insert(rect(), "red", 0.3);

        assert_ne!(first, second);
        assert_eq!(set.len(), 2);
        assert_eq!(set.attached_count(), 0);
    }

    #[test]
    fn detach_all_keeps_definitions_while_remove_all_forgets_them() {
        let mut set = HighlightSet::default();
        set.insert(rect(), "yellow", 0.5);

        set.detach_all();
        assert_eq!(set.len(), 1);

        set.remove_all(true);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn removing_an_unknown_id_is_a_no_op() {
        let mut set = HighlightSet::default();
        set.insert(rect(), "yellow", 0.5);

        set.remove(&HighlightId::none(), true);
        assert_eq!(set.len(), 1);
    }
}
