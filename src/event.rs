use std::sync::Mutex;

/// Events exposed by the viewer.
///
/// `Load` fires once, after the initial windowing pass. `PageChanged` fires
/// whenever the computed current page differs from the previous value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    Load,
    PageChanged { current_page: usize },
}

/// Token returned by listener registration; removal is by token because
/// closures carry no identity. Registration under an unknown event name
/// returns the null token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    Load,
    PageChanged,
}

impl EventKind {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "load" => Some(Self::Load),
            "pagechanged" => Some(Self::PageChanged),
            _ => None,
        }
    }
}

type Handler = Box<dyn FnMut(&ViewerEvent) + Send>;

#[derive(Default)]
pub(crate) struct EventRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    load: Vec<(ListenerId, Handler)>,
    page_changed: Vec<(ListenerId, Handler)>,
    // Removals requested while the target list is out for emission.
    pending_removals: Vec<ListenerId>,
}

impl EventRegistry {
    pub(crate) fn add(&self, name: &str, handler: Handler) -> ListenerId {
        let Some(kind) = EventKind::from_name(name) else {
            return ListenerId::none();
        };

        let mut inner = self.lock();
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        match kind {
            EventKind::Load => inner.load.push((id, handler)),
            EventKind::PageChanged => inner.page_changed.push((id, handler)),
        }
        id
    }

    pub(crate) fn remove(&self, name: &str, id: ListenerId) {
        if EventKind::from_name(name).is_none() || id.is_none() {
            return;
        }

        let mut inner = self.lock();
        let before = inner.load.len() + inner.page_changed.len();
        inner.load.retain(|(listener, _)| *listener != id);
        inner.page_changed.retain(|(listener, _)| *listener != id);
        if inner.load.len() + inner.page_changed.len() == before {
            inner.pending_removals.push(id);
        }
    }

    /// Fires `load` and drops its handlers; handlers registered afterwards
    /// are never called.
    pub(crate) fn emit_load(&self) {
        let mut handlers = std::mem::take(&mut self.lock().load);
        for (_, handler) in handlers.iter_mut() {
            handler(&ViewerEvent::Load);
        }
    }

    pub(crate) fn emit_page_changed(&self, current_page: usize) {
        // Handlers run outside the registry lock so they may re-enter the
        // viewer; the list is taken, called, and merged back afterwards.
        let mut handlers = std::mem::take(&mut self.lock().page_changed);
        let event = ViewerEvent::PageChanged { current_page };
        for (_, handler) in handlers.iter_mut() {
            handler(&event);
        }

        let mut inner = self.lock();
        let added = std::mem::take(&mut inner.page_changed);
        let removed = std::mem::take(&mut inner.pending_removals);
        handlers.retain(|(id, _)| !removed.contains(id));
        handlers.extend(added);
        inner.page_changed = handlers;
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.lock();
        inner.load.clear();
        inner.page_changed.clear();
        inner.pending_removals.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::{EventRegistry, ListenerId, ViewerEvent};

    fn recorded() -> (Arc<Mutex<Vec<ViewerEvent>>>, impl FnMut(&ViewerEvent) + Send) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |event: &ViewerEvent| {
            sink.lock().expect("log should lock").push(event.clone());
        })
    }

    #[test]
    fn unknown_event_name_returns_null_token() {
        let registry = EventRegistry::default();
        let id = registry.add("scrollend", Box::new(|_| {}));
        assert!(id.is_none());

        // Removal under an unknown name is a benign no-op as well.
        registry.remove("scrollend", ListenerId::none());
    }

    #[test]
    fn page_changed_reaches_registered_handlers_with_payload() {
        let registry = EventRegistry::default();
        let (log, handler) = recorded();
        registry.add("pagechanged", Box::new(handler));

        registry.emit_page_changed(3);

        assert_eq!(
            log.lock().expect("log should lock").as_slice(),
            &[ViewerEvent::PageChanged { current_page: 3 }]
        );
    }

    #[test]
    fn load_handlers_are_drained_and_late_registrations_never_fire() {
        let registry = EventRegistry::default();
        let (log, handler) = recorded();
        registry.add("load", Box::new(handler));

        registry.emit_load();
        registry.emit_load();

        let (late_log, late_handler) = recorded();
        registry.add("load", Box::new(late_handler));
        registry.emit_page_changed(1);

        assert_eq!(log.lock().expect("log should lock").len(), 1);
        assert!(late_log.lock().expect("log should lock").is_empty());
    }

    #[test]
    fn removed_handler_stops_receiving_events() {
        let registry = EventRegistry::default();
        let (log, handler) = recorded();
        let id = registry.add("pagechanged", Box::new(handler));

        registry.emit_page_changed(1);
        registry.remove("pagechanged", id);
        registry.emit_page_changed(2);

        assert_eq!(log.lock().expect("log should lock").len(), 1);
    }

    #[test]
    fn handler_may_register_another_listener_while_emitting() {
        let registry = Arc::new(EventRegistry::default());
        let reentrant = Arc::clone(&registry);
        let (log, handler) = recorded();
        registry.add(
            "pagechanged",
            Box::new(move |_| {
                reentrant.add("pagechanged", Box::new(|_| {}));
            }),
        );
        registry.add("pagechanged", Box::new(handler));

        registry.emit_page_changed(5);
        registry.emit_page_changed(6);

        assert_eq!(log.lock().expect("log should lock").len(), 2);
    }
}
