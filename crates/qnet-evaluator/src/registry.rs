//! Typed registrant lists.
//!
//! Fire-and-forget observer plumbing: the core never blocks on a registrant
//! and a slow callback only hurts its own delivery.

/// Handle returned by [`CallbackList::register`]; used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrantId(u64);

/// Ordered list of callbacks notified with a shared payload reference.
pub struct CallbackList<T> {
    next_id: u64,
    entries: Vec<(RegistrantId, Box<dyn Fn(&T) + Send>)>,
}

impl<T> CallbackList<T> {
    pub fn new() -> Self {
        CallbackList {
            next_id: 1,
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, callback: impl Fn(&T) + Send + 'static) -> RegistrantId {
        let id = RegistrantId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Box::new(callback)));
        id
    }

    /// Remove a registrant. Unknown ids are a no-op.
    pub fn unregister(&mut self, id: RegistrantId) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    pub fn notify(&self, payload: &T) {
        for (_, callback) in &self.entries {
            callback(payload);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Default for CallbackList<T> {
    fn default() -> Self {
        Self::new()
    }
}
