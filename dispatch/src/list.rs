use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::{ListId, Message, Observer, ObserverId, ObserverRef, SubjectId, lock};

/// The observers of one subject, in insertion order.
///
/// Observers live in a slot vector. Removing one tombstones its slot, so every
/// live [`ObserverIterator`] keeps valid indices and simply skips the hole; the
/// vector is compacted once no iterator is registered.
///
/// The registry owns the only long-lived `Arc`. A dispatch in progress holds its
/// own clone, so the list outlives an `unadvise` issued from inside its own
/// dispatch.
pub struct ObserverList {
    subject: SubjectId,
    state: Mutex<ListState>,
}

#[derive(Default)]
struct ListState {
    slots: Vec<Option<ObserverRef>>,
    live: usize,
    iterators: usize,
}

impl ListState {
    fn compact(&mut self) {
        if self.iterators == 0 && self.live != self.slots.len() {
            self.slots.retain(Option::is_some);
        }
    }

    fn tombstone(&mut self, index: usize) -> Option<ObserverRef> {
        let removed = self.slots.get_mut(index)?.take()?;
        self.live -= 1;
        Some(removed)
    }
}

impl ObserverList {
    pub fn new(subject: SubjectId) -> Self { Self { subject, state: Mutex::new(ListState::default()) } }

    pub fn subject(&self) -> SubjectId { self.subject }

    pub fn id(self: &Arc<Self>) -> ListId { ListId(Arc::as_ptr(self) as usize) }

    pub fn is_empty(&self) -> bool { lock(&self.state).live == 0 }

    pub fn len(&self) -> usize { lock(&self.state).live }

    /// Appends an observer. Adding the same observer twice is not checked.
    pub fn append(&self, observer: ObserverRef) {
        let mut state = lock(&self.state);
        state.slots.push(Some(observer));
        state.live += 1;
    }

    /// Removes the first occurrence of `observer`. Returns false if it was not present.
    ///
    /// Live iterators never yield the removed observer, even if it was the very next one.
    pub fn remove(&self, observer: ObserverId) -> bool {
        let mut state = lock(&self.state);
        let Some(index) = state.slots.iter().position(|slot| slot.as_ref().is_some_and(|o| o.id() == observer)) else {
            return false;
        };
        state.tombstone(index);
        if state.iterators > 0 {
            debug!(subject = %self.subject, %observer, "observer removed during iteration");
        }
        state.compact();
        true
    }

    pub fn contains(&self, observer: ObserverId) -> bool {
        lock(&self.state).slots.iter().flatten().any(|o| o.id() == observer)
    }

    /// Snapshot of the registered observers, in order
    pub fn observers(&self) -> Vec<ObserverRef> { lock(&self.state).slots.iter().flatten().cloned().collect() }

    pub fn iter(&self) -> ObserverIterator<'_> { ObserverIterator::new(self) }

    /// Notifies every observer in list order with `(subject, message)`.
    ///
    /// The caller's `Arc` keeps the list alive even if the registry lets go of it mid-dispatch.
    pub fn perform_signal(self: &Arc<Self>, message: &Message) {
        let mut notified = 0usize;
        for observer in self.iter() {
            observer.notify(Some(self.subject), message);
            notified += 1;
        }
        trace!(subject = %self.subject, message = message.id(), notified, "signal performed");

        if Arc::strong_count(self) == 1 {
            debug!(subject = %self.subject, "observer list released during perform_signal");
        }
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList").field("subject", &self.subject).field("observers", &self.len()).finish()
    }
}

/// Cursor over an [`ObserverList`] that stays valid while observers are removed.
///
/// Registered with its list for its whole lifetime. Yields each live observer
/// once, in insertion order; observers removed (or dropped) before the cursor
/// reaches them are never yielded. Observers appended during iteration are.
pub struct ObserverIterator<'a> {
    list: &'a ObserverList,
    next: usize,
    done: bool,
}

impl<'a> ObserverIterator<'a> {
    pub fn new(list: &'a ObserverList) -> Self {
        lock(&list.state).iterators += 1;
        Self { list, next: 0, done: false }
    }
}

impl Iterator for ObserverIterator<'_> {
    type Item = Arc<dyn Observer>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut state = lock(&self.list.state);
        while self.next < state.slots.len() {
            if state.live == 0 {
                break;
            }
            let index = self.next;
            self.next += 1;
            let Some(reference) = state.slots[index].clone() else { continue };
            match reference.upgrade() {
                Some(observer) => return Some(observer),
                None => {
                    // dropped without unadvise
                    debug!(subject = %self.list.subject, observer = %reference.id(), "pruning dropped observer");
                    state.tombstone(index);
                }
            }
        }
        self.done = true;
        None
    }
}

impl Drop for ObserverIterator<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.list.state);
        state.iterators -= 1;
        state.compact();
    }
}
