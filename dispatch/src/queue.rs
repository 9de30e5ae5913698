use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::trace;

use crate::callback::{CallbackKind, CallbackMessage, ExecutingKey, QueuedEntry, TargetKey};
use crate::{Message, ObserverId, ObserverList, ObserverRef, lock};

/// The pending-work queue shared by every subject and observer.
///
/// One FIFO of [`CallbackMessage`]s plus a stack of side-queues, one per active
/// `flush`, holding entries deferred during that pass. A single mutex guards all
/// of it and is never held while a callback runs.
#[derive(Default)]
pub(crate) struct CallbackQueue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<CallbackMessage>,
    drains: Vec<VecDeque<CallbackMessage>>,
    executing: Option<ExecutingKey>,
}

impl QueueState {
    fn entries_mut(&mut self) -> impl Iterator<Item = &mut CallbackMessage> {
        self.pending.iter_mut().chain(self.drains.iter_mut().flatten())
    }

    /// Removes every entry matching `predicate` from the main queue and all side-queues
    fn extract(&mut self, predicate: impl Fn(&CallbackMessage) -> bool) -> Vec<CallbackMessage> {
        let mut removed = Vec::new();
        for queue in std::iter::once(&mut self.pending).chain(self.drains.iter_mut()) {
            let (matching, kept): (VecDeque<_>, VecDeque<_>) = queue.drain(..).partition(|entry| predicate(entry));
            *queue = kept;
            removed.extend(matching);
        }
        removed
    }
}

/// Outcome of posting a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Posted {
    Queued,
    Coalesced,
    /// Parked in the current drain's side-queue (self-repost while executing)
    Deferred,
}

impl CallbackQueue {
    pub fn new() -> Self { Self::default() }

    pub fn is_empty(&self) -> bool { lock(&self.state).pending.is_empty() }

    /// Entries in the main queue and all side-queues
    pub fn len(&self) -> usize {
        let state = lock(&self.state);
        state.pending.len() + state.drains.iter().map(VecDeque::len).sum::<usize>()
    }

    pub fn push(&self, entry: CallbackMessage) {
        trace!(?entry, "queued");
        lock(&self.state).pending.push_back(entry);
    }

    pub fn pop_front(&self) -> Option<CallbackMessage> { lock(&self.state).pending.pop_front() }

    /// Queues a signal for `list`, replacing the payload of an equal signal waiting in the
    /// main queue or in a side-queue.
    pub fn queue_signal(&self, list: &Arc<ObserverList>, message: Message) -> Posted {
        let target = TargetKey::List(list.id());
        let mut state = lock(&self.state);
        let existing = state.entries_mut().find(|e| e.matches(CallbackKind::Signal, target, Some(&message)));
        if let Some(entry) = existing {
            let previous = entry.replace(message);
            drop(state);
            drop(previous);
            trace!(list = %list.id(), "signal coalesced");
            return Posted::Coalesced;
        }
        state.pending.push_back(CallbackMessage::signal(list, message));
        Posted::Queued
    }

    /// Queues the "changed" signal for `list` unless one is already waiting, side-queues included.
    pub fn queue_changed(&self, list: &Arc<ObserverList>) -> Posted {
        let target = TargetKey::List(list.id());
        let mut state = lock(&self.state);
        if state.entries_mut().any(|e| e.matches(CallbackKind::Changed, target, None)) {
            return Posted::Coalesced;
        }
        state.pending.push_back(CallbackMessage::changed(list));
        Posted::Queued
    }

    /// Posts a message to `observer`.
    ///
    /// An equal entry (same observer and message id) waiting in the main queue or in any
    /// side-queue takes the new payload and due time instead. Otherwise, while the same
    /// pair is executing on the flushing thread, the new entry goes to the current
    /// drain's side-queue so that pass does not deliver it again.
    pub fn post(&self, observer: ObserverRef, message: Message, due: Option<Instant>, on_main_thread: bool) -> Posted {
        let target = TargetKey::Observer(observer.id());
        let mut state = lock(&self.state);

        let existing = state
            .entries_mut()
            .find(|e| !e.is_blocking() && e.matches(CallbackKind::Message, target, Some(&message)));
        if let Some(entry) = existing {
            entry.set_due(due);
            let previous = entry.replace(message);
            drop(state);
            drop(previous);
            return Posted::Coalesced;
        }

        let reposting = on_main_thread && state.executing.as_ref().is_some_and(|key| key.matches(observer.id(), &message));
        let entry = CallbackMessage::message(observer, message, due, None);
        if reposting {
            if let Some(side_queue) = state.drains.last_mut() {
                side_queue.push_back(entry);
                return Posted::Deferred;
            }
        }
        state.pending.push_back(entry);
        Posted::Queued
    }

    /// Removes every entry addressed to `target`, side-queues included. Returns how many.
    pub fn cancel(&self, target: TargetKey) -> usize {
        let removed = lock(&self.state).extract(|entry| entry.target() == target);
        // dropped outside the lock: completion flags fire here
        removed.len()
    }

    /// Whether the main queue holds a message for `observer`
    pub fn pending_for(&self, observer: ObserverId) -> bool {
        lock(&self.state).pending.iter().any(|e| e.observer() == Some(observer))
    }

    pub fn snapshot(&self) -> Vec<QueuedEntry> {
        let state = lock(&self.state);
        let pending = state.pending.iter().map(|e| e.snapshot(false));
        let deferred = state.drains.iter().flatten().map(|e| e.snapshot(true));
        pending.chain(deferred).collect()
    }

    /// Discards everything, returning the number of entries dropped
    pub fn clear(&self) -> usize {
        let removed = lock(&self.state).extract(|_| true);
        removed.len()
    }

    fn swap_executing(&self, key: Option<ExecutingKey>) -> Option<ExecutingKey> {
        std::mem::replace(&mut lock(&self.state).executing, key)
    }
}

/// Side-queue for one `flush` pass.
///
/// Entries deferred during the pass are parked here, where cancellation and
/// coalescing can still reach them. On drop they move to the tail of the main
/// queue, in order, ready for the next pass.
pub(crate) struct DeferralGuard<'a> {
    queue: &'a CallbackQueue,
    depth: usize,
}

impl<'a> DeferralGuard<'a> {
    pub fn new(queue: &'a CallbackQueue) -> Self {
        let mut state = lock(&queue.state);
        state.drains.push(VecDeque::new());
        Self { queue, depth: state.drains.len() }
    }

    pub fn defer(&self, entry: CallbackMessage) {
        trace!(?entry, "deferred");
        let mut state = lock(&self.queue.state);
        match state.drains.get_mut(self.depth - 1) {
            Some(side_queue) => side_queue.push_back(entry),
            None => state.pending.push_back(entry),
        }
    }
}

impl Drop for DeferralGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.queue.state);
        debug_assert_eq!(state.drains.len(), self.depth, "drain side-queues unwound out of order");
        if let Some(mut side_queue) = state.drains.pop() {
            state.pending.append(&mut side_queue);
        }
    }
}

/// Marks an entry as executing for the duration of its callback, restoring the outer key after.
pub(crate) struct ExecutingScope<'a> {
    queue: &'a CallbackQueue,
    previous: Option<ExecutingKey>,
}

impl<'a> ExecutingScope<'a> {
    pub fn enter(queue: &'a CallbackQueue, key: Option<ExecutingKey>) -> Self {
        let previous = queue.swap_executing(key);
        Self { queue, previous }
    }
}

impl Drop for ExecutingScope<'_> {
    fn drop(&mut self) { self.queue.swap_executing(self.previous.take()); }
}
