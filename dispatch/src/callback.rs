use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::{ListId, Message, ObserverId, ObserverList, ObserverRef};

/// Which callback a queued entry runs when it is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// Perform a queued signal on an observer list
    Signal,
    /// Perform the generic "changed" signal on an observer list
    Changed,
    /// Deliver a one-shot message to a single observer
    Message,
}

/// Identity of the thing a queued entry is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKey {
    List(ListId),
    Observer(ObserverId),
}

pub(crate) enum CallbackTarget {
    List { id: ListId, list: Weak<ObserverList> },
    Observer(ObserverRef),
}

impl CallbackTarget {
    fn key(&self) -> TargetKey {
        match self {
            CallbackTarget::List { id, .. } => TargetKey::List(*id),
            CallbackTarget::Observer(observer) => TargetKey::Observer(observer.id()),
        }
    }
}

/// Completion flag for a caller blocked on a queued entry.
///
/// Set when the entry is dropped, whether it was executed, canceled or discarded.
#[derive(Debug, Default)]
pub struct Waitable {
    done: AtomicBool,
    #[cfg(feature = "tokio")]
    notify: tokio::sync::Notify,
}

impl Waitable {
    pub fn new() -> Self { Self::default() }

    pub fn is_done(&self) -> bool { self.done.load(Ordering::Acquire) }

    pub(crate) fn complete(&self) {
        self.done.store(true, Ordering::Release);
        #[cfg(feature = "tokio")]
        self.notify.notify_one();
    }

    /// Sleeps in `interval` steps until the flag is set
    pub fn wait_blocking(&self, interval: Duration) {
        while !self.is_done() {
            std::thread::sleep(interval);
        }
    }

    #[cfg(feature = "tokio")]
    pub async fn wait(&self) {
        // notify_one stores a permit, so a completion between the check and the await is not lost
        while !self.is_done() {
            self.notify.notified().await;
        }
    }
}

/// One pending unit of deferred work.
pub struct CallbackMessage {
    kind: CallbackKind,
    target: CallbackTarget,
    message: Option<Message>,
    due: Option<Instant>,
    waitable: Option<Arc<Waitable>>,
}

impl CallbackMessage {
    pub(crate) fn signal(list: &Arc<ObserverList>, message: Message) -> Self {
        Self {
            kind: CallbackKind::Signal,
            target: CallbackTarget::List { id: list.id(), list: Arc::downgrade(list) },
            message: Some(message),
            due: None,
            waitable: None,
        }
    }

    pub(crate) fn changed(list: &Arc<ObserverList>) -> Self {
        Self {
            kind: CallbackKind::Changed,
            target: CallbackTarget::List { id: list.id(), list: Arc::downgrade(list) },
            message: None,
            due: None,
            waitable: None,
        }
    }

    pub(crate) fn message(observer: ObserverRef, message: Message, due: Option<Instant>, waitable: Option<Arc<Waitable>>) -> Self {
        Self { kind: CallbackKind::Message, target: CallbackTarget::Observer(observer), message: Some(message), due, waitable }
    }

    pub fn kind(&self) -> CallbackKind { self.kind }

    pub fn target(&self) -> TargetKey { self.target.key() }

    pub fn payload(&self) -> Option<&Message> { self.message.as_ref() }

    /// `None` means ready now
    pub fn due(&self) -> Option<Instant> { self.due }

    pub fn is_blocking(&self) -> bool { self.waitable.is_some() }

    pub(crate) fn observer(&self) -> Option<ObserverId> {
        match &self.target {
            CallbackTarget::Observer(observer) => Some(observer.id()),
            CallbackTarget::List { .. } => None,
        }
    }

    /// The observer list a signal entry is addressed to, if it still exists
    pub(crate) fn list(&self) -> Option<Arc<ObserverList>> {
        match &self.target {
            CallbackTarget::List { list, .. } => list.upgrade(),
            CallbackTarget::Observer(_) => None,
        }
    }

    /// Same payload identity: equal message ids, or both without payload
    pub(crate) fn is_equal(&self, other: Option<&Message>) -> bool {
        match (&self.message, other) {
            (Some(mine), Some(other)) => mine.same_identity(other),
            (None, None) => true,
            _ => false,
        }
    }

    pub(crate) fn matches(&self, kind: CallbackKind, target: TargetKey, message: Option<&Message>) -> bool {
        self.kind == kind && self.target() == target && self.is_equal(message)
    }

    /// Replaces the payload, returning the old one
    pub(crate) fn replace(&mut self, message: Message) -> Option<Message> { self.message.replace(message) }

    pub(crate) fn set_due(&mut self, due: Option<Instant>) { self.due = due; }

    /// Key used by the self-repost rule while this entry executes
    pub(crate) fn executing_key(&self) -> Option<ExecutingKey> {
        match (&self.target, &self.message) {
            (CallbackTarget::Observer(observer), Some(message)) => Some(ExecutingKey { observer: observer.id(), message: message.clone() }),
            _ => None,
        }
    }

    /// Runs the callback. Targets that are gone are skipped.
    pub(crate) fn execute(&self) {
        match (&self.target, self.kind) {
            (CallbackTarget::List { list, .. }, CallbackKind::Signal) => {
                if let (Some(list), Some(message)) = (list.upgrade(), &self.message) {
                    list.perform_signal(message);
                }
            }
            (CallbackTarget::List { list, .. }, _) => {
                if let Some(list) = list.upgrade() {
                    list.perform_signal(&Message::changed());
                }
            }
            (CallbackTarget::Observer(observer), _) => {
                if let (Some(observer), Some(message)) = (observer.upgrade(), &self.message) {
                    observer.notify(None, message);
                }
            }
        }
    }

    pub(crate) fn snapshot(&self, deferred: bool) -> QueuedEntry {
        QueuedEntry {
            kind: self.kind,
            target: self.target(),
            message_id: self.message.as_ref().map(|m| m.id().to_string()),
            due: self.due,
            blocking: self.is_blocking(),
            deferred,
        }
    }
}

impl Drop for CallbackMessage {
    fn drop(&mut self) {
        if let Some(waitable) = self.waitable.take() {
            waitable.complete();
        }
    }
}

impl std::fmt::Debug for CallbackMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackMessage")
            .field("kind", &self.kind)
            .field("target", &self.target())
            .field("message", &self.message.as_ref().map(Message::id))
            .field("due", &self.due)
            .field("blocking", &self.is_blocking())
            .finish()
    }
}

/// The (observer, message identity) pair currently being delivered by `flush`.
#[derive(Debug, Clone)]
pub(crate) struct ExecutingKey {
    observer: ObserverId,
    message: Message,
}

impl ExecutingKey {
    pub(crate) fn matches(&self, observer: ObserverId, message: &Message) -> bool {
        self.observer == observer && self.message.same_identity(message)
    }
}

/// Diagnostic view of a queued entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEntry {
    pub kind: CallbackKind,
    pub target: TargetKey,
    pub message_id: Option<String>,
    pub due: Option<Instant>,
    /// A caller is blocked until this entry completes
    pub blocking: bool,
    /// Parked in an active drain's side-queue
    pub deferred: bool,
}
