use std::sync::{Arc, Mutex, RwLock};
use std::thread::ThreadId;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::callback::{CallbackMessage, QueuedEntry, TargetKey, Waitable};
use crate::queue::{CallbackQueue, DeferralGuard, ExecutingScope, Posted};
use crate::registry::Registry;
use crate::{DispatchError, DispatcherConfig, IntoObserverRef, Message, ObserverId, ObserverList, SubjectId, ThreadPolicy, lock};

/// The signal/observer dispatcher.
///
/// Subjects notify their observers immediately ([`perform_signal`](Self::perform_signal)),
/// at the next drain ([`queue_signal`](Self::queue_signal), [`queue_changed`](Self::queue_changed)),
/// or, for one observer, after a delay ([`post_message`](Self::post_message)).
///
/// # Threads
/// One designated main thread (the constructing thread, see [`bind_main_thread`](Self::bind_main_thread))
/// registers observers, dispatches synchronously and drains the queue. Those operations may be
/// re-entered from inside an observer's `notify`. Queuing, posting and cancelling messages is
/// allowed from any thread.
pub struct SignalHandler {
    config: DispatcherConfig,
    main_thread: RwLock<ThreadId>,
    registry: Mutex<Registry>,
    queue: CallbackQueue,
}

impl Default for SignalHandler {
    fn default() -> Self { Self::new() }
}

impl SignalHandler {
    pub fn new() -> Self { Self::with_config(DispatcherConfig::default()) }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            registry: Mutex::new(Registry::new(config.buckets)),
            config,
            main_thread: RwLock::new(std::thread::current().id()),
            queue: CallbackQueue::new(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig { &self.config }

    /// Makes the calling thread the main thread
    pub fn bind_main_thread(&self) {
        let current = std::thread::current().id();
        *self.main_thread.write().unwrap_or_else(std::sync::PoisonError::into_inner) = current;
        debug!(thread = ?current, "signal handler bound to main thread");
    }

    pub fn is_main_thread(&self) -> bool {
        *self.main_thread.read().unwrap_or_else(std::sync::PoisonError::into_inner) == std::thread::current().id()
    }

    fn check_main_thread(&self, operation: &'static str) -> Result<(), DispatchError> {
        if self.is_main_thread() {
            return Ok(());
        }
        match self.config.thread_policy {
            ThreadPolicy::Strict => panic!("SignalHandler::{operation} called off the main thread"),
            ThreadPolicy::Soft => {
                warn!(operation, "signal handler not in main thread");
                Err(DispatchError::WrongThread { operation })
            }
        }
    }

    // ---- Registration ----

    /// Registers `observer` for `subject`. Main thread only.
    pub fn advise(&self, subject: SubjectId, observer: &impl IntoObserverRef) -> Result<(), DispatchError> {
        self.check_main_thread("advise")?;
        let observer = observer.observer_ref();
        let mut registry = lock(&self.registry);
        let (list, created) = registry.get_or_insert(subject);
        if created {
            debug!(%subject, "observer list created");
        }
        trace!(%subject, observer = %observer.id(), "advise");
        list.append(observer);
        Ok(())
    }

    /// Like [`advise`](Self::advise), returning a guard that unadvises on drop.
    pub fn advise_guarded(&self, subject: SubjectId, observer: &impl IntoObserverRef) -> Result<Advice<'_>, DispatchError> {
        let observer = observer.observer_ref();
        self.advise(subject, &observer)?;
        Ok(Advice { handler: self, subject, observer: observer.id() })
    }

    /// Unregisters `observer` from `subject`. Main thread only.
    ///
    /// When the last observer goes, signals still queued for the subject are canceled and
    /// its list is released (a dispatch in progress keeps it alive until it returns).
    pub fn unadvise(&self, subject: SubjectId, observer: ObserverId) -> Result<(), DispatchError> {
        self.check_main_thread("unadvise")?;
        let mut registry = lock(&self.registry);
        let Some(list) = registry.lookup(subject).cloned() else { return Ok(()) };
        trace!(%subject, %observer, "unadvise");
        list.remove(observer);
        if list.is_empty() {
            self.release_list(&mut registry, &list);
        }
        Ok(())
    }

    fn release_list(&self, registry: &mut Registry, list: &Arc<ObserverList>) {
        let canceled = self.queue.cancel(TargetKey::List(list.id()));
        if registry.remove(list).is_some() {
            debug!(subject = %list.subject(), canceled, "observer list released");
        }
    }

    pub fn has_observers(&self, subject: SubjectId) -> bool { lock(&self.registry).lookup(subject).is_some() }

    // ---- Synchronous dispatch ----

    /// Notifies every observer of `subject` now, in registration order. Main thread only.
    pub fn perform_signal(&self, subject: SubjectId, message: &Message) -> Result<(), DispatchError> {
        self.check_main_thread("perform_signal")?;
        let Some(list) = lock(&self.registry).lookup(subject).cloned() else { return Ok(()) };
        list.perform_signal(message);
        self.release_if_pruned(&list);
        Ok(())
    }

    /// Observers dropped without unadvise are pruned during iteration; a list left empty goes.
    fn release_if_pruned(&self, list: &Arc<ObserverList>) {
        if list.is_empty() {
            let mut registry = lock(&self.registry);
            self.release_list(&mut registry, list);
        }
    }

    // ---- Queued dispatch ----

    /// Queues `message` for the observers of `subject`, delivered by the next [`flush`](Self::flush).
    ///
    /// A signal with the same message id already queued for the subject takes the new payload
    /// instead. Without observers the message is dropped.
    pub fn queue_signal(&self, subject: SubjectId, message: Message) -> Result<(), DispatchError> {
        let registry = lock(&self.registry);
        let Some(list) = registry.lookup(subject) else {
            trace!(%subject, message = message.id(), "no observers, signal dropped");
            return Ok(());
        };
        if self.queue.queue_signal(list, message) == Posted::Queued {
            trace!(%subject, "signal queued");
        }
        Ok(())
    }

    /// Queues the generic "changed" signal for `subject`; at most one is pending per subject.
    pub fn queue_changed(&self, subject: SubjectId) -> Result<(), DispatchError> {
        let registry = lock(&self.registry);
        if let Some(list) = registry.lookup(subject) {
            self.queue.queue_changed(list);
        }
        Ok(())
    }

    /// Removes every queued signal for `subject`, including ones deferred by an active flush.
    /// Main thread only.
    pub fn cancel_signals(&self, subject: SubjectId) -> Result<(), DispatchError> {
        self.check_main_thread("cancel_signals")?;
        let registry = lock(&self.registry);
        if let Some(list) = registry.lookup(subject) {
            let canceled = self.queue.cancel(TargetKey::List(list.id()));
            trace!(%subject, canceled, "signals canceled");
        }
        Ok(())
    }

    /// Posts `message` to a single observer.
    ///
    /// - `delay_ms == 0`: delivered by the next flush.
    /// - `delay_ms > 0`: delivered by the first flush after the delay.
    /// - `delay_ms < 0`: collected, then delivered by the next flush regardless of the clock.
    ///
    /// A message with the same id already waiting for this observer takes the new payload and
    /// due time instead of being duplicated.
    pub fn post_message(&self, observer: &impl IntoObserverRef, message: Message, delay_ms: i64) -> Result<(), DispatchError> {
        let observer = observer.observer_ref();
        let now = Instant::now();
        let due = match delay_ms {
            0 => None,
            d if d > 0 => Some(now + std::time::Duration::from_millis(d.unsigned_abs())),
            _ => Some(now),
        };
        let id = observer.id();
        let posted = self.queue.post(observer, message, due, self.is_main_thread());
        trace!(observer = %id, ?posted, delay_ms, "message posted");
        Ok(())
    }

    /// Delivers `message` to `observer` on the main thread and waits for it.
    ///
    /// On the main thread the observer is notified directly. Elsewhere the message is queued
    /// and the caller sleeps until a flush on the main thread has executed (or canceled) it.
    pub fn post_message_blocking(&self, observer: &impl IntoObserverRef, message: Message) -> Result<(), DispatchError> {
        let observer = observer.observer_ref();
        if self.is_main_thread() {
            let target = observer.upgrade().ok_or(DispatchError::ObserverGone)?;
            target.notify(None, &message);
            return Ok(());
        }
        if !observer.is_alive() {
            return Err(DispatchError::ObserverGone);
        }
        let waitable = Arc::new(Waitable::new());
        self.queue.push(CallbackMessage::message(observer, message, None, Some(Arc::clone(&waitable))));
        waitable.wait_blocking(self.config.blocking_poll_interval);
        Ok(())
    }

    /// Awaitable form of [`post_message_blocking`](Self::post_message_blocking).
    #[cfg(feature = "tokio")]
    pub async fn post_message_async(&self, observer: &impl IntoObserverRef, message: Message) -> Result<(), DispatchError> {
        let observer = observer.observer_ref();
        if self.is_main_thread() {
            let target = observer.upgrade().ok_or(DispatchError::ObserverGone)?;
            target.notify(None, &message);
            return Ok(());
        }
        if !observer.is_alive() {
            return Err(DispatchError::ObserverGone);
        }
        let waitable = Arc::new(Waitable::new());
        self.queue.push(CallbackMessage::message(observer, message, None, Some(Arc::clone(&waitable))));
        waitable.wait().await;
        Ok(())
    }

    /// Removes every queued message for `observer`. Blocked posters are released.
    pub fn cancel_messages(&self, observer: ObserverId) -> Result<(), DispatchError> {
        let canceled = self.queue.cancel(TargetKey::Observer(observer));
        trace!(%observer, canceled, "messages canceled");
        Ok(())
    }

    /// Whether a message for `observer` is waiting in the main queue
    pub fn messages_pending(&self, observer: ObserverId) -> bool { self.queue.pending_for(observer) }

    // ---- Drain ----

    /// Executes all queued work that is due. Main thread only.
    pub fn flush(&self) -> Result<(), DispatchError> { self.drain(None) }

    /// Executes queued messages for `observer` only, ignoring their due times. Main thread only.
    pub fn flush_for(&self, observer: ObserverId) -> Result<(), DispatchError> { self.drain(Some(observer)) }

    fn drain(&self, filter: Option<ObserverId>) -> Result<(), DispatchError> {
        self.check_main_thread("flush")?;
        if self.queue.is_empty() {
            return Ok(());
        }

        let deferred = DeferralGuard::new(&self.queue);
        while let Some(entry) = self.queue.pop_front() {
            if filter.is_some() && entry.observer() != filter {
                deferred.defer(entry);
                continue;
            }
            if let Some(due) = entry.due() {
                if filter.is_none() && Instant::now() < due {
                    deferred.defer(entry);
                    continue;
                }
            }
            trace!(?entry, "executing");
            {
                let _executing = ExecutingScope::enter(&self.queue, entry.executing_key());
                entry.execute();
            }
            if let Some(list) = entry.list() {
                self.release_if_pruned(&list);
            }
            // dropping the entry sets its completion flag
            drop(entry);
        }
        Ok(())
    }

    // ---- Diagnostics / teardown ----

    /// Snapshot of all queued work: the main queue, then the side-queues of active flushes
    pub fn queue_snapshot(&self) -> Vec<QueuedEntry> { self.queue.snapshot() }

    /// Number of subjects with observers
    pub fn subject_count(&self) -> usize { lock(&self.registry).len() }

    /// Whether nothing is registered and nothing is queued
    pub fn is_quiescent(&self) -> bool { lock(&self.registry).is_empty() && self.queue.len() == 0 }

    /// Logs every registered subject with its observers, then the queue, at debug level
    pub fn dump(&self) {
        for list in lock(&self.registry).lists() {
            let observers: Vec<String> = list.observers().iter().map(|o| o.name()).collect();
            debug!(subject = %list.subject(), ?observers, "registered");
        }
        for entry in self.queue.snapshot() {
            debug!(kind = ?entry.kind, target = ?entry.target, message = ?entry.message_id, due = ?entry.due, deferred = entry.deferred, "queued");
        }
    }

    /// Drops every observer list and queued entry, releasing blocked posters.
    /// Returns the number of queued entries discarded.
    pub fn reset(&self) -> usize {
        let lists = lock(&self.registry).clear();
        let discarded = self.queue.clear();
        debug!(lists = lists.len(), discarded, "signal handler reset");
        discarded
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        let subjects = lock(&self.registry).len();
        let queued = self.queue.len();
        if subjects == 0 && queued == 0 {
            return;
        }
        warn!(subjects, queued, "signal handler dropped while not quiescent");
        if self.config.assert_quiescent_on_drop && !std::thread::panicking() {
            panic!("signal handler dropped with {subjects} registered subject(s) and {queued} queued entries");
        }
    }
}

/// Keeps an observer advised for a subject; unadvises on drop.
#[must_use = "dropping the guard unadvises immediately"]
pub struct Advice<'a> {
    handler: &'a SignalHandler,
    subject: SubjectId,
    observer: ObserverId,
}

impl Advice<'_> {
    pub fn subject(&self) -> SubjectId { self.subject }

    pub fn observer(&self) -> ObserverId { self.observer }
}

impl Drop for Advice<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.handler.unadvise(self.subject, self.observer) {
            warn!(subject = %self.subject, observer = %self.observer, label = err.as_label(), "advice dropped off the main thread");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FnObserver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn crate::Observer>) {
        let count = Arc::new(AtomicUsize::new(0));
        let observer = {
            let count = count.clone();
            FnObserver::new("counter", move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, observer)
    }

    #[test]
    fn test_list_released_when_last_observer_leaves() {
        let handler = SignalHandler::new();
        let subject = SubjectId::from_raw(0x40);
        let (_, observer) = counter();
        let id = observer.observer_ref().id();

        handler.advise(subject, &observer).unwrap();
        handler.queue_changed(subject).unwrap();
        assert_eq!(handler.queue_snapshot().len(), 1);

        handler.unadvise(subject, id).unwrap();
        assert!(!handler.has_observers(subject));
        assert!(handler.queue_snapshot().is_empty());
        assert!(handler.is_quiescent());
    }

    #[test]
    fn test_dropped_observer_releases_list_on_dispatch() {
        let handler = SignalHandler::new();
        let subject = SubjectId::from_raw(0x80);
        {
            let (_, observer) = counter();
            handler.advise(subject, &observer).unwrap();
        }
        assert!(handler.has_observers(subject));
        handler.perform_signal(subject, &Message::new("ping")).unwrap();
        assert!(!handler.has_observers(subject));
    }

    #[test]
    fn test_advice_guard_unadvises() {
        let handler = SignalHandler::new();
        let subject = SubjectId::from_raw(0x100);
        let (count, observer) = counter();
        {
            let _advice = handler.advise_guarded(subject, &observer).unwrap();
            handler.perform_signal(subject, &Message::new("ping")).unwrap();
        }
        handler.perform_signal(subject, &Message::new("ping")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!handler.has_observers(subject));
    }

    #[test]
    fn test_reset_discards_everything() {
        let handler = SignalHandler::new();
        let (_, observer) = counter();
        handler.advise(SubjectId::from_raw(1), &observer).unwrap();
        handler.post_message(&observer, Message::new("later"), 10_000).unwrap();
        assert_eq!(handler.reset(), 1);
        assert!(handler.is_quiescent());
    }

    #[test]
    #[should_panic(expected = "signal handler dropped")]
    fn test_drop_asserts_quiescence() {
        let handler = SignalHandler::with_config(DispatcherConfig::default().with_assert_quiescent_on_drop(true));
        let (_, observer) = counter();
        handler.advise(SubjectId::from_raw(1), &observer).unwrap();
    }
}
