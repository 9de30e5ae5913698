use std::sync::{Arc, Weak};

use crate::{Message, ObserverId, SubjectId};

/// Receives notifications about subjects, and point-to-point messages.
pub trait Observer: Send + Sync {
    /// Called on the main thread with the subject that signaled, or `None` for a posted message.
    fn notify(&self, subject: Option<SubjectId>, message: &Message);

    /// Name used in diagnostics. The default is the type name, override it when possible.
    fn name(&self) -> &str { std::any::type_name::<Self>() }
}

/// A non-owning reference to an observer.
///
/// The dispatcher never keeps an observer alive: an observer dropped without
/// being unadvised is skipped (and pruned) rather than called.
#[derive(Clone)]
pub struct ObserverRef {
    id: ObserverId,
    observer: Weak<dyn Observer>,
}

impl ObserverRef {
    pub fn new(observer: &Arc<dyn Observer>) -> Self { Self { id: ObserverId::of(&**observer), observer: Arc::downgrade(observer) } }

    pub fn id(&self) -> ObserverId { self.id }

    pub fn upgrade(&self) -> Option<Arc<dyn Observer>> { self.observer.upgrade() }

    pub fn is_alive(&self) -> bool { self.observer.strong_count() > 0 }

    /// The observer's name, or a placeholder once it is gone
    pub fn name(&self) -> String {
        match self.upgrade() {
            Some(observer) => observer.name().to_string(),
            None => "<dropped>".to_string(),
        }
    }
}

impl std::fmt::Debug for ObserverRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRef").field("id", &self.id).field("alive", &self.is_alive()).finish()
    }
}

/// Trait for types that can be registered as observers.
pub trait IntoObserverRef {
    fn observer_ref(&self) -> ObserverRef;
}

impl<O> IntoObserverRef for Arc<O>
where O: Observer + 'static
{
    fn observer_ref(&self) -> ObserverRef {
        let observer: Arc<dyn Observer> = self.clone();
        ObserverRef::new(&observer)
    }
}

impl IntoObserverRef for Arc<dyn Observer> {
    fn observer_ref(&self) -> ObserverRef { ObserverRef::new(self) }
}

impl IntoObserverRef for ObserverRef {
    fn observer_ref(&self) -> ObserverRef { self.clone() }
}

/// An observer that wraps a closure.
pub struct FnObserver<F> {
    name: &'static str,
    callback: F,
}

impl<F> FnObserver<F>
where F: Fn(Option<SubjectId>, &Message) + Send + Sync + 'static
{
    pub fn new(name: &'static str, callback: F) -> Arc<Self> { Arc::new(Self { name, callback }) }
}

impl<F> Observer for FnObserver<F>
where F: Fn(Option<SubjectId>, &Message) + Send + Sync
{
    fn notify(&self, subject: Option<SubjectId>, message: &Message) { (self.callback)(subject, message) }

    fn name(&self) -> &str { self.name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_ref_id_matches_self_address() {
        let seen = Arc::new(AtomicUsize::new(0));
        let observer = {
            let seen = seen.clone();
            FnObserver::new("probe", move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };
        let reference = observer.observer_ref();
        assert_eq!(reference.id(), ObserverId::of(&*observer));
        assert_eq!(reference.name(), "probe");

        if let Some(observer) = reference.upgrade() {
            observer.notify(None, &Message::new("ping"));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ref_does_not_keep_observer_alive() {
        let observer = FnObserver::new("short-lived", |_, _| {});
        let reference = observer.observer_ref();
        assert!(reference.is_alive());
        drop(observer);
        assert!(!reference.is_alive());
        assert!(reference.upgrade().is_none());
        assert_eq!(reference.name(), "<dropped>");
    }
}
