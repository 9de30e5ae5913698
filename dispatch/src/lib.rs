/*!
An in-process signal/observer dispatch engine.

Subjects notify the observers registered for them either synchronously, deferred until the
next drain of the queue, or, for point-to-point messages, after a wall-clock delay. A
blocking post gives other threads a synchronous rendezvous with the main thread.

# Model
- A *subject* is anything with a stable identity ([`SubjectId`]). Observers are registered
  per subject with [`SignalHandler::advise`] and held weakly.
- Synchronous dispatch ([`SignalHandler::perform_signal`]) walks the subject's
  [`ObserverList`] with an [`ObserverIterator`], which never yields an observer removed
  during the walk.
- Queued work ([`SignalHandler::queue_signal`], [`SignalHandler::queue_changed`],
  [`SignalHandler::post_message`]) is coalesced by (target, message id) and executed by
  [`SignalHandler::flush`] on the main thread.

# Threads
`advise`, `unadvise`, `perform_signal`, `cancel_signals` and `flush` belong to the main
thread and may be re-entered from inside `notify`. Queuing, posting and cancelling messages
is allowed from any thread.

# Basic usage

```rust
use signal_dispatch::*;

struct Document {
    title: String,
}
impl Subject for Document {}

let handler = SignalHandler::new();
let doc = Document { title: "draft".into() };

let view = FnObserver::new("view", |subject, message| {
    println!("{subject:?} sent {}", message.id());
});
handler.advise(doc.subject_id(), &view).unwrap();

// immediately
handler.perform_signal(doc.subject_id(), &Message::new("renamed").with_arg(doc.title.as_str())).unwrap();

// deferred: coalesced into a single delivery
handler.queue_changed(doc.subject_id()).unwrap();
handler.queue_changed(doc.subject_id()).unwrap();
handler.flush().unwrap();

handler.unadvise(doc.subject_id(), ObserverId::of(&*view)).unwrap();
```
*/

mod callback;
mod config;
mod error;
mod global;
mod handler;
mod identity;
mod list;
mod message;
mod observer;
mod queue;
mod registry;

pub use callback::{CallbackKind, QueuedEntry, TargetKey, Waitable};
pub use config::{DEFAULT_BUCKETS, DispatcherConfig, ThreadPolicy};
pub use error::DispatchError;
pub use global::{reset, signal_handler};
pub use handler::{Advice, SignalHandler};
pub use identity::{ListId, ObserverId, Subject, SubjectId};
pub use list::{ObserverIterator, ObserverList};
pub use message::{CHANGED, Message, Variant};
pub use observer::{FnObserver, IntoObserverRef, Observer, ObserverRef};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a panicking thread poisoned it.
/// No lock in this crate is held while observer code runs.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }
