//! Process-wide signal handler.
//!
//! Created on first use; the thread that first touches it becomes its main thread.
//! Tests (or a host that restarts its event loop) can rebind it with
//! [`SignalHandler::bind_main_thread`] and clear it with [`reset`].

use std::sync::OnceLock;

use crate::SignalHandler;

static SIGNAL_HANDLER: OnceLock<SignalHandler> = OnceLock::new();

/// The process-wide handler
pub fn signal_handler() -> &'static SignalHandler { SIGNAL_HANDLER.get_or_init(SignalHandler::new) }

/// Clears the process-wide handler if it exists. Returns the number of queued entries discarded.
pub fn reset() -> usize { SIGNAL_HANDLER.get().map_or(0, SignalHandler::reset) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FnObserver, Message, SubjectId};

    #[test]
    fn test_global_handler_is_shared_and_resettable() {
        let handler = signal_handler();
        handler.bind_main_thread();
        assert!(std::ptr::eq(handler, signal_handler()));

        let observer = FnObserver::new("global", |_, _| {});
        handler.advise(SubjectId::from_raw(0xfeed), &observer).unwrap();
        handler.queue_signal(SubjectId::from_raw(0xfeed), Message::new("m")).unwrap();
        assert_eq!(reset(), 1);
        assert!(!handler.has_observers(SubjectId::from_raw(0xfeed)));
    }
}
