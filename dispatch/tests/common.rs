use signal_dispatch::{Message, Observer, ObserverId, SubjectId};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use tracing::Level;

#[ctor::ctor]
fn init_tracing() { tracing_subscriber::fmt().with_max_level(Level::DEBUG).with_test_writer().init(); }

type Action = Box<dyn Fn(&Recorder, &Message) + Send + Sync>;

/// Observer that records every notification and can run an action from inside `notify`.
pub struct Recorder {
    name: &'static str,
    log: Mutex<Vec<Notification>>,
    action: Mutex<Option<Arc<Action>>>,
}

#[derive(Debug, Clone)]
#[allow(unused)]
pub struct Notification {
    pub subject: Option<SubjectId>,
    pub message: Message,
    pub thread: ThreadId,
}

#[allow(unused)]
impl Recorder {
    pub fn new(name: &'static str) -> Arc<Self> { Arc::new(Self { name, log: Mutex::new(Vec::new()), action: Mutex::new(None) }) }

    /// Runs `action` on every notification, after it is recorded
    pub fn on_notify<F>(&self, action: F)
    where F: Fn(&Recorder, &Message) + Send + Sync + 'static {
        *self.action.lock().unwrap() = Some(Arc::new(Box::new(action)));
    }

    pub fn id(&self) -> ObserverId { ObserverId::of(self) }

    pub fn notifications(&self) -> Vec<Notification> { self.log.lock().unwrap().clone() }

    pub fn ids(&self) -> Vec<String> { self.log.lock().unwrap().iter().map(|n| n.message.id().to_string()).collect() }

    pub fn count(&self) -> usize { self.log.lock().unwrap().len() }

    pub fn clear(&self) { self.log.lock().unwrap().clear(); }
}

impl Observer for Recorder {
    fn notify(&self, subject: Option<SubjectId>, message: &Message) {
        self.log.lock().unwrap().push(Notification { subject, message: message.clone(), thread: std::thread::current().id() });
        // clone out so the action may replace itself
        let action = self.action.lock().unwrap().clone();
        if let Some(action) = action {
            action(self, message);
        }
    }

    fn name(&self) -> &str { self.name }
}

/// Shared log of observer names, for checking dispatch order across observers
#[allow(unused)]
pub fn order_log() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn() -> Vec<&'static str>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let check = {
        let log = log.clone();
        move || log.lock().unwrap().drain(..).collect::<Vec<_>>()
    };
    (log, check)
}
