use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use gds_monitor::config::MonitorConfig;
use gds_monitor::poll::PollSchedule;
use gds_monitor::simulation::SimulatedDevice;
use gds_monitor::{HandleState, RemoteService, Reporter, SubscriptionManager, UpdateSink, Value};
use parking_lot::Mutex;
use smol_str::SmolStr;

const COUNTER: &str = "Arp.Plc.Eclr/Main.Counter";
const RUNNING: &str = "Arp.Plc.Eclr/Main.Running";

fn device() -> Arc<SimulatedDevice> {
    Arc::new(SimulatedDevice::with_variables([
        (COUNTER, Value::DInt(1)),
        (RUNNING, Value::Bool(true)),
    ]))
}

fn idle() -> MonitorConfig {
    MonitorConfig {
        poll: PollSchedule {
            initial_delay: Duration::from_secs(3600),
            interval: Duration::from_secs(3600),
        },
        ..MonitorConfig::default()
    }
}

/// Calls back into the manager from every notification.
#[derive(Default)]
struct ReentrantConsumer {
    manager: OnceLock<Weak<SubscriptionManager>>,
    updates: Mutex<Vec<SmolStr>>,
    reports: Mutex<Vec<(String, usize)>>,
}

impl ReentrantConsumer {
    fn manager(&self) -> Option<Arc<SubscriptionManager>> {
        self.manager.get().and_then(Weak::upgrade)
    }

    fn record_report(&self, text: &str) {
        let tracked = self
            .manager()
            .map_or(0, |manager| manager.variables().len());
        self.reports.lock().push((text.to_string(), tracked));
    }
}

impl UpdateSink for ReentrantConsumer {
    fn on_variable_updated(&self, uri: &str, _value: &Value) {
        self.updates.lock().push(SmolStr::new(uri));
        if let Some(manager) = self.manager() {
            let _ = manager.unsubscribe_from(uri);
        }
    }
}

impl Reporter for ReentrantConsumer {
    fn message(&self, text: &str) {
        self.record_report(text);
    }

    fn error(&self, text: &str) {
        self.record_report(text);
    }
}

/// Blocks inside every update until the test releases it.
struct GatedSink {
    entered: Sender<SmolStr>,
    release: Receiver<()>,
    published: Mutex<Vec<SmolStr>>,
}

impl UpdateSink for GatedSink {
    fn on_variable_updated(&self, uri: &str, _value: &Value) {
        self.published.lock().push(SmolStr::new(uri));
        let _ = self.entered.send(SmolStr::new(uri));
        let _ = self.release.recv_timeout(Duration::from_secs(5));
    }
}

#[test]
fn callbacks_may_call_back_into_the_manager() {
    let device = device();
    let consumer = Arc::new(ReentrantConsumer::default());
    let remote: Arc<dyn RemoteService> = device.clone();
    let manager = Arc::new(
        SubscriptionManager::builder(remote, consumer.clone())
            .reporter(consumer.clone())
            .config(idle())
            .build(),
    );
    consumer
        .manager
        .set(Arc::downgrade(&manager))
        .expect("manager set once");

    manager.subscribe_to(COUNTER).expect("subscribe counter");
    manager.poll_now();

    assert_eq!(*consumer.updates.lock(), vec![SmolStr::new(COUNTER)]);
    assert!(manager.variables().is_empty());
    assert!(!manager.is_polling());
    assert_eq!(
        *consumer.reports.lock(),
        vec![
            (format!("subscribed to '{COUNTER}'"), 1),
            (format!("unsubscribed from '{COUNTER}'"), 0),
        ]
    );
}

#[test]
fn shutdown_during_publish_discards_the_rest_of_the_tick() {
    let device = device();
    let (entered_tx, entered_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    let sink = Arc::new(GatedSink {
        entered: entered_tx,
        release: release_rx,
        published: Mutex::new(Vec::new()),
    });
    let remote: Arc<dyn RemoteService> = device.clone();
    let manager = Arc::new(
        SubscriptionManager::builder(remote, sink.clone())
            .config(idle())
            .build(),
    );
    manager.subscribe_to(COUNTER).expect("subscribe counter");
    manager.subscribe_to(RUNNING).expect("subscribe running");

    let ticking = Arc::clone(&manager);
    let tick = thread::spawn(move || ticking.poll_now());
    let first = entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("tick reached the sink");
    assert_eq!(first, COUNTER);

    manager.shutdown();
    assert_eq!(manager.handle_state(), HandleState::Unallocated);
    assert!(manager.variables().is_empty());

    release_tx.send(()).expect("release sink");
    tick.join().expect("tick thread");

    assert_eq!(*sink.published.lock(), vec![SmolStr::new(COUNTER)]);
    assert!(manager.variables().is_empty());
    assert_eq!(device.subscription_count(), 0);
}
