//! Change pipeline: observe the document, debounce, re-render what changed.

use std::time::Duration;

use tracing::{debug, trace};

use crate::dom::{Document, MutationRecord, NodeId, ObserverId};
use crate::engine::Core;
use crate::scanner::{bind_attributes, scan, substitute_text};

/// A single re-armable deadline on the engine clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct DebounceTimer {
    deadline: Option<Duration>,
}

impl DebounceTimer {
    /// Cancel any pending deadline and arm a new one.
    pub fn arm(&mut self, at: Duration) {
        self.deadline = Some(at);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn is_due(&self, now: Duration) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WatcherState {
    Inactive,
    Active {
        observer: ObserverId,
        debounce: Duration,
    },
}

pub(crate) struct ChangePipeline {
    state: WatcherState,
    batch: Vec<MutationRecord>,
    timer: DebounceTimer,
    passes: u64,
}

impl Default for ChangePipeline {
    fn default() -> Self {
        Self {
            state: WatcherState::Inactive,
            batch: Vec::new(),
            timer: DebounceTimer::default(),
            passes: 0,
        }
    }
}

impl ChangePipeline {
    pub fn is_active(&self) -> bool {
        matches!(self.state, WatcherState::Active { .. })
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.timer.deadline()
    }

    /// Start watching `root`. Any previous watcher is torn down first.
    pub fn setup(&mut self, doc: &mut Document, root: NodeId, debounce: Duration) {
        self.teardown(doc);
        let observer = doc.observe(root);
        self.state = WatcherState::Active { observer, debounce };
        debug!(?observer, debounce_ms = debounce.as_millis() as u64, "watcher active");
    }

    /// Disconnect the watcher, cancel the pending timer and drop the batch.
    pub fn teardown(&mut self, doc: &mut Document) {
        if let WatcherState::Active { observer, .. } =
            std::mem::replace(&mut self.state, WatcherState::Inactive)
        {
            doc.disconnect(observer);
            debug!(?observer, dropped = self.batch.len(), "watcher inactive");
        }
        self.timer.cancel();
        self.batch.clear();
    }

    /// Swap the watcher for one with a new debounce window.
    ///
    /// Records already queued or batched are carried over and re-armed on the
    /// new window.
    pub fn reconfigure(&mut self, doc: &mut Document, root: NodeId, debounce: Duration, now: Duration) {
        self.deliver(doc, now);
        let carried = std::mem::take(&mut self.batch);
        self.setup(doc, root, debounce);
        if !carried.is_empty() {
            debug!(carried = carried.len(), "batch carried into new watcher");
            self.batch = carried;
            self.timer.arm(now + debounce);
        }
    }

    /// Process everything queued or batched right away. Returns whether a pass ran.
    pub fn flush_now(&mut self, core: &Core, doc: &mut Document, now: Duration) -> bool {
        self.deliver(doc, now);
        if self.batch.is_empty() {
            return false;
        }
        self.timer.arm(now);
        self.flush_if_due(core, doc, now)
    }

    /// Observer callback: append queued records and restart the debounce window.
    pub fn deliver(&mut self, doc: &mut Document, now: Duration) -> usize {
        let WatcherState::Active { observer, debounce } = self.state else {
            return 0;
        };
        let records = doc.take_records(observer);
        if records.is_empty() {
            return 0;
        }
        let delivered = records.len();
        self.batch.extend(records);
        self.timer.arm(now + debounce);
        trace!(delivered, batched = self.batch.len(), "mutations delivered");
        delivered
    }

    /// Drop records produced by the engine's own writes.
    pub fn discard_pending(&mut self, doc: &mut Document) {
        if let WatcherState::Active { observer, .. } = self.state {
            let discarded = doc.take_records(observer).len();
            if discarded > 0 {
                trace!(discarded, "self-inflicted mutations discarded");
            }
        }
    }

    /// Process the batch if the timer has elapsed. Returns whether a pass ran.
    pub fn flush_if_due(&mut self, core: &Core, doc: &mut Document, now: Duration) -> bool {
        if !self.timer.is_due(now) {
            return false;
        }
        self.timer.cancel();
        let batch = std::mem::take(&mut self.batch);
        process(core, doc, &batch);
        self.discard_pending(doc);
        self.passes += 1;
        debug!(records = batch.len(), pass = self.passes, "batch processed");
        true
    }
}

fn process(core: &Core, doc: &mut Document, batch: &[MutationRecord]) {
    let disable_attribute = core.config.disable_attribute.as_str();
    for record in batch {
        match record {
            MutationRecord::ChildList { added, .. } => {
                for &node in added {
                    if core.is_disabled(doc, node) {
                        continue;
                    }
                    if doc.is_text(node) {
                        substitute_text(core, doc, node);
                    } else if doc.is_element(node) {
                        // scan binds the element's own attributes before descending.
                        scan(core, doc, node);
                    }
                }
            }
            MutationRecord::Attributes { target, name, .. } => {
                let target = *target;
                if name == disable_attribute && !doc.has_attribute(target, name) {
                    trace!(?target, "subtree re-enabled");
                    scan(core, doc, target);
                } else if !core.is_disabled(doc, target) {
                    bind_attributes(core, doc, target);
                }
            }
            MutationRecord::CharacterData { target, .. } => {
                if !core.is_disabled(doc, *target) {
                    substitute_text(core, doc, *target);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn timer_rearms_instead_of_stacking() {
        let mut timer = DebounceTimer::default();
        timer.arm(10 * MS);
        timer.arm(15 * MS);
        assert!(!timer.is_due(12 * MS));
        assert!(timer.is_due(15 * MS));
        timer.cancel();
        assert_eq!(timer.deadline(), None);
    }

    #[test]
    fn setup_replaces_the_previous_watcher() {
        let mut doc = Document::new();
        let root = doc.root();
        let mut pipeline = ChangePipeline::default();
        pipeline.setup(&mut doc, root, 10 * MS);
        pipeline.setup(&mut doc, root, 20 * MS);
        assert_eq!(doc.observer_count(), 1);
        pipeline.teardown(&mut doc);
        assert_eq!(doc.observer_count(), 0);
        assert!(!pipeline.is_active());
    }

    #[test]
    fn teardown_cancels_a_pending_flush() {
        let core = Core::default();
        let mut doc = Document::new();
        let root = doc.root();
        let body = doc.body().unwrap();
        let mut pipeline = ChangePipeline::default();
        pipeline.setup(&mut doc, root, 10 * MS);
        let text = doc.create_text("${1}");
        doc.append_child(body, text).unwrap();
        assert_eq!(pipeline.deliver(&mut doc, Duration::ZERO), 1);
        pipeline.teardown(&mut doc);
        assert!(!pipeline.flush_if_due(&core, &mut doc, 50 * MS));
        assert_eq!(doc.text(text), Some("${1}"));
    }

    #[test]
    fn reconfigure_keeps_the_batch() {
        let core = Core::default();
        let mut doc = Document::new();
        let root = doc.root();
        let body = doc.body().unwrap();
        let mut pipeline = ChangePipeline::default();
        pipeline.setup(&mut doc, root, 10 * MS);
        let delivered = doc.create_text("${1}");
        doc.append_child(body, delivered).unwrap();
        pipeline.deliver(&mut doc, Duration::ZERO);
        let queued = doc.create_text("${2}");
        doc.append_child(body, queued).unwrap();

        pipeline.reconfigure(&mut doc, root, 50 * MS, 2 * MS);
        assert_eq!(doc.observer_count(), 1);
        assert_eq!(pipeline.deadline(), Some(52 * MS));
        assert!(pipeline.flush_if_due(&core, &mut doc, 52 * MS));
        assert_eq!(doc.text(delivered), Some("1"));
        assert_eq!(doc.text(queued), Some("2"));
    }

    #[test]
    fn flush_now_ignores_the_deadline() {
        let core = Core::default();
        let mut doc = Document::new();
        let root = doc.root();
        let body = doc.body().unwrap();
        let mut pipeline = ChangePipeline::default();
        pipeline.setup(&mut doc, root, 10 * MS);
        assert!(!pipeline.flush_now(&core, &mut doc, Duration::ZERO));
        let text = doc.create_text("${3}");
        doc.append_child(body, text).unwrap();
        assert!(pipeline.flush_now(&core, &mut doc, Duration::ZERO));
        assert_eq!(doc.text(text), Some("3"));
        assert_eq!(pipeline.deadline(), None);
    }

    #[test]
    fn flush_processes_the_batch_once_due() {
        let core = Core::default();
        let mut doc = Document::new();
        let root = doc.root();
        let body = doc.body().unwrap();
        let mut pipeline = ChangePipeline::default();
        pipeline.setup(&mut doc, root, 10 * MS);
        let text = doc.create_text("${6 * 7}");
        doc.append_child(body, text).unwrap();
        pipeline.deliver(&mut doc, Duration::ZERO);
        assert!(!pipeline.flush_if_due(&core, &mut doc, 9 * MS));
        assert!(pipeline.flush_if_due(&core, &mut doc, 10 * MS));
        assert_eq!(doc.text(text), Some("42"));
        assert_eq!(pipeline.passes(), 1);
        assert_eq!(pipeline.deliver(&mut doc, 10 * MS), 0);
    }
}
