use tokio::sync::mpsc;

/// One emitted change, stamped with its position in the global emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<E> {
    pub seq: u64,
    pub payload: E,
}

/// Ordered, non-reentrant change notification.
///
/// `emit` never calls back into observer code: events are queued on each
/// subscriber's unbounded channel and consumed whenever the observer next
/// polls. Every subscriber therefore sees every event emitted after it
/// subscribed exactly once, in emission order, regardless of what it does
/// while handling one.
#[derive(Debug)]
pub struct EventBus<E> {
    next_seq: u64,
    subscribers: Vec<mpsc::UnboundedSender<Event<E>>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_seq: 0,
            subscribers: Vec::new(),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Event<E>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Emits `payload` and returns its sequence number.
    ///
    /// Subscribers whose receiver was dropped are pruned here.
    pub fn emit(&mut self, payload: E) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.subscribers.retain(|tx| {
            tx.send(Event {
                seq,
                payload: payload.clone(),
            })
            .is_ok()
        });
        seq
    }

    /// Number of events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.next_seq
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Drains everything currently queued on `rx` without waiting.
pub fn drain_ready<E>(rx: &mut mpsc::UnboundedReceiver<Event<E>>) -> Vec<Event<E>> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{EventBus, drain_ready};

    #[test]
    fn events_are_sequenced_in_emission_order() {
        let mut bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit("a");
        bus.emit("b");
        bus.emit("c");

        let got: Vec<(u64, &str)> = drain_ready(&mut rx)
            .into_iter()
            .map(|e| (e.seq, e.payload))
            .collect();
        assert_eq!(got, vec![(0, "a"), (1, "b"), (2, "c")]);
    }

    #[test]
    fn late_subscriber_only_sees_later_events() {
        let mut bus = EventBus::new();
        bus.emit(1);
        let mut rx = bus.subscribe();
        bus.emit(2);
        let got: Vec<i32> = drain_ready(&mut rx).into_iter().map(|e| e.payload).collect();
        assert_eq!(got, vec![2]);
        assert_eq!(bus.emitted(), 2);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let rx = bus.subscribe();
        let _keep = bus.subscribe();
        drop(rx);
        bus.emit(());
        assert_eq!(bus.subscriber_count(), 1);
    }
}
