//! Input history and replay for locally predicted components

use crate::component::{SyncComponent, TickContext};
use crate::error::SyncResult;
use crate::input::{InputChannel, InputFrame};
use crate::state::Value;
use crate::time::Time;
use log::{debug, warn};
use std::collections::VecDeque;

/// Input captured on one local tick
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    pub time: Time,
    /// Index of the last input packet sent before this frame
    pub index: u32,
    pub input: InputFrame,
}

/// Unacknowledged inputs of one predicted component, oldest first.
///
/// Records are only ever appended in capture order; acknowledgement removes
/// them from the front.
#[derive(Debug, Clone)]
pub struct PredictionBuffer {
    queue: VecDeque<InputRecord>,
    capacity: usize,
}

impl PredictionBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputRecord> {
        self.queue.iter()
    }

    pub fn indices(&self) -> Vec<u32> {
        self.queue.iter().map(|record| record.index).collect()
    }

    /// Appends a record. Records older than the newest one are refused.
    pub fn record(&mut self, time: Time, index: u32, input: InputFrame) -> bool {
        if let Some(newest) = self.queue.back() {
            if index < newest.index || time.current() < newest.time.current() {
                warn!(
                    "Refusing out-of-order input record {} (newest is {})",
                    index, newest.index
                );
                return false;
            }
        }

        if self.queue.len() == self.capacity {
            if let Some(dropped) = self.queue.pop_front() {
                warn!(
                    "Prediction buffer full ({} entries), dropping input {}",
                    self.capacity, dropped.index
                );
            }
        }

        self.queue.push_back(InputRecord { time, index, input });
        true
    }

    /// Drops every record the server has already folded into its state,
    /// i.e. those with an index below `acked_index`. Returns how many went.
    pub fn discard_acknowledged(&mut self, acked_index: u32) -> usize {
        let mut discarded = 0;
        while self
            .queue
            .front()
            .is_some_and(|record| record.index < acked_index)
        {
            self.queue.pop_front();
            discarded += 1;
        }
        discarded
    }

    /// Reconciles `component` against an authoritative correction.
    ///
    /// The component is reset to `server_state` and every remaining record is
    /// replayed in order with its own input and time. The live state of
    /// `channel` is saved before the replay and restored afterwards. Returns
    /// the number of replayed records.
    pub fn reconcile(
        &mut self,
        component: &mut dyn SyncComponent,
        channel: &mut InputChannel,
        server_state: &[Value],
        acked_index: u32,
        entity: &str,
    ) -> SyncResult<usize> {
        let discarded = self.discard_acknowledged(acked_index);

        component.set_state(server_state)?;

        channel.save();
        for record in &self.queue {
            channel.inject(&record.input);
            let cx = TickContext {
                time: &record.time,
                input: &*channel,
                entity,
            };
            component.update(&cx);
        }
        channel.restore();

        debug!(
            "Reconciled {} on '{}' at ack {}: {} discarded, {} replayed",
            component.type_name(),
            entity,
            acked_index,
            discarded,
            self.queue.len()
        );

        Ok(self.queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{number_field, unknown_property, Component, SyncSchema, Synced};
    use crate::input::{InputDelta, KEY_RIGHT};
    use crate::state::Value;
    use std::collections::BTreeSet;

    /// Moves right while KEY_RIGHT is held and logs every tick time it saw
    #[derive(Debug, Default)]
    struct Walker {
        x: f64,
        seen: Vec<f64>,
    }

    impl Component for Walker {
        fn init(&mut self, schema: &mut SyncSchema<Self>) {
            schema.named("x");
        }

        fn field(&self, name: &str) -> Option<Value> {
            (name == "x").then(|| Value::from(self.x))
        }

        fn set_field(&mut self, name: &str, value: Value) -> SyncResult<()> {
            match name {
                "x" => self.x = number_field::<Self>(name, &value)?,
                _ => return Err(unknown_property::<Self>(name)),
            }
            Ok(())
        }

        fn update(&mut self, cx: &TickContext<'_>) {
            if cx.input.is_key_pressed(KEY_RIGHT) {
                self.x += 10.0 * cx.time.dt();
            }
            self.seen.push(cx.time.current());
        }
    }

    fn frame(held: &[u32]) -> InputFrame {
        InputFrame {
            delta: InputDelta::default(),
            held: held.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    fn tick_time(at: f64) -> Time {
        Time::with_interval(at - 1.0, 1.0).advanced(at)
    }

    #[test]
    fn test_record_keeps_order() {
        let mut buffer = PredictionBuffer::new(8);
        assert!(buffer.record(tick_time(1.0), 1, frame(&[])));
        assert!(buffer.record(tick_time(2.0), 1, frame(&[])));
        assert!(buffer.record(tick_time(3.0), 2, frame(&[])));
        assert!(!buffer.record(tick_time(4.0), 1, frame(&[])));
        assert_eq!(buffer.indices(), vec![1, 1, 2]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut buffer = PredictionBuffer::new(2);
        buffer.record(tick_time(1.0), 1, frame(&[]));
        buffer.record(tick_time(2.0), 2, frame(&[]));
        buffer.record(tick_time(3.0), 3, frame(&[]));
        assert_eq!(buffer.indices(), vec![2, 3]);
    }

    #[test]
    fn test_discard_acknowledged() {
        let mut buffer = PredictionBuffer::new(8);
        for index in 4..8 {
            buffer.record(tick_time(index as f64), index, frame(&[]));
        }
        assert_eq!(buffer.discard_acknowledged(5), 1);
        assert_eq!(buffer.indices(), vec![5, 6, 7]);
        assert_eq!(buffer.discard_acknowledged(3), 0);
    }

    #[test]
    fn test_reconcile_discards_then_replays_in_order() {
        let mut buffer = PredictionBuffer::new(8);
        for index in 4..8 {
            buffer.record(tick_time(index as f64), index, frame(&[KEY_RIGHT]));
        }

        let mut walker = Synced::new(Walker::default());
        let mut channel = InputChannel::new("me");

        let replayed = buffer
            .reconcile(&mut walker, &mut channel, &[Value::from(100.0)], 5, "e1")
            .unwrap();

        assert_eq!(replayed, 3);
        assert_eq!(buffer.indices(), vec![5, 6, 7]);
        assert_eq!(walker.inner().seen, vec![5.0, 6.0, 7.0]);
        // server truth plus three replayed one-second steps at 10 units/s
        assert_eq!(walker.inner().x, 130.0);
    }

    #[test]
    fn test_reconcile_uses_recorded_input_and_restores_live_input() {
        let mut buffer = PredictionBuffer::new(8);
        buffer.record(tick_time(1.0), 1, frame(&[KEY_RIGHT]));
        buffer.record(tick_time(2.0), 1, frame(&[]));

        let mut walker = Synced::new(Walker::default());
        let mut channel = InputChannel::new("me");
        channel.set_key_down(40);

        buffer
            .reconcile(&mut walker, &mut channel, &[Value::from(0.0)], 1, "e1")
            .unwrap();

        assert_eq!(walker.inner().x, 10.0);
        assert!(channel.is_key_pressed(40));
        assert!(!channel.is_key_pressed(KEY_RIGHT));
        assert_eq!(channel.peek_delta().down, vec![40]);
    }

    #[test]
    fn test_reconcile_with_bad_state_leaves_input_alone() {
        let mut buffer = PredictionBuffer::new(8);
        buffer.record(tick_time(1.0), 1, frame(&[KEY_RIGHT]));

        let mut walker = Synced::new(Walker::default());
        let mut channel = InputChannel::new("me");
        channel.set_key_down(38);

        let err = buffer
            .reconcile(&mut walker, &mut channel, &[], 0, "e1")
            .unwrap_err();

        assert!(err.is_contract_violation());
        assert!(walker.inner().seen.is_empty());
        assert!(channel.is_key_pressed(38));
    }
}
