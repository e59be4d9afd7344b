//! Weighted queue selection
//!
//! Smooth weighted round-robin over the three queue classes: with weights
//! 6:3:1 every window of ten picks yields exactly six critical, three default
//! and one low, interleaved rather than in bursts. When the picked class is
//! empty the worker falls through to the others, so no worker idles while
//! any class has ready work.

use crate::config::QueueWeights;
use crate::messaging::QueueClass;

#[derive(Debug, Clone)]
struct Slot {
    queue: QueueClass,
    weight: i64,
    current: i64,
}

#[derive(Debug, Clone)]
pub struct WeightedQueueSelector {
    slots: Vec<Slot>,
    total: i64,
}

impl WeightedQueueSelector {
    pub fn new(weights: QueueWeights) -> Self {
        let slots: Vec<Slot> = QueueClass::ALL
            .into_iter()
            .map(|queue| Slot {
                queue,
                weight: i64::from(weights.weight(queue)),
                current: 0,
            })
            .collect();
        let total = slots.iter().map(|slot| slot.weight).sum();
        Self { slots, total }
    }

    /// Next class by weight
    pub fn pick(&mut self) -> QueueClass {
        for slot in &mut self.slots {
            slot.current += slot.weight;
        }
        // Ties go to the earlier (higher priority) class
        let mut best = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.current > self.slots[best].current {
                best = index;
            }
        }
        self.slots[best].current -= self.total;
        self.slots[best].queue
    }

    /// The picked class followed by the remaining classes, heaviest first
    pub fn next_order(&mut self) -> Vec<QueueClass> {
        let first = self.pick();
        let mut rest: Vec<&Slot> = self.slots.iter().filter(|slot| slot.queue != first).collect();
        rest.sort_by(|a, b| b.weight.cmp(&a.weight));

        let mut order = Vec::with_capacity(self.slots.len());
        order.push(first);
        order.extend(rest.into_iter().map(|slot| slot.queue));
        order
    }
}
