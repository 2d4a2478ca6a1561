//! Weighted fair queue selection.
//!
//! Smooth weighted round-robin picks the preferred queue for each dequeue,
//! so over any window of `sum(weights)` picks each queue is preferred in
//! proportion to its weight. The remaining queues follow as fallbacks in
//! weight order, which keeps workers busy when the preferred queue is empty
//! without letting a busy high-priority queue starve the others.

use crate::task::QueueName;

/// Relative dequeue weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueWeights {
    pub critical: u32,
    pub default: u32,
    pub low: u32,
}

impl QueueWeights {
    pub fn weight(&self, queue: QueueName) -> u32 {
        match queue {
            QueueName::Critical => self.critical,
            QueueName::Default => self.default,
            QueueName::Low => self.low,
        }
    }
}

impl Default for QueueWeights {
    fn default() -> Self {
        Self {
            critical: 6,
            default: 3,
            low: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeightedSelector {
    slots: Vec<Slot>,
    total: i64,
}

#[derive(Debug, Clone)]
struct Slot {
    queue: QueueName,
    weight: i64,
    current: i64,
}

impl WeightedSelector {
    pub fn new(weights: QueueWeights) -> Self {
        let slots: Vec<Slot> = QueueName::ALL
            .iter()
            .map(|&queue| Slot {
                queue,
                weight: weights.weight(queue) as i64,
                current: 0,
            })
            .collect();
        let total = slots.iter().map(|s| s.weight).sum();
        Self { slots, total }
    }

    /// The queue to try first on the next dequeue.
    pub fn next_preferred(&mut self) -> QueueName {
        if self.total == 0 {
            return QueueName::ALL[0];
        }
        for slot in &mut self.slots {
            slot.current += slot.weight;
        }
        // Ties go to the earlier (higher priority) queue.
        let mut best = 0;
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.current > self.slots[best].current {
                best = i;
            }
        }
        self.slots[best].current -= self.total;
        self.slots[best].queue
    }

    /// Dequeue order for the next claim: the preferred queue, then the rest
    /// by descending weight.
    pub fn next_order(&mut self) -> Vec<QueueName> {
        let preferred = self.next_preferred();
        let mut rest: Vec<&Slot> = self.slots.iter().filter(|s| s.queue != preferred).collect();
        rest.sort_by(|a, b| b.weight.cmp(&a.weight));

        let mut order = Vec::with_capacity(self.slots.len());
        order.push(preferred);
        order.extend(rest.into_iter().map(|s| s.queue));
        order
    }
}
