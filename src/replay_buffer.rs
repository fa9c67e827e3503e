use ndarray::Array1;
use rand::Rng;
use rand::seq::index;
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq)]
pub struct Experience {
    pub state: Array1<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: Array1<f32>,
    pub done: bool,
}

/// Fixed-capacity FIFO of transitions, owned by a single agent.
///
/// Not part of a checkpoint: a loaded agent starts with an empty buffer.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    buffer: VecDeque<Experience>,
    capacity: usize,
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        ReplayBuffer::new(10_000)
    }
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        ReplayBuffer {
            buffer: VecDeque::with_capacity(capacity.min(65_536)),
            capacity: capacity.max(1),
        }
    }

    pub fn add(&mut self, experience: Experience) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(experience);
    }

    /// Sample up to `batch_size` distinct transitions.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<&Experience> {
        let amount = batch_size.min(self.buffer.len());
        index::sample(rng, self.buffer.len(), amount)
            .into_iter()
            .map(|i| &self.buffer[i])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn experience(i: usize) -> Experience {
        Experience {
            state: array![i as f32],
            action: i % 2,
            reward: 1.0,
            next_state: array![i as f32 + 1.0],
            done: false,
        }
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buffer = ReplayBuffer::new(3);
        for i in 0..5 {
            buffer.add(experience(i));
        }
        assert_eq!(buffer.len(), 3);
        let mut rng = StdRng::seed_from_u64(0);
        let sampled = buffer.sample(10, &mut rng);
        assert_eq!(sampled.len(), 3);
        assert!(sampled.iter().all(|e| e.state[0] >= 2.0));
    }

    #[test]
    fn test_sample_is_distinct() {
        let mut buffer = ReplayBuffer::new(100);
        for i in 0..50 {
            buffer.add(experience(i));
        }
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen: Vec<usize> = buffer.sample(20, &mut rng).iter().map(|e| e.state[0] as usize).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 20);
    }
}
