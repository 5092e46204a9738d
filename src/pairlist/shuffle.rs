use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Randomises pair order; a fixed seed gives the same order for the same input
#[derive(Debug, Clone)]
pub struct ShuffleFilter {
    seed: Option<u64>,
}

impl ShuffleFilter {
    pub fn new(seed: Option<u64>) -> Self {
        if seed.is_none() {
            tracing::debug!("ShuffleFilter without a seed, order will differ between runs");
        }
        Self { seed }
    }

    pub fn filter(&self, pairs: &[String]) -> Vec<String> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut shuffled = pairs.to_vec();
        shuffled.shuffle(&mut rng);
        shuffled
    }
}
