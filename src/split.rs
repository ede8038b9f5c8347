//! Train/validation partitioning.

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use crate::error::PcbScanError;

/// The two disjoint halves of a partitioned list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split<T> {
    pub train: Vec<T>,
    pub val: Vec<T>,
}

impl<T> Split<T> {
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty() && self.val.is_empty()
    }
}

/// Number of items that land in the train half: `floor(len * train_fraction)`.
pub fn train_count(len: usize, train_fraction: f64) -> usize {
    ((len as f64 * train_fraction).floor() as usize).min(len)
}

/// Shuffle `items` and cut them into train and val halves.
///
/// With `seed: None` the shuffle draws from the thread RNG and the result is
/// not reproducible between runs. Pass a seed to get the same assignment for
/// the same input order.
pub fn partition<T>(
    mut items: Vec<T>,
    train_fraction: f64,
    seed: Option<u64>,
) -> Result<Split<T>, PcbScanError> {
    validate_train_fraction(train_fraction)?;

    if let Some(seed) = seed {
        let mut rng = StdRng::seed_from_u64(seed);
        items.shuffle(&mut rng);
    } else {
        let mut rng = rand::rng();
        items.shuffle(&mut rng);
    }

    let cut = train_count(items.len(), train_fraction);
    let val = items.split_off(cut);

    Ok(Split { train: items, val })
}

/// Reject fractions outside `[0, 1]`, including NaN.
pub fn validate_train_fraction(train_fraction: f64) -> Result<(), PcbScanError> {
    if !(0.0..=1.0).contains(&train_fraction) {
        return Err(PcbScanError::InvalidConfiguration {
            message: format!("train fraction must be in the interval [0.0, 1.0], got {train_fraction}"),
        });
    }
    Ok(())
}
