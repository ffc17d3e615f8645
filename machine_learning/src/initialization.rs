use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Uniform};

use crate::{MlErr, Result};

/// Creates the random number generator used for parameter initialization.
///
/// # Arguments
/// * `seed` - An optional seed, for reproducible models.
pub fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => {
            debug!("seeding parameter initialization with {seed}");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_os_rng(),
    }
}

/// Fills `out` with samples of a uniform distribution in `[low, high)`.
///
/// # Returns
/// An error if the range is invalid (low > high).
pub fn uniform<R: Rng>(rng: &mut R, out: &mut [f32], low: f32, high: f32) -> Result<()> {
    let distribution = Uniform::new(low, high).map_err(|e| MlErr::Init(e.to_string()))?;

    for w in out.iter_mut() {
        *w = distribution.sample(rng);
    }

    Ok(())
}

/// Fills `out` using Xavier uniform initialization.
///
/// # Arguments
/// * `rng` - A random number generator.
/// * `out` - The weights to fill.
/// * `fan_in` - The number of input units in the weight tensor.
/// * `fan_out` - The number of output units in the weight tensor.
///
/// # Returns
/// An error if the calculated range is invalid.
pub fn xavier_uniform<R: Rng>(
    rng: &mut R,
    out: &mut [f32],
    fan_in: usize,
    fan_out: usize,
) -> Result<()> {
    let range = (6. / (fan_in + fan_out).max(1) as f32).sqrt();
    uniform(rng, out, -range, range)
}
