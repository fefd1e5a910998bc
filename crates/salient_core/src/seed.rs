//! Seeds for reproducible noise sampling.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Random number generator used for input perturbations.
pub type NoiseRng = ChaCha8Rng;

/// A seed for the perturbation noise of sampling-based interpreters.
///
/// Two interpreters driven by the same seed draw the same noise, so their
/// attribution maps are identical for the same model and inputs.
///
/// # Example
///
/// ```rust
/// use rand::Rng;
/// use salient_core::Seed;
///
/// let mut a = Seed::new(7).to_rng();
/// let mut b = Seed::new(7).to_rng();
/// assert_eq!(a.gen::<f32>(), b.gen::<f32>());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(u64);

impl Seed {
    /// Wrap a raw seed value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw seed value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Create the ChaCha8 generator for this seed.
    #[must_use]
    pub fn to_rng(&self) -> NoiseRng {
        NoiseRng::seed_from_u64(self.0)
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

/// Build the noise generator for an optional seed.
///
/// Without a seed the generator is drawn from OS entropy and runs are not
/// reproducible.
#[must_use]
pub fn noise_rng(seed: Option<Seed>) -> NoiseRng {
    match seed {
        Some(seed) => seed.to_rng(),
        None => NoiseRng::from_entropy(),
    }
}
