// PCG-LCG random numbers with skip-ahead seeding, so every particle of every
// batch gets its own reproducible stream without any shared generator.

use rand::{Rng, RngCore, SeedableRng};
use rand_distr::StandardNormal;

/// LCG multiplier
const PRN_MULT: u64 = 6364136223846793005;
/// LCG additive constant
const PRN_ADD: u64 = 1442695040888963407;
/// Number of LCG steps reserved for one particle's stream
pub const PRN_STRIDE: u64 = 152917;
/// 2^-53
const F64_UNIT: f64 = 1.0 / (1u64 << 53) as f64;
/// Master seed used when the run settings leave it unset
pub const DEFAULT_SEED: u64 = 1;

/// PCG generator: LCG state with an RXS-M-XS output permutation.
///
/// Reference: Melissa E. O'Neill, "PCG: A Family of Simple Fast Space-Efficient
/// Statistically Good Algorithms for Random Number Generation"
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FastRng {
    seed: u64,
}

impl FastRng {
    #[inline]
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Uniform f64 in [0, 1)
    #[inline(always)]
    pub fn random(&mut self) -> f64 {
        // top 53 bits, so the result never rounds up to 1.0
        (self.next_u64() >> 11) as f64 * F64_UNIT
    }

    #[inline]
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Current LCG state
    pub fn state(&self) -> u64 {
        self.seed
    }
}

/// LCG state reached from `seed` after `n` steps, in O(log n).
///
/// F. Brown, "Random Number Generation with Arbitrary Stride", Trans. Am.
/// Nucl. Soc. (1994).
pub fn future_seed(mut n: u64, seed: u64) -> u64 {
    let mut g = PRN_MULT;
    let mut c = PRN_ADD;
    let mut g_new = 1u64;
    let mut c_new = 0u64;

    while n > 0 {
        if n & 1 == 1 {
            g_new = g_new.wrapping_mul(g);
            c_new = c_new.wrapping_mul(g).wrapping_add(c);
        }
        c = g.wrapping_add(1).wrapping_mul(c);
        g = g.wrapping_mul(g);
        n >>= 1;
    }

    g_new.wrapping_mul(seed).wrapping_add(c_new)
}

impl SeedableRng for FastRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self {
            seed: u64::from_le_bytes(seed),
        }
    }
}

impl RngCore for FastRng {
    #[inline(always)]
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline(always)]
    fn next_u64(&mut self) -> u64 {
        self.seed = PRN_MULT.wrapping_mul(self.seed).wrapping_add(PRN_ADD);

        let word = ((self.seed >> ((self.seed >> 59) + 5)) ^ self.seed)
            .wrapping_mul(12605985483714917081);
        (word >> 43) ^ word
    }

    #[inline]
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut left = dest;
        while left.len() >= 8 {
            let bytes = self.next_u64().to_le_bytes();
            left[..8].copy_from_slice(&bytes);
            left = &mut left[8..];
        }
        if !left.is_empty() {
            let bytes = self.next_u64().to_le_bytes();
            left.copy_from_slice(&bytes[..left.len()]);
        }
    }

    #[inline]
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Independent sub-streams of one particle's seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Index selection and kernel perturbation of an emitted particle
    Source = 0,
    /// Per-batch offset of systematic selection
    Selection = 1,
}

impl StreamKind {
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Source => "source",
            StreamKind::Selection => "selection",
        }
    }
}

/// A caller-owned source of uniform and Gaussian variates.
///
/// Each sampling context (thread, worker or particle) owns one. Two streams
/// built from the same seed produce the same sequence.
#[derive(Clone, Debug)]
pub struct RandomStream {
    rng: FastRng,
    kind: StreamKind,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: FastRng::new(seed),
            kind: StreamKind::Source,
        }
    }

    /// The stream of one particle, derived from the run's master seed.
    ///
    /// Particle ids start at 1; batch `b` of `n` particles covers
    /// `b·n + 1 ..= b·n + n`.
    pub fn for_particle(master_seed: u64, particle_id: u64, kind: StreamKind) -> Self {
        let seed = future_seed(
            particle_id.wrapping_mul(PRN_STRIDE),
            master_seed.wrapping_add(kind as u64),
        );
        Self {
            rng: FastRng::new(seed),
            kind,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Uniform variate in [0, 1)
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.rng.random()
    }

    /// Standard normal variate
    #[inline]
    pub fn normal(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    /// Mutable access for code written against `rand::Rng`
    pub fn rng(&mut self) -> &mut FastRng {
        &mut self.rng
    }
}
