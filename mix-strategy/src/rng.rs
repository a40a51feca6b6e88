use rand::rngs::{SmallRng, StdRng};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};

/// Pseudo-random generator backing a pool's random choices.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RngKind {
    #[default]
    Std,
    ChaCha,
    Small,
}

pub enum MixRng {
    Std(StdRng),
    ChaCha(ChaCha12Rng),
    Small(SmallRng),
}

impl MixRng {
    pub fn new(kind: RngKind, seed: Option<u64>) -> Self {
        match (kind, seed) {
            (RngKind::Std, Some(seed)) => Self::Std(StdRng::seed_from_u64(seed)),
            (RngKind::Std, None) => Self::Std(StdRng::from_entropy()),
            (RngKind::ChaCha, Some(seed)) => Self::ChaCha(ChaCha12Rng::seed_from_u64(seed)),
            (RngKind::ChaCha, None) => Self::ChaCha(ChaCha12Rng::from_entropy()),
            (RngKind::Small, Some(seed)) => Self::Small(SmallRng::seed_from_u64(seed)),
            (RngKind::Small, None) => Self::Small(SmallRng::from_entropy()),
        }
    }
}

impl RngCore for MixRng {
    fn next_u32(&mut self) -> u32 {
        match self {
            Self::Std(rng) => rng.next_u32(),
            Self::ChaCha(rng) => rng.next_u32(),
            Self::Small(rng) => rng.next_u32(),
        }
    }

    fn next_u64(&mut self) -> u64 {
        match self {
            Self::Std(rng) => rng.next_u64(),
            Self::ChaCha(rng) => rng.next_u64(),
            Self::Small(rng) => rng.next_u64(),
        }
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        match self {
            Self::Std(rng) => rng.fill_bytes(dest),
            Self::ChaCha(rng) => rng.fill_bytes(dest),
            Self::Small(rng) => rng.fill_bytes(dest),
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        match self {
            Self::Std(rng) => rng.try_fill_bytes(dest),
            Self::ChaCha(rng) => rng.try_fill_bytes(dest),
            Self::Small(rng) => rng.try_fill_bytes(dest),
        }
    }
}
