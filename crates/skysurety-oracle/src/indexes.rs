/// PSEUDO-RANDOM ORACLE INDEX ASSIGNMENT
///
/// Indexes are drawn from a deterministic generator seeded by the caller
/// address, a monotonically incrementing nonce and a fixed salt. The output
/// is unpredictable enough to spread request load across oracle operators,
/// and NOT adversarially secure: a participant who knows the nonce can
/// predict its own assignment. Nothing in the protocol relies on secrecy of
/// the indexes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use skysurety_core::Address;

/// Indexes assigned to every oracle.
pub const INDEXES_PER_ORACLE: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexGenerator {
    nonce: u64,
    salt: u64,
}

impl IndexGenerator {
    pub fn new(salt: u64) -> Self {
        IndexGenerator { nonce: 0, salt }
    }

    fn next_rng(&mut self, address: &Address) -> StdRng {
        self.nonce = self.nonce.wrapping_add(1);

        let mut hasher = Sha256::new();
        hasher.update(address.as_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.salt.to_le_bytes());
        let digest = hasher.finalize();

        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        StdRng::from_seed(seed)
    }

    /// Draw a single index in `[0, space)`.
    pub fn next_index(&mut self, address: &Address, space: u8) -> u8 {
        self.next_rng(address).gen_range(0..space)
    }

    /// Draw three pairwise-distinct indexes in `[0, space)`.
    ///
    /// Regenerates until the triple is distinct; terminates for any
    /// `space >= 3` (enforced by parameter validation).
    pub fn assign_indexes(&mut self, address: &Address, space: u8) -> [u8; INDEXES_PER_ORACLE] {
        let mut rng = self.next_rng(address);

        let first = rng.gen_range(0..space);
        let mut second = rng.gen_range(0..space);
        while second == first {
            second = rng.gen_range(0..space);
        }
        let mut third = rng.gen_range(0..space);
        while third == first || third == second {
            third = rng.gen_range(0..space);
        }

        [first, second, third]
    }
}
