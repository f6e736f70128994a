use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

/// Number of leading zero hex digits a valid proof hash must have.
/// Shared by every node; changing it forks the network.
pub const DIFFICULTY: usize = 4;

// How many candidates to try between cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// Checks whether `proof` solves the puzzle for the block whose proof is
/// `last_proof` and whose hash is `last_hash`
pub fn valid_proof(last_proof: u64, proof: u64, last_hash: &str) -> bool {
    let guess = format!("{}{}{}", last_proof, proof, last_hash);
    let digest = Sha256::digest(guess.as_bytes());

    // Each byte holds two hex digits
    let zero_bytes = DIFFICULTY / 2;
    if digest[..zero_bytes].iter().any(|byte| *byte != 0) {
        return false;
    }
    DIFFICULTY % 2 == 0 || digest[zero_bytes] >> 4 == 0
}

/// Searches proofs upward from zero until one is valid. Never gives up.
pub fn solve(last_proof: u64, last_hash: &str) -> u64 {
    let mut proof = 0;
    while !valid_proof(last_proof, proof, last_hash) {
        proof += 1;
    }
    proof
}

/// Like [`solve`], but returns `None` once `cancel` has been triggered
pub fn solve_until(last_proof: u64, last_hash: &str, cancel: &CancellationToken) -> Option<u64> {
    let mut proof = 0;
    loop {
        if proof % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return None;
        }
        if valid_proof(last_proof, proof, last_hash) {
            return Some(proof);
        }
        proof += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Block;

    fn hex_digest(last_proof: u64, proof: u64, last_hash: &str) -> String {
        format!("{:x}", Sha256::digest(format!("{}{}{}", last_proof, proof, last_hash).as_bytes()))
    }

    #[test]
    fn test_solve_finds_valid_proof() {
        let genesis = Block::genesis();
        let last_hash = genesis.hash();

        let proof = solve(genesis.proof, &last_hash);
        assert!(valid_proof(genesis.proof, proof, &last_hash));
        assert!(hex_digest(genesis.proof, proof, &last_hash).starts_with("0000"));
    }

    #[test]
    fn test_first_proof_on_genesis() {
        let genesis = Block::genesis();
        assert_eq!(solve(genesis.proof, &genesis.hash()), 40818);
    }

    #[test]
    fn test_solve_returns_smallest_proof() {
        let last_hash = Block::genesis().hash();
        let proof = solve(7, &last_hash);

        assert!((0..proof).all(|candidate| !valid_proof(7, candidate, &last_hash)));
    }

    #[test]
    fn test_valid_proof_matches_hex_prefix() {
        let last_hash = "abc";
        for proof in 0..2000 {
            let expected = hex_digest(1, proof, last_hash).starts_with(&"0".repeat(DIFFICULTY));
            assert_eq!(valid_proof(1, proof, last_hash), expected);
        }
    }

    #[test]
    fn test_solve_until_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(solve_until(100, "hash", &cancel), None);
    }

    #[test]
    fn test_solve_until_agrees_with_solve() {
        let cancel = CancellationToken::new();
        let last_hash = Block::genesis().hash();

        assert_eq!(solve_until(100, &last_hash, &cancel), Some(solve(100, &last_hash)));
    }
}
