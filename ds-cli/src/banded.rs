//! Random banded matrix generation for the demo pipeline.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Sparse structure of the multiplied matrix; only the shape matters here.
#[derive(Debug, Clone, Copy)]
pub struct MatrixInfo {
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
}

/// Random square banded matrix: every row holds a random subset of the
/// entries within `bandwidth` of the diagonal.
pub fn random_banded(n: usize, bandwidth: usize, seed: u64) -> MatrixInfo {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut nnz = 0usize;
    for row in 0..n {
        let lo = row.saturating_sub(bandwidth);
        let hi = (row + bandwidth).min(n - 1);
        let width = hi - lo + 1;
        // diagonal always present
        nnz += 1 + rng.gen_range(0..width);
    }
    MatrixInfo { rows: n, cols: n, nnz }
}

/// This rank's slice of the work: a contiguous block of rows, with the
/// entries reaching outside the block treated as halo coupling.
#[derive(Debug, Clone, Copy)]
pub struct RankWork {
    pub rows: usize,
    pub local_nnz: usize,
    pub halo_nnz: usize,
}

pub fn partition(m: &MatrixInfo, rank: u32, size: u32) -> RankWork {
    let size = size.max(1) as usize;
    let rank = rank as usize;
    let rows = m.rows / size + usize::from(rank < m.rows % size);
    let nnz = m.nnz / size;
    // single rank: nothing is remote
    let halo_nnz = if size == 1 { 0 } else { nnz / 10 };
    RankWork {
        rows,
        local_nnz: nnz - halo_nnz,
        halo_nnz,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banded_is_deterministic_per_seed() {
        let a = random_banded(1000, 4, 7);
        let b = random_banded(1000, 4, 7);
        assert_eq!(a.nnz, b.nnz);
        assert_eq!(a.rows, 1000);
        // at least the diagonal, at most the full band
        assert!(a.nnz >= 1000);
        assert!(a.nnz <= 1000 * 9);
    }

    #[test]
    fn partition_splits_rows_and_nnz() {
        let m = random_banded(1001, 4, 0);
        let total_rows: usize = (0..4).map(|r| partition(&m, r, 4).rows).sum();
        assert_eq!(total_rows, 1001);

        let w = partition(&m, 0, 4);
        assert!(w.halo_nnz > 0);
        assert!(w.local_nnz > w.halo_nnz);

        let solo = partition(&m, 0, 1);
        assert_eq!(solo.halo_nnz, 0);
    }
}
