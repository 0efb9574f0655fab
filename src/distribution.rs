//! # Data distribution
//!
//! Store size and starting index of the current processor and of all
//! participating processors along a single, possibly split, dimension.

use std::ops::Range;

/// Distribute grid points to processors along one axis.
///
/// The partition is balanced to within one point, covers the axis exactly,
/// and depends only on `(n_global, nprocs)`, so every processor derives the
/// same tables without communication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    /// Size of data of current processor
    pub sz: usize,
    /// Starting index of data of current processor
    pub st: usize,
    /// Size of data of all processors
    pub sz_procs: Vec<usize>,
    /// Starting index of data of all processors
    pub st_procs: Vec<usize>,
}

impl Distribution {
    /// Generate new contiguous decomposition, i.e. sz = `n_global`
    ///
    /// # Arguments
    /// * `n_global`: Total number of grid points along the axis
    #[must_use]
    pub fn contiguous(n_global: usize) -> Self {
        Self {
            sz: n_global,
            st: 0,
            sz_procs: vec![n_global],
            st_procs: vec![0],
        }
    }

    /// Generate split decomposition
    ///
    /// # Arguments
    /// * `n_global`: Total number of grid points along the axis
    /// * `nprocs`: Number of processors
    /// * `nrank`: Current processor id
    ///
    /// # Panics
    /// If `nrank >= nprocs` or `nprocs == 0`.
    #[must_use]
    pub fn split(n_global: usize, nprocs: usize, nrank: usize) -> Self {
        assert!(nrank < nprocs, "rank {nrank} outside 0..{nprocs}");
        let (st_procs, sz_procs) = Self::distribute(n_global, nprocs);
        let st = st_procs[nrank];
        let sz = sz_procs[nrank];
        Self {
            sz,
            st,
            sz_procs,
            st_procs,
        }
    }

    /// Distribute grid points across processors along one dimension.
    ///
    /// Processor `p` of `P` owns `[p·n/P, (p+1)·n/P)`; the chunk lengths
    /// differ by at most one and sum to `n_global` exactly.
    fn distribute(n_global: usize, nprocs: usize) -> (Vec<usize>, Vec<usize>) {
        let mut st = Vec::with_capacity(nprocs);
        let mut sz = Vec::with_capacity(nprocs);
        for p in 0..nprocs {
            let lo = p * n_global / nprocs;
            let hi = (p + 1) * n_global / nprocs;
            st.push(lo);
            sz.push(hi - lo);
        }
        (st, sz)
    }

    /// Number of processors sharing the axis.
    #[must_use]
    pub fn nprocs(&self) -> usize {
        self.sz_procs.len()
    }

    /// Global index range of the current processor.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.st..self.st + self.sz
    }

    /// Global index range of processor `p`.
    ///
    /// # Panics
    /// If `p` is not a valid rank along this axis.
    #[must_use]
    pub fn range_of(&self, p: usize) -> Range<usize> {
        self.st_procs[p]..self.st_procs[p] + self.sz_procs[p]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_is_complete_and_disjoint() {
        for n in [1, 2, 5, 16, 21, 41, 192] {
            for p in [1, 2, 3, 4, 7, 8] {
                let (st, sz) = Distribution::distribute(n, p);
                assert_eq!(sz.iter().sum::<usize>(), n);
                let mut next = 0;
                for rank in 0..p {
                    assert_eq!(st[rank], next, "gap or overlap at rank {rank}");
                    next += sz[rank];
                }
                assert_eq!(next, n);
            }
        }
    }

    #[test]
    fn partition_is_balanced_within_one() {
        for n in [5, 16, 21, 41, 100] {
            for p in [2, 3, 4, 7] {
                let (_, sz) = Distribution::distribute(n, p);
                let lo = sz.iter().min().unwrap();
                let hi = sz.iter().max().unwrap();
                assert!(hi - lo <= 1, "n={n} p={p}: {sz:?}");
            }
        }
    }

    #[test]
    fn split_matches_tables() {
        let d = Distribution::split(21, 4, 2);
        assert_eq!(d.sz, d.sz_procs[2]);
        assert_eq!(d.st, d.st_procs[2]);
        assert_eq!(d.range(), d.range_of(2));
        assert_eq!(d.nprocs(), 4);
    }

    #[test]
    fn contiguous_owns_everything() {
        let d = Distribution::contiguous(9);
        assert_eq!(d.range(), 0..9);
        assert_eq!(d.nprocs(), 1);
        assert_eq!(d.range_of(0), 0..9);
    }

    #[test]
    fn more_procs_than_points_leaves_empty_chunks() {
        let (st, sz) = Distribution::distribute(2, 4);
        assert_eq!(sz.iter().sum::<usize>(), 2);
        assert_eq!(st.len(), 4);
        assert!(sz.iter().any(|&s| s == 0));
    }
}
