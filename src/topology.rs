//! Cartesian arrangement of processes.
//!
//! A [`Topology`] lays the ranks of a flat communicator out as an
//! `M`-dimensional grid and extracts, for every grid dimension, the
//! sub-communicator of ranks sharing all other coordinates. Those
//! sub-communicators are the scope of every transposition.

use crate::error::{Error, Result};
use mpi::collective::CommunicatorCollectives;
use mpi::topology::{CartesianCommunicator, CartesianLayout, Communicator};

/// M-dimensional Cartesian process grid with one sub-communicator per grid
/// dimension.
///
/// Construction is collective on the parent communicator. Pencils, plans
/// and arrays share one topology through `Rc`.
pub struct Topology<const M: usize> {
    comm: CartesianCommunicator,
    subcomms: [CartesianCommunicator; M],
    dims: [i32; M],
    coords: [i32; M],
    sub_ranks: [Vec<i32>; M],
    world_size: i32,
}

impl<const M: usize> Topology<M> {
    /// Build the Cartesian grid and its axis sub-communicators.
    ///
    /// # Arguments
    /// * `comm`: flat parent communicator (rank reordering is permitted)
    /// * `dims`: processes per grid dimension
    ///
    /// # Errors
    /// [`Error::Config`] if `dims` does not multiply to the communicator
    /// size; [`Error::Comm`] if the message layer hands back the null
    /// communicator.
    pub fn new<C: Communicator>(comm: &C, dims: [i32; M]) -> Result<Self> {
        let world_size = comm.size();
        let prod = dims.iter().product::<i32>();
        if prod != world_size {
            return Err(Error::Config(format!(
                "process grid {dims:?} needs {prod} ranks, communicator has {world_size}"
            )));
        }
        if dims.iter().any(|&d| d < 1) {
            return Err(Error::Config(format!(
                "process grid {dims:?} has an empty dimension"
            )));
        }
        let periodic = [false; M];
        let cart = comm
            .create_cartesian_communicator(&dims, &periodic, true)
            .ok_or_else(|| Error::Comm("Cart_create returned the null communicator".into()))?;
        let CartesianLayout { coords, .. } = cart.get_layout();
        let coords: [i32; M] = coords
            .try_into()
            .map_err(|_| Error::Comm("Cartesian layout dimensionality mismatch".into()))?;

        let subcomms: [CartesianCommunicator; M] = std::array::from_fn(|k| {
            let mut retain = [false; M];
            retain[k] = true;
            cart.subgroup(&retain)
        });

        // Parent-communicator rank of every member, in sub-communicator order.
        let parent_rank = comm.rank();
        let sub_ranks: [Vec<i32>; M] = std::array::from_fn(|k| {
            let sc = &subcomms[k];
            let mut ranks = vec![0_i32; usize::try_from(sc.size()).unwrap_or(0)];
            sc.all_gather_into(&parent_rank, &mut ranks[..]);
            ranks
        });

        Ok(Self {
            comm: cart,
            subcomms,
            dims,
            coords,
            sub_ranks,
            world_size,
        })
    }

    /// The full Cartesian communicator.
    #[must_use]
    pub fn comm(&self) -> &CartesianCommunicator {
        &self.comm
    }

    /// Sub-communicator of grid dimension `k`.
    ///
    /// # Panics
    /// If `k >= M`.
    #[must_use]
    pub fn subcomm(&self, k: usize) -> &CartesianCommunicator {
        &self.subcomms[k]
    }

    /// Parent-communicator ranks of the members of sub-communicator `k`,
    /// ordered by sub-communicator rank.
    #[must_use]
    pub fn sub_ranks(&self, k: usize) -> &[i32] {
        &self.sub_ranks[k]
    }

    #[must_use]
    pub fn dims(&self) -> [i32; M] {
        self.dims
    }

    #[must_use]
    pub fn coords(&self) -> [i32; M] {
        self.coords
    }

    /// Number of processes along grid dimension `k`.
    ///
    /// # Panics
    /// Never for valid `k`; conversions from the message layer's counts are
    /// guaranteed non-negative.
    #[must_use]
    pub fn nprocs(&self, k: usize) -> usize {
        usize::try_from(self.dims[k]).expect("grid dimension is positive")
    }

    /// Cartesian coordinate of the local rank along grid dimension `k`.
    #[must_use]
    pub fn coord(&self, k: usize) -> usize {
        usize::try_from(self.coords[k]).expect("coordinate is non-negative")
    }

    #[must_use]
    pub fn world_size(&self) -> i32 {
        self.world_size
    }
}

/// Balanced factorisation of `world_size` into `M` grid dimensions,
/// non-increasing, in the spirit of `MPI_Dims_create` (which the message
/// layer does not expose).
///
/// # Panics
/// If `world_size < 1`.
#[must_use]
pub fn balanced_dims<const M: usize>(world_size: i32) -> [i32; M] {
    assert!(world_size >= 1, "communicator size must be positive");
    let mut dims = [1_i32; M];
    if M == 0 {
        return dims;
    }
    let mut factors = Vec::new();
    let mut n = world_size;
    let mut f = 2;
    while f * f <= n {
        while n % f == 0 {
            factors.push(f);
            n /= f;
        }
        f += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    // Largest factors first, each onto the currently smallest dimension.
    for &p in factors.iter().rev() {
        let d = dims
            .iter()
            .enumerate()
            .min_by_key(|(_, &v)| v)
            .map(|(i, _)| i)
            .expect("M > 0");
        dims[d] *= p;
    }
    dims.sort_unstable_by(|a, b| b.cmp(a));
    dims
}

#[cfg(test)]
mod tests {
    use super::balanced_dims;

    #[test]
    fn balanced_dims_multiplies_back() {
        for n in 1..=64 {
            let d2: [i32; 2] = balanced_dims(n);
            assert_eq!(d2.iter().product::<i32>(), n);
            assert!(d2[0] >= d2[1]);
            let d1: [i32; 1] = balanced_dims(n);
            assert_eq!(d1, [n]);
        }
    }

    #[test]
    fn balanced_dims_is_square_when_possible() {
        assert_eq!(balanced_dims::<2>(4), [2, 2]);
        assert_eq!(balanced_dims::<2>(8), [4, 2]);
        assert_eq!(balanced_dims::<2>(12), [4, 3]);
        assert_eq!(balanced_dims::<3>(8), [2, 2, 2]);
    }
}
