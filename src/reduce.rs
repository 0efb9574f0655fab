//! Collection of simple collective reductions.
//!
//! Used by the verification drivers and tests to combine per-rank results
//! (error norms, checksums) over any communicator, including the plan's
//! Cartesian communicator.

use mpi::collective::CommunicatorCollectives;
use mpi::topology::Communicator;
use mpi::traits::Equivalence;
use num_traits::Zero;

/// Gather one value from every rank and reduce the list with a closure on
/// all processes.
///
/// # Panics
/// i32 to usize conversion
pub fn all_gather_apply<T, F, C>(comm: &C, data: T, f: F) -> T
where
    C: Communicator,
    T: Zero + Equivalence + Clone,
    F: Fn(&[T]) -> T,
{
    let size = usize::try_from(comm.size()).expect("communicator size is positive");
    let mut gathered = vec![T::zero(); size];
    comm.all_gather_into(&data, &mut gathered[..]);
    f(&gathered)
}

/// Sum of one value per rank, on all processes.
pub fn all_gather_sum<T, C>(comm: &C, data: T) -> T
where
    C: Communicator,
    T: Zero + Equivalence + Clone + Copy + std::iter::Sum,
{
    all_gather_apply(comm, data, |x| x.iter().copied().sum())
}

/// Maximum of one value per rank, on all processes.
pub fn all_gather_max<T, C>(comm: &C, data: T) -> T
where
    C: Communicator,
    T: Zero + Equivalence + Clone + Copy + PartialOrd,
{
    all_gather_apply(comm, data, |x| {
        x.iter()
            .copied()
            .reduce(|a, b| if b > a { b } else { a })
            .expect("communicator has at least one rank")
    })
}
