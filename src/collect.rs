//! Gather pencil data onto the root rank and scatter it back.
//!
//! Debugging and I/O aid: the root assembles the full logical array from
//! every rank's block (or splits one up for distribution). Both operations
//! are collective on the pencil's Cartesian communicator. Per-rank block
//! extents are exchanged once with an all-gather instead of querying the
//! message layer for remote Cartesian coordinates.

use crate::array::DistArray;
use crate::dtype::{as_scalars, as_scalars_mut, Element};
use crate::error::{Error, Result};
use crate::pencil::Pencil;
use crate::transpose::{block_runs, gather_run, scatter_run};
use mpi::collective::{CommunicatorCollectives, Root};
use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::Communicator;
use mpi::Count;
use ndarray::{Array, Dim, Dimension, IntoDimension};
use num_traits::Zero;
use std::ops::Range;

fn row_major_strides<const N: usize>(shape: &[usize; N]) -> [usize; N] {
    let mut strides = [1usize; N];
    for d in (0..N.saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// Per-rank block extents `(start, len)` per axis, identical on all ranks
/// after one all-gather.
fn gather_blocks<const N: usize, const M: usize>(
    pencil: &Pencil<N, M>,
) -> Result<Vec<[Range<usize>; N]>> {
    let comm = pencil.topology().comm();
    let size = usize::try_from(comm.size())
        .map_err(|_| Error::Comm("negative communicator size".into()))?;
    let range = pencil.local_range();
    let mut my_meta = Vec::with_capacity(2 * N);
    for r in &range {
        my_meta.push(r.start as u64);
        my_meta.push(r.len() as u64);
    }
    let mut all_meta = vec![0u64; 2 * N * size];
    comm.all_gather_into(&my_meta[..], &mut all_meta[..]);
    Ok((0..size)
        .map(|r| {
            std::array::from_fn(|a| {
                let st = all_meta[2 * N * r + 2 * a] as usize;
                let sz = all_meta[2 * N * r + 2 * a + 1] as usize;
                st..st + sz
            })
        })
        .collect())
}

fn wire_counts<const N: usize>(
    blocks: &[[Range<usize>; N]],
    components: usize,
) -> Result<(Vec<Count>, Vec<Count>)> {
    let counts: Vec<Count> = blocks
        .iter()
        .map(|b| {
            let vol: usize = b.iter().map(|r| r.len()).product();
            Count::try_from(vol * components)
                .map_err(|_| Error::Comm(format!("block volume {vol} overflows the wire count")))
        })
        .collect::<Result<_>>()?;
    let displs: Vec<Count> = counts
        .iter()
        .scan(0, |acc, &x| {
            let tmp = *acc;
            *acc += x;
            Some(tmp)
        })
        .collect();
    Ok((counts, displs))
}

/// Copy the local block into `out` in logical row-major order.
fn pack_logical<T: Element, const N: usize, const M: usize>(
    pencil: &Pencil<N, M>,
    src: &[T],
    out: &mut [T],
) {
    let local = pencil.local_shape();
    let block: [Range<usize>; N] = std::array::from_fn(|a| 0..local[a]);
    let order: [usize; N] = std::array::from_fn(|a| a);
    let strides = pencil.axis_strides();
    let mut pos = 0;
    block_runs(&block, &order, &strides, |off, len, stride| {
        gather_run(src, off, len, stride, &mut out[pos..pos + len]);
        pos += len;
    });
}

/// Copy a logical row-major sequence into the local block.
fn unpack_logical<T: Element, const N: usize, const M: usize>(
    pencil: &Pencil<N, M>,
    input: &[T],
    dst: &mut [T],
) {
    let local = pencil.local_shape();
    let block: [Range<usize>; N] = std::array::from_fn(|a| 0..local[a]);
    let order: [usize; N] = std::array::from_fn(|a| a);
    let strides = pencil.axis_strides();
    let mut pos = 0;
    block_runs(&block, &order, &strides, |off, len, stride| {
        scatter_run(dst, off, len, stride, &input[pos..pos + len]);
        pos += len;
    });
}

/// Gather the distributed array into one logical array on rank 0 of its
/// Cartesian communicator; other ranks receive `None`.
///
/// Collective.
///
/// # Errors
/// [`Error::Comm`] on count conversion failures.
pub fn gather_root<T: Element, const N: usize, const M: usize>(
    src: &DistArray<T, N, M>,
) -> Result<Option<Array<T, Dim<[usize; N]>>>>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    let pencil = src.pencil();
    let comm = pencil.topology().comm();
    let blocks = gather_blocks(pencil)?;
    let (counts, displs) = wire_counts(&blocks, T::COMPONENTS)?;

    let mut sendbuf = vec![T::zero(); src.len()];
    pack_logical(pencil, src.as_slice(), &mut sendbuf);

    let root = comm.process_at_rank(0);
    if comm.rank() == 0 {
        let mut recv = vec![T::zero(); pencil.global_len()];
        {
            let mut partition =
                PartitionMut::new(as_scalars_mut(&mut recv[..]), &counts[..], &displs[..]);
            root.gather_varcount_into_root(as_scalars(&sendbuf), &mut partition);
        }
        // Reassemble rank blocks into the global logical array.
        let global_shape = pencil.global_shape();
        let strides = row_major_strides(&global_shape);
        let order: [usize; N] = std::array::from_fn(|a| a);
        let mut global = Array::zeros(global_shape);
        let out = global.as_slice_mut().expect("freshly allocated, dense");
        let mut pos = 0;
        for block in &blocks {
            block_runs(block, &order, &strides, |off, len, stride| {
                scatter_run(out, off, len, stride, &recv[pos..pos + len]);
                pos += len;
            });
        }
        Ok(Some(global))
    } else {
        root.gather_varcount_into(as_scalars(&sendbuf));
        Ok(None)
    }
}

/// Scatter a logical global array from rank 0 onto the pencil blocks of
/// `dst`. Non-root ranks pass `None`.
///
/// Collective.
///
/// # Errors
/// [`Error::Config`] if the root passes no array or one that is not in
/// standard layout; [`Error::Shape`] on a shape mismatch;
/// [`Error::Comm`] on count conversion failures.
pub fn scatter_root<T: Element, const N: usize, const M: usize>(
    global: Option<&Array<T, Dim<[usize; N]>>>,
    dst: &mut DistArray<T, N, M>,
) -> Result<()>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    let pencil = dst.pencil().clone();
    let comm = pencil.topology().comm();
    let blocks = gather_blocks(&pencil)?;
    let (counts, displs) = wire_counts(&blocks, T::COMPONENTS)?;

    let root = comm.process_at_rank(0);
    let mut recv = vec![T::zero(); dst.len()];
    if comm.rank() == 0 {
        let global = global.ok_or_else(|| {
            Error::Config("the root rank must supply the global array".into())
        })?;
        let global_shape = pencil.global_shape();
        if global.shape() != global_shape {
            return Err(Error::Shape {
                got: global.shape().to_vec(),
                expected: global_shape.to_vec(),
            });
        }
        let src = global
            .as_slice()
            .ok_or_else(|| Error::Config("the global array must be in standard layout".into()))?;
        // Pack rank blocks in rank order.
        let strides = row_major_strides(&global_shape);
        let order: [usize; N] = std::array::from_fn(|a| a);
        let mut sendbuf = vec![T::zero(); pencil.global_len()];
        let mut pos = 0;
        for block in &blocks {
            block_runs(block, &order, &strides, |off, len, stride| {
                gather_run(src, off, len, stride, &mut sendbuf[pos..pos + len]);
                pos += len;
            });
        }
        let partition = Partition::new(as_scalars(&sendbuf), &counts[..], &displs[..]);
        root.scatter_varcount_into_root(&partition, as_scalars_mut(&mut recv[..]));
    } else {
        root.scatter_varcount_into(as_scalars_mut(&mut recv[..]));
    }
    unpack_logical(&pencil, &recv, dst.as_mut_slice());
    Ok(())
}
