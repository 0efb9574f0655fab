//! Transposition between pencils.
//!
//! Moves data between two pencil configurations that differ in at most one
//! decomposed axis. The per-peer blocks follow from the deterministic axis
//! partition, so both sides derive matching counts without a handshake.
//! Send blocks are packed walking the block in the *destination's* memory
//! order; the receiver then scatters each block straight into place with no
//! separate permutation pass.

use crate::array::DistArray;
use crate::dtype::{as_scalars, as_scalars_mut, Element};
use crate::error::{Error, Result};
use crate::pencil::Pencil;
use crate::topology::Topology;
use log::{debug, trace};
use mpi::datatype::{Partition, PartitionMut};
use mpi::traits::{Communicator, CommunicatorCollectives, Destination, Source};
use mpi::Count;
use ndarray::{Dim, Dimension, IntoDimension};
use num_traits::Zero;
use std::ops::Range;

/// Communication strategy of a transposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransposeMethod {
    /// One non-blocking receive and send per peer, then wait on all.
    Pairwise,
    /// A single vectored all-to-all collective.
    AllToAllV,
}

/// How the data gets from `src`'s pencil to `dst`'s pencil.
pub(crate) enum Route {
    /// Same decomposition; only the memory order changes. No communication.
    Local,
    /// Collective exchange over one sub-communicator.
    Exchange(ExchangeRoute),
}

pub(crate) struct ExchangeRoute {
    /// Grid-dimension slot whose decomposed axis changes.
    pub slot: usize,
    /// Decomposed in the source, local in the destination.
    pub axis_src: usize,
    /// Local in the source, decomposed in the destination.
    pub axis_dst: usize,
    /// Elements sent to every peer of the sub-communicator.
    pub send_counts: Vec<usize>,
    /// Elements received from every peer.
    pub recv_counts: Vec<usize>,
}

/// Classify the transposition connecting two pencils.
///
/// # Errors
/// [`Error::Config`] if the pencils live on different topologies or global
/// shapes, carry different element flavours, or differ in more than one
/// decomposed axis (no silent chaining through intermediate pencils).
pub(crate) fn route<const N: usize, const M: usize>(
    src: &Pencil<N, M>,
    dst: &Pencil<N, M>,
) -> Result<Route> {
    if !std::rc::Rc::ptr_eq(src.topology(), dst.topology()) {
        return Err(Error::Config(
            "transpose endpoints live on different topologies".into(),
        ));
    }
    if src.global_shape() != dst.global_shape() {
        return Err(Error::Config(format!(
            "transpose endpoints disagree on the global shape: {:?} vs {:?}",
            src.global_shape(),
            dst.global_shape()
        )));
    }
    if src.dtype() != dst.dtype() {
        return Err(Error::Config(format!(
            "transpose endpoints disagree on the element flavour: {:?} vs {:?}",
            src.dtype(),
            dst.dtype()
        )));
    }
    let diff: Vec<usize> = (0..M)
        .filter(|&k| src.decomp_axes()[k] != dst.decomp_axes()[k])
        .collect();
    match diff[..] {
        [] => Ok(Route::Local),
        [slot] => {
            let axis_src = src.decomp_axes()[slot];
            let axis_dst = dst.decomp_axes()[slot];
            let nprocs = src.topology().nprocs(slot);
            let send_counts = (0..nprocs)
                .map(|q| volume(&send_block(src, dst, axis_dst, q)))
                .collect();
            let recv_counts = (0..nprocs)
                .map(|q| volume(&recv_block(src, dst, axis_src, q)))
                .collect();
            Ok(Route::Exchange(ExchangeRoute {
                slot,
                axis_src,
                axis_dst,
                send_counts,
                recv_counts,
            }))
        }
        _ => Err(Error::Config(format!(
            "pencils differ in {} decomposed axes; a transposition changes exactly one",
            diff.len()
        ))),
    }
}

/// Block (in source-local coordinates) that the local rank sends to peer
/// `q`: the peer's destination chunk along `axis_dst`, everything else the
/// local extent.
fn send_block<const N: usize, const M: usize>(
    src: &Pencil<N, M>,
    dst: &Pencil<N, M>,
    axis_dst: usize,
    q: usize,
) -> [Range<usize>; N] {
    let local = src.local_shape();
    std::array::from_fn(|a| {
        if a == axis_dst {
            // `axis_dst` is contiguous in the source, so destination-side
            // global coordinates are already source-local coordinates.
            dst.dist(axis_dst).range_of(q)
        } else {
            0..local[a]
        }
    })
}

/// Block (in destination-local coordinates) received from peer `q`.
fn recv_block<const N: usize, const M: usize>(
    src: &Pencil<N, M>,
    dst: &Pencil<N, M>,
    axis_src: usize,
    q: usize,
) -> [Range<usize>; N] {
    let local = dst.local_shape();
    std::array::from_fn(|a| {
        if a == axis_src {
            src.dist(axis_src).range_of(q)
        } else {
            0..local[a]
        }
    })
}

fn volume<const N: usize>(block: &[Range<usize>; N]) -> usize {
    block.iter().map(|r| r.len()).product()
}

/// Visit an N-dimensional index block in the given axis order as
/// `(offset, len, stride)` runs along the fastest (last-ordered) axis.
pub(crate) fn block_runs<const N: usize>(
    block: &[Range<usize>; N],
    order: &[usize; N],
    strides: &[usize; N],
    mut f: impl FnMut(usize, usize, usize),
) {
    if block.iter().any(|r| r.is_empty()) {
        return;
    }
    let inner = order[N - 1];
    let inner_len = block[inner].len();
    let inner_stride = strides[inner];
    let mut counters = [0usize; N];
    loop {
        let mut off = block[inner].start * inner_stride;
        for d in 0..N - 1 {
            let a = order[d];
            off += (block[a].start + counters[d]) * strides[a];
        }
        f(off, inner_len, inner_stride);
        let mut d = N - 1;
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            counters[d] += 1;
            if counters[d] < block[order[d]].len() {
                break;
            }
            counters[d] = 0;
        }
    }
}

/// Gather one run from `src` into `out`.
pub(crate) fn gather_run<T: Copy>(src: &[T], off: usize, len: usize, stride: usize, out: &mut [T]) {
    if stride == 1 {
        out[..len].copy_from_slice(&src[off..off + len]);
    } else {
        for (i, slot) in out[..len].iter_mut().enumerate() {
            *slot = src[off + i * stride];
        }
    }
}

/// Scatter one packed run from `input` into `dst`.
pub(crate) fn scatter_run<T: Copy>(dst: &mut [T], off: usize, len: usize, stride: usize, input: &[T]) {
    if stride == 1 {
        dst[off..off + len].copy_from_slice(&input[..len]);
    } else {
        for (i, &v) in input[..len].iter().enumerate() {
            dst[off + i * stride] = v;
        }
    }
}

/// Local repermutation between two pencils with identical decompositions.
///
/// Walking the local block in the destination's memory order while reading
/// through the source's strides produces the destination's linear layout
/// directly.
pub(crate) fn repermute<T: Element, const N: usize, const M: usize>(
    src_pencil: &Pencil<N, M>,
    src: &[T],
    dst_pencil: &Pencil<N, M>,
    dst: &mut [T],
) {
    if src_pencil.permutation() == dst_pencil.permutation() {
        dst.copy_from_slice(src);
        return;
    }
    let local = src_pencil.local_shape();
    let block: [Range<usize>; N] = std::array::from_fn(|a| 0..local[a]);
    let order = dst_pencil.permutation().axes();
    let strides = src_pencil.axis_strides();
    let mut pos = 0;
    block_runs(&block, &order, &strides, |off, len, stride| {
        gather_run(src, off, len, stride, &mut dst[pos..pos + len]);
        pos += len;
    });
    debug_assert_eq!(pos, dst.len());
}

/// Pack all per-peer send blocks into `sendbuf`, each walked in the
/// destination's memory order.
pub(crate) fn pack<T: Element, const N: usize, const M: usize>(
    ex: &ExchangeRoute,
    src_pencil: &Pencil<N, M>,
    dst_pencil: &Pencil<N, M>,
    src: &[T],
    sendbuf: &mut [T],
) {
    let order = dst_pencil.permutation().axes();
    let strides = src_pencil.axis_strides();
    let mut pos = 0;
    for q in 0..ex.send_counts.len() {
        let block = send_block(src_pencil, dst_pencil, ex.axis_dst, q);
        block_runs(&block, &order, &strides, |off, len, stride| {
            gather_run(src, off, len, stride, &mut sendbuf[pos..pos + len]);
            pos += len;
        });
    }
    debug_assert_eq!(pos, sendbuf.len());
}

/// Scatter all received blocks from `recvbuf` into the destination buffer.
pub(crate) fn unpack<T: Element, const N: usize, const M: usize>(
    ex: &ExchangeRoute,
    src_pencil: &Pencil<N, M>,
    dst_pencil: &Pencil<N, M>,
    recvbuf: &[T],
    dst: &mut [T],
) {
    let order = dst_pencil.permutation().axes();
    let strides = dst_pencil.axis_strides();
    let mut pos = 0;
    for q in 0..ex.recv_counts.len() {
        let block = recv_block(src_pencil, dst_pencil, ex.axis_src, q);
        block_runs(&block, &order, &strides, |off, len, stride| {
            scatter_run(dst, off, len, stride, &recvbuf[pos..pos + len]);
            pos += len;
        });
    }
    debug_assert_eq!(pos, recvbuf.len());
}

fn wire_layout(counts: &[usize], components: usize) -> Result<(Vec<Count>, Vec<Count>)> {
    let counts: Vec<Count> = counts
        .iter()
        .map(|&c| {
            Count::try_from(c * components)
                .map_err(|_| Error::Comm(format!("per-peer count {c} overflows the wire count")))
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

/// Run the collective exchange of a transposition.
///
/// Collective on sub-communicator `ex.slot`; every member must call with
/// the same method.
pub(crate) fn exchange<T: Element, const M: usize>(
    ex: &ExchangeRoute,
    topology: &Topology<M>,
    method: TransposeMethod,
    sendbuf: &[T],
    recvbuf: &mut [T],
) -> Result<()> {
    let comm = topology.subcomm(ex.slot);
    debug_assert_eq!(
        usize::try_from(comm.rank()).unwrap_or(usize::MAX),
        topology.coord(ex.slot),
        "sub-communicator ranks follow Cartesian coordinates"
    );
    let (send_counts, send_displs) = wire_layout(&ex.send_counts, T::COMPONENTS)?;
    let (recv_counts, recv_displs) = wire_layout(&ex.recv_counts, T::COMPONENTS)?;
    let wire_send = as_scalars(sendbuf);
    let wire_recv = as_scalars_mut(recvbuf);
    trace!(
        "exchange over slot {}: method {:?}, send {:?}, recv {:?}",
        ex.slot,
        method,
        send_counts,
        recv_counts
    );

    match method {
        TransposeMethod::AllToAllV => {
            let send = Partition::new(wire_send, &send_counts[..], &send_displs[..]);
            let mut recv = PartitionMut::new(wire_recv, &recv_counts[..], &recv_displs[..]);
            comm.all_to_all_varcount_into(&send, &mut recv);
        }
        TransposeMethod::Pairwise => {
            let me = usize::try_from(comm.rank())
                .map_err(|_| Error::Comm("negative rank in sub-communicator".into()))?;
            let nprocs = ex.send_counts.len();
            // Disjoint per-peer windows of the receive buffer.
            let mut chunks: Vec<(usize, &mut [T::Real])> = Vec::with_capacity(nprocs);
            let mut rest = wire_recv;
            for (q, &c) in recv_counts.iter().enumerate() {
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(
                    usize::try_from(c).expect("count is non-negative"),
                );
                chunks.push((q, head));
                rest = tail;
            }
            let send_window = |q: usize| {
                let lo = send_displs[q] as usize;
                lo..lo + send_counts[q] as usize
            };
            // Receives go up first, then the sends; waiting in posting
            // order completes the whole exchange.
            mpi::request::scope(|scope| {
                let mut requests = Vec::with_capacity(2 * nprocs.saturating_sub(1));
                for (q, chunk) in chunks {
                    if q == me {
                        chunk.copy_from_slice(&wire_send[send_window(q)]);
                    } else {
                        let rank = Count::try_from(q).expect("peer rank fits the count type");
                        requests.push(comm.process_at_rank(rank).immediate_receive_into(scope, chunk));
                    }
                }
                for q in (0..nprocs).filter(|&q| q != me) {
                    let rank = Count::try_from(q).expect("peer rank fits the count type");
                    requests.push(
                        comm.process_at_rank(rank)
                            .immediate_send(scope, &wire_send[send_window(q)]),
                    );
                }
                for request in requests {
                    request.wait();
                }
            });
        }
    }
    Ok(())
}

/// Transpose `src` into `dst`.
///
/// Both arrays keep their pencils; the call moves values so that every
/// logical index of `dst`'s local range receives the value `src` held at
/// the same logical index. Collective on the sub-communicator whose
/// decomposed axis changes; purely local when only the memory order
/// differs.
///
/// # Errors
/// [`Error::Config`] on incompatible pencils (see [`route`]);
/// [`Error::Type`] if the pencils' dtype does not match `T`;
/// [`Error::Comm`] on wire-count overflow.
pub fn transpose_into<T: Element, const N: usize, const M: usize>(
    dst: &mut DistArray<T, N, M>,
    src: &DistArray<T, N, M>,
    method: TransposeMethod,
) -> Result<()>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    if src.pencil().dtype() != T::DTYPE {
        return Err(Error::Type(format!(
            "transpose buffers of flavour {:?} on pencils of dtype {:?}",
            T::DTYPE,
            src.pencil().dtype()
        )));
    }
    match route(src.pencil(), dst.pencil())? {
        Route::Local => {
            repermute(src.pencil(), src.as_slice(), dst.pencil(), dst.as_mut_slice());
            Ok(())
        }
        Route::Exchange(ex) => {
            debug!(
                "transpose axis {} -> axis {} over slot {} ({:?}, {} local elements)",
                ex.axis_src,
                ex.axis_dst,
                ex.slot,
                method,
                src.len()
            );
            let mut sendbuf = vec![T::zero(); src.len()];
            let mut recvbuf = vec![T::zero(); dst.len()];
            pack(&ex, src.pencil(), dst.pencil(), src.as_slice(), &mut sendbuf);
            exchange(&ex, src.pencil().topology(), method, &sendbuf, &mut recvbuf)?;
            unpack(&ex, src.pencil(), dst.pencil(), &recvbuf, dst.as_mut_slice());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_runs_visits_every_cell_once() {
        let block = [1..3, 0..2, 2..5];
        let order = [0, 2, 1];
        // Logical strides of a dense 4x3x6 buffer in identity order.
        let strides = [18, 6, 1];
        let mut seen = Vec::new();
        block_runs(&block, &order, &strides, |off, len, stride| {
            for i in 0..len {
                seen.push(off + i * stride);
            }
        });
        assert_eq!(seen.len(), 2 * 2 * 3);
        let mut expect = Vec::new();
        for i in 1..3 {
            for k in 2..5 {
                for j in 0..2 {
                    expect.push(i * 18 + j * 6 + k);
                }
            }
        }
        assert_eq!(seen, expect);
    }

    #[test]
    fn block_runs_skips_empty_blocks() {
        let block = [0..2, 3..3];
        let mut calls = 0;
        block_runs(&block, &[0, 1], &[2, 1], |_, _, _| calls += 1);
        assert_eq!(calls, 0);
    }

    #[test]
    fn runs_merge_along_contiguous_axis() {
        let block = [0..2, 0..4];
        let mut runs = Vec::new();
        block_runs(&block, &[0, 1], &[4, 1], |off, len, stride| {
            runs.push((off, len, stride));
        });
        assert_eq!(runs, vec![(0, 4, 1), (4, 4, 1)]);
    }
}
