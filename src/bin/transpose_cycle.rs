//! cargo mpirun --np 4 --bin transpose_cycle
//!
//! Chained transpositions pencil1 -> pencil2 -> pencil3 -> pencil2 ->
//! pencil1 with memory permutations set on each configuration; every hop
//! must reproduce the oracle and the full cycle must restore the start.
//! A transposition that changes two decomposed axes must be rejected.
use mpi::topology::Communicator;
use pencil_fft::{
    transpose_into, DistArray, Dtype, Error, Pencil, Permutation, Topology, TransposeMethod,
};
use std::rc::Rc;

fn oracle(pencil: &Pencil<3, 2>) -> DistArray<f64, 3, 2> {
    let mut data = DistArray::zeros(pencil).unwrap();
    data.fill_with(|[i, j, k]| (i + j * 10 + k * 100) as f64);
    data
}

fn main() {
    env_logger::init();
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    assert!(world.size() == 4, "Run with 4 processors");

    let topology = Rc::new(Topology::new(&world, [2, 2]).unwrap());
    let n_global = [6, 7, 9];
    let pen1 = Pencil::new(Rc::clone(&topology), n_global, [1, 2], Dtype::Real).unwrap();
    let pen2 = Pencil::new(Rc::clone(&topology), n_global, [0, 2], Dtype::Real)
        .unwrap()
        .with_permutation(Permutation::try_new([0, 2, 1]).unwrap());
    let pen3 = Pencil::new(Rc::clone(&topology), n_global, [0, 1], Dtype::Real)
        .unwrap()
        .with_permutation(Permutation::try_new([1, 0, 2]).unwrap());

    for method in [TransposeMethod::Pairwise, TransposeMethod::AllToAllV] {
        let a1 = oracle(&pen1);
        let mut a2 = DistArray::zeros(&pen2).unwrap();
        let mut a3 = DistArray::zeros(&pen3).unwrap();

        transpose_into(&mut a2, &a1, method).unwrap();
        assert_eq!(a2, oracle(&pen2));

        transpose_into(&mut a3, &a2, method).unwrap();
        assert_eq!(a3, oracle(&pen3));

        a2.fill(0.0);
        transpose_into(&mut a2, &a3, method).unwrap();
        assert_eq!(a2, oracle(&pen2));

        let mut back = DistArray::zeros(&pen1).unwrap();
        transpose_into(&mut back, &a2, method).unwrap();
        assert_eq!(back, a1, "cycle did not restore the start ({method:?})");
    }

    // pen1 and pen3 differ in both decomposed axes.
    let a1 = oracle(&pen1);
    let mut a3 = DistArray::zeros(&pen3).unwrap();
    let rejected = transpose_into(&mut a3, &a1, TransposeMethod::AllToAllV);
    assert!(matches!(rejected, Err(Error::Config(_))));

    if world.rank() == 0 {
        println!("transpose cycle ok");
    }
}
