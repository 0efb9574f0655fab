//! Single-process integration suite.
//!
//! The message layer is initialised once, so every check runs inside one
//! test function. All communicators have size one; the collective paths
//! still execute (self-exchange), which pins down the full pipeline
//! without an `mpirun` harness.

use float_cmp::approx_eq;
use mpi::topology::Communicator;
use num_complex::Complex;
use pencil_fft::collect::{gather_root, scatter_root};
use pencil_fft::reduce::all_gather_sum;
use pencil_fft::{
    transpose_into, DistArray, Dtype, Error, Pencil, Permutation, Plan, R2rKind, Topology,
    Transform, TransposeMethod,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::rc::Rc;

#[test]
fn single_rank_suite() {
    let universe = mpi::initialize().expect("message layer initialises once");
    let world = universe.world();
    assert_eq!(world.size(), 1, "serial suite expects one rank");

    plan_layout(&world);
    transpose_cycle(&world);
    transpose_rejects_two_slot_changes(&world);
    odd_real_axis_rejected(&world);
    wrong_pencil_rejected(&world);
    from_vec_rejects_bad_length(&world);
    c2c_matches_naive_dft(&world);
    r2c_roundtrip(&world);
    r2r_roundtrip(&world);
    gather_scatter_roundtrip(&world);
    reductions(&world);
}

fn plan_layout<C: Communicator>(world: &C) {
    let plan = Plan::<f64, Complex<f64>, 3, 2>::r2c(
        world,
        [8, 4, 6],
        [1, 1],
        TransposeMethod::AllToAllV,
    )
    .unwrap();
    assert_eq!(
        plan.stage_layout(),
        vec![
            (2, Transform::Rfft),
            (1, Transform::Fft),
            (0, Transform::Fft)
        ]
    );
    assert_eq!(plan.input_pencil().global_shape(), [8, 4, 6]);
    assert_eq!(plan.input_pencil().decomp_axes(), [0, 1]);
    assert!(plan.input_pencil().permutation().is_identity());
    assert_eq!(plan.output_pencil().global_shape(), [8, 4, 4]);
    assert_eq!(plan.output_pencil().dtype(), Dtype::Complex);
    // The final stage leaves axis 0 local and memory-fastest.
    assert!(plan.output_pencil().is_local_axis(0));
    assert_eq!(plan.output_pencil().permutation().axes(), [1, 2, 0]);
    assert_eq!(plan.scale_factor(), f64::from(8 * 4 * 6));
}

fn oracle(pencil: &Pencil<3, 2>) -> DistArray<f64, 3, 2> {
    let mut data = DistArray::zeros(pencil).unwrap();
    data.fill_with(|[i, j, k]| (i + j * 10 + k * 100) as f64);
    data
}

fn transpose_cycle<C: Communicator>(world: &C) {
    let topology = Rc::new(Topology::new(world, [1, 1]).unwrap());
    let n_global = [5, 4, 3];
    let pen1 = Pencil::new(Rc::clone(&topology), n_global, [1, 2], Dtype::Real).unwrap();
    let pen2 = Pencil::new(Rc::clone(&topology), n_global, [0, 2], Dtype::Real)
        .unwrap()
        .with_permutation(Permutation::try_new([0, 2, 1]).unwrap());
    let pen3 = Pencil::new(Rc::clone(&topology), n_global, [0, 1], Dtype::Real)
        .unwrap()
        .with_permutation(Permutation::try_new([2, 1, 0]).unwrap());

    for method in [TransposeMethod::Pairwise, TransposeMethod::AllToAllV] {
        let a1 = oracle(&pen1);
        let mut a2 = DistArray::zeros(&pen2).unwrap();
        transpose_into(&mut a2, &a1, method).unwrap();
        assert_eq!(a2, oracle(&pen2));

        let mut a3 = DistArray::zeros(&pen3).unwrap();
        transpose_into(&mut a3, &a2, method).unwrap();
        assert_eq!(a3, oracle(&pen3));

        let mut back = DistArray::zeros(&pen1).unwrap();
        let mut mid = DistArray::zeros(&pen2).unwrap();
        transpose_into(&mut mid, &a3, method).unwrap();
        transpose_into(&mut back, &mid, method).unwrap();
        assert_eq!(back, a1);
    }
}

fn transpose_rejects_two_slot_changes<C: Communicator>(world: &C) {
    let topology = Rc::new(Topology::new(world, [1, 1]).unwrap());
    let n_global = [4, 4, 4];
    let pen1 = Pencil::new(Rc::clone(&topology), n_global, [1, 2], Dtype::Real).unwrap();
    let pen3 = Pencil::new(Rc::clone(&topology), n_global, [0, 1], Dtype::Real).unwrap();
    let a1 = oracle(&pen1);
    let mut a3 = DistArray::zeros(&pen3).unwrap();
    assert!(matches!(
        transpose_into(&mut a3, &a1, TransposeMethod::AllToAllV),
        Err(Error::Config(_))
    ));
}

fn odd_real_axis_rejected<C: Communicator>(world: &C) {
    let odd = Plan::<f64, Complex<f64>, 3, 2>::r2c(
        world,
        [4, 4, 7],
        [1, 1],
        TransposeMethod::AllToAllV,
    );
    assert!(matches!(odd, Err(Error::Config(_))));
}

fn wrong_pencil_rejected<C: Communicator>(world: &C) {
    let mut plan = Plan::<f64, Complex<f64>, 3, 2>::r2c(
        world,
        [6, 4, 8],
        [1, 1],
        TransposeMethod::AllToAllV,
    )
    .unwrap();
    let other = Plan::<f64, Complex<f64>, 3, 2>::r2c(
        world,
        [6, 4, 10],
        [1, 1],
        TransposeMethod::AllToAllV,
    )
    .unwrap();
    let x = other.allocate_input().unwrap();
    let mut y = plan.allocate_output().unwrap();
    assert!(matches!(
        plan.apply_forward(&mut y, &x),
        Err(Error::Shape { .. })
    ));
}

fn from_vec_rejects_bad_length<C: Communicator>(world: &C) {
    let topology = Rc::new(Topology::new(world, [1]).unwrap());
    let pencil = Pencil::<2, 1>::new(topology, [3, 4], [0], Dtype::Real).unwrap();
    let bad = DistArray::<f64, 2, 1>::from_vec(&pencil, vec![0.0; 11]);
    assert!(matches!(bad, Err(Error::Shape { .. })));
    let good = DistArray::<f64, 2, 1>::from_vec(&pencil, vec![0.0; 12]);
    assert!(good.is_ok());
}

fn c2c_matches_naive_dft<C: Communicator>(world: &C) {
    let shape = [4, 3, 2];
    let mut plan =
        Plan::<Complex<f64>, Complex<f64>, 3, 2>::c2c(world, shape, [1, 1], TransposeMethod::Pairwise)
            .unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let mut x = plan.allocate_input().unwrap();
    x.fill_with(|_| Complex::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5));

    let y = plan.forward(&x).unwrap();

    // Brute-force reference; everything is local on one rank.
    let mut expect = plan.allocate_output().unwrap();
    for k0 in 0..shape[0] {
        for k1 in 0..shape[1] {
            for k2 in 0..shape[2] {
                let mut acc = Complex::new(0.0, 0.0);
                for j0 in 0..shape[0] {
                    for j1 in 0..shape[1] {
                        for j2 in 0..shape[2] {
                            let phase = -2.0
                                * PI
                                * ((k0 * j0) as f64 / shape[0] as f64
                                    + (k1 * j1) as f64 / shape[1] as f64
                                    + (k2 * j2) as f64 / shape[2] as f64);
                            acc += *x.get_global([j0, j1, j2]).unwrap()
                                * Complex::from_polar(1.0, phase);
                        }
                    }
                }
                expect.set_global([k0, k1, k2], acc).unwrap();
            }
        }
    }
    let err = y.max_abs_diff(&expect);
    assert!(err < 1e-9, "c2c deviates from the naive DFT by {err}");

    let x_back = plan.inverse(&y).unwrap();
    assert!(x.max_abs_diff(&x_back) < 1e-10);
}

fn r2c_roundtrip<C: Communicator>(world: &C) {
    let mut plan = Plan::<f64, Complex<f64>, 3, 2>::r2c(
        world,
        [6, 5, 8],
        [1, 1],
        TransposeMethod::AllToAllV,
    )
    .unwrap();
    assert_eq!(plan.output_pencil().global_shape(), [6, 5, 5]);
    let mut rng = StdRng::seed_from_u64(7);
    let mut x = plan.allocate_input().unwrap();
    x.fill_with(|_| rng.gen::<f64>() - 0.5);
    let y = plan.forward(&x).unwrap();
    let x_back = plan.inverse(&y).unwrap();
    let err = x.max_abs_diff(&x_back);
    assert!(err < 1e-10, "r2c roundtrip error {err}");
}

fn r2r_roundtrip<C: Communicator>(world: &C) {
    let mut plan =
        Plan::<f64, f64, 2, 1>::r2r(world, [4, 6], R2rKind::Dct2, [1], TransposeMethod::Pairwise)
            .unwrap();
    assert!(approx_eq!(f64, plan.scale_factor(), 6.0, epsilon = 1e-12));
    let mut rng = StdRng::seed_from_u64(11);
    let mut x = plan.allocate_input().unwrap();
    x.fill_with(|_| rng.gen::<f64>() - 0.5);
    let y = plan.forward(&x).unwrap();
    let x_back = plan.inverse(&y).unwrap();
    let err = x.max_abs_diff(&x_back);
    assert!(err < 1e-10, "dct roundtrip error {err}");
}

fn gather_scatter_roundtrip<C: Communicator>(world: &C) {
    let topology = Rc::new(Topology::new(world, [1]).unwrap());
    let pencil = Pencil::<2, 1>::new(topology, [3, 4], [0], Dtype::Real)
        .unwrap()
        .with_permutation(Permutation::try_new([1, 0]).unwrap());
    let mut src = DistArray::zeros(&pencil).unwrap();
    src.fill_with(|[i, j]| (i * 10 + j) as f64);

    {
        let view = src.global_view();
        assert_eq!(view[[1, 2]], 12.0);
        assert!(matches!(view.get([3, 0]), Err(Error::Index { .. })));
    }
    {
        let mut view = src.global_view_mut();
        view[[2, 3]] = 23.0;
        assert!(view.get_mut([0, 4]).is_err());
    }

    let global = gather_root(&src).unwrap().expect("rank 0 owns the result");
    for i in 0..3 {
        for j in 0..4 {
            assert_eq!(global[[i, j]], (i * 10 + j) as f64);
        }
    }

    let mut back = DistArray::zeros(&pencil).unwrap();
    scatter_root(Some(&global), &mut back).unwrap();
    assert_eq!(back, src);
}

fn reductions<C: Communicator>(world: &C) {
    assert_eq!(all_gather_sum(world, 3.5_f64), 3.5);
}
