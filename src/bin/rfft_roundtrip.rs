//! cargo mpirun --np 4 --bin rfft_roundtrip
//!
//! Real 3-D transform forward then inverse on a 2x2 pencil grid and on a
//! 4x1 slab grid; the round trip must recover the input to 1e-10 after
//! normalisation.
use mpi::topology::Communicator;
use num_complex::Complex;
use pencil_fft::reduce::all_gather_max;
use pencil_fft::{Plan, TransposeMethod};

fn main() {
    env_logger::init();
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    assert!(world.size() == 4, "Run with 4 processors");

    // Pencil grid 2x2, odd lengths on the complex axes.
    let mut plan = Plan::<f64, Complex<f64>, 3, 2>::r2c(
        &world,
        [41, 21, 16],
        [2, 2],
        TransposeMethod::AllToAllV,
    )
    .unwrap();
    let mut x = plan.allocate_input().unwrap();
    x.fill_with(|[i, j, k]| ((i * 13 + j * 7 + k) as f64 * 0.37).sin());
    let y = plan.forward(&x).unwrap();
    let x_back = plan.inverse(&y).unwrap();
    let err = all_gather_max(&world, x.max_abs_diff(&x_back));
    assert!(err <= 1e-10, "pencil roundtrip error {err}");

    // Slab grid 4x1, explicit normalisation by the scale factor.
    let mut plan = Plan::<f64, Complex<f64>, 3, 2>::r2c(
        &world,
        [64, 40, 32],
        [4, 1],
        TransposeMethod::Pairwise,
    )
    .unwrap();
    assert_eq!(plan.scale_factor(), f64::from(64 * 40 * 32));
    let mut x = plan.allocate_input().unwrap();
    x.fill_with(|[i, j, k]| ((i + 2 * j + 3 * k) as f64 * 0.11).cos());
    let y = plan.forward(&x).unwrap();
    let mut x_back = plan.allocate_input().unwrap();
    plan.apply_inverse_unnormalized(&mut x_back, &y).unwrap();
    x_back.scale(1.0 / plan.scale_factor());
    let err = all_gather_max(&world, x.max_abs_diff(&x_back));
    assert!(err <= 1e-10, "slab roundtrip error {err}");

    if world.rank() == 0 {
        println!("rfft roundtrips ok");
    }
}
