//! cargo mpirun --np 8 --bin method_equivalence
//!
//! The forward transform must produce the same distributed output under
//! the pairwise and the vectored all-to-all exchange.
use mpi::topology::Communicator;
use num_complex::Complex;
use pencil_fft::{Plan, TransposeMethod};

fn main() {
    env_logger::init();
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    assert!(world.size() == 8, "Run with 8 processors");

    let shape = [128, 192, 64];
    let dims = [4, 2];
    let mut plan_pairwise =
        Plan::<f64, Complex<f64>, 3, 2>::r2c(&world, shape, dims, TransposeMethod::Pairwise)
            .unwrap();
    let mut plan_alltoall =
        Plan::<f64, Complex<f64>, 3, 2>::r2c(&world, shape, dims, TransposeMethod::AllToAllV)
            .unwrap();

    let fill = |[i, j, k]: [usize; 3]| ((i * 31 + j * 17 + k * 3) as f64 * 0.013).sin();
    let mut x = plan_pairwise.allocate_input().unwrap();
    x.fill_with(fill);
    let y_pairwise = plan_pairwise.forward(&x).unwrap();

    let mut x = plan_alltoall.allocate_input().unwrap();
    x.fill_with(fill);
    let y_alltoall = plan_alltoall.forward(&x).unwrap();

    assert_eq!(y_pairwise.local_shape(), y_alltoall.local_shape());
    assert_eq!(
        y_pairwise.as_slice(),
        y_alltoall.as_slice(),
        "methods disagree on the distributed output"
    );

    if world.rank() == 0 {
        println!("transpose methods agree");
    }
}
