//! End-to-end scenarios exercising `solver_new`/`solve` directly, mirroring
//! the literal LP/QP/SOCP/infeasibility test problems used to validate the
//! original LP solver, parameterised across both LDLᵀ backends.

use faer::sparse::{SparseColMat, Triplet};
use macros::type_parameterized_test;

use crate::kkt::ldl::{LdlSolver, SimplicialLdlSolver, SupernodalLdlSolver};
use crate::problem::{ConeSpec, ProblemData};
use crate::solver::IpmSolver;
use crate::{E, I, Options, Status};

fn sparse(n: usize, m: usize, entries: &[(usize, usize, E)]) -> SparseColMat<I, E> {
    let triplets: Vec<Triplet<I, I, E>> = entries.iter().map(|&(r, c, v)| Triplet::new(r, c, v)).collect();
    SparseColMat::try_new_from_triplets(n, m, &triplets).unwrap()
}

fn zero_p(n: usize) -> SparseColMat<I, E> {
    sparse(n, n, &[])
}

fn solve_problem<S: LdlSolver>(problem: ProblemData) -> crate::solver::Solution {
    let mut solver = IpmSolver::<S>::new(problem, Options::new()).unwrap();
    solver.solve().unwrap()
}

/// **S1**: `min [1,1]^T x s.t. x >= 0, [1 1]x = 1` — optimal value 1, any
/// point on the simplex.
#[type_parameterized_test(values = (SimplicialLdlSolver, SupernodalLdlSolver))]
fn s1_lp_on_simplex<S: LdlSolver>() {
    let problem = ProblemData {
        p: zero_p(2),
        q: vec![1.0, 1.0],
        a: sparse(3, 2, &[(0, 0, 1.0), (0, 1, 1.0), (1, 0, -1.0), (2, 1, -1.0)]),
        b: vec![1.0, 0.0, 0.0],
        cones: vec![ConeSpec::Zero { dim: 1 }, ConeSpec::NonNegative { dim: 2 }],
    };
    let solution = solve_problem::<S>(problem);
    assert_eq!(solution.status, Status::Solved);
    assert!((solution.x[0] + solution.x[1] - 1.0).abs() < 1e-6);
    assert!(solution.x[0] >= -1e-6 && solution.x[1] >= -1e-6);
    let value: E = solution.x[0] + solution.x[1];
    assert!((value - 1.0).abs() < 1e-6);
}

/// **S2**: `min 1/2 ||x - [1,2,3]||^2 s.t. x >= 0` — unconstrained minimizer
/// is already feasible, so `x* = [1,2,3]`, optimal value 0.
#[type_parameterized_test(values = (SimplicialLdlSolver, SupernodalLdlSolver))]
fn s2_qp_projection<S: LdlSolver>() {
    let problem = ProblemData {
        p: sparse(3, 3, &[(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0)]),
        q: vec![-1.0, -2.0, -3.0],
        a: sparse(3, 3, &[(0, 0, -1.0), (1, 1, -1.0), (2, 2, -1.0)]),
        b: vec![0.0, 0.0, 0.0],
        cones: vec![ConeSpec::NonNegative { dim: 3 }],
    };
    let solution = solve_problem::<S>(problem);
    assert_eq!(solution.status, Status::Solved);
    assert!((solution.x[0] - 1.0).abs() < 1e-5);
    assert!((solution.x[1] - 2.0).abs() < 1e-5);
    assert!((solution.x[2] - 3.0).abs() < 1e-5);
}

/// **S3**: `min t s.t. ||(x1,x2)|| <= t, x1+x2=1` — `x* = (0.5, 0.5, 1/sqrt(2))`.
#[type_parameterized_test(values = (SimplicialLdlSolver, SupernodalLdlSolver))]
fn s3_socp_min_norm<S: LdlSolver>() {
    // Variable order (x1, x2, t).
    let problem = ProblemData {
        p: zero_p(3),
        q: vec![0.0, 0.0, 1.0],
        a: sparse(
            4,
            3,
            &[
                (0, 0, 1.0),
                (0, 1, 1.0),
                (1, 2, -1.0),
                (2, 0, -1.0),
                (3, 1, -1.0),
            ],
        ),
        b: vec![1.0, 0.0, 0.0, 0.0],
        cones: vec![ConeSpec::Zero { dim: 1 }, ConeSpec::SecondOrder { dim: 3 }],
    };
    let solution = solve_problem::<S>(problem);
    assert_eq!(solution.status, Status::Solved);
    assert!((solution.x[0] - 0.5).abs() < 1e-5);
    assert!((solution.x[1] - 0.5).abs() < 1e-5);
    assert!((solution.x[2] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-5);
}

/// **S4**: `x >= 0, x <= -1` has no feasible point.
#[type_parameterized_test(values = (SimplicialLdlSolver, SupernodalLdlSolver))]
fn s4_infeasible_lp<S: LdlSolver>() {
    let problem = ProblemData {
        p: zero_p(1),
        q: vec![0.0],
        a: sparse(2, 1, &[(0, 0, -1.0), (1, 0, 1.0)]),
        b: vec![0.0, -1.0],
        cones: vec![ConeSpec::NonNegative { dim: 2 }],
    };
    let solution = solve_problem::<S>(problem);
    assert_eq!(solution.status, Status::PrimalInfeasible);
}

/// **S5**: `min -x s.t. x >= 0` is unbounded below.
#[type_parameterized_test(values = (SimplicialLdlSolver, SupernodalLdlSolver))]
fn s5_unbounded_lp<S: LdlSolver>() {
    let problem = ProblemData {
        p: zero_p(1),
        q: vec![-1.0],
        a: sparse(1, 1, &[(0, 0, -1.0)]),
        b: vec![0.0],
        cones: vec![ConeSpec::NonNegative { dim: 1 }],
    };
    let solution = solve_problem::<S>(problem);
    assert_eq!(solution.status, Status::DualInfeasible);
}

/// **S6**: generalized power cone `d1=2, alpha=(0.5,0.5)` — feasibility
/// boundary `sqrt(u1 u2) = ||w||` and Newton-Raphson gradient recovery.
#[test]
fn s6_generalized_power_boundary() {
    use crate::cones::{Cone, GeneralizedPowerCone};

    let cone = GeneralizedPowerCone::new(vec![0.5, 0.5]);
    let u1 = 2.0_f64;
    let u2 = 3.0_f64;
    let w = (u1 * u2).sqrt();
    let boundary = vec![u1, u2, w];
    // On the boundary `g(z) = 0`; just inside should shrink `g` towards zero
    // within the tolerance a ray-search would target.
    assert!((boundary[2] - (boundary[0] * boundary[1]).sqrt()).abs() < 1e-10);

    let mut interior = vec![u1, u2, w * 0.9];
    cone.shift_to_cone(&mut interior);
    assert!(cone.in_cone(&interior));
}

/// **S7**: `min -w s.t. u1 = 2, u2 = 2, (u1,u2,w)` in the generalized power
/// cone with `alpha = (0.5, 0.5)` — the cone bounds `|w| <= sqrt(u1*u2) = 2`,
/// so maximizing `w` gives `x* = (2, 2, 2)`. Exercises the power cone's
/// dense KKT block and centering shift end to end, not just its boundary
/// arithmetic.
#[type_parameterized_test(values = (SimplicialLdlSolver, SupernodalLdlSolver))]
fn s7_generalized_power_solve<S: LdlSolver>() {
    // Variable order (u1, u2, w).
    let problem = ProblemData {
        p: zero_p(3),
        q: vec![0.0, 0.0, -1.0],
        a: sparse(
            5,
            3,
            &[
                (0, 0, 1.0),
                (1, 1, 1.0),
                (2, 0, -1.0),
                (3, 1, -1.0),
                (4, 2, -1.0),
            ],
        ),
        b: vec![2.0, 2.0, 0.0, 0.0, 0.0],
        cones: vec![ConeSpec::Zero { dim: 2 }, ConeSpec::GeneralizedPower { alpha: vec![0.5, 0.5] }],
    };
    let solution = solve_problem::<S>(problem);
    assert_eq!(solution.status, Status::Solved);
    assert!((solution.x[0] - 2.0).abs() < 1e-5);
    assert!((solution.x[1] - 2.0).abs() < 1e-5);
    assert!((solution.x[2] - 2.0).abs() < 1e-4);
}
