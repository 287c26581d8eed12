use std::any::Any;

use dyn_clone::DynClone;
use faer::traits::ComplexField;
use faer::traits::num_traits::Float;
use macros::{build_options, explicit_options, use_option};

/// Bound satisfied by the scalar arithmetic type used throughout the numeric
/// core. The crate itself only ever instantiates `E = f64`, since the sparse
/// LDLᵀ backend is concretely typed over `f64`; this trait exists so the
/// smaller pieces of math that don't dip into `faer`'s sparse-solver API
/// (residual norms, Jordan-algebra helpers) can be written generically.
pub trait Scalar: ComplexField + Float {}
impl<T> Scalar for T where T: ComplexField + Float {}

pub type E = f64;
pub type I = usize;

pub mod callback;
pub mod cones;
pub mod error;
pub mod kkt;
pub mod problem;
pub mod residuals;
pub mod solver;
pub mod terminators;
pub mod variables;

#[cfg(test)]
mod tests;

pub trait OptionTrait: Any + Sync + Send + DynClone {}
impl OptionTrait for &'static str {}
impl OptionTrait for String {}
impl OptionTrait for bool {}
impl OptionTrait for usize {}
impl OptionTrait for u8 {}
impl OptionTrait for u16 {}
impl OptionTrait for u32 {}
impl OptionTrait for u64 {}
impl OptionTrait for i8 {}
impl OptionTrait for i16 {}
impl OptionTrait for i32 {}
impl OptionTrait for i64 {}
impl OptionTrait for f32 {}
impl OptionTrait for f64 {}

impl Clone for Box<dyn OptionTrait> {
    fn clone(&self) -> Self {
        dyn_clone::clone_box(&**self)
    }
}

/// Terminal and in-progress status codes for the interior-point solver.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Status {
    #[default]
    InProgress,
    Solved,
    PrimalInfeasible,
    DualInfeasible,
    MaxIters,
    TimeLimit,
    NumericalError,
    InsufficientProgress,
    AlmostSolved,
    Interrupted,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::InProgress)
    }
}

#[use_option(
    name = "max_iter",
    type_ = usize,
    default = "200",
    description = "Maximum number of outer interior-point iterations."
)]
#[use_option(
    name = "time_limit_secs",
    type_ = f64,
    default = "f64::INFINITY",
    description = "Wall-clock time limit in seconds."
)]
#[use_option(
    name = "eps_abs",
    type_ = f64,
    default = "1e-8",
    description = "Absolute tolerance on the duality gap and residual norms."
)]
#[use_option(
    name = "eps_rel",
    type_ = f64,
    default = "1e-8",
    description = "Relative tolerance on the duality gap and residual norms."
)]
#[use_option(
    name = "eps_infeasible",
    type_ = f64,
    default = "1e-8",
    description = "Threshold on the homogeneous certificate residuals used to declare infeasibility."
)]
#[use_option(
    name = "static_regularization_enable",
    type_ = bool,
    default = "true",
    description = "Add a small fixed diagonal perturbation to the KKT matrix before factorization."
)]
#[use_option(
    name = "static_regularization_eps",
    type_ = f64,
    default = "1e-8",
    description = "Magnitude of the static KKT regularization term."
)]
#[use_option(
    name = "iterative_refinement_enable",
    type_ = bool,
    default = "true",
    description = "Sharpen each KKT solve with iterative refinement against the unregularized system."
)]
#[use_option(
    name = "iterative_refinement_reltol",
    type_ = f64,
    default = "1e-10",
    description = "Relative residual tolerance that stops iterative refinement early."
)]
#[use_option(
    name = "iterative_refinement_abstol",
    type_ = f64,
    default = "1e-12",
    description = "Absolute residual tolerance that stops iterative refinement early."
)]
#[use_option(
    name = "iterative_refinement_max_iter",
    type_ = usize,
    default = "10",
    description = "Maximum number of iterative refinement steps per KKT solve."
)]
#[use_option(
    name = "iterative_refinement_stop_ratio",
    type_ = f64,
    default = "2.0",
    description = "Stop refining once the residual norm fails to shrink by at least this factor."
)]
#[use_option(
    name = "linesearch_backtrack_step",
    type_ = f64,
    default = "0.8",
    description = "Backtracking factor applied to the step length while the cone barrier is non-finite."
)]
#[use_option(
    name = "min_terminate_step_length",
    type_ = f64,
    default = "1e-4",
    description = "Step length below which the solver declares insufficient progress."
)]
#[use_option(
    name = "verbose",
    type_ = bool,
    default = "false",
    description = "Print per-iteration convergence output."
)]
#[explicit_options(name = SolverOptions)]
struct OptionsMarker {}

build_options!(name = SolverOptions, registry_name = OPTION_REGISTRY);

/// Friendly alias: the macro-generated registry type is always named
/// `Options`, regardless of what name a `#[explicit_options(name = ...)]`
/// call site asks for.
pub type SolverSettings = Options;

impl Default for Options {
    fn default() -> Self {
        Options::new()
    }
}
