use macros::build_option_enum;

use crate::Options;
use crate::residuals::Residuals;
use crate::variables::Variables;

/// Per-iteration snapshot handed to callbacks: the outer loop's iteration
/// count, the step length just taken, and the residuals computed from the
/// iterate at the end of the iteration.
pub struct IterationState<'a> {
    pub iteration: usize,
    pub alpha: f64,
    pub vars: &'a Variables,
    pub residuals: &'a Residuals,
}

/// Hook invoked once per solver iteration for logging, monitoring, or early stopping.
pub trait Callback {
    /// Creates a new callback from solver options.
    fn new(options: &Options) -> Self
    where
        Self: Sized;

    /// Called at the end of each iteration with the current solver state.
    fn call(&mut self, state: &IterationState);
}

/// A callback that does nothing. Use when no per-iteration output is needed.
pub struct NoOpCallback {}

impl Callback for NoOpCallback {
    fn new(_options: &Options) -> Self {
        Self {}
    }

    fn call(&mut self, _state: &IterationState) {
        // Do nothing
    }
}

/// Prints primal/dual residuals and the duality gap to stdout each iteration.
pub struct ConvergenceOutput {}

impl Callback for ConvergenceOutput {
    fn new(_options: &Options) -> Self {
        Self {}
    }

    fn call(&mut self, state: &IterationState) {
        let txt = format!(
            "| {:4} | {:<8.2e} | {:<8.2e} | {:<8.2e} | {:<8.2e} |",
            state.iteration, state.alpha, state.residuals.rx_inf, state.residuals.rz_inf, state.residuals.gap,
        );
        println!("{}", txt);
    }
}

build_option_enum!(
    trait_ = Callback,
    name = "Callbacks",
    variants = (NoOpCallback, ConvergenceOutput),
    new_arguments = (&Options,),
    doc_header = "An enum representing different callbacks for the interior-point solver. Each variant corresponds to a specific callback strategy."
);
