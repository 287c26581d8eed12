use derive_more::{Display, Error};

/// Fallible-operation errors internal to the solver's numeric core.
///
/// The outer loop never propagates these to the caller; each variant is mapped
/// to a terminal [`crate::Status`] (see [`crate::solver::IpmSolver::solve`]).
#[derive(Debug, Display, Error, PartialEq, Clone, Copy)]
pub enum SolverError {
    #[display("KKT symbolic analysis failed")]
    SymbolicFactorization,

    #[display("KKT numeric factorization failed")]
    NumericFactorization,

    #[display("linear solver used before analyze/factorize")]
    Uninitialized,

    #[display("memory reservation failed while assembling the KKT system")]
    MemoryReservation,

    #[display("memory allocation failed during factorization")]
    MemoryAllocation,

    #[display("triangular solve failed")]
    SolveFailed,

    #[display("cone scaling update failed for an interior-point iterate")]
    ConeScalingFailed,

    #[display("a non-finite value was produced during the linear algebra step")]
    NonFiniteValue,

    #[display("generalized power cone gradient recovery did not converge")]
    PowerNewtonDivergence,
}
