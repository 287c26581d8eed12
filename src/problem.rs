//! Problem data for the conic quadratic program
//!
//!   minimize   (1/2) xᵀPx + qᵀx
//!   subject to Ax + s = b,  s ∈ 𝒦
//!
//! `P` is supplied as the upper triangle of a symmetric PSD matrix; `A`/`b`
//! describe the affine constraint; the cone product 𝒦 is an ordered list of
//! [`ConeSpec`] blocks whose dimensions sum to `A.nrows()`.

use faer::sparse::SparseColMat;

use crate::{E, I};

/// One block of the Cartesian cone product `𝒦`, in the order its rows appear
/// in `A`/`b`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum ConeSpec {
    /// `{0}^dim`, the zero cone (equality rows).
    Zero { dim: usize },
    /// `ℝ₊^dim`, the nonnegative orthant.
    NonNegative { dim: usize },
    /// The second-order (Lorentz) cone of total dimension `dim`.
    SecondOrder { dim: usize },
    /// The cone of `dim×dim` symmetric PSD matrices, stored as a length
    /// `dim*(dim+1)/2` scaled-vectorized block.
    PositiveSemidefinite { dim: usize },
    /// The generalized power cone `{(u,w) : u_i >= 0, prod u_i^alpha_i >= ||w||}`
    /// with `alpha.len()` "power" coordinates and the remainder in `w`.
    GeneralizedPower { alpha: Vec<E> },
}

impl ConeSpec {
    /// Total number of rows this block occupies in `A`/`b`.
    pub fn dim(&self) -> usize {
        match self {
            ConeSpec::Zero { dim } => *dim,
            ConeSpec::NonNegative { dim } => *dim,
            ConeSpec::SecondOrder { dim } => *dim,
            ConeSpec::PositiveSemidefinite { dim } => dim * (dim + 1) / 2,
            ConeSpec::GeneralizedPower { alpha } => alpha.len() + 1,
        }
    }

    /// Barrier degree `ν` contributed by this block (used to scale `μ`).
    ///
    /// The zero cone carries no barrier (`s` is pinned to zero, not merely
    /// constrained), so it contributes nothing to the centrality degree.
    pub fn degree(&self) -> E {
        match self {
            ConeSpec::Zero { .. } => 0.0,
            ConeSpec::NonNegative { dim } => *dim as E,
            ConeSpec::SecondOrder { .. } => 1.0,
            ConeSpec::PositiveSemidefinite { dim } => *dim as E,
            ConeSpec::GeneralizedPower { alpha } => alpha.len() as E,
        }
    }
}

/// Immutable problem data handed to [`crate::solver::IpmSolver::new`].
pub struct ProblemData {
    /// Upper triangle of the symmetric PSD quadratic cost matrix, `n x n`.
    pub p: SparseColMat<I, E>,
    /// Linear cost, length `n`.
    pub q: Vec<E>,
    /// Constraint matrix, `m x n`.
    pub a: SparseColMat<I, E>,
    /// Constraint offset, length `m`.
    pub b: Vec<E>,
    /// Ordered cone product whose dimensions sum to `m`.
    pub cones: Vec<ConeSpec>,
}

impl ProblemData {
    pub fn n(&self) -> usize {
        self.q.len()
    }

    pub fn m(&self) -> usize {
        self.b.len()
    }

    /// Sanity-checks the shapes implied by `P`, `A`, `b`, `q`, and the cone
    /// product. Does not check numerical properties such as PSD-ness.
    pub fn validate(&self) -> Result<(), String> {
        let n = self.n();
        let m = self.m();
        if self.p.nrows() != n || self.p.ncols() != n {
            return Err(format!("P must be {n}x{n}, got {}x{}", self.p.nrows(), self.p.ncols()));
        }
        if self.a.nrows() != m || self.a.ncols() != n {
            return Err(format!(
                "A must be {m}x{n}, got {}x{}",
                self.a.nrows(),
                self.a.ncols()
            ));
        }
        let cone_dim: usize = self.cones.iter().map(ConeSpec::dim).sum();
        if cone_dim != m {
            return Err(format!(
                "cone product dimension {cone_dim} does not match constraint count {m}"
            ));
        }
        Ok(())
    }
}
