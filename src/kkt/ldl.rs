//! Sparse LDLᵀ factorization of the KKT system (C3), with iterative
//! refinement on top.
//!
//! Two interchangeable backends are offered, both thin wrappers over faer's
//! sparse Cholesky-family routines: [`SimplicialLdlSolver`] for small/dense
//! KKT systems and [`SupernodalLdlSolver`] for larger ones. Both factor the
//! upper triangle of a symmetric indefinite matrix using faer's quasi-definite
//! LDLᵀ with static regularization.

use faer::dyn_stack::{MemBuffer, MemStack, StackReq};
use faer::linalg::cholesky::ldlt::factor::LdltRegularization;
use faer::perm::{Perm, PermRef};
use faer::prelude::{Reborrow, ReborrowMut};
use faer::sparse::linalg::amd;
use faer::sparse::linalg::cholesky::simplicial::{self, SimplicialLdltRef, SymbolicSimplicialCholesky};
use faer::sparse::linalg::cholesky::supernodal::{self, SupernodalLdltRef, SymbolicSupernodalCholesky};
use faer::sparse::{SparseColMat, SparseColMatRef, SymbolicSparseColMat};
use faer::{Col, Mat, MatMut, MatRef};
use problemo::{Problem, ProblemResult};

use crate::error::SolverError;
use crate::{E, I};

/// A reusable symbolic-then-numeric sparse LDLᵀ solver over the KKT matrix's
/// fixed nonzero pattern.
pub trait LdlSolver {
    fn new() -> Self
    where
        Self: Sized;

    /// Symbolic analysis (fill-reducing permutation and elimination tree).
    /// Only needs to run once per KKT sparsity pattern.
    fn analyze(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem>;

    /// Numeric factorization against the pattern fixed by `analyze`.
    fn factorize(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem>;

    /// `sol <- K^-1 sol`, overwriting in place.
    fn solve_in_place(&self, sol: &mut MatMut<E>) -> Result<(), Problem>;

    fn solve(&self, rhs: MatRef<E>) -> Result<Mat<E>, Problem> {
        let mut sol = rhs.to_owned();
        self.solve_in_place(&mut sol.as_mut())?;
        Ok(sol)
    }
}

#[allow(non_snake_case)]
pub struct SimplicialLdlSolver {
    symbolic: Option<SymbolicSimplicialCholesky<I>>,
    L_values: Vec<E>,
    perm: Option<Perm<I>>,
    ldlt: Option<SimplicialLdltRef<'static, I, E>>,
}

impl LdlSolver for SimplicialLdlSolver {
    fn new() -> Self {
        Self {
            symbolic: None,
            L_values: Vec::new(),
            perm: None,
            ldlt: None,
        }
    }

    fn analyze(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem> {
        let (symbolic, perm) = analyze_upper::<SimplicialBackend>(mat)?;
        self.symbolic = Some(symbolic);
        self.perm = Some(perm);
        Ok(())
    }

    fn factorize(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem> {
        let symbolic = self.symbolic.as_ref().ok_or(SolverError::Uninitialized)?;
        let perm = self.perm.as_ref().ok_or(SolverError::Uninitialized)?;

        self.L_values = Vec::new();
        self.L_values
            .try_reserve_exact(symbolic.len_val())
            .via(SolverError::MemoryReservation)?;
        self.L_values.resize(symbolic.len_val(), 0.0);

        let mat_upper = get_mat_upper(mat, perm.as_ref())?;

        let mut mem = MemBuffer::try_new(simplicial::factorize_simplicial_numeric_ldlt_scratch::<I, E>(
            mat.ncols(),
        ))
        .via(SolverError::MemoryAllocation)?;
        let stack = MemStack::new(&mut mem);

        simplicial::factorize_simplicial_numeric_ldlt::<I, E>(
            &mut self.L_values,
            mat_upper.rb(),
            LdltRegularization::default(),
            symbolic,
            stack,
        )
        .via(SolverError::NumericFactorization)?;

        // SAFETY: `symbolic` and `L_values` are owned by `self` and live at
        // least as long as `ldlt` does.
        self.ldlt = Some(unsafe {
            std::mem::transmute::<SimplicialLdltRef<'_, I, E>, SimplicialLdltRef<'static, I, E>>(
                SimplicialLdltRef::<'_, I, E>::new(symbolic, &self.L_values),
            )
        });
        Ok(())
    }

    fn solve_in_place(&self, sol: &mut MatMut<E>) -> Result<(), Problem> {
        let symbolic = self.symbolic.as_ref().ok_or(SolverError::Uninitialized)?;
        let perm = self.perm.as_ref().ok_or(SolverError::Uninitialized)?;
        let ldlt = self.ldlt.as_ref().ok_or(SolverError::Uninitialized)?;
        let dim = symbolic.ncols();

        let mut mem = MemBuffer::try_new(StackReq::all_of(&[
            faer::perm::permute_rows_in_place_scratch::<I, E>(dim, 1),
            symbolic.solve_in_place_scratch::<E>(dim),
        ]))
        .via(SolverError::MemoryAllocation)?;
        let stack = MemStack::new(&mut mem);

        faer::perm::permute_rows_in_place(sol.rb_mut(), perm.as_ref(), stack);
        ldlt.solve_in_place_with_conj(faer::Conj::No, sol.rb_mut(), faer::Par::Seq, stack);
        faer::perm::permute_rows_in_place(sol.rb_mut(), perm.as_ref().inverse(), stack);
        Ok(())
    }
}

#[allow(non_snake_case)]
pub struct SupernodalLdlSolver {
    symbolic: Option<SymbolicSupernodalCholesky<I>>,
    L_values: Vec<E>,
    perm: Option<Perm<I>>,
    ldlt: Option<SupernodalLdltRef<'static, I, E>>,
}

impl LdlSolver for SupernodalLdlSolver {
    fn new() -> Self {
        Self {
            symbolic: None,
            L_values: Vec::new(),
            perm: None,
            ldlt: None,
        }
    }

    fn analyze(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem> {
        let (symbolic, perm) = analyze_upper::<SupernodalBackend>(mat)?;
        self.symbolic = Some(symbolic);
        self.perm = Some(perm);
        Ok(())
    }

    fn factorize(&mut self, mat: SparseColMatRef<I, E>) -> Result<(), Problem> {
        let symbolic = self.symbolic.as_ref().ok_or(SolverError::Uninitialized)?;
        let perm = self.perm.as_ref().ok_or(SolverError::Uninitialized)?;

        self.L_values = Vec::new();
        self.L_values
            .try_reserve_exact(symbolic.len_val())
            .via(SolverError::MemoryReservation)?;
        self.L_values.resize(symbolic.len_val(), 0.0);

        let mat_lower = get_mat_lower(mat, perm.as_ref())?;

        let mut mem = MemBuffer::try_new(supernodal::factorize_supernodal_numeric_ldlt_scratch::<I, E>(
            symbolic,
            faer::Par::Seq,
            Default::default(),
        ))
        .via(SolverError::MemoryAllocation)?;
        let stack = MemStack::new(&mut mem);

        supernodal::factorize_supernodal_numeric_ldlt::<I, E>(
            &mut self.L_values,
            mat_lower.rb(),
            LdltRegularization::default(),
            symbolic,
            faer::Par::Seq,
            stack,
            Default::default(),
        )
        .via(SolverError::NumericFactorization)?;

        self.ldlt = Some(unsafe {
            std::mem::transmute::<SupernodalLdltRef<'_, I, E>, SupernodalLdltRef<'static, I, E>>(
                SupernodalLdltRef::<'_, I, E>::new(symbolic, &self.L_values),
            )
        });
        Ok(())
    }

    fn solve_in_place(&self, sol: &mut MatMut<E>) -> Result<(), Problem> {
        let symbolic = self.symbolic.as_ref().ok_or(SolverError::Uninitialized)?;
        let perm = self.perm.as_ref().ok_or(SolverError::Uninitialized)?;
        let ldlt = self.ldlt.as_ref().ok_or(SolverError::Uninitialized)?;
        let dim = symbolic.ncols();

        let mut mem = MemBuffer::try_new(StackReq::all_of(&[
            faer::perm::permute_rows_in_place_scratch::<I, E>(dim, 1),
            symbolic.solve_in_place_scratch::<E>(dim, faer::Par::Seq),
        ]))
        .via(SolverError::MemoryAllocation)?;
        let stack = MemStack::new(&mut mem);

        faer::perm::permute_rows_in_place(sol.rb_mut(), perm.as_ref(), stack);
        ldlt.solve_in_place_with_conj(faer::Conj::No, sol.rb_mut(), faer::Par::Seq, stack);
        faer::perm::permute_rows_in_place(sol.rb_mut(), perm.as_ref().inverse(), stack);
        Ok(())
    }
}

trait Backend {
    type Symbolic;
    fn symbolic_scratch(dim: usize, nnz: usize) -> StackReq;
    fn factorize_symbolic(
        mat_upper: SparseColMatRef<I, E>,
        etree: &[isize],
        col_counts: &[usize],
        stack: &mut MemStack,
    ) -> Result<Self::Symbolic, Problem>;
    fn side() -> faer::Side;
}

struct SimplicialBackend;
impl Backend for SimplicialBackend {
    type Symbolic = SymbolicSimplicialCholesky<I>;
    fn symbolic_scratch(dim: usize, nnz: usize) -> StackReq {
        StackReq::any_of(&[
            simplicial::prefactorize_symbolic_cholesky_scratch::<I>(dim, nnz),
            simplicial::factorize_simplicial_symbolic_cholesky_scratch::<I>(dim),
        ])
    }
    fn factorize_symbolic(
        mat_upper: SparseColMatRef<I, E>,
        etree: &[isize],
        col_counts: &[usize],
        stack: &mut MemStack,
    ) -> Result<Self::Symbolic, Problem> {
        simplicial::factorize_simplicial_symbolic_cholesky(
            mat_upper.symbolic(),
            unsafe { simplicial::EliminationTreeRef::from_inner(etree) },
            col_counts,
            stack,
        )
        .via(SolverError::SymbolicFactorization)
    }
    fn side() -> faer::Side {
        faer::Side::Upper
    }
}

struct SupernodalBackend;
impl Backend for SupernodalBackend {
    type Symbolic = SymbolicSupernodalCholesky<I>;
    fn symbolic_scratch(dim: usize, nnz: usize) -> StackReq {
        StackReq::any_of(&[
            simplicial::prefactorize_symbolic_cholesky_scratch::<I>(dim, nnz),
            supernodal::factorize_supernodal_symbolic_cholesky_scratch::<I>(dim),
        ])
    }
    fn factorize_symbolic(
        mat_upper: SparseColMatRef<I, E>,
        etree: &[isize],
        col_counts: &[usize],
        stack: &mut MemStack,
    ) -> Result<Self::Symbolic, Problem> {
        supernodal::factorize_supernodal_symbolic_cholesky(
            mat_upper.symbolic(),
            unsafe { simplicial::EliminationTreeRef::from_inner(etree) },
            col_counts,
            stack,
            faer::sparse::linalg::SymbolicSupernodalParams { relax: None },
        )
        .via(SolverError::SymbolicFactorization)
    }
    fn side() -> faer::Side {
        faer::Side::Lower
    }
}

fn analyze_upper<B: Backend>(mat: SparseColMatRef<I, E>) -> Result<(B::Symbolic, Perm<I>), Problem> {
    let nnz = mat.compute_nnz();
    let dim = mat.ncols();
    let mat_symbolic = mat.symbolic();

    let mut perm_fwd = Vec::new();
    let mut perm_inv = Vec::new();
    perm_fwd.try_reserve_exact(dim).via(SolverError::MemoryReservation)?;
    perm_inv.try_reserve_exact(dim).via(SolverError::MemoryReservation)?;
    perm_fwd.resize(dim, 0usize);
    perm_inv.resize(dim, 0usize);

    let mut mem =
        MemBuffer::try_new(amd::order_scratch::<I>(dim, nnz)).via(SolverError::MemoryAllocation)?;
    amd::order(
        &mut perm_fwd,
        &mut perm_inv,
        mat_symbolic,
        amd::Control::default(),
        MemStack::new(&mut mem),
    )
    .via(SolverError::SymbolicFactorization)?;
    let perm = unsafe { Perm::new_unchecked(perm_fwd.into_boxed_slice(), perm_inv.into_boxed_slice()) };

    let mat_permuted = match B::side() {
        faer::Side::Upper => get_mat_upper(mat, perm.as_ref())?,
        faer::Side::Lower => get_mat_lower(mat, perm.as_ref())?,
    };

    let mut mem = MemBuffer::try_new(B::symbolic_scratch(dim, nnz)).via(SolverError::MemoryAllocation)?;
    let stack = MemStack::new(&mut mem);

    let mut etree = Vec::new();
    let mut col_counts = Vec::new();
    etree.try_reserve_exact(dim).via(SolverError::MemoryReservation)?;
    etree.resize(dim, 0isize);
    col_counts.try_reserve_exact(dim).via(SolverError::MemoryReservation)?;
    col_counts.resize(dim, 0usize);

    simplicial::prefactorize_symbolic_cholesky(&mut etree, &mut col_counts, mat_permuted.symbolic(), stack);
    let symbolic = B::factorize_symbolic(mat_permuted.as_ref(), &etree, &col_counts, stack)?;
    Ok((symbolic, perm))
}

fn get_mat_lower(mat: SparseColMatRef<I, E>, perm: PermRef<I>) -> Result<SparseColMat<I, E>, Problem> {
    permute_self_adjoint(mat, perm, faer::Side::Lower)
}

fn get_mat_upper(mat: SparseColMatRef<I, E>, perm: PermRef<I>) -> Result<SparseColMat<I, E>, Problem> {
    permute_self_adjoint(mat, perm, faer::Side::Upper)
}

fn permute_self_adjoint(
    mat: SparseColMatRef<I, E>,
    perm: PermRef<I>,
    side: faer::Side,
) -> Result<SparseColMat<I, E>, Problem> {
    let dim = mat.ncols();
    let nnz = mat.compute_nnz();

    let mut col_ptrs = Vec::new();
    let mut row_indices = Vec::new();
    let mut values = Vec::new();
    col_ptrs.try_reserve_exact(dim + 1).via(SolverError::MemoryReservation)?;
    col_ptrs.resize(dim + 1, 0usize);
    row_indices.try_reserve_exact(nnz).via(SolverError::MemoryReservation)?;
    row_indices.resize(nnz, 0usize);
    values.try_reserve_exact(nnz).via(SolverError::MemoryReservation)?;
    values.resize(nnz, 0.0);

    let mut mem =
        MemBuffer::try_new(faer::sparse::utils::permute_self_adjoint_scratch::<I>(dim))
            .via(SolverError::MemoryAllocation)?;
    faer::sparse::utils::permute_self_adjoint_to_unsorted(
        &mut values,
        &mut col_ptrs,
        &mut row_indices,
        mat.rb(),
        perm.rb(),
        side,
        side,
        MemStack::new(&mut mem),
    );

    Ok(SparseColMat::<I, E>::new(
        unsafe { SymbolicSparseColMat::new_unchecked(dim, dim, col_ptrs, None, row_indices) },
        values,
    ))
}

/// Settings for [`refine`]; owned by the KKT driver (C4).
#[derive(Debug, Clone, Copy)]
pub struct RefinementSettings {
    pub enable: bool,
    pub reltol: E,
    pub abstol: E,
    pub max_iter: usize,
    /// Stop once the residual norm stops shrinking by at least this factor.
    pub stop_ratio: E,
}

impl Default for RefinementSettings {
    fn default() -> Self {
        Self {
            enable: true,
            reltol: 1e-10,
            abstol: 1e-12,
            max_iter: 10,
            stop_ratio: 2.0,
        }
    }
}

/// Solves `K x = b` then sharpens `x` with iterative refinement against the
/// *unregularized, unpermuted* symmetric matrix `k_full` (accessed through
/// its symmetric `MatRef`-like `mul` closure), matching the exact residual
/// recursion `e = b - K x`.
pub fn solve_with_refinement<S: LdlSolver>(
    solver: &S,
    mul_k: impl Fn(&[E], &mut [E]),
    b: &[E],
    settings: &RefinementSettings,
) -> Result<Vec<E>, Problem> {
    let n = b.len();
    let mut x = Mat::<E>::from_fn(n, 1, |i, _| b[i]);
    solver.solve_in_place(&mut x.as_mut())?;
    let mut x_vec: Vec<E> = (0..n).map(|i| x[(i, 0)]).collect();

    if !settings.enable {
        return Ok(x_vec);
    }

    let mut kx = vec![0.0; n];
    let mut prev_norm = E::INFINITY;
    for _ in 0..settings.max_iter {
        mul_k(&x_vec, &mut kx);
        let mut e: Vec<E> = (0..n).map(|i| b[i] - kx[i]).collect();
        let norm = e.iter().map(|v| v * v).sum::<E>().sqrt();
        let b_norm = b.iter().map(|v| v * v).sum::<E>().sqrt().max(1.0);
        if norm <= settings.abstol + settings.reltol * b_norm {
            break;
        }
        if norm * settings.stop_ratio > prev_norm {
            break;
        }
        prev_norm = norm;

        let mut correction = Mat::<E>::from_fn(n, 1, |i, _| e[i]);
        solver.solve_in_place(&mut correction.as_mut())?;
        for i in 0..n {
            x_vec[i] += correction[(i, 0)];
        }
        e.fill(0.0);
    }
    Ok(x_vec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::sparse::Triplet;
    use macros::type_parameterized_test;

    fn tridiagonal(n: usize) -> SparseColMat<I, E> {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push(Triplet::new(i, i, 2.0));
            if i + 1 < n {
                triplets.push(Triplet::new(i, i + 1, -1.0));
                triplets.push(Triplet::new(i + 1, i, -1.0));
            }
        }
        SparseColMat::try_new_from_triplets(n, n, &triplets).unwrap()
    }

    #[type_parameterized_test(values = (SimplicialLdlSolver, SupernodalLdlSolver))]
    fn solves_tridiagonal_system<S: LdlSolver>() {
        let mat = tridiagonal(5);
        let mut solver = S::new();
        solver.analyze(mat.as_ref()).unwrap();
        solver.factorize(mat.as_ref()).unwrap();

        let b = Mat::<E>::from_fn(5, 1, |i, _| (i + 1) as E);
        let x = solver.solve(b.as_ref()).unwrap();
        let residual = &b - &mat * &x;
        assert!(residual.norm_l2() < 1e-9);
    }

    #[test]
    fn refinement_improves_on_factorization_alone() {
        let mat = tridiagonal(20);
        let mut solver = SimplicialLdlSolver::new();
        solver.analyze(mat.as_ref()).unwrap();
        solver.factorize(mat.as_ref()).unwrap();

        let b: Vec<E> = (0..20).map(|i| (i as E + 1.0).sin()).collect();
        let mul_k = |x: &[E], y: &mut [E]| {
            for yi in y.iter_mut() {
                *yi = 0.0;
            }
            for i in 0..20 {
                y[i] += 2.0 * x[i];
                if i + 1 < 20 {
                    y[i] -= x[i + 1];
                    y[i + 1] -= x[i];
                }
            }
        };
        let x = solve_with_refinement(&solver, mul_k, &b, &RefinementSettings::default()).unwrap();
        let mut kx = vec![0.0; 20];
        mul_k(&x, &mut kx);
        let residual: E = (0..20).map(|i| (b[i] - kx[i]).powi(2)).sum::<E>().sqrt();
        assert!(residual < 1e-8);
    }
}
