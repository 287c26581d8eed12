//! Reduced 2x2 KKT system driver (C4): turns cone complementarity targets
//! into a full Newton direction `(Δx, Δs, Δz, Δτ, Δκ)` via the standard
//! homogeneous self-dual "constant direction" reduction.

use problemo::Problem;

use crate::E;
use crate::cones::{Cone, ConeKind};
use crate::kkt::ldl::{LdlSolver, RefinementSettings, solve_with_refinement};
use crate::kkt::{KktAssembler, KktLayout};
use crate::problem::ProblemData;

/// `P x`, expanding `problem.p`'s upper-triangle-only storage to the full
/// symmetric product (mirrors the expansion in `KktAssembler::mul_unregularized`).
fn p_matvec(problem: &ProblemData, x: &[E]) -> Vec<E> {
    let n = problem.n();
    let mut y = vec![0.0; n];
    for col in 0..n {
        for idx in problem.p.col_range(col) {
            let row = problem.p.row_idx(idx);
            let v = problem.p.val(idx);
            y[row] += v * x[col];
            if row != col {
                y[col] += v * x[row];
            }
        }
    }
    y
}

pub struct NewtonStep {
    pub dx: Vec<E>,
    pub ds: Vec<E>,
    pub dz: Vec<E>,
    pub dtau: E,
    pub dkappa: E,
}

pub struct KktDriver<S: LdlSolver> {
    assembler: KktAssembler,
    solver: S,
    refinement: RefinementSettings,
    /// `(Δx2, Δz2)` solving `K [Δx2; Δz2] = [-q; b]`, cached per factorization.
    const_dir: Option<(Vec<E>, Vec<E>)>,
}

impl<S: LdlSolver> KktDriver<S> {
    pub fn new(problem: &ProblemData, static_reg_enable: bool, static_reg_eps: E, refinement: RefinementSettings) -> Self {
        Self {
            assembler: KktAssembler::new(problem, static_reg_enable, static_reg_eps),
            solver: S::new(),
            refinement,
            const_dir: None,
        }
    }

    pub fn layout(&self) -> &KktLayout {
        self.assembler.layout()
    }

    /// Re-assembles and re-factorizes the KKT matrix from the current cone
    /// scalings, and solves the per-factorization constant direction.
    pub fn refactorize(&mut self, problem: &ProblemData, cones: &[ConeKind], first: bool) -> Result<(), Problem> {
        let mat = self.assembler.assemble(cones);
        if first {
            self.solver.analyze(mat.as_ref())?;
        }
        self.solver.factorize(mat.as_ref())?;

        let dim = self.assembler.layout().dim();
        let n = self.assembler.layout().n;
        let z_off = self.assembler.layout().z_offset();

        let mut rhs = vec![0.0; dim];
        for i in 0..n {
            rhs[i] = -problem.q[i];
        }
        for j in 0..problem.m() {
            rhs[z_off + j] = problem.b[j];
        }
        let sol = self.solve_raw(cones, &rhs)?;
        let dx2 = sol[..n].to_vec();
        let dz2 = sol[z_off..z_off + problem.m()].to_vec();
        self.const_dir = Some((dx2, dz2));
        Ok(())
    }

    fn solve_raw(&self, cones: &[ConeKind], rhs: &[E]) -> Result<Vec<E>, Problem> {
        let mul_k = |x: &[E], y: &mut [E]| self.assembler.mul_unregularized(cones, x, y);
        solve_with_refinement(&self.solver, mul_k, rhs, &self.refinement)
    }

    /// Solves one Newton direction given complementarity targets `ds_target`
    /// (per-cone, length `m`) and `ds_tau_target` (the linearized `τκ`
    /// right-hand side), reusing the cached constant direction for `Δτ`.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_step(
        &self,
        problem: &ProblemData,
        cones: &[ConeKind],
        rx: &[E],
        rz: &[E],
        rtau: E,
        z: &[E],
        ds_target: &[E],
        ds_tau_target: E,
        tau: E,
        kappa: E,
    ) -> Result<NewtonStep, Problem> {
        let layout = self.assembler.layout();
        let n = layout.n;
        let m = layout.m;
        let z_off = layout.z_offset();
        let dim = layout.dim();

        let mut rhs = vec![0.0; dim];
        for i in 0..n {
            rhs[i] = -rx[i];
        }

        let mut offset = 0;
        for cone in cones {
            let len = cone.dim();
            let ds_slice = &ds_target[offset..offset + len];
            let mut tmp = vec![0.0; len];
            cone.lambda_inv_circ_op(ds_slice, &mut tmp);
            for i in 0..len {
                rhs[z_off + offset + i] = -rz[offset + i] - tmp[i];
            }
            offset += len;
        }

        let sol3 = self.solve_raw(cones, &rhs)?;
        let dx3 = &sol3[..n];
        let dz3 = &sol3[z_off..z_off + m];

        let (dx2, dz2) = self
            .const_dir
            .as_ref()
            .expect("refactorize must run before solve_step");

        let dot = |a: &[E], b: &[E]| -> E { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        let c1 = dot(&problem.q, dx3) + dot(&problem.b, dz3);
        let c2 = dot(&problem.q, dx2) + dot(&problem.b, dz2);

        // Quadratic-P correction to the constant-direction's linear reduction.
        // `Δx = dx3 + Δτ dx2` solves the (x, z) rows exactly for any `P`, but
        // the scalar τ-row's Mehrotra target is derived against `xi = dx2/tau`
        // (the constant direction rescaled to the current homogenization),
        // contributing `2 xiᵀ P dx3` to the numerator and
        // `(xi - dx2)ᵀ P (xi - dx2) - dx2ᵀ P dx2` to the denominator.
        let xi: Vec<E> = dx2.iter().map(|v| v / tau).collect();
        let p_dx3 = p_matvec(problem, dx3);
        let p_dx2 = p_matvec(problem, dx2);
        let xi_minus_x2: Vec<E> = xi.iter().zip(dx2.iter()).map(|(a, b)| a - b).collect();
        let p_diff = p_matvec(problem, &xi_minus_x2);
        let c1_p = c1 + 2.0 * dot(&xi, &p_dx3);
        let c2_p = c2 + dot(&xi_minus_x2, &p_diff) - dot(dx2, &p_dx2);

        let rhs_tau = -rtau;
        let dtau = (ds_tau_target + tau * (rhs_tau - c1_p)) / (kappa + tau * c2_p);
        let dkappa = rhs_tau - c1_p - dtau * c2_p;

        let dx: Vec<E> = (0..n).map(|i| dx3[i] + dtau * dx2[i]).collect();
        let dz: Vec<E> = (0..m).map(|i| dz3[i] + dtau * dz2[i]).collect();

        let mut ds = vec![0.0; m];
        let mut offset = 0;
        for cone in cones {
            let len = cone.dim();
            let ds_slice = &ds_target[offset..offset + len];
            let z_slice = &z[offset..offset + len];
            let dz_slice = &dz[offset..offset + len];
            let mut out = vec![0.0; len];
            cone.ds_from_dz_offset(ds_slice, z_slice, dz_slice, &mut out);
            ds[offset..offset + len].copy_from_slice(&out);
            offset += len;
        }

        Ok(NewtonStep { dx, ds, dz, dtau, dkappa })
    }
}
