//! HSDE residual computation (C5), in the fixed order the outer loop and
//! convergence checks rely on: `qx, bz, sz, Px, xPx, rx_inf, rz_inf, rx, rz,
//! rtau`.

use crate::E;
use crate::problem::ProblemData;
use crate::variables::Variables;

#[derive(Debug, Clone, Copy, Default)]
pub struct Residuals {
    pub rx: E,
    pub rz: E,
    pub rtau: E,
    /// `‖rx‖` normalized by the dual-infeasibility scale, used for the
    /// primal/dual termination checks rather than raw residual norms.
    pub rx_inf: E,
    pub rz_inf: E,
    pub qx: E,
    pub bz: E,
    pub sz: E,
    pub gap: E,
}

impl Residuals {
    /// Computes `(rx_vec, rz_vec, residuals)` from the problem data and the
    /// current HSDE iterate.
    pub fn compute(problem: &ProblemData, vars: &Variables) -> (Vec<E>, Vec<E>, Residuals) {
        let n = problem.n();
        let m = problem.m();

        let mut px = vec![0.0; n];
        for col in 0..n {
            for idx in problem.p.col_range(col) {
                let row = problem.p.row_idx(idx);
                let v = problem.p.val(idx);
                px[row] += v * vars.x[col];
                if row != col {
                    px[col] += v * vars.x[row];
                }
            }
        }
        let xpx: E = (0..n).map(|i| vars.x[i] * px[i]).sum();

        let mut atz = vec![0.0; n];
        let mut ax = vec![0.0; m];
        for col in 0..n {
            for idx in problem.a.col_range(col) {
                let row = problem.a.row_idx(idx);
                let v = problem.a.val(idx);
                atz[col] += v * vars.z[row];
                ax[row] += v * vars.x[col];
            }
        }

        let qx: E = (0..n).map(|i| problem.q[i] * vars.x[i]).sum();
        let bz: E = (0..m).map(|i| problem.b[i] * vars.z[i]).sum();
        let sz: E = (0..m).map(|i| vars.s[i] * vars.z[i]).sum();

        let rx_vec: Vec<E> = (0..n).map(|i| px[i] + atz[i] + problem.q[i] * vars.tau).collect();
        let rz_vec: Vec<E> = (0..m).map(|i| ax[i] + vars.s[i] - problem.b[i] * vars.tau).collect();
        let rtau = vars.kappa + qx + bz;

        let rx_norm: E = rx_vec.iter().map(|v| v * v).sum::<E>().sqrt();
        let rz_norm: E = rz_vec.iter().map(|v| v * v).sum::<E>().sqrt();
        let tau_scale = vars.tau.max(1e-12);

        let residuals = Residuals {
            rx: rx_norm,
            rz: rz_norm,
            rtau,
            rx_inf: rx_norm / tau_scale,
            rz_inf: rz_norm / tau_scale,
            qx,
            bz,
            sz,
            gap: (xpx + qx + bz) / tau_scale,
        };

        (rx_vec, rz_vec, residuals)
    }
}
