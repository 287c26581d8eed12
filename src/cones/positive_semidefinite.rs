use faer::linalg::evd::{self, ComputeEigenvectors};
use faer::prelude::*;
use faer::{Mat, Par};

use crate::E;
use crate::cones::{Cone, WMode};

const SQRT2: E = std::f64::consts::SQRT_2;

/// Converts a scaled-vectorized (svec) representation of a symmetric matrix
/// back to its dense form. Off-diagonal entries carry a `sqrt(2)` factor so
/// that the svec inner product equals the matrix Frobenius inner product.
fn svec_to_mat(n: usize, svec: &[E]) -> Mat<E> {
    let mut mat = Mat::<E>::zeros(n, n);
    let mut k = 0;
    for j in 0..n {
        for i in 0..=j {
            if i == j {
                mat[(i, j)] = svec[k];
            } else {
                let v = svec[k] / SQRT2;
                mat[(i, j)] = v;
                mat[(j, i)] = v;
            }
            k += 1;
        }
    }
    mat
}

fn mat_to_svec(n: usize, mat: &Mat<E>) -> Vec<E> {
    let mut svec = Vec::with_capacity(n * (n + 1) / 2);
    for j in 0..n {
        for i in 0..=j {
            if i == j {
                svec.push(mat[(i, j)]);
            } else {
                svec.push(mat[(i, j)] * SQRT2);
            }
        }
    }
    svec
}

/// Dense symmetric eigendecomposition `mat = q * diag(eigs) * qᵀ`.
fn self_adjoint_eigen(mat: &Mat<E>) -> (Mat<E>, Vec<E>) {
    let n = mat.nrows();
    let mut s = faer::Col::<E>::zeros(n);
    let mut u = Mat::<E>::zeros(n, n);
    evd::self_adjoint_evd(
        mat.as_ref(),
        s.as_mut(),
        Some(u.as_mut()),
        Par::Seq,
        faer::dyn_stack::MemStack::new(&mut faer::dyn_stack::MemBuffer::new(
            evd::self_adjoint_evd_scratch::<E>(n, ComputeEigenvectors::Yes, Par::Seq, Default::default()),
        )),
        Default::default(),
    );
    let eigs = (0..n).map(|i| s[i]).collect();
    (u, eigs)
}

fn mat_from_eigen(n: usize, q: &Mat<E>, eigs: &[E], f: impl Fn(E) -> E) -> Mat<E> {
    let d = Mat::<E>::from_fn(n, n, |i, j| if i == j { f(eigs[i]) } else { 0.0 });
    q * &d * q.transpose()
}

/// The cone of `order x order` symmetric PSD matrices, stored as a
/// `order*(order+1)/2`-length scaled-vectorized block.
pub struct PositiveSemidefiniteCone {
    order: usize,
    /// Nesterov-Todd scaling matrix `W` satisfying `W Z W = S`.
    w: Mat<E>,
    /// Symmetric matrix representation of `λ`, used for the cone's Jordan
    /// algebra (`X ∘ Y = (XY + YX)/2`).
    lambda_mat: Mat<E>,
}

impl PositiveSemidefiniteCone {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            w: Mat::<E>::identity(order, order),
            lambda_mat: Mat::<E>::identity(order, order),
        }
    }

    fn congruence(&self, x_svec: &[E]) -> Vec<E> {
        let x = svec_to_mat(self.order, x_svec);
        let y = &self.w * &x * &self.w;
        mat_to_svec(self.order, &y)
    }

    /// The dense `dim() x dim()` matrix of the congruence operator
    /// `svec(X) -> svec(W X W)`, for the KKT assembler's per-cone dense
    /// sub-block (PSD cones are never sparsified into auxiliary variables
    /// the way second-order cones are).
    pub(crate) fn dense_block(&self) -> Mat<E> {
        let d = self.dim();
        let mut cols = Vec::with_capacity(d);
        for k in 0..d {
            let mut basis = vec![0.0; d];
            basis[k] = 1.0;
            cols.push(self.congruence(&basis));
        }
        Mat::<E>::from_fn(d, d, |i, j| cols[j][i])
    }
}

impl Cone for PositiveSemidefiniteCone {
    fn dim(&self) -> usize {
        self.order * (self.order + 1) / 2
    }

    fn degree(&self) -> E {
        self.order as E
    }

    fn is_symmetric(&self) -> bool {
        true
    }

    fn unit_initialization(&self, s: &mut [E], z: &mut [E]) {
        let ident = mat_to_svec(self.order, &Mat::<E>::identity(self.order, self.order));
        s.copy_from_slice(&ident);
        z.copy_from_slice(&ident);
    }

    fn shift_to_cone(&self, s: &mut [E]) {
        let mat = svec_to_mat(self.order, s);
        let (_q, eigs) = self_adjoint_eigen(&mat);
        let min_eig = eigs.iter().cloned().fold(E::INFINITY, E::min);
        if min_eig < 1e-8 {
            let shift = 1.0 - min_eig;
            let shifted = &mat + Mat::<E>::identity(self.order, self.order) * shift;
            s.copy_from_slice(&mat_to_svec(self.order, &shifted));
        }
    }

    fn update_scaling(&mut self, s: &[E], z: &[E], _mu: E) -> bool {
        let smat = svec_to_mat(self.order, s);
        let zmat = svec_to_mat(self.order, z);

        let (qs, ds) = self_adjoint_eigen(&smat);
        if ds.iter().any(|&d| d <= 0.0) {
            return false;
        }
        let s12 = mat_from_eigen(self.order, &qs, &ds, |d| d.sqrt());

        let m = &s12 * &zmat * &s12;
        let (qm, dm) = self_adjoint_eigen(&m);
        if dm.iter().any(|&d| d <= 0.0) {
            return false;
        }

        self.w = mat_from_eigen(self.order, &(&s12 * &qm), &dm, |d| 1.0 / d.sqrt());
        self.lambda_mat = mat_from_eigen(self.order, &qm, &dm, |d| d.sqrt());
        true
    }

    fn get_hs_block(&self, out: &mut [E]) {
        // Diagonal-only projection of the dense congruence action; the full
        // dense block lives in the KKT system's per-cone dense sub-block.
        let ident_svec = mat_to_svec(self.order, &Mat::<E>::identity(self.order, self.order));
        let diag = self.congruence(&ident_svec);
        out.copy_from_slice(&diag);
    }

    fn mul_hs(&self, x: &[E], y: &mut [E]) {
        y.copy_from_slice(&self.congruence(x));
    }

    fn affine_ds(&self, _s: &[E], ds: &mut [E]) {
        let l2 = &self.lambda_mat * &self.lambda_mat;
        ds.copy_from_slice(&mat_to_svec(self.order, &l2));
    }

    fn combined_ds_shift(&self, step_s: &[E], step_z: &[E], sigma_mu: E, shift: &mut [E]) {
        let ds = svec_to_mat(self.order, step_s);
        let dz = svec_to_mat(self.order, step_z);
        let prod = (&ds * &dz + &dz * &ds) * 0.5;
        let mut out = mat_to_svec(self.order, &prod);
        for (k, v) in out.iter_mut().enumerate() {
            // Only the diagonal svec slots correspond to identity directions.
            let is_diag = {
                let mut idx = 0usize;
                let mut found = false;
                'outer: for j in 0..self.order {
                    for i in 0..=j {
                        if idx == k {
                            found = i == j;
                            break 'outer;
                        }
                        idx += 1;
                    }
                }
                found
            };
            if is_diag {
                *v -= sigma_mu;
            }
        }
        shift.copy_from_slice(&out);
    }

    fn ds_from_dz_offset(&self, ds: &[E], _z: &[E], dz: &[E], out: &mut [E]) {
        let mut tmp = vec![0.0; self.dim()];
        self.lambda_inv_circ_op(ds, &mut tmp);
        let mut hdz = vec![0.0; self.dim()];
        self.mul_hs(dz, &mut hdz);
        for i in 0..self.dim() {
            out[i] = -tmp[i] - hdz[i];
        }
    }

    fn step_length(&self, s: &[E], z: &[E], ds: &[E], dz: &[E], alpha_max: E) -> (E, E) {
        let alpha_s = max_step_keeping_psd(self.order, s, ds, alpha_max);
        let alpha_z = max_step_keeping_psd(self.order, z, dz, alpha_max);
        (alpha_s, alpha_z)
    }

    fn compute_barrier(&self, s: &[E], z: &[E], ds: &[E], dz: &[E], alpha: E) -> E {
        let sv: Vec<E> = s.iter().zip(ds).map(|(a, b)| a + alpha * b).collect();
        let zv: Vec<E> = z.iter().zip(dz).map(|(a, b)| a + alpha * b).collect();
        let (_q, seig) = self_adjoint_eigen(&svec_to_mat(self.order, &sv));
        let (_q, zeig) = self_adjoint_eigen(&svec_to_mat(self.order, &zv));
        if seig.iter().any(|&d| d <= 0.0) || zeig.iter().any(|&d| d <= 0.0) {
            return E::INFINITY;
        }
        let s_logdet: E = seig.iter().map(|d| d.ln()).sum();
        let z_logdet: E = zeig.iter().map(|d| d.ln()).sum();
        -s_logdet - z_logdet
    }

    fn lambda_inv_circ_op(&self, ds: &[E], out: &mut [E]) {
        let dsmat = svec_to_mat(self.order, ds);
        let (q, leig) = self_adjoint_eigen(&self.lambda_mat);
        let qt_ds_q = q.transpose() * &dsmat * &q;
        let mut result = Mat::<E>::zeros(self.order, self.order);
        for i in 0..self.order {
            for j in 0..self.order {
                result[(i, j)] = qt_ds_q[(i, j)] * 2.0 / (leig[i] + leig[j]);
            }
        }
        let back = &q * &result * q.transpose();
        out.copy_from_slice(&mat_to_svec(self.order, &back));
    }

    fn gemv_w(&self, _mode: WMode, x: &[E], y: &mut [E], alpha: E, beta: E) {
        let hx = self.congruence(x);
        for i in 0..self.dim() {
            y[i] = alpha * hx[i] + beta * y[i];
        }
    }
}

/// Largest `alpha` in `[0, alpha_max]` keeping `mat(x) + alpha*mat(dx)` PSD,
/// found by a coarse eigenvalue-ratio bound refined with bisection.
fn max_step_keeping_psd(order: usize, x: &[E], dx: &[E], alpha_max: E) -> E {
    let xmat = svec_to_mat(order, x);
    let dxmat = svec_to_mat(order, dx);
    let (_q, xeig) = self_adjoint_eigen(&xmat);
    let min_xeig = xeig.iter().cloned().fold(E::INFINITY, E::min);
    let (_q, dxeig) = self_adjoint_eigen(&dxmat);
    let max_neg_dir = dxeig.iter().cloned().fold(0.0, |acc: E, v| acc.min(v));
    if max_neg_dir >= 0.0 {
        return alpha_max;
    }

    let mut lo = 0.0;
    let mut hi = alpha_max;
    for _ in 0..50 {
        let mid = 0.5 * (lo + hi);
        let trial = &xmat + &dxmat * mid;
        let (_q, trial_eig) = self_adjoint_eigen(&trial);
        let trial_min = trial_eig.iter().cloned().fold(E::INFINITY, E::min);
        if trial_min > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let _ = min_xeig;
    lo
}
