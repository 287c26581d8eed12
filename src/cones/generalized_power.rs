use faer::Mat;

use crate::E;
use crate::cones::{Cone, WMode};

/// The generalized power cone
/// `{(x_1..x_r, y) : prod_i (x_i / alpha_i)^alpha_i >= |y|, x_i >= 0}`
/// with `sum(alpha) = 1`. Unlike the symmetric cones this crate otherwise
/// handles, there is no Nesterov-Todd scaling point: the primal-dual step
/// is driven directly off the gradient and Hessian of the dual barrier.
pub struct GeneralizedPowerCone {
    alpha: Vec<E>,
    /// `prod(alpha_i^{-2 alpha_i})`, the normalizing constant in the barrier.
    c: E,
    /// Gradient of the dual barrier at the last `z` passed to
    /// [`Cone::update_scaling`].
    grad: Vec<E>,
    /// The `z` the gradient and Hessian action above are evaluated at.
    z: Vec<E>,
    mu: E,
    /// Diagonal part of `H(z)`.
    d: Vec<E>,
    /// Rank vectors of `H(z) = diag(d) + p*pᵀ - q*qᵀ`; `q[r] == 0` since the
    /// coupling between the power coordinates and the single half-space
    /// coordinate is carried entirely by `p`.
    p: Vec<E>,
    q: Vec<E>,
}

impl GeneralizedPowerCone {
    pub fn new(alpha: Vec<E>) -> Self {
        assert!(!alpha.is_empty());
        let c = alpha.iter().map(|a| a.powf(-2.0 * a)).product();
        let dim = alpha.len() + 1;
        Self {
            alpha,
            c,
            grad: vec![0.0; dim],
            z: vec![0.0; dim],
            mu: 1.0,
            d: vec![0.0; dim],
            p: vec![0.0; dim],
            q: vec![0.0; dim],
        }
    }

    fn r(&self) -> usize {
        self.alpha.len()
    }

    fn power(&self, v: &[E]) -> E {
        self.alpha.iter().zip(&v[..self.r()]).map(|(a, vi)| vi.powf(2.0 * a)).product::<E>() * self.c
    }

    /// `g(v) = c * prod(v_i^{2 alpha_i}) - v_last^2`, positive in the cone's
    /// interior.
    fn g(&self, v: &[E]) -> E {
        self.power(v) - v[self.r()] * v[self.r()]
    }

    fn gradient(&self, v: &[E]) -> Vec<E> {
        let r = self.r();
        let power = self.power(v);
        let g = power - v[r] * v[r];
        let mut out = vec![0.0; r + 1];
        for i in 0..r {
            out[i] = -(2.0 * self.alpha[i] * power) / (g * v[i]) - (1.0 - self.alpha[i]) / v[i];
        }
        out[r] = 2.0 * v[r] / g;
        out
    }

    pub(crate) fn in_cone(&self, v: &[E]) -> bool {
        v[..self.r()].iter().all(|&vi| vi > 0.0) && self.g(v) > 0.0
    }

    /// Closed-form diagonal+rank-2 decomposition of the dual barrier Hessian
    /// `H(z) = D + p pᵀ - q qᵀ`.
    ///
    /// `f*(z) = -log(g(z)) - sum_i (1-alpha_i) log z_i`, with
    /// `g(z) = power(z) - z_r^2` and `power(z) = c prod_i z_i^{2 alpha_i}`
    /// (`power` does not depend on `z_r`). Writing `g_i = d power/d z_i =
    /// 2 alpha_i power / z_i` for `i < r` and `g_r = d g/d z_r = -2 z_r`,
    /// `-log(g)`'s Hessian is `-g''/g + (grad g)(grad g)^T/g^2`, and
    /// differentiating `g` twice shows its restriction to the power
    /// coordinates is `g_i g_j / power` off the diagonal and
    /// `g_i(2 alpha_i - 1)/z_i` on it, with zero coupling to the `z_r` row
    /// (since `power` is independent of `z_r`). Substituting collapses the
    /// full Hessian (barrier plus the separable `-(1-alpha_i) log z_i` term)
    /// to `D + p pᵀ - q qᵀ` with `p_i = g_i/g` (the full gradient of `g`,
    /// rescaled) and `q_i = p_i sqrt(g/power)` for `i < r`, `q_r = 0`. A
    /// third rank-1 term would only appear if the half-space coordinate had
    /// dimension greater than one; this cone restricts to a single `z_r`.
    fn hessian_components(&self, z: &[E]) -> (Vec<E>, Vec<E>, Vec<E>) {
        let r = self.r();
        let power = self.power(z);
        let g = self.g(z);

        let mut p = vec![0.0; r + 1];
        let mut q = vec![0.0; r + 1];
        let mut d = vec![0.0; r + 1];

        for i in 0..r {
            let gi = 2.0 * self.alpha[i] * power / z[i];
            p[i] = gi / g;
            q[i] = p[i] * (g / power).sqrt();
            let e_i = 2.0 * self.alpha[i] * power / (z[i] * z[i] * g);
            d[i] = e_i + (1.0 - self.alpha[i]) / (z[i] * z[i]);
        }
        p[r] = -2.0 * z[r] / g;
        q[r] = 0.0;
        d[r] = 2.0 / g;

        (d, p, q)
    }

    /// Full `dim x dim` dense matrix of `mu * H(z)`, for the KKT assembler's
    /// per-cone dense sub-block (the power cone's Hessian is never
    /// sparsified the way second-order cones are).
    pub(crate) fn dense_block(&self) -> Mat<E> {
        let dim = self.dim();
        Mat::<E>::from_fn(dim, dim, |i, j| {
            let off = self.p[i] * self.p[j] - self.q[i] * self.q[j];
            let diag = if i == j { self.d[i] } else { 0.0 };
            self.mu * (diag + off)
        })
    }
}

impl Cone for GeneralizedPowerCone {
    fn dim(&self) -> usize {
        self.r() + 1
    }

    fn degree(&self) -> E {
        self.r() as E
    }

    fn is_symmetric(&self) -> bool {
        false
    }

    fn unit_initialization(&self, s: &mut [E], z: &mut [E]) {
        for i in 0..self.r() {
            s[i] = 1.0;
            z[i] = 1.0;
        }
        s[self.r()] = 0.0;
        z[self.r()] = 0.0;
    }

    fn shift_to_cone(&self, s: &mut [E]) {
        if self.in_cone(s) {
            return;
        }
        // Newton-Raphson on the scalar `t` scaling the power coordinates so
        // that `g(t*x_1,...,t*x_r, y) = eps` holds.
        let r = self.r();
        let y = s[r];
        let mut t: E = 2.0;
        for _ in 0..50 {
            let scaled: Vec<E> = s[..r].iter().map(|x| t * x).chain(std::iter::once(y)).collect();
            let h = self.g(&scaled) - 1e-6;
            if h.abs() < 1e-12 {
                break;
            }
            let power: E = self.alpha.iter().zip(&s[..r]).map(|(a, x)| (t * x).powf(2.0 * a)).product::<E>() * self.c;
            let dh_dt = 2.0 * power / t;
            if dh_dt.abs() < 1e-14 {
                break;
            }
            t -= h / dh_dt;
            t = t.max(1e-8);
        }
        for i in 0..r {
            s[i] *= t;
        }
    }

    fn update_scaling(&mut self, _s: &[E], z: &[E], mu: E) -> bool {
        if !self.in_cone(z) {
            return false;
        }
        self.grad = self.gradient(z);
        let (d, p, q) = self.hessian_components(z);
        self.d = d;
        self.p = p;
        self.q = q;
        self.z = z.to_vec();
        self.mu = mu;
        true
    }

    fn get_hs_block(&self, out: &mut [E]) {
        // Diagonal-only projection of H(z); the full dense block (including
        // the rank-2 off-diagonal correction) lives in `dense_block`.
        for i in 0..self.dim() {
            out[i] = self.mu * self.d[i];
        }
    }

    fn mul_hs(&self, x: &[E], y: &mut [E]) {
        let px: E = self.p.iter().zip(x).map(|(pi, xi)| pi * xi).sum();
        let qx: E = self.q.iter().zip(x).map(|(qi, xi)| qi * xi).sum();
        for i in 0..self.dim() {
            y[i] = self.mu * (self.d[i] * x[i] + self.p[i] * px - self.q[i] * qx);
        }
    }

    fn affine_ds(&self, s: &[E], ds: &mut [E]) {
        for i in 0..self.dim() {
            ds[i] = -(s[i] + self.mu * self.grad[i]);
        }
    }

    fn combined_ds_shift(&self, _step_s: &[E], _step_z: &[E], sigma_mu: E, shift: &mut [E]) {
        // First-order centering term for the asymmetric-cone corrector
        // (`grad_dual(z) * sigma * mu`); the third-order Mehrotra-Tapia
        // correction is not computed.
        for i in 0..self.dim() {
            shift[i] = sigma_mu * self.grad[i];
        }
    }

    fn ds_from_dz_offset(&self, ds: &[E], _z: &[E], dz: &[E], out: &mut [E]) {
        let mut hdz = vec![0.0; self.dim()];
        self.mul_hs(dz, &mut hdz);
        for i in 0..self.dim() {
            out[i] = -ds[i] - hdz[i];
        }
    }

    fn step_length(&self, s: &[E], z: &[E], ds: &[E], dz: &[E], alpha_max: E) -> (E, E) {
        let search = |v: &[E], dv: &[E]| -> E {
            let mut lo = 0.0;
            let mut hi = alpha_max;
            if self.in_cone(v) && !self.in_cone(&add_scaled(v, dv, hi)) {
                for _ in 0..60 {
                    let mid = 0.5 * (lo + hi);
                    if self.in_cone(&add_scaled(v, dv, mid)) {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                lo
            } else if self.in_cone(&add_scaled(v, dv, hi)) {
                hi
            } else {
                0.0
            }
        };
        (search(s, ds), search(z, dz))
    }

    fn compute_barrier(&self, s: &[E], z: &[E], ds: &[E], dz: &[E], alpha: E) -> E {
        let sv = add_scaled(s, ds, alpha);
        let zv = add_scaled(z, dz, alpha);
        if !self.in_cone(&sv) || !self.in_cone(&zv) {
            return E::INFINITY;
        }
        self.barrier_value(&sv) + self.barrier_value(&zv)
    }

    fn lambda_inv_circ_op(&self, ds: &[E], out: &mut [E]) {
        // Unreachable on the asymmetric-cone step path (`is_symmetric` is
        // `false`); kept as a plain copy to satisfy the trait.
        out.copy_from_slice(ds);
    }

    fn gemv_w(&self, _mode: WMode, x: &[E], y: &mut [E], alpha: E, beta: E) {
        for i in 0..self.dim() {
            y[i] = alpha * x[i] + beta * y[i];
        }
    }
}

impl GeneralizedPowerCone {
    fn barrier_value(&self, v: &[E]) -> E {
        let g = self.g(v);
        let mut out = -g.ln();
        for i in 0..self.r() {
            out -= (1.0 - self.alpha[i]) * v[i].ln();
        }
        out
    }
}

fn add_scaled(a: &[E], b: &[E], alpha: E) -> Vec<E> {
    a.iter().zip(b).map(|(x, y)| x + alpha * y).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_point_is_interior() {
        let cone = GeneralizedPowerCone::new(vec![0.5, 0.5]);
        let mut s = vec![0.0; 3];
        let mut z = vec![0.0; 3];
        cone.unit_initialization(&mut s, &mut z);
        assert!(cone.in_cone(&s));
        assert!(cone.in_cone(&z));
    }

    #[test]
    fn gradient_points_inward_for_interior_point() {
        let cone = GeneralizedPowerCone::new(vec![0.5, 0.5]);
        let z = vec![1.0, 1.0, 0.0];
        let g = cone.gradient(&z);
        assert!(g[0] < 0.0 && g[1] < 0.0);
    }

    #[test]
    fn hessian_is_symmetric_and_positive_at_symmetric_point() {
        let mut cone = GeneralizedPowerCone::new(vec![0.5, 0.5]);
        cone.update_scaling(&[1.0, 1.0, 0.0], &[1.0, 1.0, 0.0], 1.0);
        let dense = cone.dense_block();
        for i in 0..3 {
            for j in 0..3 {
                assert!((dense[(i, j)] - dense[(j, i)]).abs() < 1e-12);
            }
        }
        assert!(dense[(0, 0)] > 0.0 && dense[(1, 1)] > 0.0 && dense[(2, 2)] > 0.0);
    }

    #[test]
    fn mul_hs_matches_dense_block_action() {
        let mut cone = GeneralizedPowerCone::new(vec![0.3, 0.7]);
        cone.update_scaling(&[2.0, 0.8, 0.5], &[2.0, 0.8, 0.5], 1.3);
        let dense = cone.dense_block();
        let x = [0.4, -0.9, 1.1];
        let mut hx = [0.0; 3];
        cone.mul_hs(&x, &mut hx);
        for i in 0..3 {
            let expected: E = (0..3).map(|j| dense[(i, j)] * x[j]).sum();
            assert!((hx[i] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn combined_ds_shift_is_centering_term() {
        let mut cone = GeneralizedPowerCone::new(vec![0.5, 0.5]);
        cone.update_scaling(&[1.0, 1.0, 0.0], &[1.0, 1.0, 0.0], 1.0);
        let mut shift = vec![0.0; 3];
        cone.combined_ds_shift(&[0.0; 3], &[0.0; 3], 2.0, &mut shift);
        for i in 0..3 {
            assert!((shift[i] - 2.0 * cone.grad[i]).abs() < 1e-12);
        }
    }
}
