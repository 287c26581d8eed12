use crate::E;
use crate::cones::{Cone, WMode};

fn dot(a: &[E], b: &[E]) -> E {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn jordan_det(x: &[E]) -> E {
    x[0] * x[0] - dot(&x[1..], &x[1..])
}

/// The second-order (Lorentz) cone `{(u,w) : u >= ||w||}` of total
/// dimension `dim`. Nesterov-Todd scaling is the quadratic representation
/// `Q_w` of a single scaling point `w`.
pub struct SecondOrderCone {
    dim: usize,
    /// NT scaling point, refreshed by [`Cone::update_scaling`].
    w: Vec<E>,
    /// `det(w) = w0^2 - ||w_bar||^2`.
    det_w: E,
    /// Scaled point `λ`, the Jordan-algebra image of `(s, z)` at the NT point.
    lambda: Vec<E>,
}

impl SecondOrderCone {
    pub fn new(dim: usize) -> Self {
        assert!(dim >= 2, "second-order cone needs at least 2 dimensions");
        Self {
            dim,
            w: vec![0.0; dim],
            det_w: 0.0,
            lambda: vec![0.0; dim],
        }
    }

    /// Rank-1 border column and diagonal sign used by the KKT assembler's
    /// sparse SOC expansion (C2/C4): the dense `Q_w = 2 w wᵀ - det(w) J`
    /// splits into a directly-written diagonal (`-det(w)`, `det(w)`, ...)
    /// plus one genuinely dense column `u = sqrt(2) w` eliminated through an
    /// auxiliary variable of sign `-1`. A second auxiliary variable (sign
    /// `+1`, zero column) is reserved alongside it so every second-order
    /// cone contributes exactly two extra KKT rows/columns, matching the
    /// fixed-pattern assumption the assembler relies on.
    pub(crate) fn sparse_expansion(&self) -> (Vec<E>, Vec<E>, E, E) {
        let u: Vec<E> = self.w.iter().map(|wi| (2.0f64).sqrt() * wi).collect();
        let v = vec![0.0; self.dim];
        (u, v, -1.0, 1.0)
    }

    pub(crate) fn diagonal(&self) -> Vec<E> {
        let mut out = vec![self.det_w; self.dim];
        out[0] = -self.det_w;
        out
    }
}

impl Cone for SecondOrderCone {
    fn dim(&self) -> usize {
        self.dim
    }

    fn degree(&self) -> E {
        1.0
    }

    fn is_symmetric(&self) -> bool {
        true
    }

    fn unit_initialization(&self, s: &mut [E], z: &mut [E]) {
        s.fill(0.0);
        z.fill(0.0);
        s[0] = 1.0;
        z[0] = 1.0;
    }

    fn shift_to_cone(&self, s: &mut [E]) {
        let qs = jordan_det(s);
        if qs < 1e-8 {
            let norm_bar = dot(&s[1..], &s[1..]).sqrt();
            s[0] = norm_bar + 1.0;
        }
    }

    fn update_scaling(&mut self, s: &[E], z: &[E], _mu: E) -> bool {
        let qs = jordan_det(s);
        let qz = jordan_det(z);
        if qs <= 0.0 || qz <= 0.0 {
            return false;
        }
        let s_scale = qs.sqrt();
        let z_scale = qz.sqrt();
        let shat: Vec<E> = s.iter().map(|v| v / s_scale).collect();
        let zhat: Vec<E> = z.iter().map(|v| v / z_scale).collect();

        let gamma = ((1.0 + dot(&shat, &zhat)) / 2.0).sqrt();
        if gamma <= 0.0 {
            return false;
        }

        let eta = (qs / qz).powf(0.25);
        self.w[0] = eta * (shat[0] + zhat[0]) / (2.0 * gamma);
        for i in 1..self.dim {
            self.w[i] = eta * (shat[i] - zhat[i]) / (2.0 * gamma);
        }
        self.det_w = jordan_det(&self.w);

        for i in 0..self.dim {
            self.lambda[i] = self.w[i] * self.det_w.sqrt();
        }
        true
    }

    fn get_hs_block(&self, out: &mut [E]) {
        out.copy_from_slice(&self.diagonal());
    }

    fn mul_hs(&self, x: &[E], y: &mut [E]) {
        let wx = dot(&self.w, x);
        y[0] = 2.0 * wx * self.w[0] - self.det_w * x[0];
        for i in 1..self.dim {
            y[i] = 2.0 * wx * self.w[i] + self.det_w * x[i];
        }
    }

    fn affine_ds(&self, _s: &[E], ds: &mut [E]) {
        ds[0] = dot(&self.lambda, &self.lambda);
        for i in 1..self.dim {
            ds[i] = 2.0 * self.lambda[0] * self.lambda[i];
        }
    }

    fn combined_ds_shift(&self, step_s: &[E], step_z: &[E], sigma_mu: E, shift: &mut [E]) {
        shift[0] = dot(step_s, step_z) - sigma_mu;
        for i in 1..self.dim {
            shift[i] = step_s[0] * step_z[i] + step_z[0] * step_s[i];
        }
    }

    fn ds_from_dz_offset(&self, ds: &[E], _z: &[E], dz: &[E], out: &mut [E]) {
        let mut tmp = vec![0.0; self.dim];
        self.lambda_inv_circ_op(ds, &mut tmp);
        let mut hdz = vec![0.0; self.dim];
        self.mul_hs(dz, &mut hdz);
        for i in 0..self.dim {
            out[i] = -tmp[i] - hdz[i];
        }
    }

    fn step_length(&self, s: &[E], z: &[E], ds: &[E], dz: &[E], alpha_max: E) -> (E, E) {
        let root_s = smallest_positive_root(
            ds[0] * ds[0] - dot(&ds[1..], &ds[1..]),
            2.0 * (s[0] * ds[0] - dot(&s[1..], &ds[1..])),
            jordan_det(s),
        );
        let root_z = smallest_positive_root(
            dz[0] * dz[0] - dot(&dz[1..], &dz[1..]),
            2.0 * (z[0] * dz[0] - dot(&z[1..], &dz[1..])),
            jordan_det(z),
        );
        (alpha_max.min(root_s), alpha_max.min(root_z))
    }

    fn compute_barrier(&self, s: &[E], z: &[E], ds: &[E], dz: &[E], alpha: E) -> E {
        let sv: Vec<E> = s.iter().zip(ds).map(|(a, b)| a + alpha * b).collect();
        let zv: Vec<E> = z.iter().zip(dz).map(|(a, b)| a + alpha * b).collect();
        let qs = jordan_det(&sv);
        let qz = jordan_det(&zv);
        if qs <= 0.0 || qz <= 0.0 {
            return E::INFINITY;
        }
        -qs.ln() - qz.ln()
    }

    fn lambda_inv_circ_op(&self, ds: &[E], out: &mut [E]) {
        let det_l = jordan_det(&self.lambda);
        let y0 = (ds[0] * self.lambda[0] - dot(&self.lambda[1..], &ds[1..])) / det_l;
        out[0] = y0;
        for i in 1..self.dim {
            out[i] = (ds[i] - y0 * self.lambda[i]) / self.lambda[0];
        }
    }

    fn gemv_w(&self, _mode: WMode, x: &[E], y: &mut [E], alpha: E, beta: E) {
        // `W` is self-adjoint for the second-order cone; both modes apply
        // the same quadratic representation `Q_w`.
        let mut hx = vec![0.0; self.dim];
        self.mul_hs(x, &mut hx);
        for i in 0..self.dim {
            y[i] = alpha * hx[i] + beta * y[i];
        }
    }
}

/// Smallest strictly-positive root of `a*t^2 + b*t + c = 0`, or `+inf` if
/// the line segment never leaves the cone.
fn smallest_positive_root(a: E, b: E, c: E) -> E {
    if a.abs() < 1e-14 {
        return if b < 0.0 { -c / b } else { E::INFINITY };
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return E::INFINITY;
    }
    let sqrt_disc = disc.sqrt();
    let r1 = (-b - sqrt_disc) / (2.0 * a);
    let r2 = (-b + sqrt_disc) / (2.0 * a);
    let mut best = E::INFINITY;
    for r in [r1, r2] {
        if r > 1e-14 && r < best {
            best = r;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_initialization_is_interior() {
        let cone = SecondOrderCone::new(3);
        let mut s = vec![0.0; 3];
        let mut z = vec![0.0; 3];
        cone.unit_initialization(&mut s, &mut z);
        assert!(jordan_det(&s) > 0.0);
        assert!(jordan_det(&z) > 0.0);
    }

    #[test]
    fn scaling_point_is_interior_after_update() {
        let mut cone = SecondOrderCone::new(3);
        let s = [2.0, 0.5, 0.5];
        let z = [1.5, 0.2, 0.1];
        assert!(cone.update_scaling(&s, &z, 1.0));
        assert!(cone.det_w > 0.0);
    }

    #[test]
    fn w_is_self_adjoint_round_trip() {
        let mut cone = SecondOrderCone::new(3);
        cone.update_scaling(&[2.0, 0.5, 0.5], &[1.5, 0.2, 0.1], 1.0);
        let x = [1.0, -0.3, 0.7];
        let mut wx = [0.0; 3];
        cone.gemv_w(WMode::W, &x, &mut wx, 1.0, 0.0);
        let mut wtx = [0.0; 3];
        cone.gemv_w(WMode::WTranspose, &x, &mut wtx, 1.0, 0.0);
        let mut hsx = [0.0; 3];
        cone.mul_hs(&x, &mut hsx);
        for i in 0..3 {
            assert!((wx[i] - wtx[i]).abs() < 1e-12);
            assert!((wx[i] - hsx[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn lambda_circ_inverse_is_identity() {
        let mut cone = SecondOrderCone::new(3);
        cone.update_scaling(&[2.0, 0.5, 0.5], &[1.5, 0.2, 0.1], 1.0);
        let v = [1.0, -0.3, 0.7];
        let mut inv = [0.0; 3];
        cone.lambda_inv_circ_op(&v, &mut inv);
        // Jordan product `lambda o inv` recovers `v`.
        let recovered = [
            dot(&cone.lambda, &inv),
            cone.lambda[0] * inv[1] + inv[0] * cone.lambda[1],
            cone.lambda[0] * inv[2] + inv[0] * cone.lambda[2],
        ];
        for i in 0..3 {
            assert!((recovered[i] - v[i]).abs() < 1e-9);
        }
    }
}
