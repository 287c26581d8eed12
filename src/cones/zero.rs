use crate::E;
use crate::cones::{Cone, WMode};

/// `{0}^dim`: equality rows. `s` is pinned to zero; `z` is a free multiplier.
pub struct ZeroCone {
    dim: usize,
}

impl ZeroCone {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Cone for ZeroCone {
    fn dim(&self) -> usize {
        self.dim
    }

    fn degree(&self) -> E {
        0.0
    }

    fn is_symmetric(&self) -> bool {
        true
    }

    fn unit_initialization(&self, s: &mut [E], z: &mut [E]) {
        s.fill(0.0);
        z.fill(0.0);
    }

    fn shift_to_cone(&self, s: &mut [E]) {
        s.fill(0.0);
    }

    fn update_scaling(&mut self, _s: &[E], _z: &[E], _mu: E) -> bool {
        true
    }

    fn get_hs_block(&self, out: &mut [E]) {
        out.fill(0.0);
    }

    fn mul_hs(&self, _x: &[E], y: &mut [E]) {
        y.fill(0.0);
    }

    fn affine_ds(&self, _s: &[E], ds: &mut [E]) {
        ds.fill(0.0);
    }

    fn combined_ds_shift(&self, _step_s: &[E], _step_z: &[E], _sigma_mu: E, shift: &mut [E]) {
        shift.fill(0.0);
    }

    fn ds_from_dz_offset(&self, _ds: &[E], _z: &[E], _dz: &[E], out: &mut [E]) {
        out.fill(0.0);
    }

    fn step_length(&self, _s: &[E], _z: &[E], _ds: &[E], _dz: &[E], alpha_max: E) -> (E, E) {
        (alpha_max, alpha_max)
    }

    fn compute_barrier(&self, _s: &[E], _z: &[E], _ds: &[E], _dz: &[E], _alpha: E) -> E {
        0.0
    }

    fn lambda_inv_circ_op(&self, ds: &[E], out: &mut [E]) {
        out.copy_from_slice(ds);
    }

    fn gemv_w(&self, _mode: WMode, x: &[E], y: &mut [E], alpha: E, beta: E) {
        for i in 0..self.dim {
            y[i] = alpha * x[i] + beta * y[i];
        }
    }
}
