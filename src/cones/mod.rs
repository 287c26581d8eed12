//! Cone interface and per-kind implementations (C1).
//!
//! Every cone kind exposes the same small set of operations the outer
//! iteration and the KKT assembler need; the iteration never matches on
//! cone kind itself. Dispatch happens once per cone per phase (a handful of
//! calls per outer iteration), never per vector element, so `enum_dispatch`
//! costs nothing the inner products would not already pay.

mod generalized_power;
mod nonnegative;
mod positive_semidefinite;
mod second_order;
mod zero;

pub use generalized_power::GeneralizedPowerCone;
pub use nonnegative::NonNegativeCone;
pub use positive_semidefinite::PositiveSemidefiniteCone;
pub use second_order::SecondOrderCone;
pub use zero::ZeroCone;

use enum_dispatch::enum_dispatch;

use crate::E;
use crate::problem::ConeSpec;

/// Direction for [`Cone::gemv_w`]: apply `W` or its transpose `Wᵀ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WMode {
    W,
    WTranspose,
}

/// Operations the HSDE iteration and KKT assembler perform against a single
/// cone block. All slices are sized to the cone's own dimension; callers are
/// responsible for slicing the full `(s, z)` vectors before calling in.
#[enum_dispatch]
pub trait Cone {
    /// Number of scalar coordinates this cone occupies.
    fn dim(&self) -> usize;

    /// Barrier degree contributed to the centrality parameter `μ`.
    fn degree(&self) -> E;

    /// Whether this cone uses Nesterov-Todd (symmetric) scaling as opposed
    /// to a dual-Hessian (asymmetric) scaling.
    fn is_symmetric(&self) -> bool;

    /// Sets `(s, z)` to a canonical interior point of `𝒦 x 𝒦*`.
    fn unit_initialization(&self, s: &mut [E], z: &mut [E]);

    /// Moves a computed-but-possibly-exterior `s` into the interior of `𝒦`,
    /// used only for symmetric cones during initialization.
    fn shift_to_cone(&self, s: &mut [E]);

    /// Refreshes the internal scaling from the current iterate. Returns
    /// `false` if `(s, z)` is no longer numerically interior.
    fn update_scaling(&mut self, s: &[E], z: &[E], mu: E) -> bool;

    /// Writes this cone's contribution to the block-diagonal part of the
    /// scaled Hessian (the `-WᵀW` / `-μH(z)` block of the KKT matrix).
    fn get_hs_block(&self, out: &mut [E]);

    /// `y <- μ H(z) x`, the dense-within-cone scaled Hessian product.
    fn mul_hs(&self, x: &[E], y: &mut [E]);

    /// Affine-step right-hand side contribution for the complementarity row.
    fn affine_ds(&self, s: &[E], ds: &mut [E]);

    /// Mehrotra corrector shift added to the combined-step right-hand side.
    fn combined_ds_shift(&self, step_s: &[E], step_z: &[E], sigma_mu: E, shift: &mut [E]);

    /// Recovers `Δs` once `Δz` is known, from the stored `ds` and scaling.
    fn ds_from_dz_offset(&self, ds: &[E], z: &[E], dz: &[E], out: &mut [E]);

    /// Maximum feasible step length along `(ds, dz)` from `(s, z)`, capped
    /// at `alpha_max`. Returns `(alpha_s, alpha_z)`.
    fn step_length(&self, s: &[E], z: &[E], ds: &[E], dz: &[E], alpha_max: E) -> (E, E);

    /// Barrier value at `(s + alpha*ds, z + alpha*dz)`; used to check that a
    /// candidate step length keeps the iterate's barrier finite.
    fn compute_barrier(&self, s: &[E], z: &[E], ds: &[E], dz: &[E], alpha: E) -> E;

    /// Jordan-algebra left-inverse circle product `λ ∖ v`; symmetric cones
    /// only. Asymmetric cones never call this (their KKT solve short-circuits
    /// to the raw `ds`).
    fn lambda_inv_circ_op(&self, ds: &[E], out: &mut [E]);

    /// `y <- alpha * W^{(T)} x + beta * y`; symmetric cones only.
    fn gemv_w(&self, mode: WMode, x: &[E], y: &mut [E], alpha: E, beta: E);
}

/// Closed, enumerable set of cone kinds; dispatches through `enum_dispatch`
/// rather than a trait object so the per-cone hot loops stay monomorphic.
#[enum_dispatch(Cone)]
pub enum ConeKind {
    Zero(ZeroCone),
    NonNegative(NonNegativeCone),
    SecondOrder(SecondOrderCone),
    PositiveSemidefinite(PositiveSemidefiniteCone),
    GeneralizedPower(GeneralizedPowerCone),
}

impl ConeKind {
    pub fn from_spec(spec: &ConeSpec) -> Self {
        match spec {
            ConeSpec::Zero { dim } => ConeKind::Zero(ZeroCone::new(*dim)),
            ConeSpec::NonNegative { dim } => ConeKind::NonNegative(NonNegativeCone::new(*dim)),
            ConeSpec::SecondOrder { dim } => ConeKind::SecondOrder(SecondOrderCone::new(*dim)),
            ConeSpec::PositiveSemidefinite { dim } => {
                ConeKind::PositiveSemidefinite(PositiveSemidefiniteCone::new(*dim))
            }
            ConeSpec::GeneralizedPower { alpha } => {
                ConeKind::GeneralizedPower(GeneralizedPowerCone::new(alpha.clone()))
            }
        }
    }
}

/// Builds one [`ConeKind`] per entry of the problem's cone product, in order.
pub fn build_cones(specs: &[ConeSpec]) -> Vec<ConeKind> {
    specs.iter().map(ConeKind::from_spec).collect()
}
