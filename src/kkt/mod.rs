//! KKT system assembly (C2) and the reduced-system driver (C4).

pub mod driver;
pub mod ldl;

use faer::sparse::{SparseColMat, Triplet};

use crate::E;
use crate::I;
use crate::cones::ConeKind;
use crate::problem::ProblemData;

/// Layout of the augmented KKT matrix: `x` (n), `z` (m, one slot per cone
/// coordinate), and `p` auxiliary variables (two per second-order cone, used
/// to sparsify its rank-1 Nesterov-Todd correction).
pub struct KktLayout {
    pub n: usize,
    pub m: usize,
    pub p: usize,
    /// `(start, len)` of each cone's block within the `z` slice.
    cone_ranges: Vec<(usize, usize)>,
    /// For each second-order cone: `(cone_index, aux_col0, aux_col1)`,
    /// `aux_col*` being offsets into the auxiliary block.
    soc_aux: Vec<(usize, usize, usize)>,
    /// `+1`/`-1` per KKT row, used to sign the static regularization term.
    dsigns: Vec<E>,
}

impl KktLayout {
    pub fn new(problem: &ProblemData) -> Self {
        let n = problem.n();
        let mut cone_ranges = Vec::with_capacity(problem.cones.len());
        let mut start = 0;
        for cone in &problem.cones {
            let len = cone.dim();
            cone_ranges.push((start, len));
            start += len;
        }
        let m = start;

        let mut soc_aux = Vec::new();
        let mut aux_col = 0;
        for (idx, cone) in problem.cones.iter().enumerate() {
            if matches!(cone, crate::problem::ConeSpec::SecondOrder { .. }) {
                soc_aux.push((idx, aux_col, aux_col + 1));
                aux_col += 2;
            }
        }
        let p = aux_col;
        let dim = n + m + p;

        let mut dsigns = vec![1.0; dim];
        for v in dsigns.iter_mut().skip(n).take(m) {
            *v = -1.0;
        }
        for &(_, c0, c1) in &soc_aux {
            dsigns[n + m + c0] = -1.0;
            dsigns[n + m + c1] = 1.0;
        }

        Self {
            n,
            m,
            p,
            cone_ranges,
            soc_aux,
            dsigns,
        }
    }

    pub fn dim(&self) -> usize {
        self.n + self.m + self.p
    }

    pub fn z_offset(&self) -> usize {
        self.n
    }

    pub fn aux_offset(&self) -> usize {
        self.n + self.m
    }
}

/// Builds the augmented KKT matrix from `P`, `A`, and the current per-cone
/// scaling, and exposes the equivalent symmetric matrix-vector product used
/// by iterative refinement (against the true, unregularized system).
pub struct KktAssembler {
    layout: KktLayout,
    p: SparseColMat<I, E>,
    a: SparseColMat<I, E>,
    pub static_reg_enable: bool,
    pub static_reg_eps: E,
}

impl KktAssembler {
    pub fn new(problem: &ProblemData, static_reg_enable: bool, static_reg_eps: E) -> Self {
        Self {
            layout: KktLayout::new(problem),
            p: problem.p.clone(),
            a: problem.a.clone(),
            static_reg_enable,
            static_reg_eps,
        }
    }

    pub fn layout(&self) -> &KktLayout {
        &self.layout
    }

    /// Rebuilds the KKT matrix's value set from the current cone scalings.
    /// The set of `(row, col)` pairs emitted is the same on every call
    /// (diagonal entries are always present, even when a contribution is
    /// momentarily zero), so the nonzero pattern handed to the LDLᵀ backend
    /// never changes across outer iterations.
    pub fn assemble(&self, cones: &[ConeKind]) -> SparseColMat<I, E> {
        use crate::cones::Cone;

        let n = self.layout.n;
        let dim = self.layout.dim();
        let mut triplets: Vec<Triplet<I, I, E>> = Vec::new();

        for col in 0..n {
            for idx in self.p.col_range(col) {
                let row = self.p.row_idx(idx);
                if row <= col {
                    triplets.push(Triplet::new(row, col, self.p.val(idx)));
                }
            }
        }
        for i in 0..n {
            let reg = if self.static_reg_enable { self.static_reg_eps } else { 0.0 };
            triplets.push(Triplet::new(i, i, reg));
        }

        let z_off = self.layout.z_offset();
        // `A` is stored column-major over its own `n` columns; its transpose
        // lands in the KKT's upper-triangular `(x, z)` block directly.
        for col in 0..n {
            for idx in self.a.col_range(col) {
                let row = self.a.row_idx(idx);
                triplets.push(Triplet::new(col, z_off + row, self.a.val(idx)));
            }
        }

        for (cone_idx, cone) in cones.iter().enumerate() {
            let (start, len) = self.layout.cone_ranges[cone_idx];
            let reg = if self.static_reg_enable { -self.static_reg_eps } else { 0.0 };

            if let ConeKind::PositiveSemidefinite(psd) = cone {
                let dense = psd.dense_block();
                for i in 0..len {
                    for j in i..len {
                        let row = z_off + start + i;
                        let col = z_off + start + j;
                        let mut v = -dense[(i, j)];
                        if i == j {
                            v += reg;
                        }
                        triplets.push(Triplet::new(row, col, v));
                    }
                }
                continue;
            }

            if let ConeKind::GeneralizedPower(power) = cone {
                let dense = power.dense_block();
                for i in 0..len {
                    for j in i..len {
                        let row = z_off + start + i;
                        let col = z_off + start + j;
                        let mut v = -dense[(i, j)];
                        if i == j {
                            v += reg;
                        }
                        triplets.push(Triplet::new(row, col, v));
                    }
                }
                continue;
            }

            let mut diag = vec![0.0; len];
            cone.get_hs_block(&mut diag);
            for i in 0..len {
                triplets.push(Triplet::new(z_off + start + i, z_off + start + i, -diag[i] + reg));
            }
        }

        let aux_off = self.layout.aux_offset();
        for &(cone_idx, c0, c1) in &self.layout.soc_aux {
            if let ConeKind::SecondOrder(soc) = &cones[cone_idx] {
                let (start, len) = self.layout.cone_ranges[cone_idx];
                let (u, _v, sign1, sign2) = soc.sparse_expansion();
                let reg0 = if self.static_reg_enable { self.static_reg_eps * sign1 } else { 0.0 };
                let reg1 = if self.static_reg_enable { self.static_reg_eps * sign2 } else { 0.0 };
                triplets.push(Triplet::new(aux_off + c0, aux_off + c0, sign1 + reg0));
                triplets.push(Triplet::new(aux_off + c1, aux_off + c1, sign2 + reg1));
                for k in 0..len {
                    triplets.push(Triplet::new(z_off + start + k, aux_off + c0, u[k]));
                }
            }
        }

        SparseColMat::try_new_from_triplets(dim, dim, &triplets)
            .expect("KKT triplet list is well-formed by construction")
    }

    /// `y <- K x` using the *unregularized* system (`P`, `A`, raw cone `Hs`
    /// blocks and SOC borders), for iterative refinement's exact residual.
    pub fn mul_unregularized(&self, cones: &[ConeKind], x: &[E], y: &mut [E]) {
        use crate::cones::Cone;

        y.fill(0.0);
        let n = self.layout.n;
        let z_off = self.layout.z_offset();
        let aux_off = self.layout.aux_offset();

        for col in 0..n {
            for idx in self.p.col_range(col) {
                let row = self.p.row_idx(idx);
                let v = self.p.val(idx);
                y[row] += v * x[col];
                if row != col {
                    y[col] += v * x[row];
                }
            }
        }

        for col in 0..n {
            for idx in self.a.col_range(col) {
                let row = self.a.row_idx(idx);
                let v = self.a.val(idx);
                y[col] += v * x[z_off + row];
                y[z_off + row] += v * x[col];
            }
        }

        for (cone_idx, cone) in cones.iter().enumerate() {
            let (start, len) = self.layout.cone_ranges[cone_idx];
            let xs = &x[z_off + start..z_off + start + len];
            let mut hx = vec![0.0; len];
            cone.mul_hs(xs, &mut hx);
            for i in 0..len {
                y[z_off + start + i] -= hx[i];
            }
        }

        for &(cone_idx, c0, c1) in &self.layout.soc_aux {
            if let ConeKind::SecondOrder(soc) = &cones[cone_idx] {
                let (start, len) = self.layout.cone_ranges[cone_idx];
                let (u, _v, sign1, sign2) = soc.sparse_expansion();
                let xc0 = x[aux_off + c0];
                for k in 0..len {
                    y[z_off + start + k] += u[k] * xc0;
                }
                let ux: E = (0..len).map(|k| u[k] * x[z_off + start + k]).sum();
                y[aux_off + c0] += sign1 * xc0 + ux;
                y[aux_off + c1] += sign2 * x[aux_off + c1];
            }
        }
    }

    pub fn dsigns(&self) -> &[E] {
        &self.layout.dsigns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cones::build_cones;
    use crate::problem::ConeSpec;
    use faer::sparse::Triplet;

    fn triplet_problem() -> ProblemData {
        let p = SparseColMat::try_new_from_triplets(2, 2, &[Triplet::new(0, 0, 1.0), Triplet::new(1, 1, 1.0)]).unwrap();
        let a = SparseColMat::try_new_from_triplets(
            2,
            2,
            &[Triplet::new(0, 0, -1.0), Triplet::new(1, 1, -1.0)],
        )
        .unwrap();
        ProblemData {
            p,
            q: vec![1.0, 1.0],
            a,
            b: vec![0.0, 0.0],
            cones: vec![ConeSpec::NonNegative { dim: 2 }],
        }
    }

    #[test]
    fn assemble_is_idempotent_under_unchanged_scaling() {
        let problem = triplet_problem();
        let mut cones = build_cones(&problem.cones);
        {
            use crate::cones::Cone;
            let mut offset = 0;
            for cone in &mut cones {
                let len = cone.dim();
                cone.update_scaling(&vec![1.0; len], &vec![1.0; len], 1.0);
                offset += len;
            }
            let _ = offset;
        }
        let assembler = KktAssembler::new(&problem, true, 1e-8);

        let first = assembler.assemble(&cones);
        let second = assembler.assemble(&cones);

        let dim = assembler.layout().dim();
        for col in 0..dim {
            let firsts: Vec<(I, E)> = first.col_range(col).map(|i| (first.row_idx(i), first.val(i))).collect();
            let seconds: Vec<(I, E)> = second.col_range(col).map(|i| (second.row_idx(i), second.val(i))).collect();
            assert_eq!(firsts, seconds);
        }
    }
}
