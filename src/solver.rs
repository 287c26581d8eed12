//! Outer Mehrotra predictor-corrector loop over the homogeneous self-dual
//! embedding (C7): predictor step, centering parameter from its step length,
//! corrector step, then a damped step along the combined direction.

use problemo::Problem;

use crate::callback::{Callback, Callbacks, IterationState, NoOpCallback};
use crate::cones::{Cone, ConeKind, build_cones};
use crate::error::SolverError;
use crate::kkt::driver::KktDriver;
use crate::kkt::ldl::{LdlSolver, RefinementSettings};
use crate::problem::ProblemData;
use crate::residuals::Residuals;
use crate::terminators::Terminator;
use crate::variables::{Variables, step_length};
use crate::{E, Options, Status};

/// Primal-dual point recovered from the homogeneous embedding, together with
/// the status and iteration count the outer loop stopped at.
pub struct Solution {
    pub x: Vec<E>,
    /// Dual variable `y`; equal to the HSDE's `z`, dehomogenized by `τ`.
    pub y: Vec<E>,
    pub s: Vec<E>,
    pub status: Status,
    pub iterations: usize,
    pub residuals: Residuals,
    pub gap: E,
    pub time: std::time::Duration,
}

pub struct IpmSolver<S: LdlSolver> {
    problem: ProblemData,
    cones: Vec<ConeKind>,
    driver: KktDriver<S>,
    options: Options,
    callback: Box<dyn Callback>,
    terminator: Option<Box<dyn Terminator>>,
}

impl<S: LdlSolver> IpmSolver<S> {
    pub fn new(problem: ProblemData, options: Options) -> Result<Self, Problem> {
        problem.validate().map_err(|_| SolverError::ConeScalingFailed)?;

        let static_reg_enable = options.get_option::<bool>("static_regularization_enable").unwrap_or(true);
        let static_reg_eps = options.get_option::<f64>("static_regularization_eps").unwrap_or(1e-8);
        let refinement = RefinementSettings {
            enable: options.get_option::<bool>("iterative_refinement_enable").unwrap_or(true),
            reltol: options.get_option::<f64>("iterative_refinement_reltol").unwrap_or(1e-10),
            abstol: options.get_option::<f64>("iterative_refinement_abstol").unwrap_or(1e-12),
            max_iter: options.get_option::<usize>("iterative_refinement_max_iter").unwrap_or(10),
            stop_ratio: options.get_option::<f64>("iterative_refinement_stop_ratio").unwrap_or(2.0),
        };

        let cones = build_cones(&problem.cones);
        let driver = KktDriver::new(&problem, static_reg_enable, static_reg_eps, refinement);

        Ok(Self {
            problem,
            cones,
            driver,
            options,
            callback: Box::new(NoOpCallback {}),
            terminator: None,
        })
    }

    pub fn with_callback(mut self, callback: Callbacks) -> Self {
        self.callback = Callbacks::into_variant(callback, &self.options);
        self
    }

    pub fn with_terminator(mut self, terminator: Box<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    pub fn solve(&mut self) -> Result<Solution, Problem> {
        let n = self.problem.n();
        let m = self.problem.m();
        let total_degree: E = self.cones.iter().map(Cone::degree).sum();
        let backtrack = self.options.get_option::<f64>("linesearch_backtrack_step").unwrap_or(0.8);
        let min_step = self.options.get_option::<f64>("min_terminate_step_length").unwrap_or(1e-4);
        let eps_abs = self.options.get_option::<f64>("eps_abs").unwrap_or(1e-8);
        let eps_rel = self.options.get_option::<f64>("eps_rel").unwrap_or(1e-8);
        let eps_infeasible = self.options.get_option::<f64>("eps_infeasible").unwrap_or(1e-8);
        let max_iter = self.options.get_option::<usize>("max_iter").unwrap_or(200);
        let time_limit = self.options.get_option::<f64>("time_limit_secs").unwrap_or(f64::INFINITY);
        let verbose = self.options.get_option::<bool>("verbose").unwrap_or(false);

        if let Some(t) = self.terminator.as_mut() {
            t.initialize();
        }

        let mut vars = Variables::initialize(n, m, &self.cones);
        let start = std::time::Instant::now();

        for iter in 0..max_iter {
            let mu = vars.mu(total_degree);
            if mu <= 0.0 || !mu.is_finite() {
                return Ok(self.terminal(vars, Status::NumericalError, iter, start.elapsed()));
            }

            let mut offset = 0;
            for cone in &mut self.cones {
                let len = cone.dim();
                let ok = cone.update_scaling(&vars.s[offset..offset + len], &vars.z[offset..offset + len], mu);
                if !ok {
                    return Ok(self.terminal(vars, Status::NumericalError, iter, start.elapsed()));
                }
                offset += len;
            }
            if self.driver.refactorize(&self.problem, &self.cones, iter == 0).is_err() {
                return Ok(self.terminal(vars, Status::NumericalError, iter, start.elapsed()));
            }

            let (rx_vec, rz_vec, residuals) = Residuals::compute(&self.problem, &vars);

            let converged = residuals.rx_inf < eps_abs + eps_rel * (1.0 + vars.x.iter().map(|v| v * v).sum::<E>().sqrt())
                && residuals.rz_inf < eps_abs + eps_rel * (1.0 + vars.s.iter().map(|v| v * v).sum::<E>().sqrt())
                && residuals.gap.abs() < eps_abs + eps_rel * (residuals.qx.abs() + residuals.bz.abs() + 1.0);
            if converged {
                return Ok(self.terminal(vars, Status::Solved, iter, start.elapsed()));
            }

            // Certificates from the homogeneous embedding: a vanishing `τ`
            // alongside a non-vanishing `κ` and residual of the right sign
            // means the original problem has no feasible point of that kind.
            if vars.tau < 1e-12 * vars.kappa.max(1.0) {
                if residuals.bz < -eps_infeasible {
                    return Ok(self.terminal(vars, Status::PrimalInfeasible, iter, start.elapsed()));
                }
                if residuals.qx < -eps_infeasible {
                    return Ok(self.terminal(vars, Status::DualInfeasible, iter, start.elapsed()));
                }
            }

            // Affine (predictor) direction.
            let mut ds_affine = vec![0.0; m];
            let mut offset = 0;
            for cone in &self.cones {
                let len = cone.dim();
                cone.affine_ds(&vars.s[offset..offset + len], &mut ds_affine[offset..offset + len]);
                offset += len;
            }
            let dtau_kappa_affine = vars.tau * vars.kappa;

            let affine = match self.driver.solve_step(
                &self.problem,
                &self.cones,
                &rx_vec,
                &rz_vec,
                residuals.rtau,
                &vars.z,
                &ds_affine,
                dtau_kappa_affine,
                vars.tau,
                vars.kappa,
            ) {
                Ok(step) => step,
                Err(_) => return Ok(self.terminal(vars, Status::NumericalError, iter, start.elapsed())),
            };

            let alpha_affine = step_length(&vars, &affine, &self.cones, 1.0, backtrack);
            let mu_affine = {
                let mut trial = vars.clone();
                trial.apply_step(&affine, alpha_affine);
                trial.mu(total_degree)
            };
            let sigma = (mu_affine / mu).max(0.0).min(1.0).powi(3);

            // Combined (corrector) direction.
            let mut ds_combined = vec![0.0; m];
            let mut offset = 0;
            for cone in &self.cones {
                let len = cone.dim();
                cone.combined_ds_shift(
                    &affine.ds[offset..offset + len],
                    &affine.dz[offset..offset + len],
                    sigma * mu,
                    &mut ds_combined[offset..offset + len],
                );
                offset += len;
            }
            let dtau_kappa_combined = sigma * mu - affine.dtau * affine.dkappa;

            let combined = match self.driver.solve_step(
                &self.problem,
                &self.cones,
                &rx_vec,
                &rz_vec,
                residuals.rtau,
                &vars.z,
                &ds_combined,
                dtau_kappa_combined,
                vars.tau,
                vars.kappa,
            ) {
                Ok(step) => step,
                Err(_) => return Ok(self.terminal(vars, Status::NumericalError, iter, start.elapsed())),
            };

            let alpha = step_length(&vars, &combined, &self.cones, 0.99, backtrack);
            if alpha < min_step {
                return Ok(self.terminal(vars, Status::InsufficientProgress, iter, start.elapsed()));
            }
            vars.apply_step(&combined, alpha);

            self.callback.call(&IterationState {
                iteration: iter,
                alpha,
                vars: &vars,
                residuals: &residuals,
            });
            if verbose {
                println!("iter {iter}: alpha={alpha:.3e} mu={mu:.3e} gap={:.3e}", residuals.gap);
            }

            if let Some(t) = self.terminator.as_mut() {
                if let Some(status) = t.terminate() {
                    return Ok(self.terminal(vars, status, iter, start.elapsed()));
                }
            }
            if start.elapsed().as_secs_f64() > time_limit {
                return Ok(self.terminal(vars, Status::TimeLimit, iter, start.elapsed()));
            }
        }

        let (_, _, residuals) = Residuals::compute(&self.problem, &vars);
        let almost = residuals.rx_inf < 10.0 * (eps_abs + eps_rel) && residuals.rz_inf < 10.0 * (eps_abs + eps_rel);
        let status = if almost { Status::AlmostSolved } else { Status::MaxIters };
        Ok(self.terminal(vars, status, max_iter, start.elapsed()))
    }

    fn terminal(&self, vars: Variables, status: Status, iterations: usize, time: std::time::Duration) -> Solution {
        let (_, _, residuals) = Residuals::compute(&self.problem, &vars);
        let gap = residuals.gap;
        let tau = vars.tau.max(1e-12);
        Solution {
            x: vars.x.iter().map(|v| v / tau).collect(),
            y: vars.z.iter().map(|v| v / tau).collect(),
            s: vars.s.iter().map(|v| v / tau).collect(),
            status,
            iterations,
            residuals,
            gap,
            time,
        }
    }
}

/// `solver_new(P, q, A, b, cones, settings) -> Solver`, named to match this
/// core's consumer-facing interface.
pub fn solver_new<S: LdlSolver>(problem: ProblemData, settings: Options) -> Result<IpmSolver<S>, Problem> {
    IpmSolver::new(problem, settings)
}

/// `solve(Solver) -> Solution`.
pub fn solve<S: LdlSolver>(solver: &mut IpmSolver<S>) -> Result<Solution, Problem> {
    solver.solve()
}
