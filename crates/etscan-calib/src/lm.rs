//! Dense Levenberg–Marquardt for small parameter vectors.

use nalgebra::{DMatrix, DVector};

/// Residuals and Jacobian of a nonlinear least-squares problem.
pub trait LeastSquaresProblem {
    /// Residual vector at `params`.
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;

    /// Jacobian of the residuals at `params`, shape `residuals x params`.
    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64>;
}

#[derive(Clone, Copy, Debug)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Initial damping factor.
    pub lambda: f64,
    /// Stop when the squared-residual improvement falls below this.
    pub cost_tolerance: f64,
    /// Stop when the step norm falls below this.
    pub step_tolerance: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            lambda: 1e-3,
            cost_tolerance: 1e-12,
            step_tolerance: 1e-12,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LmError {
    #[error("problem has fewer residuals ({residuals}) than parameters ({params})")]
    UnderDetermined { residuals: usize, params: usize },

    #[error("normal equations are singular")]
    Singular,
}

/// Minimize `||residuals(p)||^2` starting from `initial`.
///
/// Classic damped normal-equations update: solve
/// `(J^T J + lambda * diag(J^T J)) dp = -J^T r`, accept the step when the
/// cost decreases, otherwise raise the damping and retry.
pub fn solve(
    problem: &impl LeastSquaresProblem,
    initial: DVector<f64>,
    options: &LmOptions,
) -> Result<DVector<f64>, LmError> {
    let mut params = initial;
    let mut residuals = problem.residuals(&params);
    if residuals.len() < params.len() {
        return Err(LmError::UnderDetermined {
            residuals: residuals.len(),
            params: params.len(),
        });
    }
    let mut cost = residuals.norm_squared();
    let mut lambda = options.lambda;

    for iteration in 0..options.max_iterations {
        let jacobian = problem.jacobian(&params);
        let jtj = jacobian.transpose() * &jacobian;
        let gradient = jacobian.transpose() * &residuals;

        let mut stepped = false;
        // Inner damping loop: grow lambda until a step improves the cost.
        for _ in 0..32 {
            let mut damped = jtj.clone();
            for i in 0..damped.nrows() {
                let d = jtj[(i, i)];
                damped[(i, i)] = d + lambda * d.max(1e-12);
            }
            let rhs = -gradient.clone();
            let step = match damped.lu().solve(&rhs) {
                Some(s) => s,
                None => return Err(LmError::Singular),
            };

            let candidate = &params + &step;
            let candidate_residuals = problem.residuals(&candidate);
            let candidate_cost = candidate_residuals.norm_squared();
            if candidate_cost < cost {
                let improvement = cost - candidate_cost;
                let step_norm = step.norm();
                params = candidate;
                residuals = candidate_residuals;
                cost = candidate_cost;
                lambda = (lambda * 0.1).max(1e-12);
                stepped = true;
                if improvement < options.cost_tolerance || step_norm < options.step_tolerance {
                    log::debug!("lm converged after {} iterations, cost {cost:.3e}", iteration + 1);
                    return Ok(params);
                }
                break;
            }
            lambda *= 10.0;
        }

        if !stepped {
            // Damping exhausted: already at a (local) minimum.
            break;
        }
    }

    log::debug!("lm stopped at cost {cost:.3e}");
    Ok(params)
}
