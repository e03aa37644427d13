//! Derivative-free minimization of a 2-D objective, used to invert
//! pixel-to-position mappings that have no closed-form inverse.

use crate::Error;

// Standard Nelder-Mead coefficients: reflection, expansion,
// contraction, shrink
const ALPHA: f64 = 1.0;
const GAMMA: f64 = 2.0;
const RHO: f64 = 0.5;
const SIGMA: f64 = 0.5;

const MAX_ITERATIONS: usize = 400;

/// Minimize `f` over two variables with the Nelder-Mead simplex, starting
/// from `x0` with initial vertex offsets `step`. Terminates when the
/// simplex has collapsed below `xtol` in every coordinate and the
/// objective varies less than `ftol` across it, or after a fixed
/// iteration budget. Returns the best vertex seen.
///
/// Objective errors abort the search; the objective is expected to be
/// total over the region the simplex explores.
pub(crate) fn minimize<F>(
    mut f: F,
    x0: [f64; 2],
    step: [f64; 2],
    xtol: f64,
    ftol: f64,
) -> Result<[f64; 2], Error>
where
    F: FnMut([f64; 2]) -> Result<f64, Error>,
{
    let step = [nonzero(step[0]), nonzero(step[1])];
    let mut simplex = [
        x0,
        [x0[0] + step[0], x0[1]],
        [x0[0], x0[1] + step[1]],
    ];
    let mut values = [f(simplex[0])?, f(simplex[1])?, f(simplex[2])?];

    for _ in 0..MAX_ITERATIONS {
        order(&mut simplex, &mut values);
        if converged(&simplex, &values, xtol, ftol) {
            break;
        }

        // Centroid of the two best vertices
        let centroid = [
            (simplex[0][0] + simplex[1][0]) / 2.,
            (simplex[0][1] + simplex[1][1]) / 2.,
        ];

        let reflected = lerp(centroid, simplex[2], -ALPHA);
        let f_reflected = f(reflected)?;

        if f_reflected < values[0] {
            // Reflection went downhill; try going further
            let expanded = lerp(centroid, simplex[2], -GAMMA);
            let f_expanded = f(expanded)?;
            if f_expanded < f_reflected {
                simplex[2] = expanded;
                values[2] = f_expanded;
            } else {
                simplex[2] = reflected;
                values[2] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[1] {
            simplex[2] = reflected;
            values[2] = f_reflected;
            continue;
        }

        // Contract toward the better of the worst vertex and its reflection
        let contracted = if f_reflected < values[2] {
            lerp(centroid, simplex[2], -RHO)
        } else {
            lerp(centroid, simplex[2], RHO)
        };
        let f_contracted = f(contracted)?;
        if f_contracted < values[2].min(f_reflected) {
            simplex[2] = contracted;
            values[2] = f_contracted;
            continue;
        }

        // Shrink everything toward the best vertex
        for i in 1..3 {
            simplex[i] = lerp(simplex[0], simplex[i], SIGMA);
            values[i] = f(simplex[i])?;
        }
    }

    order(&mut simplex, &mut values);
    Ok(simplex[0])
}

fn nonzero(step: f64) -> f64 {
    if step.abs() < 1e-9 { 0.00025 } else { step }
}

fn order(simplex: &mut [[f64; 2]; 3], values: &mut [f64; 3]) {
    // Three elements; a hand-rolled insertion sort keeps the pairs together
    for i in 1..3 {
        let mut j = i;
        while j > 0 && values[j] < values[j - 1] {
            values.swap(j, j - 1);
            simplex.swap(j, j - 1);
            j -= 1;
        }
    }
}

fn converged(simplex: &[[f64; 2]; 3], values: &[f64; 3], xtol: f64, ftol: f64) -> bool {
    let spread = |axis: usize| {
        (simplex[1][axis] - simplex[0][axis])
            .abs()
            .max((simplex[2][axis] - simplex[0][axis]).abs())
    };
    spread(0) < xtol && spread(1) < xtol && (values[2] - values[0]).abs() < ftol
}

/// The point `anchor + t · (target − anchor)`; negative `t` reflects
/// `target` through `anchor`
fn lerp(anchor: [f64; 2], target: [f64; 2], t: f64) -> [f64; 2] {
    [
        anchor[0] + t * (target[0] - anchor[0]),
        anchor[1] + t * (target[1] - anchor[1]),
    ]
}

// ----- T E S T S ---------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_bowl() -> Result<(), Error> {
        let f = |u: [f64; 2]| Ok((u[0] - 3.).powi(2) + 2. * (u[1] + 1.).powi(2));
        let best = minimize(f, [0., 0.], [1., 1.], 1e-6, 1e-12)?;
        assert!((best[0] - 3.).abs() < 1e-4);
        assert!((best[1] + 1.).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn rosenbrock_valley() -> Result<(), Error> {
        let f = |u: [f64; 2]| {
            Ok((1. - u[0]).powi(2) + 100. * (u[1] - u[0] * u[0]).powi(2))
        };
        let best = minimize(f, [-1.2, 1.], [0.5, 0.5], 1e-8, 1e-12)?;
        assert!((best[0] - 1.).abs() < 1e-3);
        assert!((best[1] - 1.).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn objective_errors_propagate() {
        let f = |_u: [f64; 2]| -> Result<f64, Error> {
            Err(Error::Degenerate("synthetic"))
        };
        assert!(minimize(f, [0., 0.], [1., 1.], 1e-6, 1e-6).is_err());
    }
}
