//! # One-Dimensional Optimization
//!
//! Brent minimization (golden-section with parabolic interpolation) and a
//! gradient-ascent alternative for branch-length optimization. Both respect
//! an iteration cap: running out of iterations returns the best value found,
//! never an error.

/// 2 − φ, the golden-section step fraction
const GOLDEN_SECTION: f64 = 0.381_966_011_250_105_1;

/// Absolute floor added to the x tolerance
const ZEPS: f64 = 1e-10;

/// Minimize `f` on `[lower, upper]` to roughly `significant_digits` digits
/// of the argument, with at most `max_iterations` function evaluations
/// beyond the first. Returns `(argmin, min)`.
pub fn brent_minimize(
    mut f: impl FnMut(f64) -> f64,
    lower: f64,
    upper: f64,
    significant_digits: usize,
    max_iterations: usize,
) -> (f64, f64) {
    let tolerance = 10f64.powi(-(significant_digits as i32));
    let (mut a, mut b) = (lower, upper);
    let mut x = a + GOLDEN_SECTION * (b - a);
    let mut w = x;
    let mut v = x;
    let mut fx = f(x);
    let mut fw = fx;
    let mut fv = fx;
    // Step taken on the iteration before last, and the last step.
    let mut e = 0.0f64;
    let mut d = 0.0f64;

    for _ in 0..max_iterations {
        let midpoint = 0.5 * (a + b);
        let tol1 = tolerance * x.abs() + ZEPS;
        let tol2 = 2.0 * tol1;
        if (x - midpoint).abs() <= tol2 - 0.5 * (b - a) {
            break;
        }
        let mut use_golden = true;
        if e.abs() > tol1 {
            // Try a parabolic fit through x, v, w.
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let e_temp = e;
            e = d;
            if p.abs() < (0.5 * q * e_temp).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = if midpoint > x { tol1 } else { -tol1 };
                }
                use_golden = false;
            }
        }
        if use_golden {
            e = if x < midpoint { b - x } else { a - x };
            d = GOLDEN_SECTION * e;
        }
        let u = if d.abs() >= tol1 {
            x + d
        } else if d > 0.0 {
            x + tol1
        } else {
            x - tol1
        };
        let fu = f(u);
        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }
    (x, fx)
}

/// Maximize `f` by gradient ascent from `start`; `f` returns the value and
/// its derivative. Stops when the derivative is small relative to the value
/// or the iteration cap is reached. The argument is clamped to
/// `[min_x, max_x]`. Returns `(argmax, max)`.
pub fn gradient_ascent(
    mut f: impl FnMut(f64) -> (f64, f64),
    start: f64,
    relative_tolerance: f64,
    step_size: f64,
    min_x: f64,
    max_x: f64,
    max_iterations: usize,
) -> (f64, f64) {
    let mut x = start.clamp(min_x, max_x);
    let (mut value, mut derivative) = f(x);
    for _ in 0..max_iterations {
        if derivative.abs() < value.abs() * relative_tolerance {
            break;
        }
        x = (x + derivative * step_size).clamp(min_x, max_x);
        let (new_value, new_derivative) = f(x);
        value = new_value;
        derivative = new_derivative;
    }
    (x, value)
}
