use crate::polevl::polevl;
use std::f64::consts::PI;

// Asymptotic expansion coefficients, highest order first.
const A: &[f64] = &[
    8.333_333_333_333_333E-2,
    -2.109_279_609_279_609_3E-2,
    7.575_757_575_757_576E-3,
    -4.166_666_666_666_667E-3,
    3.968_253_968_253_968E-3,
    -8.333_333_333_333_333E-3,
    8.333_333_333_333_333E-2,
];
const EUL: f64 = 0.577_215_664_901_532_9;

/// Digamma function, the logarithmic derivative of the gamma function.
///
/// Non-positive integers are poles and return `+inf`. Negative arguments go through the
/// reflection formula, positive integers up to 10 are summed exactly and everything else
/// is pushed above 10 by recurrence before applying the asymptotic series.
pub fn psi(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    } else if x == f64::NEG_INFINITY {
        return f64::NAN;
    }

    let mut x = x;
    let mut nz = 0.0;
    let negative = x <= 0.0;
    if negative {
        let q = x;
        let mut p = q.floor();
        if p == q {
            return f64::INFINITY;
        }
        // remove the zeros of tan(pi x) by subtracting the nearest integer
        nz = q - p;
        if nz != 0.5 {
            if nz > 0.5 {
                p += 1.0;
                nz = q - p;
            }
            nz = PI / (PI * nz).tan();
        } else {
            nz = 0.0;
        }
        x = 1.0 - x;
    }

    let y = if x <= 10.0 && x == x.floor() {
        let n = x as u32;
        (1..n).map(|i| 1.0 / i as f64).sum::<f64>() - EUL
    } else {
        let mut s = x;
        let mut w = 0.0;
        while s < 10.0 {
            w += 1.0 / s;
            s += 1.0;
        }
        let y = if s < 1.0e17 {
            let z = 1.0 / (s * s);
            z * polevl(z, A)
        } else {
            0.0
        };
        s.ln() - (0.5 / s) - y - w
    };

    if negative {
        y - nz
    } else {
        y
    }
}
