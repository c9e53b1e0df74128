use super::{MathFn, arg};
use crate::{exception::RunResult, value::Value};

pub(super) fn call(f: MathFn, args: &[Value]) -> RunResult<Value> {
    let x = || arg(args, 0).to_number();
    let n = match f {
        MathFn::Abs => x().abs(),
        MathFn::Floor => x().floor(),
        MathFn::Ceil => x().ceil(),
        MathFn::Round => round(x()),
        MathFn::Trunc => x().trunc(),
        MathFn::Sign => {
            let v = x();
            if v.is_nan() || v == 0.0 { v } else { v.signum() }
        }
        MathFn::Sqrt => x().sqrt(),
        MathFn::Cbrt => x().cbrt(),
        MathFn::Pow => {
            let (base, exp) = (x(), arg(args, 1).to_number());
            if exp.is_nan() || (base.abs() == 1.0 && exp.is_infinite()) {
                f64::NAN
            } else {
                base.powf(exp)
            }
        }
        MathFn::Exp => x().exp(),
        MathFn::Log => x().ln(),
        MathFn::Log2 => x().log2(),
        MathFn::Log10 => x().log10(),
        MathFn::Sin => x().sin(),
        MathFn::Cos => x().cos(),
        MathFn::Tan => x().tan(),
        MathFn::Asin => x().asin(),
        MathFn::Acos => x().acos(),
        MathFn::Atan => x().atan(),
        MathFn::Atan2 => x().atan2(arg(args, 1).to_number()),
        MathFn::Min => fold(args, f64::INFINITY, f64::min),
        MathFn::Max => fold(args, f64::NEG_INFINITY, f64::max),
        MathFn::Hypot => args
            .iter()
            .map(|v| v.to_number().powi(2))
            .sum::<f64>()
            .sqrt(),
        MathFn::Random => rand::random::<f64>(),
    };
    Ok(Value::Number(n))
}

/// Rounds half up, towards positive infinity, as `Math.round` does.
fn round(v: f64) -> f64 {
    if !v.is_finite() || v.fract() == 0.0 {
        return v;
    }
    let floor = v.floor();
    if v - floor >= 0.5 { floor + 1.0 } else { floor }
}

/// `f64::min`/`max` ignore NaN, but `Math.min`/`max` propagate it.
fn fold(args: &[Value], init: f64, f: fn(f64, f64) -> f64) -> f64 {
    let mut acc = init;
    for v in args {
        let n = v.to_number();
        if n.is_nan() {
            return f64::NAN;
        }
        acc = f(acc, n);
    }
    acc
}
