use std::{fmt, str::FromStr};

use ndgrad_tensor::{Tensor, TensorAllocator};

use crate::{
    error::TensorOpsError,
    kernel::{map_into, WriteMode},
};

/// Elementwise unary operations.
///
/// Every operation has a forward evaluation and a local derivative with respect to
/// its input. `param` is only read by [`UnaryOp::LeakyRelu`], where it is the slope
/// of the negative half.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Sine.
    Sin,
    /// Cosine.
    Cos,
    /// Tangent.
    Tan,
    /// Arc sine.
    Asin,
    /// Arc cosine.
    Acos,
    /// Arc tangent.
    Atan,
    /// Hyperbolic sine.
    Sinh,
    /// Hyperbolic cosine.
    Cosh,
    /// Hyperbolic tangent.
    Tanh,
    /// Natural exponential.
    Exp,
    /// Natural logarithm.
    Log,
    /// Base 2 logarithm.
    Log2,
    /// Base 10 logarithm.
    Log10,
    /// Approximate inverse square root.
    InvSqrt,
    /// Square root.
    Sqrt,
    /// Round up.
    Ceil,
    /// Round down.
    Floor,
    /// Absolute value.
    Abs,
    /// Sign, 0 at 0.
    Sign,
    /// Negation.
    Negate,
    /// Identity.
    Identity,
    /// `1 / x`.
    Reciprocal,
    /// Rectified linear unit.
    Relu,
    /// Leaky rectified linear unit with slope `param` below zero.
    LeakyRelu,
    /// Binary step, 0 below zero and 1 otherwise.
    BinStep,
    /// Logistic sigmoid.
    Logistic,
}

/// Approximates `1 / sqrt(x)` with the bit-level trick and one Newton iteration.
///
/// Less precise than `1.0 / x.sqrt()`; relative error stays below 0.2%.
#[inline]
pub fn fast_inv_sqrt(x: f32) -> f32 {
    let half = 0.5 * x;
    let y = f32::from_bits(0x5f37_59df_u32.wrapping_sub(x.to_bits() >> 1));
    y * (1.5 - half * y * y)
}

#[inline]
fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[inline]
fn logistic(x: f32) -> f32 {
    1.0 / ((-x).exp() + 1.0)
}

impl UnaryOp {
    /// Every operation, in declaration order.
    pub const ALL: [UnaryOp; 26] = [
        UnaryOp::Sin,
        UnaryOp::Cos,
        UnaryOp::Tan,
        UnaryOp::Asin,
        UnaryOp::Acos,
        UnaryOp::Atan,
        UnaryOp::Sinh,
        UnaryOp::Cosh,
        UnaryOp::Tanh,
        UnaryOp::Exp,
        UnaryOp::Log,
        UnaryOp::Log2,
        UnaryOp::Log10,
        UnaryOp::InvSqrt,
        UnaryOp::Sqrt,
        UnaryOp::Ceil,
        UnaryOp::Floor,
        UnaryOp::Abs,
        UnaryOp::Sign,
        UnaryOp::Negate,
        UnaryOp::Identity,
        UnaryOp::Reciprocal,
        UnaryOp::Relu,
        UnaryOp::LeakyRelu,
        UnaryOp::BinStep,
        UnaryOp::Logistic,
    ];

    /// Evaluates the operation at `x`.
    pub fn eval(self, x: f32, param: f32) -> f32 {
        match self {
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tan => x.tan(),
            UnaryOp::Asin => x.asin(),
            UnaryOp::Acos => x.acos(),
            UnaryOp::Atan => x.atan(),
            UnaryOp::Sinh => x.sinh(),
            UnaryOp::Cosh => x.cosh(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Log2 => x.log2(),
            UnaryOp::Log10 => x.log10(),
            UnaryOp::InvSqrt => fast_inv_sqrt(x),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Ceil => x.ceil(),
            UnaryOp::Floor => x.floor(),
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sign => sign(x),
            UnaryOp::Negate => -x,
            UnaryOp::Identity => x,
            UnaryOp::Reciprocal => 1.0 / x,
            UnaryOp::Relu => {
                if x < 0.0 {
                    0.0
                } else {
                    x
                }
            }
            UnaryOp::LeakyRelu => {
                if x < 0.0 {
                    param * x
                } else {
                    x
                }
            }
            UnaryOp::BinStep => {
                if x < 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
            UnaryOp::Logistic => logistic(x),
        }
    }

    /// Evaluates the derivative of the operation at `x`.
    ///
    /// Piecewise constant operations have a zero derivative everywhere.
    pub fn derivative(self, x: f32, param: f32) -> f32 {
        match self {
            UnaryOp::Sin => x.cos(),
            UnaryOp::Cos => -x.sin(),
            UnaryOp::Tan => {
                let c = x.cos();
                1.0 / (c * c)
            }
            UnaryOp::Asin => 1.0 / (1.0 - x * x).sqrt(),
            UnaryOp::Acos => -1.0 / (1.0 - x * x).sqrt(),
            UnaryOp::Atan => 1.0 / (x * x + 1.0),
            UnaryOp::Sinh => x.cosh(),
            UnaryOp::Cosh => x.sinh(),
            UnaryOp::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => 1.0 / x,
            UnaryOp::Log2 => 1.0 / (x * std::f32::consts::LN_2),
            UnaryOp::Log10 => 1.0 / (x * std::f32::consts::LN_10),
            UnaryOp::InvSqrt => -0.5 / x.powf(1.5),
            UnaryOp::Sqrt => 0.5 / x.sqrt(),
            UnaryOp::Ceil | UnaryOp::Floor | UnaryOp::Sign | UnaryOp::BinStep => 0.0,
            UnaryOp::Abs => sign(x),
            UnaryOp::Negate => -1.0,
            UnaryOp::Identity => 1.0,
            UnaryOp::Reciprocal => -1.0 / (x * x),
            UnaryOp::Relu => {
                if x < 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
            UnaryOp::LeakyRelu => {
                if x < 0.0 {
                    param
                } else {
                    1.0
                }
            }
            UnaryOp::Logistic => {
                let s = logistic(x);
                s * (1.0 - s)
            }
        }
    }

    /// The name the operation is looked up by.
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Asin => "asin",
            UnaryOp::Acos => "acos",
            UnaryOp::Atan => "atan",
            UnaryOp::Sinh => "sinh",
            UnaryOp::Cosh => "cosh",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Log2 => "log2",
            UnaryOp::Log10 => "log10",
            UnaryOp::InvSqrt => "invsqrt",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Ceil => "ceil",
            UnaryOp::Floor => "floor",
            UnaryOp::Abs => "abs",
            UnaryOp::Sign => "sign",
            UnaryOp::Negate => "negate",
            UnaryOp::Identity => "identity",
            UnaryOp::Reciprocal => "reciprocal",
            UnaryOp::Relu => "relu",
            UnaryOp::LeakyRelu => "leaky_relu",
            UnaryOp::BinStep => "binstep",
            UnaryOp::Logistic => "logistic",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UnaryOp {
    type Err = TensorOpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnaryOp::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| TensorOpsError::UnknownOp(s.to_string()))
    }
}

/// Applies `op` to every element of `a` and writes the results into `res`.
///
/// `a` is broadcast to the shape of `res`.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `a` does not broadcast to `res`.
///
/// # Example
///
/// ```
/// use ndgrad_tensor::{Tensor, TensorContext};
/// use ndgrad_tensor_ops::{unary::{unary, UnaryOp}, WriteMode};
///
/// let ctx = TensorContext::default();
/// let a = Tensor::from_shape_vec(&ctx, &[3], vec![-2.0, 0.0, 3.0]).unwrap();
/// let mut res = Tensor::zeros(&ctx, &[3]).unwrap();
/// unary(&a, &mut res, UnaryOp::LeakyRelu, 0.1, WriteMode::Overwrite).unwrap();
/// assert_eq!(res.to_vec(), vec![-0.2, 0.0, 3.0]);
/// ```
pub fn unary<A: TensorAllocator>(
    a: &Tensor<A>,
    res: &mut Tensor<A>,
    op: UnaryOp,
    param: f32,
    mode: WriteMode,
) -> Result<(), TensorOpsError> {
    map_into(a, res, mode, |x| op.eval(x, param))
}

/// Writes the derivative of `op` at every element of `a` into `res`.
///
/// # Errors
///
/// Returns [`TensorOpsError::ShapeMismatch`] if `a` does not broadcast to `res`.
pub fn unary_df<A: TensorAllocator>(
    a: &Tensor<A>,
    res: &mut Tensor<A>,
    op: UnaryOp,
    param: f32,
    mode: WriteMode,
) -> Result<(), TensorOpsError> {
    map_into(a, res, mode, |x| op.derivative(x, param))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndgrad_tensor::TensorContext;

    #[test]
    fn test_names_round_trip() -> Result<(), TensorOpsError> {
        for op in UnaryOp::ALL {
            assert_eq!(op.to_string().parse::<UnaryOp>()?, op);
        }
        assert_eq!(
            "softmax".parse::<UnaryOp>(),
            Err(TensorOpsError::UnknownOp("softmax".to_string()))
        );
        Ok(())
    }

    #[test]
    fn test_fast_inv_sqrt() {
        for x in [0.25_f32, 1.0, 2.0, 16.0, 1000.0] {
            assert_relative_eq!(fast_inv_sqrt(x), 1.0 / x.sqrt(), max_relative = 2e-3);
        }
    }

    #[test]
    fn test_sign_and_steps() {
        assert_eq!(UnaryOp::Sign.eval(0.0, 0.0), 0.0);
        assert_eq!(UnaryOp::Sign.eval(-3.0, 0.0), -1.0);
        assert_eq!(UnaryOp::BinStep.eval(0.0, 0.0), 1.0);
        assert_eq!(UnaryOp::Relu.derivative(0.0, 0.0), 1.0);
        assert_eq!(UnaryOp::LeakyRelu.derivative(-1.0, 0.01), 0.01);
        assert_eq!(UnaryOp::Floor.derivative(1.5, 0.0), 0.0);
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let h = 1e-3_f32;
        let smooth = [
            UnaryOp::Sin,
            UnaryOp::Cos,
            UnaryOp::Tan,
            UnaryOp::Asin,
            UnaryOp::Acos,
            UnaryOp::Atan,
            UnaryOp::Sinh,
            UnaryOp::Cosh,
            UnaryOp::Tanh,
            UnaryOp::Exp,
            UnaryOp::Log,
            UnaryOp::Log2,
            UnaryOp::Log10,
            UnaryOp::Sqrt,
            UnaryOp::Reciprocal,
            UnaryOp::Logistic,
        ];
        for op in smooth {
            let x = 0.4_f32;
            let numeric = (op.eval(x + h, 0.0) - op.eval(x - h, 0.0)) / (2.0 * h);
            assert_relative_eq!(op.derivative(x, 0.0), numeric, max_relative = 1e-2);
        }
    }

    #[test]
    fn test_unary_broadcasts_to_result() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[2], vec![1.0, 4.0])?;
        let mut res = Tensor::zeros(&ctx, &[2, 2])?;
        unary(&a, &mut res, UnaryOp::Sqrt, 0.0, WriteMode::Overwrite)?;
        assert_eq!(res.to_vec(), vec![1.0, 2.0, 1.0, 2.0]);

        unary_df(&a, &mut res, UnaryOp::Sqrt, 0.0, WriteMode::Accumulate)?;
        assert_eq!(res.to_vec(), vec![1.5, 2.25, 1.5, 2.25]);
        Ok(())
    }

    #[test]
    fn test_unary_in_place_through_view() -> Result<(), TensorOpsError> {
        let ctx = TensorContext::default();
        let a = Tensor::from_shape_vec(&ctx, &[3], vec![-1.0, 2.0, -3.0])?;
        let mut alias = a.view()?;
        let src = a.view()?;
        unary(&src, &mut alias, UnaryOp::Abs, 0.0, WriteMode::Overwrite)?;
        assert_eq!(a.to_vec(), vec![1.0, 2.0, 3.0]);
        Ok(())
    }
}
