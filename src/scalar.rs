//! Numbers at the construction boundary and the scalars that flow through a backward pass.

use std::{
    any::{type_name, Any},
    fmt::Display,
    ops::{Add, Div, Mul, Neg, Sub},
};

use crate::{
    error::{Error, Result},
    Variable,
};

/// A primitive number a [`Variable`] can be built from.
///
/// Every integer and floating-point primitive is accepted and converted to `f64` once,
/// so the rest of the crate only ever sees a single numeric domain.
pub trait Number: Copy {
    fn to_f64(self) -> f64;
}

macro_rules! impl_number {
    ($($t:ty),*) => {
        $(
            impl Number for $t {
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_number!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

/// Reads a number out of a dynamically typed value, rejecting anything that is not
/// an integer or a float.
pub(crate) fn number_from_any<T: Any>(value: &T) -> Result<f64> {
    let any = value as &dyn Any;
    macro_rules! downcast {
        ($($t:ty),*) => {
            $(
                if let Some(v) = any.downcast_ref::<$t>() {
                    return Ok(v.to_f64());
                }
            )*
        };
    }
    downcast!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);
    Err(Error::UnsupportedType {
        type_name: type_name::<T>(),
    })
}

/// A gradient or operand in the backward pass.
///
/// In a first-order pass everything is a plain `Value`, so no nodes are allocated.
/// When the pass builds a graph, operands and upstream gradients are `Graph` variables and
/// every arithmetic step below records a new node, making the gradient itself differentiable.
/// Mixing the two promotes the plain side to a constant variable.
#[derive(Clone, Debug)]
pub enum Scalar {
    Value(f64),
    Graph(Variable),
}

impl Default for Scalar {
    fn default() -> Self {
        Self::Value(0.)
    }
}

impl Scalar {
    /// The numeric value, reading through to the data of a graph scalar.
    pub fn value(&self) -> f64 {
        match self {
            Self::Value(v) => *v,
            Self::Graph(v) => v.data(),
        }
    }

    pub fn is_graph(&self) -> bool {
        matches!(self, Self::Graph(_))
    }

    /// Turns this scalar into a variable; a plain value becomes a constant.
    pub fn into_variable(self) -> Variable {
        match self {
            Self::Value(v) => Variable::constant(v),
            Self::Graph(v) => v,
        }
    }

    fn unary(self, f: fn(f64) -> f64, g: fn(&Variable) -> Variable) -> Self {
        match self {
            Self::Value(v) => Self::Value(f(v)),
            Self::Graph(v) => Self::Graph(g(&v)),
        }
    }

    fn binary(
        self,
        rhs: Self,
        f: fn(f64, f64) -> f64,
        g: fn(&Variable, &Variable) -> Variable,
    ) -> Self {
        use Scalar::*;
        match (self, rhs) {
            (Value(lhs), Value(rhs)) => Value(f(lhs, rhs)),
            (lhs, rhs) => Graph(g(&lhs.into_variable(), &rhs.into_variable())),
        }
    }

    pub fn pow(self, rhs: impl Into<Scalar>) -> Self {
        self.binary(rhs.into(), f64::powf, |lhs: &Variable, rhs: &Variable| {
            lhs.pow(rhs)
        })
    }

    pub fn powf(self, rhs: f64) -> Self {
        self.pow(rhs)
    }

    pub fn sqrt(self) -> Self {
        self.unary(f64::sqrt, Variable::sqrt)
    }

    pub fn sin(self) -> Self {
        self.unary(f64::sin, Variable::sin)
    }

    pub fn cos(self) -> Self {
        self.unary(f64::cos, Variable::cos)
    }

    pub fn sinh(self) -> Self {
        self.unary(f64::sinh, Variable::sinh)
    }

    pub fn cosh(self) -> Self {
        self.unary(f64::cosh, Variable::cosh)
    }

    pub fn tanh(self) -> Self {
        self.unary(f64::tanh, Variable::tanh)
    }

    pub fn exp(self) -> Self {
        self.unary(f64::exp, Variable::exp)
    }

    pub fn ln(self) -> Self {
        self.unary(f64::ln, Variable::log)
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.value(), f)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Value(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Value(value.into())
    }
}

impl From<Variable> for Scalar {
    fn from(value: Variable) -> Self {
        Self::Graph(value)
    }
}

impl From<&Variable> for Scalar {
    fn from(value: &Variable) -> Self {
        Self::Graph(value.clone())
    }
}

macro_rules! impl_scalar_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait for Scalar {
            type Output = Scalar;
            fn $method(self, rhs: Scalar) -> Scalar {
                self.binary(
                    rhs,
                    |lhs: f64, rhs: f64| lhs $op rhs,
                    |lhs: &Variable, rhs: &Variable| lhs $op rhs,
                )
            }
        }

        impl $trait<f64> for Scalar {
            type Output = Scalar;
            fn $method(self, rhs: f64) -> Scalar {
                self $op Scalar::Value(rhs)
            }
        }

        impl $trait<Scalar> for f64 {
            type Output = Scalar;
            fn $method(self, rhs: Scalar) -> Scalar {
                Scalar::Value(self) $op rhs
            }
        }
    };
}

impl_scalar_op!(Add, add, +);
impl_scalar_op!(Sub, sub, -);
impl_scalar_op!(Mul, mul, *);
impl_scalar_op!(Div, div, /);

impl Neg for Scalar {
    type Output = Scalar;
    fn neg(self) -> Scalar {
        self.unary(|v: f64| -v, |v: &Variable| -v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_stay_plain() {
        let s = Scalar::Value(3.) * Scalar::Value(2.) - 1.;
        assert!(!s.is_graph());
        assert_eq!(s.value(), 5.);
    }

    #[test]
    fn mixing_promotes_to_graph() {
        let x = Variable::new(2.);
        let s = Scalar::from(&x) * 3.;
        assert!(s.is_graph());
        assert_eq!(s.value(), 6.);

        let s = 1. - Scalar::from(&x).powf(2.);
        assert_eq!(s.value(), -3.);
        let Scalar::Graph(v) = s else {
            panic!("expected a graph scalar");
        };
        v.backward();
        assert_eq!(x.grad(), -4.);
    }

    #[test]
    fn promoted_values_are_constants() {
        let v = Scalar::Value(1.5).into_variable();
        assert!(!v.requires_grad());
        assert!(v.is_leaf());
    }

    #[test]
    fn dynamic_numbers() {
        assert_eq!(number_from_any(&3u8).unwrap(), 3.);
        assert_eq!(number_from_any(&-2i64).unwrap(), -2.);
        assert_eq!(number_from_any(&0.5f32).unwrap(), 0.5);
        assert_eq!(
            number_from_any(&"1.0"),
            Err(Error::UnsupportedType {
                type_name: "&str"
            })
        );
    }
}
