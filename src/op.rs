//! Operator nodes: how a variable was produced and how to push a gradient back through it.

use std::fmt::Display;

use crate::{Scalar, Variable};

/// An elementary function of one variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryFn {
    Sin,
    Asin,
    Sinh,
    Asinh,
    Cos,
    Acos,
    Cosh,
    Acosh,
    Tan,
    Atan,
    Tanh,
    Atanh,
    Exp,
    Log,
}

impl UnaryFn {
    pub fn name(self) -> &'static str {
        use UnaryFn::*;
        match self {
            Sin => "sin",
            Asin => "asin",
            Sinh => "sinh",
            Asinh => "asinh",
            Cos => "cos",
            Acos => "acos",
            Cosh => "cosh",
            Acosh => "acosh",
            Tan => "tan",
            Atan => "atan",
            Tanh => "tanh",
            Atanh => "atanh",
            Exp => "exp",
            Log => "log",
        }
    }

    pub fn eval(self, x: f64) -> f64 {
        use UnaryFn::*;
        match self {
            Sin => x.sin(),
            Asin => x.asin(),
            Sinh => x.sinh(),
            Asinh => x.asinh(),
            Cos => x.cos(),
            Acos => x.acos(),
            Cosh => x.cosh(),
            Acosh => x.acosh(),
            Tan => x.tan(),
            Atan => x.atan(),
            Tanh => x.tanh(),
            Atanh => x.atanh(),
            Exp => x.exp(),
            Log => x.ln(),
        }
    }

    /// Gradient flowing into the argument `x` given the upstream `grad`.
    fn backward(self, x: Scalar, grad: Scalar) -> Scalar {
        use UnaryFn::*;
        match self {
            Sin => grad * x.cos(),
            Asin => grad / (1. - x.powf(2.)).sqrt(),
            Sinh => grad * x.cosh(),
            Asinh => grad / (1. + x.powf(2.)).sqrt(),
            Cos => -grad * x.sin(),
            Acos => -grad / (1. - x.powf(2.)).sqrt(),
            Cosh => grad * x.sinh(),
            Acosh => grad / (x.powf(2.) - 1.).sqrt(),
            Tan => grad / x.cos().powf(2.),
            Atan => grad / (1. + x.powf(2.)),
            Tanh => grad * (1. - x.tanh().powf(2.)),
            Atanh => grad / (1. - x.powf(2.)),
            Exp => grad * x.exp(),
            Log => grad / x,
        }
    }
}

/// Tag naming the operation of an [`Op`], for consumers that only inspect the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Identity,
    Add,
    Neg,
    Abs,
    Mul,
    Div,
    Pow,
    Unary(UnaryFn),
}

impl OpKind {
    pub fn name(self) -> &'static str {
        use OpKind::*;
        match self {
            Identity => "identity",
            Add => "add",
            Neg => "neg",
            Abs => "abs",
            Mul => "mul",
            Div => "div",
            Pow => "pow",
            Unary(f) => f.name(),
        }
    }
}

impl Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The producer of a variable, holding the operands it consumed in order.
///
/// `Identity` has no operands and marks a leaf. Operands are fixed when the node is
/// built and never change afterwards.
#[derive(Clone, Debug)]
pub enum Op {
    Identity,
    Add(Variable, Variable),
    Neg(Variable),
    Abs(Variable),
    Mul(Variable, Variable),
    Div(Variable, Variable),
    Pow(Variable, Variable),
    Unary(UnaryFn, Variable),
}

impl Op {
    pub fn kind(&self) -> OpKind {
        use Op::*;
        match self {
            Identity => OpKind::Identity,
            Add(..) => OpKind::Add,
            Neg(_) => OpKind::Neg,
            Abs(_) => OpKind::Abs,
            Mul(..) => OpKind::Mul,
            Div(..) => OpKind::Div,
            Pow(..) => OpKind::Pow,
            Unary(f, _) => OpKind::Unary(*f),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Op::Identity)
    }

    /// Operands in the order they were given.
    pub fn operands(&self) -> impl Iterator<Item = &Variable> + '_ {
        use Op::*;
        let pair = match self {
            Identity => [None, None],
            Neg(x) | Abs(x) | Unary(_, x) => [Some(x), None],
            Add(x, y) | Mul(x, y) | Div(x, y) | Pow(x, y) => [Some(x), Some(y)],
        };
        pair.into_iter().flatten()
    }

    /// Moves the operands out, leaving `Identity` behind.
    pub(crate) fn take_operands(&mut self) -> impl Iterator<Item = Variable> {
        use Op::*;
        let pair = match std::mem::replace(self, Identity) {
            Identity => [None, None],
            Neg(x) | Abs(x) | Unary(_, x) => [Some(x), None],
            Add(x, y) | Mul(x, y) | Div(x, y) | Pow(x, y) => [Some(x), Some(y)],
        };
        pair.into_iter().flatten()
    }

    pub fn arity(&self) -> usize {
        self.operands().count()
    }

    /// Forward value computed from the operands' data.
    pub(crate) fn eval(&self) -> f64 {
        use Op::*;
        match self {
            Identity => unreachable!("identity has no operands to evaluate"),
            Add(x, y) => x.data() + y.data(),
            Neg(x) => -x.data(),
            Abs(x) => x.data().abs(),
            Mul(x, y) => x.data() * y.data(),
            Div(x, y) => x.data() / y.data(),
            Pow(x, y) => x.data().powf(y.data()),
            Unary(f, x) => f.eval(x.data()),
        }
    }

    /// Computes each operand's share of `grad` and hands it to `emit`.
    ///
    /// With `build_graph` the operands enter the formulas as variables, so every
    /// contribution is itself a differentiable graph. `Div` and `Pow` skip the work for
    /// operands that do not require grad; the other operators always emit.
    pub(crate) fn backward(
        &self,
        grad: &Scalar,
        build_graph: bool,
        emit: &mut dyn FnMut(&Variable, Scalar),
    ) {
        use Op::*;
        let val = |v: &Variable| v.as_scalar(build_graph);
        match self {
            Identity => (),
            Add(x, y) => {
                emit(x, grad.clone());
                emit(y, grad.clone());
            }
            Neg(x) => emit(x, -grad.clone()),
            Abs(x) => {
                let sign = if x.data() < 0. { -1. } else { 1. };
                emit(x, grad.clone() * sign);
            }
            Mul(x, y) => {
                emit(x, grad.clone() * val(y));
                emit(y, grad.clone() * val(x));
            }
            Div(x, y) => {
                if x.requires_grad() {
                    emit(x, grad.clone() / val(y));
                }
                if y.requires_grad() {
                    emit(y, -grad.clone() * val(x) / val(y).powf(2.));
                }
            }
            Pow(x, y) => {
                if x.requires_grad() {
                    emit(x, grad.clone() * val(y) * val(x).pow(val(y) - 1.));
                }
                if y.requires_grad() {
                    emit(y, grad.clone() * val(x).pow(val(y)) * val(x).ln());
                }
            }
            Unary(f, x) => emit(x, f.backward(val(x), grad.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const ALL: [UnaryFn; 14] = [
        UnaryFn::Sin,
        UnaryFn::Asin,
        UnaryFn::Sinh,
        UnaryFn::Asinh,
        UnaryFn::Cos,
        UnaryFn::Acos,
        UnaryFn::Cosh,
        UnaryFn::Acosh,
        UnaryFn::Tan,
        UnaryFn::Atan,
        UnaryFn::Tanh,
        UnaryFn::Atanh,
        UnaryFn::Exp,
        UnaryFn::Log,
    ];

    fn sample_point(f: UnaryFn) -> f64 {
        match f {
            UnaryFn::Acosh => 1.7,
            UnaryFn::Log => 2.3,
            _ => 0.4,
        }
    }

    #[test]
    fn unary_derivatives_match_central_difference() {
        let h = 1e-6;
        for f in ALL {
            let x0 = sample_point(f);
            let expected = (f.eval(x0 + h) - f.eval(x0 - h)) / (2. * h);
            let x = Variable::new(x0);
            let y = x.apply(f);
            assert_abs_diff_eq!(y.data(), f.eval(x0));
            y.backward();
            assert_abs_diff_eq!(x.grad(), expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn kinds_and_operands() {
        let a = Variable::new(1.);
        let b = Variable::new(2.);
        let c = &a / &b;
        assert_eq!(c.op().kind(), OpKind::Div);
        assert_eq!(c.op().arity(), 2);
        let ids: Vec<_> = c.op().operands().map(Variable::id).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);

        let s = a.sin();
        assert_eq!(s.op().kind(), OpKind::Unary(UnaryFn::Sin));
        assert_eq!(s.op().name(), "sin");
        assert_eq!(s.op().arity(), 1);
        assert!(a.op().is_identity());
        assert_eq!(a.op().arity(), 0);
    }

    #[test]
    fn abs_sign_at_zero_is_positive() {
        let x = Variable::new(0.);
        let y = x.abs();
        y.backward();
        assert_eq!(x.grad(), 1.);

        let x = Variable::new(-2.);
        x.abs().backward();
        assert_eq!(x.grad(), -1.);
    }

    #[test]
    fn div_skips_constant_operands() {
        let x = Variable::new(6.);
        let y = Variable::constant(3.);
        let mut seen = vec![];
        let q = &x / &y;
        q.op()
            .backward(&Scalar::Value(1.), false, &mut |v: &Variable, g: Scalar| {
                seen.push((v.id(), g.value()))
            });
        assert_eq!(seen, vec![(x.id(), 1. / 3.)]);
    }

    #[test]
    fn mul_emits_for_constant_operands() {
        let x = Variable::new(6.);
        let y = Variable::constant(3.);
        let mut seen = vec![];
        let p = &x * &y;
        p.op()
            .backward(&Scalar::Value(1.), false, &mut |v: &Variable, g: Scalar| {
                seen.push((v.id(), g.value()))
            });
        assert_eq!(seen, vec![(x.id(), 3.), (y.id(), 6.)]);
    }

    #[test]
    fn graph_mode_contributions_are_variables() {
        let x = Variable::new(2.);
        let y = Variable::new(5.);
        let p = &x * &y;
        let mut seen = vec![];
        p.op().backward(
            &Scalar::Graph(Variable::constant(1.)),
            true,
            &mut |_: &Variable, g: Scalar| seen.push(g),
        );
        assert!(seen.iter().all(Scalar::is_graph));
        assert_eq!(seen[0].value(), 5.);
        assert_eq!(seen[1].value(), 2.);
    }
}
