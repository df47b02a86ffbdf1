use std::{
    any::Any,
    cell::{Cell, RefCell},
    cmp::Ordering,
    fmt::{Debug, Display},
    ops::{Add, Div, Mul, Neg, Sub},
    rc::{Rc, Weak},
};

use log::trace;

use crate::{
    error::Result,
    grad_mode::is_grad_enabled,
    op::{Op, UnaryFn},
    scalar::{number_from_any, Number},
    Scalar,
};

struct VariablePayload {
    data: f64,
    grad: RefCell<Grad>,
    op: Op,
    requires_grad: bool,
    /// Set while a graph is being rendered so shared values are drawn once.
    visited: Cell<bool>,
    /// Gradient graphs recorded by backward passes started from this value.
    retained: RefCell<Vec<Variable>>,
}

/// Accumulated gradient.
///
/// A graph gradient usually refers back to the value it belongs to (the gradient of
/// `x * x` is `2 * x`), so the payload holds it weakly. The value the backward pass
/// started from owns it instead.
enum Grad {
    Value(f64),
    Graph {
        value: f64,
        node: Weak<VariablePayload>,
    },
}

impl Drop for VariablePayload {
    fn drop(&mut self) {
        // Unlink long chains iteratively instead of recursing once per level.
        let mut stack: Vec<Variable> = self.op.take_operands().collect();
        while let Some(Variable(rc)) = stack.pop() {
            if let Ok(mut payload) = Rc::try_unwrap(rc) {
                stack.extend(payload.op.take_operands());
            }
        }
    }
}

/// A scalar that records how it was computed, so gradients can flow back to its inputs.
///
/// Cloning is cheap and yields another handle to the same node; operators hold their
/// operands the same way, which is what lets one value feed many operations.
#[derive(Clone)]
pub struct Variable(Rc<VariablePayload>);

impl Variable {
    /// A leaf that takes part in differentiation.
    pub fn new(data: impl Number) -> Self {
        Self::with_requires_grad(data, true)
    }

    /// A leaf that gradients never flow into.
    pub fn constant(data: impl Number) -> Self {
        Self::with_requires_grad(data, false)
    }

    pub fn with_requires_grad(data: impl Number, requires_grad: bool) -> Self {
        Self::with_producer(data.to_f64(), None, requires_grad)
    }

    /// Builds a leaf from a dynamically typed value.
    ///
    /// An existing `Variable` is aliased rather than copied. Anything other than an
    /// integer or floating-point primitive is rejected.
    pub fn try_new<T: Any>(value: T) -> Result<Self> {
        if let Some(var) = (&value as &dyn Any).downcast_ref::<Variable>() {
            return Ok(var.clone());
        }
        let data = number_from_any(&value)?;
        Ok(Self::with_producer(data, None, true))
    }

    fn with_producer(data: f64, op: Option<Op>, requires_grad: bool) -> Self {
        let op = match op {
            Some(op) if is_grad_enabled() => op,
            Some(op) => {
                trace!("grad tracking disabled, detaching {} result", op.name());
                Op::Identity
            }
            None => Op::Identity,
        };
        Self(Rc::new(VariablePayload {
            data,
            grad: RefCell::new(Grad::Value(0.)),
            op,
            requires_grad,
            visited: Cell::new(false),
            retained: RefCell::new(vec![]),
        }))
    }

    pub(crate) fn from_op(op: Op) -> Self {
        let data = op.eval();
        Self::with_producer(data, Some(op), true)
    }

    /// Stable identity of the underlying node, valid while any handle is alive.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn data(&self) -> f64 {
        self.0.data
    }

    /// Numeric value of the accumulated gradient.
    pub fn grad(&self) -> f64 {
        match &*self.0.grad.borrow() {
            Grad::Value(value) | Grad::Graph { value, .. } => *value,
        }
    }

    /// The accumulated gradient as it is stored, a plain value or a graph.
    ///
    /// A graph gradient is only available while the value its backward pass started
    /// from is alive; after that its numeric value is returned.
    pub fn grad_scalar(&self) -> Scalar {
        match &*self.0.grad.borrow() {
            Grad::Value(value) => Scalar::Value(*value),
            Grad::Graph { value, node } => node
                .upgrade()
                .map_or(Scalar::Value(*value), |node| Scalar::Graph(Variable(node))),
        }
    }

    /// The accumulated gradient as a variable, to be differentiated again.
    ///
    /// After a graph-building backward pass this is the recorded gradient expression,
    /// as long as the value `backward` was called on is still alive. The returned handle
    /// keeps the expression alive on its own. A plain gradient comes back as a constant.
    pub fn grad_variable(&self) -> Variable {
        self.grad_scalar().into_variable()
    }

    pub fn requires_grad(&self) -> bool {
        self.0.requires_grad
    }

    /// The operator that produced this value.
    pub fn op(&self) -> &Op {
        &self.0.op
    }

    pub fn is_leaf(&self) -> bool {
        self.0.op.is_identity()
    }

    /// Adds `grad` to the stored gradient. A graph sum is pushed to `retained` for the
    /// caller to hand to the root of the pass.
    pub(crate) fn accumulate(&self, grad: Scalar, retained: &mut Vec<Variable>) {
        let stored = match self.grad_scalar() + grad {
            Scalar::Value(value) => Grad::Value(value),
            Scalar::Graph(node) => {
                let stored = Grad::Graph {
                    value: node.data(),
                    node: Rc::downgrade(&node.0),
                };
                retained.push(node);
                stored
            }
        };
        self.0.grad.replace(stored);
    }

    pub(crate) fn retain_graphs(&self, graphs: Vec<Variable>) {
        if !graphs.is_empty() {
            self.0.retained.borrow_mut().extend(graphs);
        }
    }

    pub(crate) fn reset_grad(&self) {
        self.0.grad.replace(Grad::Value(0.));
        drop(self.0.retained.take());
    }

    pub(crate) fn as_scalar(&self, build_graph: bool) -> Scalar {
        if build_graph {
            Scalar::Graph(self.clone())
        } else {
            Scalar::Value(self.data())
        }
    }

    /// Marks this value as rendered, returning the previous mark.
    pub(crate) fn set_visited(&self, visited: bool) -> bool {
        self.0.visited.replace(visited)
    }

    pub fn pos(&self) -> Self {
        self.clone()
    }

    pub fn conjugate(&self) -> Self {
        self.clone()
    }

    pub fn abs(&self) -> Self {
        Self::from_op(Op::Abs(self.clone()))
    }

    pub fn pow(&self, rhs: impl Into<Scalar>) -> Self {
        Self::from_op(Op::Pow(self.clone(), rhs.into().into_variable()))
    }

    pub fn sqrt(&self) -> Self {
        self.pow(0.5)
    }

    pub fn apply(&self, f: UnaryFn) -> Self {
        Self::from_op(Op::Unary(f, self.clone()))
    }

    pub fn sin(&self) -> Self {
        self.apply(UnaryFn::Sin)
    }

    pub fn asin(&self) -> Self {
        self.apply(UnaryFn::Asin)
    }

    pub fn sinh(&self) -> Self {
        self.apply(UnaryFn::Sinh)
    }

    pub fn asinh(&self) -> Self {
        self.apply(UnaryFn::Asinh)
    }

    pub fn cos(&self) -> Self {
        self.apply(UnaryFn::Cos)
    }

    pub fn acos(&self) -> Self {
        self.apply(UnaryFn::Acos)
    }

    pub fn cosh(&self) -> Self {
        self.apply(UnaryFn::Cosh)
    }

    pub fn acosh(&self) -> Self {
        self.apply(UnaryFn::Acosh)
    }

    pub fn tan(&self) -> Self {
        self.apply(UnaryFn::Tan)
    }

    pub fn atan(&self) -> Self {
        self.apply(UnaryFn::Atan)
    }

    pub fn tanh(&self) -> Self {
        self.apply(UnaryFn::Tanh)
    }

    pub fn atanh(&self) -> Self {
        self.apply(UnaryFn::Atanh)
    }

    pub fn exp(&self) -> Self {
        self.apply(UnaryFn::Exp)
    }

    /// Natural logarithm.
    pub fn log(&self) -> Self {
        self.apply(UnaryFn::Log)
    }
}

fn add_vars(lhs: &Variable, rhs: &Variable) -> Variable {
    Variable::from_op(Op::Add(lhs.clone(), rhs.clone()))
}

fn sub_vars(lhs: &Variable, rhs: &Variable) -> Variable {
    add_vars(lhs, &-rhs)
}

fn mul_vars(lhs: &Variable, rhs: &Variable) -> Variable {
    Variable::from_op(Op::Mul(lhs.clone(), rhs.clone()))
}

fn div_vars(lhs: &Variable, rhs: &Variable) -> Variable {
    Variable::from_op(Op::Div(lhs.clone(), rhs.clone()))
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $f:ident) => {
        impl $trait<&Variable> for &Variable {
            type Output = Variable;
            fn $method(self, rhs: &Variable) -> Variable {
                $f(self, rhs)
            }
        }

        impl $trait<Variable> for &Variable {
            type Output = Variable;
            fn $method(self, rhs: Variable) -> Variable {
                $f(self, &rhs)
            }
        }

        impl $trait<&Variable> for Variable {
            type Output = Variable;
            fn $method(self, rhs: &Variable) -> Variable {
                $f(&self, rhs)
            }
        }

        impl $trait<Variable> for Variable {
            type Output = Variable;
            fn $method(self, rhs: Variable) -> Variable {
                $f(&self, &rhs)
            }
        }

        impl_binary_op!(@number $trait, $method, $f, f64, i32);
    };

    (@number $trait:ident, $method:ident, $f:ident, $($t:ty),*) => {
        $(
            impl $trait<$t> for &Variable {
                type Output = Variable;
                fn $method(self, rhs: $t) -> Variable {
                    $f(self, &Variable::constant(rhs))
                }
            }

            impl $trait<$t> for Variable {
                type Output = Variable;
                fn $method(self, rhs: $t) -> Variable {
                    $f(&self, &Variable::constant(rhs))
                }
            }

            impl $trait<&Variable> for $t {
                type Output = Variable;
                fn $method(self, rhs: &Variable) -> Variable {
                    $f(&Variable::constant(self), rhs)
                }
            }

            impl $trait<Variable> for $t {
                type Output = Variable;
                fn $method(self, rhs: Variable) -> Variable {
                    $f(&Variable::constant(self), &rhs)
                }
            }
        )*
    };
}

impl_binary_op!(Add, add, add_vars);
impl_binary_op!(Sub, sub, sub_vars);
impl_binary_op!(Mul, mul, mul_vars);
impl_binary_op!(Div, div, div_vars);

impl Neg for &Variable {
    type Output = Variable;
    fn neg(self) -> Variable {
        Variable::from_op(Op::Neg(self.clone()))
    }
}

impl Neg for Variable {
    type Output = Variable;
    fn neg(self) -> Variable {
        -&self
    }
}

// Comparisons look at the data only and never touch gradients.

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.data().partial_cmp(&other.data())
    }
}

macro_rules! impl_number_cmp {
    ($($t:ty),*) => {
        $(
            impl PartialEq<$t> for Variable {
                fn eq(&self, other: &$t) -> bool {
                    self.data() == other.to_f64()
                }
            }

            impl PartialEq<Variable> for $t {
                fn eq(&self, other: &Variable) -> bool {
                    self.to_f64() == other.data()
                }
            }

            impl PartialOrd<$t> for Variable {
                fn partial_cmp(&self, other: &$t) -> Option<Ordering> {
                    self.data().partial_cmp(&other.to_f64())
                }
            }

            impl PartialOrd<Variable> for $t {
                fn partial_cmp(&self, other: &Variable) -> Option<Ordering> {
                    self.to_f64().partial_cmp(&other.data())
                }
            }
        )*
    };
}

impl_number_cmp!(f64, i32);

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.data(), f)
    }
}

impl Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("data", &self.data())
            .field("grad", &self.grad())
            .field("requires_grad", &self.requires_grad())
            .field("op", &self.op().kind())
            .finish()
    }
}

impl From<&Variable> for f64 {
    fn from(value: &Variable) -> Self {
        value.data()
    }
}

impl From<&Variable> for i64 {
    fn from(value: &Variable) -> Self {
        value.data() as i64
    }
}
