//! Reverse-mode propagation of gradients through the graph of [`Variable`]s.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::{grad_mode::is_grad_enabled, Scalar, Variable};

/// How the backward pass walks a graph with shared subexpressions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Traversal {
    /// Recurse into every operand edge independently. A value reachable through several
    /// paths is revisited once per path, so the cost grows with the number of paths.
    #[default]
    PerPath,
    /// Visit each value exactly once in reverse topological order, summing all incoming
    /// contributions before propagating further. Linear in the size of the graph.
    Topological,
}

/// Settings for [`Variable::backward_with`].
#[derive(Clone, Debug, Default)]
pub struct BackwardOptions {
    grad: Option<Scalar>,
    build_graph: bool,
    traversal: Traversal,
}

impl BackwardOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upstream gradient to seed the pass with. Defaults to 1.
    pub fn grad(mut self, grad: impl Into<Scalar>) -> Self {
        self.grad = Some(grad.into());
        self
    }

    /// Record the backward pass itself as a graph, so gradients can be differentiated again.
    pub fn build_graph(mut self, build_graph: bool) -> Self {
        self.build_graph = build_graph;
        self
    }

    pub fn traversal(mut self, traversal: Traversal) -> Self {
        self.traversal = traversal;
        self
    }
}

fn seed(build_graph: bool) -> Scalar {
    if build_graph {
        Scalar::Graph(Variable::constant(1.))
    } else {
        Scalar::Value(1.)
    }
}

impl Variable {
    /// Accumulates the gradient of this value into every value it depends on.
    pub fn backward(&self) {
        self.backward_with(BackwardOptions::new());
    }

    /// Like [`backward`](Self::backward), but the accumulated gradients are graphs that can
    /// themselves be differentiated.
    ///
    /// This value owns the recorded graphs; take them with
    /// [`grad_variable`](Self::grad_variable) while it is alive. [`zero_grad`](Self::zero_grad)
    /// on this value releases them.
    pub fn backward_graph(&self) {
        self.backward_with(BackwardOptions::new().build_graph(true));
    }

    pub fn backward_with(&self, options: BackwardOptions) {
        if !self.requires_grad() || !is_grad_enabled() {
            return;
        }
        let BackwardOptions {
            grad,
            build_graph,
            traversal,
        } = options;
        let grad = grad.unwrap_or_else(|| seed(build_graph));
        debug!(
            "backward from a{} ({traversal:?}, build_graph: {build_graph})",
            self.id()
        );
        let mut retained = vec![];
        let visits = match traversal {
            Traversal::PerPath => self.backprop_rec(grad, build_graph, &mut retained),
            Traversal::Topological => self.backprop_topo(grad, build_graph, &mut retained),
        };
        debug!(
            "backward done, {visits} visits, {} gradient graphs",
            retained.len()
        );
        // Gradient graphs point back into the graph, so the values they belong to only
        // hold them weakly and the root of the pass owns them.
        self.retain_graphs(retained);
    }

    fn backprop_rec(
        &self,
        grad: Scalar,
        build_graph: bool,
        retained: &mut Vec<Variable>,
    ) -> usize {
        if !self.requires_grad() || !is_grad_enabled() {
            return 0;
        }
        trace!("a{} ({}) += {grad}", self.id(), self.op().name());
        self.accumulate(grad.clone(), retained);
        let mut visits = 1;
        self.op().backward(
            &grad,
            build_graph,
            &mut |operand: &Variable, contribution: Scalar| {
                if operand.requires_grad() {
                    visits += operand.backprop_rec(contribution, build_graph, retained);
                }
            },
        );
        visits
    }

    fn backprop_topo(
        &self,
        grad: Scalar,
        build_graph: bool,
        retained: &mut Vec<Variable>,
    ) -> usize {
        let order = self.topological_order();
        let mut pending = HashMap::new();
        pending.insert(self.id(), grad);
        for node in &order {
            let Some(grad) = pending.remove(&node.id()) else {
                continue;
            };
            trace!("a{} ({}) += {grad}", node.id(), node.op().name());
            node.accumulate(grad.clone(), retained);
            node.op().backward(
                &grad,
                build_graph,
                &mut |operand: &Variable, contribution: Scalar| {
                    if operand.requires_grad() {
                        let sum = match pending.remove(&operand.id()) {
                            Some(prev) => prev + contribution,
                            None => contribution,
                        };
                        pending.insert(operand.id(), sum);
                    }
                },
            );
        }
        order.len()
    }

    /// Values requiring grad that are reachable from this one, every consumer ahead of
    /// its operands.
    fn topological_order(&self) -> Vec<Variable> {
        let mut order = vec![];
        let mut seen = HashSet::new();
        // Post-order DFS on an explicit stack; `true` marks a node whose operands are done.
        let mut stack = vec![(self.clone(), false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !seen.insert(node.id()) {
                continue;
            }
            let operands: Vec<_> = node
                .op()
                .operands()
                .filter(|operand| operand.requires_grad() && !seen.contains(&operand.id()))
                .cloned()
                .collect();
            stack.push((node, true));
            stack.extend(operands.into_iter().map(|operand| (operand, false)));
        }
        order.reverse();
        order
    }

    /// Resets the gradient of this value and of everything it depends on.
    pub fn zero_grad(&self) {
        if !self.requires_grad() || !is_grad_enabled() {
            return;
        }
        trace!("zero_grad a{}", self.id());
        self.reset_grad();
        for operand in self.op().operands() {
            operand.zero_grad();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grad_mode::no_grad;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn add_and_mul() {
        let a = Variable::new(2.);
        let b = Variable::new(-3.);
        let c = &a + &b;
        c.backward();
        assert_eq!(a.grad(), 1.);
        assert_eq!(b.grad(), 1.);
        assert_eq!(c.grad(), 1.);

        let a = Variable::new(2.);
        let b = Variable::new(-3.);
        let c = &a * &b;
        c.backward();
        assert_eq!(a.grad(), b.data());
        assert_eq!(b.grad(), a.data());
    }

    #[test]
    fn shared_operand_accumulates() {
        let a = Variable::new(5.);
        let c = &a + &a;
        c.backward();
        assert_eq!(a.grad(), 2.);
    }

    #[test]
    fn repeated_backward_accumulates() {
        let a = Variable::new(5.);
        let c = &a * 2.;
        c.backward();
        c.backward();
        assert_eq!(a.grad(), 4.);
        c.zero_grad();
        c.backward();
        assert_eq!(a.grad(), 2.);
    }

    #[test]
    fn polynomial() {
        let x = Variable::new(3.);
        let y = Variable::new(4.);
        let z = &x * &y + &x;
        assert_eq!(z.data(), 15.);
        z.backward();
        assert_eq!(x.grad(), 5.);
        assert_eq!(y.grad(), 3.);
    }

    #[test]
    fn power() {
        let base = Variable::new(2.);
        let exponent = Variable::new(3.);
        let p = base.pow(&exponent);
        assert_eq!(p.data(), 8.);
        p.backward();
        assert_relative_eq!(base.grad(), 12.);
        assert_relative_eq!(exponent.grad(), 8. * 2f64.ln());
        assert_abs_diff_eq!(exponent.grad(), 5.545, epsilon = 1e-3);
    }

    #[test]
    fn exp_log_round_trip() {
        let x = Variable::new(0.7);
        let y = x.exp().log();
        assert_abs_diff_eq!(y.data(), 0.7, epsilon = 1e-12);
        y.backward();
        assert_abs_diff_eq!(x.grad(), 1., epsilon = 1e-12);
    }

    #[test]
    fn subtraction_and_division() {
        let a = Variable::new(6.);
        let b = Variable::new(2.);
        let c = (&a - &b) / &b;
        assert_eq!(c.data(), 2.);
        c.backward();
        assert_eq!(a.grad(), 0.5);
        // d/db (a - b) / b = -1/b - (a - b)/b^2
        assert_eq!(b.grad(), -0.5 - 1.);
    }

    #[test]
    fn constants_are_left_alone() {
        let a = Variable::new(2.);
        let k = Variable::constant(10.);
        let c = &a * &k;
        c.backward();
        assert_eq!(a.grad(), 10.);
        assert_eq!(k.grad(), 0.);

        k.backward();
        assert_eq!(k.grad(), 0.);
    }

    #[test]
    fn seeded_gradient() {
        let a = Variable::new(2.);
        let c = a.sin();
        c.backward_with(BackwardOptions::new().grad(3.));
        assert_abs_diff_eq!(a.grad(), 3. * 2f64.cos());
        assert_eq!(c.grad(), 3.);
    }

    #[test]
    fn detached_inside_no_grad() {
        let a = Variable::new(1.);
        let b = Variable::new(2.);
        let c = no_grad(|| &a + &b);
        assert!(c.op().is_identity());
        c.backward();
        assert_eq!(a.grad(), 0.);
        assert_eq!(b.grad(), 0.);
        assert_eq!(c.grad(), 1.);

        let d = &a + &b;
        d.backward();
        assert_eq!(a.grad(), 1.);
    }

    #[test]
    fn backward_and_zero_grad_are_noops_while_disabled() {
        let a = Variable::new(1.);
        let c = &a * 4.;
        no_grad(|| c.backward());
        assert_eq!(a.grad(), 0.);

        c.backward();
        no_grad(|| c.zero_grad());
        assert_eq!(a.grad(), 4.);
    }

    #[test]
    fn zero_grad_is_idempotent() {
        let a = Variable::new(1.5);
        let b = Variable::new(-2.);
        let c = (&a * &b + &a).tanh();
        c.backward();
        assert_ne!(a.grad(), 0.);
        c.zero_grad();
        c.zero_grad();
        for v in [&a, &b, &c] {
            assert_eq!(v.grad(), 0.);
        }
    }

    /// A chain of diamonds, where each level doubles the number of paths.
    fn diamonds(x: &Variable, levels: usize) -> Variable {
        let mut y = x.clone();
        for _ in 0..levels {
            y = &y * 0.5 + &y * 0.5;
        }
        y
    }

    #[test]
    fn traversals_agree() {
        let x = Variable::new(1.3);
        let y = (diamonds(&x, 6) * &x).sin();
        y.backward();
        let per_path = x.grad();

        y.zero_grad();
        y.backward_with(BackwardOptions::new().traversal(Traversal::Topological));
        assert_relative_eq!(x.grad(), per_path, epsilon = 1e-12);
        assert_relative_eq!(x.grad(), (2. * 1.3) * (1.3f64 * 1.3).cos(), epsilon = 1e-12);
    }

    #[test]
    fn topological_visits_each_node_once() {
        let x = Variable::new(2.);
        let y = diamonds(&x, 10);
        assert_eq!(y.data(), 2.);
        y.backward_with(BackwardOptions::new().traversal(Traversal::Topological));
        assert_eq!(x.grad(), 1.);
        // x plus a product, a constant product and a sum per level, constants excluded.
        let order = y.topological_order();
        assert_eq!(order.len(), 1 + 10 * 3);
        assert!(order[0].ptr_eq(&y));
        assert!(order.last().unwrap().ptr_eq(&x));
    }

    #[test]
    fn topological_handles_deep_chains() {
        let x = Variable::new(1.);
        let mut y = x.clone();
        for _ in 0..20_000 {
            y = &y + 1.;
        }
        y.backward_with(BackwardOptions::new().traversal(Traversal::Topological));
        assert_eq!(y.data(), 20_001.);
        assert_eq!(x.grad(), 1.);
        assert_eq!(y.topological_order().len(), 20_001);
    }

    #[test]
    fn domain_errors_follow_ieee() {
        let x = Variable::new(-1.);
        let y = x.log();
        assert!(y.data().is_nan());
        y.backward();
        assert_eq!(x.grad(), -1.);

        let a = Variable::new(1.);
        let zero = Variable::new(0.);
        let q = &a / &zero;
        assert!(q.data().is_infinite());
        q.backward();
        assert!(a.grad().is_infinite());
        assert!(zero.grad().is_infinite() || zero.grad().is_nan());
    }

    #[test]
    fn second_derivative_of_cube() {
        let x = Variable::new(2.);
        let y = x.pow(3);
        y.backward_graph();
        let dy = x.grad_variable();
        assert_abs_diff_eq!(dy.data(), 12., epsilon = 1e-12);
        assert!(!dy.is_leaf());

        x.zero_grad();
        dy.backward();
        assert_abs_diff_eq!(x.grad(), 6. * 2., epsilon = 1e-12);
    }

    #[test]
    fn second_derivative_topological() {
        let x = Variable::new(0.5);
        let y = x.sin() * &x;
        y.backward_with(
            BackwardOptions::new()
                .build_graph(true)
                .traversal(Traversal::Topological),
        );
        let dy = x.grad_variable();
        assert_abs_diff_eq!(dy.data(), 0.5f64.cos() * 0.5 + 0.5f64.sin(), epsilon = 1e-12);

        x.zero_grad();
        dy.backward();
        // d2/dx2 x sin x = 2 cos x - x sin x
        assert_abs_diff_eq!(
            x.grad(),
            2. * 0.5f64.cos() - 0.5 * 0.5f64.sin(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn graph_mode_stores_graphs() {
        let x = Variable::new(1.);
        let y = &x + 1.;
        y.backward_graph();
        assert!(y.grad_scalar().is_graph());
        assert!(x.grad_scalar().is_graph());
        assert_eq!(x.grad(), 1.);
    }
}
