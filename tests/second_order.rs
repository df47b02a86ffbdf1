use approx::assert_abs_diff_eq;
use scalargrad::{no_grad, BackwardOptions, Variable};

#[test]
fn cube() {
    for x0 in [-1.5, 0.5, 2.] {
        let x = Variable::new(x0);
        let y = x.pow(3);
        y.backward_graph();
        let dy = x.grad_variable();
        assert_abs_diff_eq!(dy.data(), 3. * x0 * x0, epsilon = 1e-12);

        x.zero_grad();
        dy.backward();
        assert_abs_diff_eq!(x.grad(), 6. * x0, epsilon = 1e-12);
    }
}

#[test]
fn third_derivative_of_exp_sin() {
    let x0 = 0.8f64;
    let x = Variable::new(x0);
    let y = x.sin().exp();

    y.backward_graph();
    let d1 = x.grad_variable();
    x.zero_grad();
    d1.backward_graph();
    let d2 = x.grad_variable();
    x.zero_grad();
    d2.backward();

    let (s, c) = x0.sin_cos();
    let e = s.exp();
    assert_abs_diff_eq!(d1.data(), c * e, epsilon = 1e-12);
    assert_abs_diff_eq!(d2.data(), (c * c - s) * e, epsilon = 1e-12);
    assert_abs_diff_eq!(x.grad(), (c * c * c - 3. * s * c - c) * e, epsilon = 1e-12);
}

#[test]
fn mixed_partial() {
    let x = Variable::new(2.);
    let y = Variable::new(3.);
    let f = &x * &x * &y;

    f.backward_graph();
    let dfdx = x.grad_variable();
    assert_eq!(dfdx.data(), 2. * 2. * 3.);

    x.zero_grad();
    y.zero_grad();
    dfdx.backward();
    // d/dy (2xy) = 2x
    assert_eq!(y.grad(), 4.);
    assert_eq!(x.grad(), 6.);
}

#[test]
fn supplied_graph_seed() {
    let x = Variable::new(1.5);
    let w = Variable::new(2.);
    let y = x.exp();
    y.backward_with(BackwardOptions::new().grad(&w).build_graph(true));
    let dy = x.grad_variable();
    assert_abs_diff_eq!(dy.data(), 2. * 1.5f64.exp(), epsilon = 1e-12);

    dy.backward();
    assert_abs_diff_eq!(w.grad(), 1.5f64.exp(), epsilon = 1e-12);
}

#[test]
fn no_graph_is_built_while_disabled() {
    let x = Variable::new(2.);
    let y = x.pow(2);
    no_grad(|| y.backward_graph());
    assert_eq!(x.grad(), 0.);
    assert!(!x.grad_scalar().is_graph());
}
