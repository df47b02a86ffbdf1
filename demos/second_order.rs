use scalargrad::Variable;

struct Model {
    x: Variable,
    y: Variable,
}

/// y = x^3 - 2x
fn model(x: f64) -> Model {
    let x = Variable::new(x);
    let y = x.pow(3) - &x * 2.;
    Model { x, y }
}

fn main() {
    let Model { x, y } = model(1.5);
    y.backward_graph();
    let dy = x.grad_variable();
    println!("x: {x}, y: {y}, dy/dx: {dy}");

    x.zero_grad();
    dy.backward();
    println!("d2y/dx2: {}", x.grad());
}
