//! Dependency graph in diamond shape. It uses the same value twice, so the derivative should add up.

use scalargrad::{BackwardOptions, Traversal};
use scalargrad_macro::scalargrad;

fn main() {
    env_logger::init();

    scalargrad! {{
        let a = 1.;
        let a2 = -a;
        let b = 3.;
        let c = 5.;
        let ab = a2 + b;
        let ac = a2 + c;
        let abac = ab + ac;
    }}

    abac.backward();
    println!("abac: {}", abac.grad());
    println!("a: {}", a.grad());
    println!("b: {}", b.grad());
    println!("c: {}", c.grad());

    abac.zero_grad();
    abac.backward_with(BackwardOptions::new().traversal(Traversal::Topological));
    println!("a (topological): {}", a.grad());

    abac.dot(&mut std::io::stdout()).unwrap();
}
