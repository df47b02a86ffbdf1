use scalargrad::Variable;

fn main() -> std::io::Result<()> {
    let x = Variable::new(3.);
    let y = Variable::new(4.);
    let xy = &x * &y;
    let z = &xy + &x;
    println!("x: {x}, y: {y}, x * y + x: {z}");

    z.backward();
    println!("dz/dx = {}", x.grad());
    println!("dz/dy = {}", y.grad());

    let sz = z.sin();
    sz.zero_grad();
    sz.backward();
    println!("d(sin(x * y + x))/dx = {}", x.grad());

    sz.dot(&mut std::io::stdout())
}
