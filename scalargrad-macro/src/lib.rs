use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, spanned::Spanned, BinOp, Block, Error, Expr, ExprLit, Ident, Pat, Result,
    Stmt, UnOp,
};

/// Elementary functions that can be called by name inside the macro.
const FUNCTIONS: &[&str] = &[
    "abs", "sqrt", "sin", "asin", "sinh", "asinh", "cos", "acos", "cosh", "acosh", "tan", "atan",
    "tanh", "atanh", "exp", "log",
];

/// Rewrites a block of `let` statements into `scalargrad::Variable` expressions.
///
/// A `let` bound to a literal makes a new leaf. Literals inside expressions are constants.
/// Arithmetic operators, unary minus, `pow(x, y)` and the functions in [`FUNCTIONS`] are
/// supported; every intermediate gets its own binding.
#[proc_macro]
pub fn scalargrad(input: TokenStream) -> TokenStream {
    // Parse the input tokens into a syntax tree
    let input = parse_macro_input!(input as Block);

    let mut objs = vec![];

    for stmt in &input.stmts {
        if let Err(e) = traverse_stmt(stmt, &mut objs) {
            objs.push(e.to_compile_error());
        }
    }

    let expanded = quote! {
        #(#objs)*
    };

    TokenStream::from(expanded)
}

fn traverse_stmt(input: &Stmt, terms: &mut Vec<TokenStream2>) -> Result<()> {
    match input {
        Stmt::Local(local) => {
            let (Pat::Ident(id), Some(init)) = (&local.pat, &local.init) else {
                return Err(Error::new(
                    local.span(),
                    "expected `let name = expression;`",
                ));
            };
            let name = id.ident.clone();
            let ex = &init.expr;
            let ts = match ex as &Expr {
                Expr::Lit(_) => quote! {
                    let #name = ::scalargrad::Variable::new(#ex);
                },
                Expr::Unary(un) if matches!(un.op, UnOp::Neg(_)) && is_lit(&un.expr) => quote! {
                    let #name = ::scalargrad::Variable::new(#ex);
                },
                Expr::Path(path) => quote! {
                    let #name = #path.clone();
                },
                _ => {
                    let res = traverse_expr(ex, terms)?;
                    quote! {
                        let #name = #res;
                    }
                }
            };
            terms.push(ts);
        }
        Stmt::Expr(ex, _) => {
            traverse_expr(ex, terms)?;
        }
        _ => (),
    }
    Ok(())
}

fn is_lit(ex: &Expr) -> bool {
    matches!(ex, Expr::Lit(_))
}

fn var_name(terms: &[TokenStream2]) -> String {
    format!("_a{}", terms.len())
}

fn format_constant(ex: &ExprLit, terms: &mut Vec<TokenStream2>) -> Ident {
    let name = Ident::new(&var_name(terms), ex.span());
    let ts = quote! {
        let #name = ::scalargrad::Variable::constant(#ex);
    };
    terms.push(ts);
    name
}

fn traverse_expr(input: &Expr, terms: &mut Vec<TokenStream2>) -> Result<Ident> {
    match input {
        Expr::Binary(ex) => {
            let lhs = traverse_expr(&ex.left, terms)?;
            let rhs = traverse_expr(&ex.right, terms)?;
            let name = Ident::new(&var_name(terms), ex.span());
            let binop = match ex.op {
                BinOp::Add(_) => quote! { &#lhs + &#rhs },
                BinOp::Sub(_) => quote! { &#lhs - &#rhs },
                BinOp::Mul(_) => quote! { &#lhs * &#rhs },
                BinOp::Div(_) => quote! { &#lhs / &#rhs },
                _ => return Err(Error::new(ex.op.span(), "unsupported operator")),
            };
            terms.push(quote! {
                let #name = #binop;
            });
            Ok(name)
        }
        Expr::Unary(ex) => {
            let UnOp::Neg(_) = ex.op else {
                return Err(Error::new(ex.op.span(), "unsupported operator"));
            };
            let operand = traverse_expr(&ex.expr, terms)?;
            let name = Ident::new(&var_name(terms), ex.span());
            terms.push(quote! {
                let #name = -&#operand;
            });
            Ok(name)
        }
        Expr::Paren(ex) => traverse_expr(&ex.expr, terms),
        Expr::Lit(lit) => Ok(format_constant(lit, terms)),
        Expr::Path(path) => path
            .path
            .segments
            .last()
            .map(|seg| seg.ident.clone())
            .ok_or_else(|| Error::new(path.span(), "empty path")),
        Expr::Call(call) => {
            let Expr::Path(func) = &*call.func else {
                return Err(Error::new(call.func.span(), "expected a function name"));
            };
            let Some(func) = func.path.get_ident() else {
                return Err(Error::new(func.span(), "expected a function name"));
            };
            let args = call
                .args
                .iter()
                .map(|arg| traverse_expr(arg, terms))
                .collect::<Result<Vec<_>>>()?;
            let name = Ident::new(&var_name(terms), call.span());
            let ts = match (func.to_string().as_str(), args.as_slice()) {
                ("pow", [base, exponent]) => quote! {
                    let #name = #base.pow(&#exponent);
                },
                (f, [arg]) if FUNCTIONS.contains(&f) => quote! {
                    let #name = #arg.#func();
                },
                _ => {
                    return Err(Error::new(
                        call.span(),
                        format!("unsupported function `{func}` with {} argument(s)", args.len()),
                    ))
                }
            };
            terms.push(ts);
            Ok(name)
        }
        _ => Err(Error::new(input.span(), "unsupported expression")),
    }
}
