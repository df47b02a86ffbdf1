//! Reverse-mode automatic differentiation over scalar values.
//!
//! ```
//! use scalargrad::Variable;
//!
//! let x = Variable::new(3.);
//! let y = Variable::new(4.);
//! let z = &x * &y + &x;
//! z.backward();
//! assert_eq!(x.grad(), 5.);
//! assert_eq!(y.grad(), 3.);
//! ```

mod backward;
mod dot;
pub mod error;
pub mod grad_mode;
pub mod nested;
mod op;
mod scalar;
mod variable;

pub use backward::{BackwardOptions, Traversal};
pub use error::{Error, Result};
pub use grad_mode::{is_grad_enabled, no_grad, set_grad_enabled, NoGradGuard};
pub use op::{Op, OpKind, UnaryFn};
pub use scalar::{Number, Scalar};
#[cfg(feature = "macro")]
pub use scalargrad_macro::scalargrad;
pub use variable::Variable;
