//! Element-wise helpers over nested collections of numbers and variables.

use crate::Variable;

/// Converts numbers in a nested structure into variables, keeping its shape.
///
/// Plain numbers are taken as `f64` or `i32`, so nested literals need no annotations.
/// Other primitives go through [`Variable::with_requires_grad`] first.
pub trait Track {
    type Output;
    fn track(self, requires_grad: bool) -> Self::Output;
}

/// Reads or resets the gradients of every variable in a nested structure.
///
/// Plain numbers pass through `grads` unchanged and are ignored by `zero_grads`.
pub trait GradTree {
    type Output;
    fn grads(&self) -> Self::Output;
    fn zero_grads(&self);
}

impl Track for Variable {
    type Output = Variable;
    fn track(self, _requires_grad: bool) -> Variable {
        self
    }
}

impl Track for &Variable {
    type Output = Variable;
    fn track(self, _requires_grad: bool) -> Variable {
        self.clone()
    }
}

impl GradTree for Variable {
    type Output = f64;
    fn grads(&self) -> f64 {
        self.grad()
    }
    fn zero_grads(&self) {
        self.zero_grad();
    }
}

macro_rules! impl_track_number {
    ($($t:ty),*) => {
        $(
            impl Track for $t {
                type Output = Variable;
                fn track(self, requires_grad: bool) -> Variable {
                    Variable::with_requires_grad(self, requires_grad)
                }
            }
        )*
    };
}

impl_track_number!(f64, i32);

macro_rules! impl_number_leaf {
    ($($t:ty),*) => {
        $(
            impl GradTree for $t {
                type Output = $t;
                fn grads(&self) -> $t {
                    *self
                }
                fn zero_grads(&self) {}
            }
        )*
    };
}

impl_number_leaf!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl<T: Track> Track for Vec<T> {
    type Output = Vec<T::Output>;
    fn track(self, requires_grad: bool) -> Self::Output {
        self.into_iter().map(|x| x.track(requires_grad)).collect()
    }
}

impl<T: Track + Clone> Track for &[T] {
    type Output = Vec<T::Output>;
    fn track(self, requires_grad: bool) -> Self::Output {
        self.iter().cloned().map(|x| x.track(requires_grad)).collect()
    }
}

impl<T: Track, const N: usize> Track for [T; N] {
    type Output = [T::Output; N];
    fn track(self, requires_grad: bool) -> Self::Output {
        self.map(|x| x.track(requires_grad))
    }
}

impl<T: GradTree> GradTree for Vec<T> {
    type Output = Vec<T::Output>;
    fn grads(&self) -> Self::Output {
        self.as_slice().grads()
    }
    fn zero_grads(&self) {
        self.as_slice().zero_grads();
    }
}

impl<T: GradTree> GradTree for [T] {
    type Output = Vec<T::Output>;
    fn grads(&self) -> Self::Output {
        self.iter().map(GradTree::grads).collect()
    }
    fn zero_grads(&self) {
        self.iter().for_each(GradTree::zero_grads);
    }
}

impl<T: GradTree, const N: usize> GradTree for [T; N] {
    type Output = [T::Output; N];
    fn grads(&self) -> Self::Output {
        self.each_ref().map(GradTree::grads)
    }
    fn zero_grads(&self) {
        self.as_slice().zero_grads();
    }
}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        impl<$($name: Track),+> Track for ($($name,)+) {
            type Output = ($($name::Output,)+);
            #[allow(non_snake_case)]
            fn track(self, requires_grad: bool) -> Self::Output {
                let ($($name,)+) = self;
                ($($name.track(requires_grad),)+)
            }
        }

        impl<$($name: GradTree),+> GradTree for ($($name,)+) {
            type Output = ($($name::Output,)+);
            #[allow(non_snake_case)]
            fn grads(&self) -> Self::Output {
                let ($($name,)+) = self;
                ($($name.grads(),)+)
            }
            #[allow(non_snake_case)]
            fn zero_grads(&self) {
                let ($($name,)+) = self;
                $($name.zero_grads();)+
            }
        }
    };
}

impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);

/// Converts every number in `data` into a variable. Variables already in it are kept as is.
pub fn track<T: Track>(data: T, requires_grad: bool) -> T::Output {
    data.track(requires_grad)
}

/// Gradients of every variable in `data`, in the same shape.
pub fn grads<T: GradTree + ?Sized>(data: &T) -> T::Output {
    data.grads()
}

/// Resets the gradient of every variable in `data`.
pub fn zero_grads<T: GradTree + ?Sized>(data: &T) {
    data.zero_grads()
}
