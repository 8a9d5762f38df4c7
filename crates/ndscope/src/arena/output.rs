use crate::tensor::{Buffer, TensorData};
use crate::variables::Variable;

/// Values a scope body may return.
///
/// Every buffer reachable from the returned value is kept when the scope exits
/// and handed to the enclosing frame.
pub trait ScopeOutput {
    fn collect_buffers(&self, out: &mut Vec<Buffer>);
}

impl ScopeOutput for Buffer {
    fn collect_buffers(&self, out: &mut Vec<Buffer>) {
        out.push(self.clone());
    }
}

// Variables are never owned by a frame.
impl ScopeOutput for Variable {
    fn collect_buffers(&self, _out: &mut Vec<Buffer>) {}
}

impl<T: ScopeOutput> ScopeOutput for Option<T> {
    fn collect_buffers(&self, out: &mut Vec<Buffer>) {
        if let Some(value) = self {
            value.collect_buffers(out);
        }
    }
}

impl<T: ScopeOutput> ScopeOutput for Vec<T> {
    fn collect_buffers(&self, out: &mut Vec<Buffer>) {
        for value in self {
            value.collect_buffers(out);
        }
    }
}

impl<T: ScopeOutput> ScopeOutput for &T {
    fn collect_buffers(&self, out: &mut Vec<Buffer>) {
        (**self).collect_buffers(out);
    }
}

macro_rules! impl_scope_output_tuple {
    ($($name:ident),+) => {
        impl<$($name: ScopeOutput),+> ScopeOutput for ($($name,)+) {
            #[allow(non_snake_case)]
            fn collect_buffers(&self, out: &mut Vec<Buffer>) {
                let ($($name,)+) = self;
                $($name.collect_buffers(out);)+
            }
        }
    };
}

impl_scope_output_tuple!(A, B);
impl_scope_output_tuple!(A, B, C);
impl_scope_output_tuple!(A, B, C, D);

macro_rules! impl_scope_output_plain {
    ($($ty:ty),+) => {
        $(
            impl ScopeOutput for $ty {
                fn collect_buffers(&self, _out: &mut Vec<Buffer>) {}
            }
        )+
    };
}

impl_scope_output_plain!((), bool, f32, f64, i32, i64, u32, u64, usize, String, TensorData);
