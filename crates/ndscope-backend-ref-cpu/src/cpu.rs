use std::sync::Arc;

use anyhow::Result;
use ndscope::{Buffer, DType, Engine, Shape, TensorData};
use rand::Rng;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("{op} only supports f32 tensors, got {dtype}")]
    UnsupportedDtype { op: &'static str, dtype: DType },
    #[error("{op} shape mismatch: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },
    #[error("{op} expects rank {expected} operands, got rank {actual}")]
    Rank {
        op: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Maximum,
}

impl BinaryOp {
    fn kernel_name(self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Sub",
            BinaryOp::Mul => "Mul",
            BinaryOp::Maximum => "Maximum",
        }
    }

    fn apply(self, x: f32, y: f32) -> f32 {
        match self {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Maximum => x.max(y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReduceKind {
    Sum,
    Max,
}

/// Reference kernels over `f32` buffers owned by one engine.
///
/// Every kernel allocates its output in the engine's active scope and runs
/// through [`Engine::run_kernel`].
#[derive(Clone, Copy)]
pub struct CpuBackend<'e> {
    engine: &'e Engine,
}

impl<'e> CpuBackend<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        CpuBackend { engine }
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    pub fn add(&self, lhs: &Buffer, rhs: &Buffer) -> Result<Buffer> {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(&self, lhs: &Buffer, rhs: &Buffer) -> Result<Buffer> {
        self.binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(&self, lhs: &Buffer, rhs: &Buffer) -> Result<Buffer> {
        self.binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn maximum(&self, lhs: &Buffer, rhs: &Buffer) -> Result<Buffer> {
        self.binary(BinaryOp::Maximum, lhs, rhs)
    }

    pub fn relu(&self, input: &Buffer) -> Result<Buffer> {
        self.engine.run_kernel("Relu", || {
            let values = f32_values("Relu", input)?;
            let result: Vec<f32> = values.iter().map(|&x| x.max(0.0)).collect();
            self.emit("Relu", input.shape().clone(), result)
        })
    }

    /// Sum of all elements, as a scalar.
    pub fn sum(&self, input: &Buffer) -> Result<Buffer> {
        self.reduce("Sum", ReduceKind::Sum, input)
    }

    /// Largest element, as a scalar.
    pub fn max(&self, input: &Buffer) -> Result<Buffer> {
        self.reduce("Max", ReduceKind::Max, input)
    }

    /// `[m, k] x [k, n] -> [m, n]`.
    pub fn mat_mul(&self, lhs: &Buffer, rhs: &Buffer) -> Result<Buffer> {
        self.engine.run_kernel("MatMul", || {
            let (m, k) = matrix_dims("MatMul", lhs)?;
            let (k_rhs, n) = matrix_dims("MatMul", rhs)?;
            if k != k_rhs {
                return Err(KernelError::ShapeMismatch {
                    op: "MatMul",
                    lhs: lhs.shape().clone(),
                    rhs: rhs.shape().clone(),
                }
                .into());
            }
            let a = f32_values("MatMul", lhs)?;
            let b = f32_values("MatMul", rhs)?;

            let mut out = vec![0.0f32; m * n];
            for row in 0..m {
                for col in 0..n {
                    let mut acc = 0.0f32;
                    for inner in 0..k {
                        acc += a[row * k + inner] * b[inner * n + col];
                    }
                    out[row * n + col] = acc;
                }
            }
            self.emit("MatMul", Shape::new(vec![m, n]), out)
        })
    }

    /// `input - max(input)`, built from the `Max` and `Sub` kernels. When
    /// profiled, only the outer `SubMax` call produces a record.
    pub fn sub_max(&self, input: &Buffer) -> Result<Buffer> {
        self.engine.run_kernel("SubMax", || {
            let peak = self.max(input)?;
            self.sub(input, &peak)
        })
    }

    /// Normal samples (`N(0, std^2)`) via the Box-Muller transform.
    pub fn randn(&self, shape: impl Into<Shape>, std: f32, rng: &mut impl Rng) -> Result<Buffer> {
        let shape = shape.into();
        self.engine.run_kernel("RandomNormal", || {
            let len = shape.num_elements();
            let mut values = Vec::with_capacity(len);
            while values.len() < len {
                let u1: f32 = rng.gen::<f32>().max(f32::MIN_POSITIVE);
                let u2: f32 = rng.gen::<f32>();
                let r = (-2.0 * u1.ln()).sqrt();
                let theta = 2.0 * std::f32::consts::PI * u2;
                values.push(r * theta.cos() * std);
                if values.len() < len {
                    values.push(r * theta.sin() * std);
                }
            }
            self.emit("RandomNormal", shape, values)
        })
    }

    fn binary(&self, op: BinaryOp, lhs: &Buffer, rhs: &Buffer) -> Result<Buffer> {
        let name = op.kernel_name();
        self.engine.run_kernel(name, || {
            let a = f32_values(name, lhs)?;
            let b = f32_values(name, rhs)?;
            // A single-element rhs broadcasts over lhs.
            let result: Vec<f32> = if lhs.shape() == rhs.shape() {
                a.iter().zip(b.iter()).map(|(&x, &y)| op.apply(x, y)).collect()
            } else if b.len() == 1 {
                a.iter().map(|&x| op.apply(x, b[0])).collect()
            } else {
                return Err(KernelError::ShapeMismatch {
                    op: name,
                    lhs: lhs.shape().clone(),
                    rhs: rhs.shape().clone(),
                }
                .into());
            };
            self.emit(name, lhs.shape().clone(), result)
        })
    }

    fn reduce(&self, name: &'static str, kind: ReduceKind, input: &Buffer) -> Result<Buffer> {
        self.engine.run_kernel(name, || {
            let values = f32_values(name, input)?;
            let init = match kind {
                ReduceKind::Sum => 0.0f32,
                ReduceKind::Max => f32::NEG_INFINITY,
            };
            let acc = values.iter().fold(init, |acc, &x| match kind {
                ReduceKind::Sum => acc + x,
                ReduceKind::Max => acc.max(x),
            });
            self.emit(name, Shape::scalar(), vec![acc])
        })
    }

    fn emit(&self, name: &'static str, shape: Shape, values: Vec<f32>) -> Result<Buffer> {
        trace!(kernel = name, shape = %shape, "cpu kernel produced output");
        Ok(self.engine.from_f32(shape, values)?)
    }
}

fn f32_values(op: &'static str, buffer: &Buffer) -> Result<Arc<[f32]>> {
    match buffer.data()? {
        TensorData::F32(values) => Ok(values),
        other => Err(KernelError::UnsupportedDtype {
            op,
            dtype: other.dtype(),
        }
        .into()),
    }
}

fn matrix_dims(op: &'static str, buffer: &Buffer) -> Result<(usize, usize), KernelError> {
    match buffer.shape().dims() {
        [rows, cols] => Ok((*rows, *cols)),
        dims => Err(KernelError::Rank {
            op,
            expected: 2,
            actual: dims.len(),
        }),
    }
}
