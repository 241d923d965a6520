//! Умножение матриц на ускорителе
//!
//! Проверки типа и формы выполняются до обращения к устройству. При
//! несовпадении возвращается нулевая матрица A.m x B.n с предупреждением,
//! чтобы пакетные прогоны могли продолжаться. Ошибки устройства
//! возвращаются как `DispatchError::Accelerator` и не повторяются.

use std::fmt;

use tracing::{debug, warn};

use super::strategy::{Geometry, Strategy, Tile};
use crate::accelerator::{Accelerator, BufferAccess, CommandQueue, KernelArg};
use crate::error::{AcceleratorError, DispatchError};
use crate::matrix::{Element, ElementType, Matrix};

const CL_INVALID_ARG_VALUE: i32 = -50;

/// Мягкая ошибка проверки операндов
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchWarning {
    /// Разные типы элементов A и B
    TypeConflict { left: ElementType, right: ElementType },
    /// A.n != B.m
    ShapeConflict { left: (usize, usize), right: (usize, usize) },
}

impl fmt::Display for DispatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchWarning::TypeConflict { left, right } => {
                write!(f, "type conflict: {left} * {right}")
            }
            DispatchWarning::ShapeConflict { left, right } => write!(
                f,
                "shape conflict: {}(rows) x {}(cols) * {}(rows) x {}(cols)",
                left.0, left.1, right.0, right.1
            ),
        }
    }
}

/// Результат умножения
#[derive(Debug, Clone, PartialEq)]
pub struct Product<T: Element> {
    pub matrix: Matrix<T>,
    pub warning: Option<DispatchWarning>,
}

impl<T: Element> Product<T> {
    /// Результат получен на устройстве, а не заглушка
    pub fn is_valid(&self) -> bool {
        self.warning.is_none()
    }

    pub fn into_matrix(self) -> Matrix<T> {
        self.matrix
    }
}

/// C = A * B по стратегии, заданной именем
///
/// Имя: `naive`, `local-tiled`, `reduction-tiled`, `v0`..`v2` или имя ядра
/// вида `f32_product_v1`.
pub fn product<T, U, A>(
    a: &Matrix<T>,
    b: &Matrix<U>,
    device: &A,
    strategy: &str,
    tile: Tile,
) -> Result<Product<T>, DispatchError>
where
    T: Element,
    U: Element,
    A: Accelerator,
{
    if let Some(placeholder) = soft_check(a, b) {
        return Ok(placeholder);
    }

    let parsed: Strategy = strategy.parse()?;
    if let Some((element, _)) = Strategy::parse_kernel_name(strategy.trim()) {
        if element != T::TYPE {
            return Err(DispatchError::UnknownStrategy(format!(
                "{} for {} matrices",
                strategy.trim(),
                T::TYPE
            )));
        }
    }

    execute(a, bytemuck::cast_slice(b.as_slice()), b.dims(), device, parsed, tile)
}

/// C = A * B для операндов одного типа
pub fn dispatch<T, A>(
    a: &Matrix<T>,
    b: &Matrix<T>,
    device: &A,
    strategy: Strategy,
    tile: Tile,
) -> Result<Product<T>, DispatchError>
where
    T: Element,
    A: Accelerator,
{
    if let Some(placeholder) = soft_check(a, b) {
        return Ok(placeholder);
    }
    execute(a, bytemuck::cast_slice(b.as_slice()), b.dims(), device, strategy, tile)
}

fn soft_check<T: Element, U: Element>(a: &Matrix<T>, b: &Matrix<U>) -> Option<Product<T>> {
    let warning = if T::TYPE != U::TYPE {
        DispatchWarning::TypeConflict {
            left: T::TYPE,
            right: U::TYPE,
        }
    } else if a.cols() != b.rows() {
        DispatchWarning::ShapeConflict {
            left: a.dims(),
            right: b.dims(),
        }
    } else {
        return None;
    };

    warn!("{warning}, returning zero matrix");
    Some(Product {
        matrix: Matrix::new(a.rows(), b.cols()),
        warning: Some(warning),
    })
}

fn execute<T, A>(
    a: &Matrix<T>,
    b: &[u8],
    b_dims: (usize, usize),
    device: &A,
    strategy: Strategy,
    tile: Tile,
) -> Result<Product<T>, DispatchError>
where
    T: Element,
    A: Accelerator,
{
    let (m, k) = a.dims();
    let n = b_dims.1;
    if m == 0 || k == 0 || n == 0 {
        return Ok(Product {
            matrix: Matrix::new(m, n),
            warning: None,
        });
    }

    let geometry = strategy.geometry(tile, a.dims(), b_dims, T::TYPE)?;
    let kernel = strategy.kernel_name(T::TYPE);
    debug!(
        kernel = %kernel,
        global = ?geometry.range.global,
        local = ?geometry.range.local,
        work_per_thread = ?geometry.work_per_thread,
        scratch = ?geometry.scratch_bytes,
        "dispatching product"
    );

    let data = run_kernel::<T, A>(device, &kernel, bytemuck::cast_slice(a.as_slice()), b, (m, k, n), &geometry)
        .map_err(|source| DispatchError::Accelerator {
            strategy: strategy.name(),
            source,
        })?;

    Ok(Product {
        matrix: Matrix::from_vec(m, n, data)?,
        warning: None,
    })
}

fn kernel_dim(value: usize) -> Result<i32, AcceleratorError> {
    i32::try_from(value).map_err(|_| AcceleratorError::runtime("clSetKernelArg", CL_INVALID_ARG_VALUE))
}

/// Буферы, запись, запуск и блокирующее чтение в одной очереди
///
/// Буферы и очередь освобождаются при выходе из функции на любом пути.
fn run_kernel<T, A>(
    device: &A,
    kernel: &str,
    a: &[u8],
    b: &[u8],
    (m, k, n): (usize, usize, usize),
    geometry: &Geometry,
) -> Result<Vec<T>, AcceleratorError>
where
    T: Element,
    A: Accelerator,
{
    let element = T::TYPE.size();
    let kernel = device.kernel(kernel)?;
    let queue = device.create_queue()?;

    let buf_a = device.create_buffer(BufferAccess::ReadOnly, m * k * element)?;
    let buf_b = device.create_buffer(BufferAccess::ReadOnly, k * n * element)?;
    let buf_c = device.create_buffer(BufferAccess::WriteOnly, m * n * element)?;
    queue.write(&buf_a, a)?;
    queue.write(&buf_b, b)?;

    let mut args = vec![
        KernelArg::Int(kernel_dim(m)?),
        KernelArg::Int(kernel_dim(n)?),
        KernelArg::Int(kernel_dim(k)?),
        KernelArg::Buffer(&buf_a),
        KernelArg::Buffer(&buf_b),
        KernelArg::Buffer(&buf_c),
    ];
    if let Some(bytes) = geometry.scratch_bytes {
        args.push(KernelArg::Local(bytes));
        args.push(KernelArg::Local(bytes));
    }
    queue.launch(&kernel, &args, &geometry.range)?;

    let mut out = vec![T::zero(); m * n];
    queue.read(&buf_c, bytemuck::cast_slice_mut(&mut out))?;
    queue.finish()?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::{build_sources, HostDevice};
    use crate::matrix::PRODUCT_KERNELS_F32;
    use crate::pkp::Preprocessor;

    fn device() -> HostDevice {
        let mut pkp = Preprocessor::from_source(PRODUCT_KERNELS_F32).unwrap();
        pkp.update_config("f32_product_v2", "WORK_PER_THREAD_N", "2").unwrap();
        let mut device = HostDevice::new();
        build_sources(&mut device, &mut pkp).unwrap();
        device
    }

    fn sequential(m: usize, n: usize) -> Matrix<f32> {
        let mut x = Matrix::new(m, n);
        x.fill_ints();
        x
    }

    #[test]
    fn every_strategy_matches_cpu() {
        let device = device();
        let (a, b) = (sequential(4, 4), sequential(4, 4));
        let expected = a.product(&b).unwrap();
        for strategy in Strategy::ALL {
            let c = dispatch(&a, &b, &device, strategy, Tile::square(2)).unwrap();
            assert!(c.is_valid());
            assert_eq!(c.into_matrix(), expected, "{strategy}");
        }
    }

    #[test]
    fn type_conflict_returns_zeros() {
        let device = device();
        let a = sequential(2, 2);
        let b = Matrix::<f64>::new(2, 3);
        let c = product(&a, &b, &device, "naive", Tile::square(2)).unwrap();
        assert_eq!(
            c.warning,
            Some(DispatchWarning::TypeConflict {
                left: ElementType::F32,
                right: ElementType::F64
            })
        );
        assert_eq!(c.matrix, Matrix::new(2, 3));
        assert_eq!(device.stats().buffers_created, 0);
    }

    #[test]
    fn kernel_name_of_other_type_is_rejected() {
        let device = device();
        let a = sequential(2, 2);
        let err = product(&a, &a, &device, "f64_product_v0", Tile::square(2)).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownStrategy(_)));
    }

    #[test]
    fn empty_inner_dimension_gives_zeros() {
        let device = device();
        let a = Matrix::<f32>::new(2, 0);
        let b = Matrix::<f32>::new(0, 2);
        let c = dispatch(&a, &b, &device, Strategy::Naive, Tile::square(2)).unwrap();
        assert_eq!(c.matrix, Matrix::new(2, 2));
        assert!(c.is_valid());
        assert_eq!(device.stats().buffers_created, 0);
    }

    #[test]
    fn device_errors_carry_the_strategy() {
        let device = HostDevice::new();
        let a = sequential(2, 2);
        let err = dispatch(&a, &a, &device, Strategy::LocalTiled, Tile::square(2)).unwrap_err();
        match err {
            DispatchError::Accelerator { strategy, source } => {
                assert_eq!(strategy, "local-tiled");
                assert!(matches!(source, AcceleratorError::NotBuilt));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn warning_messages_name_the_conflict() {
        let w = DispatchWarning::ShapeConflict {
            left: (2, 3),
            right: (2, 2),
        };
        assert_eq!(w.to_string(), "shape conflict: 2(rows) x 3(cols) * 2(rows) x 2(cols)");
    }
}
