//! Плотная матрица с построчным хранением и CPU-алгоритмами

use std::fmt;
use std::ops::{Add, AddAssign, Index, IndexMut, Mul, Sub, SubAssign};

use rand::Rng;

use super::types::{Element, ElementType, Real};
use crate::error::MatrixError;

/// Плотная матрица `m x n`, элементы хранятся построчно
///
/// Инвариант: `data.len() == m * n`, элемент `(i, j)` лежит по индексу `i * n + j`.
/// Все операции, возвращающие матрицу, создают независимую копию.
#[derive(Debug, Clone, Default)]
pub struct Matrix<T: Element> {
    m: usize,
    n: usize,
    data: Vec<T>,
}

impl<T: Element> Matrix<T> {
    /// Нулевая матрица
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            m,
            n,
            data: vec![T::zero(); m * n],
        }
    }

    /// Матрица с единицами на главной диагонали
    pub fn identity(m: usize, n: usize) -> Self {
        let mut matrix = Self::new(m, n);
        for i in 0..m.min(n) {
            matrix.set(i, i, T::one());
        }
        matrix
    }

    /// Создаёт матрицу из внешнего буфера ровно из `m*n` элементов
    pub fn from_vec(m: usize, n: usize, data: Vec<T>) -> Result<Self, MatrixError> {
        if data.len() != m * n {
            return Err(MatrixError::BufferLength {
                m,
                n,
                len: data.len(),
            });
        }
        Ok(Self { m, n, data })
    }

    pub fn from_slice(m: usize, n: usize, data: &[T]) -> Result<Self, MatrixError> {
        Self::from_vec(m, n, data.to_vec())
    }

    pub fn rows(&self) -> usize {
        self.m
    }

    pub fn cols(&self) -> usize {
        self.n
    }

    /// Размерности `(m, n)`
    pub fn dims(&self) -> (usize, usize) {
        (self.m, self.n)
    }

    pub fn element_type(&self) -> ElementType {
        T::TYPE
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, i: usize, j: usize) -> T {
        self[(i, j)]
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) {
        self[(i, j)] = value;
    }

    pub fn is_square(&self) -> bool {
        self.m == self.n
    }

    pub fn is_vector(&self) -> bool {
        self.m == 1 || self.n == 1
    }

    /// Заменяет строку `k`
    pub fn update_row(&mut self, k: usize, row: &[T]) -> Result<(), MatrixError> {
        if row.len() != self.n {
            return Err(MatrixError::RowBroadcast {
                len: row.len(),
                m: self.m,
                n: self.n,
            });
        }
        self.data[k * self.n..(k + 1) * self.n].copy_from_slice(row);
        Ok(())
    }

    /// Заменяет столбец `k`
    pub fn update_col(&mut self, k: usize, col: &[T]) -> Result<(), MatrixError> {
        if col.len() != self.m {
            return Err(MatrixError::ColBroadcast {
                len: col.len(),
                m: self.m,
                n: self.n,
            });
        }
        for (i, &value) in col.iter().enumerate() {
            self.set(i, k, value);
        }
        Ok(())
    }

    /// Копия этой матрицы, в которой строка `k` взята из `other`
    pub fn exchange_row(&self, k: usize, other: &Matrix<T>) -> Result<Matrix<T>, MatrixError> {
        self.check_same_shape(other)?;
        let mut result = self.clone();
        result.update_row(k, &other.data[k * other.n..(k + 1) * other.n])?;
        Ok(result)
    }

    /// Копия этой матрицы, в которой столбец `k` взят из `other`
    pub fn exchange_col(&self, k: usize, other: &Matrix<T>) -> Result<Matrix<T>, MatrixError> {
        self.check_same_shape(other)?;
        let mut result = self.clone();
        for i in 0..self.m {
            result.set(i, k, other.get(i, k));
        }
        Ok(result)
    }

    pub fn swap_row(&self, r1: usize, r2: usize) -> Matrix<T> {
        let mut result = self.clone();
        for j in 0..self.n {
            result.data.swap(r1 * self.n + j, r2 * self.n + j);
        }
        result
    }

    pub fn swap_col(&self, c1: usize, c2: usize) -> Matrix<T> {
        let mut result = self.clone();
        for i in 0..self.m {
            result.data.swap(i * self.n + c1, i * self.n + c2);
        }
        result
    }

    /// Заполняет случайными целыми из `[low, high]`, делёнными на `norm`
    pub fn fill_rand(&mut self, low: i64, high: i64, norm: T) {
        let mut rng = rand::thread_rng();
        self.fill_rand_with(&mut rng, low, high, norm);
    }

    pub fn fill_rand_with<R: Rng>(&mut self, rng: &mut R, low: i64, high: i64, norm: T) {
        for value in self.data.iter_mut() {
            *value = T::from_i64(rng.gen_range(low..=high)) / norm;
        }
    }

    /// element(i, j) = i*n + j
    pub fn fill_ints(&mut self) {
        for (idx, value) in self.data.iter_mut().enumerate() {
            *value = T::from_usize(idx);
        }
    }

    /// Поэлементное произведение
    pub fn dot(&self, other: &Matrix<T>) -> Result<Matrix<T>, MatrixError> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Классическое умножение O(m*K*n) на CPU
    pub fn product(&self, other: &Matrix<T>) -> Result<Matrix<T>, MatrixError> {
        if self.n != other.m {
            return Err(MatrixError::Shape(self.m, self.n, other.m, other.n));
        }
        let (m, k_dim, n) = (self.m, self.n, other.n);
        let mut result = Matrix::new(m, n);
        for i in 0..m {
            for j in 0..n {
                let mut acc = T::zero();
                for k in 0..k_dim {
                    acc += self.data[i * k_dim + k] * other.data[k * n + j];
                }
                result.data[i * n + j] = acc;
            }
        }
        Ok(result)
    }

    pub fn transpose(&self) -> Matrix<T> {
        let mut result = Matrix::new(self.n, self.m);
        for i in 0..self.n {
            for j in 0..self.m {
                result.set(i, j, self.get(j, i));
            }
        }
        result
    }

    /// След матрицы, определён только для квадратных
    pub fn tr(&self) -> Result<T, MatrixError> {
        if !self.is_square() {
            return Err(MatrixError::NotSquare(self.m, self.n));
        }
        let mut acc = T::zero();
        for i in 0..self.n {
            acc += self.get(i, i);
        }
        Ok(acc)
    }

    fn check_same_shape(&self, other: &Matrix<T>) -> Result<(), MatrixError> {
        if self.dims() != other.dims() {
            return Err(MatrixError::Shape(self.m, self.n, other.m, other.n));
        }
        Ok(())
    }

    fn zip_with(&self, other: &Matrix<T>, f: impl Fn(T, T) -> T) -> Result<Matrix<T>, MatrixError> {
        self.check_same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Matrix {
            m: self.m,
            n: self.n,
            data,
        })
    }
}

impl<T: Real> Matrix<T> {
    /// LU-разложение без выбора ведущего элемента
    ///
    /// Деление на `U[i][i]` не защищено: вырожденная матрица даёт NaN/Inf.
    fn lu(&self) -> (Matrix<T>, Matrix<T>) {
        let n = self.n;
        let mut l = Matrix::new(n, n);
        let mut u = Matrix::new(n, n);
        for i in 0..n {
            for k in i..n {
                let mut u_acc = T::zero();
                let mut l_acc = T::zero();
                for j in 0..i {
                    u_acc += l.get(i, j) * u.get(j, k);
                    l_acc += l.get(k, j) * u.get(j, i);
                }
                u.set(i, k, self.get(i, k) - u_acc);
                l.set(k, i, (self.get(k, i) - l_acc) / u.get(i, i));
            }
        }
        (l, u)
    }

    /// Определитель через LU-разложение, O(n^3)
    ///
    /// # Panics
    /// Если матрица не квадратная.
    pub fn det(&self) -> T {
        assert!(self.is_square(), "det() requires a square matrix");
        let (_, u) = self.lu();
        (0..self.n).fold(T::one(), |det, i| det * u.get(i, i))
    }

    /// Обратная матрица через LU-разложение, O(n^3)
    ///
    /// Обращает L и U по отдельности (индексы U симметричны индексам L)
    /// и возвращает произведение `U^-1 * L^-1`.
    ///
    /// # Panics
    /// Если матрица не квадратная.
    pub fn inv(&self) -> Matrix<T> {
        assert!(self.is_square(), "inv() requires a square matrix");
        let n = self.n;
        let (l, u) = self.lu();

        let mut l_inv = Matrix::new(n, n);
        let mut u_inv = Matrix::new(n, n);
        for i in 0..n {
            l_inv.set(i, i, T::one() / l.get(i, i));
            u_inv.set(i, i, T::one() / u.get(i, i));

            for k in i + 1..n {
                let mut u_acc = T::zero();
                let mut l_acc = T::zero();
                for j in 0..k {
                    u_acc -= u_inv.get(i, j) * u.get(j, k);
                    l_acc -= l.get(k, j) * l_inv.get(j, i);
                }
                u_inv.set(i, k, u_acc / u.get(k, k));
                l_inv.set(k, i, l_acc / l.get(k, k));
            }
        }

        // размеры совпадают по построению
        let mut result = Matrix::new(n, n);
        for i in 0..n {
            for j in 0..n {
                let mut acc = T::zero();
                for k in 0..n {
                    acc += u_inv.get(i, k) * l_inv.get(k, j);
                }
                result.set(i, j, acc);
            }
        }
        result
    }

    /// Сравнение с допуском: размеры совпадают и |a - b| <= tol поэлементно
    pub fn approx_eq(&self, other: &Matrix<T>, tol: T) -> bool {
        self.dims() == other.dims()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(&a, &b)| (a - b).abs() <= tol)
    }
}

impl<T: Element> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &T {
        assert!(i < self.m && j < self.n, "index ({i}, {j}) out of bounds");
        &self.data[i * self.n + j]
    }
}

impl<T: Element> IndexMut<(usize, usize)> for Matrix<T> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        assert!(i < self.m && j < self.n, "index ({i}, {j}) out of bounds");
        &mut self.data[i * self.n + j]
    }
}

/// Точное сравнение: подходит только для целочисленных данных
impl<T: Element> PartialEq for Matrix<T> {
    fn eq(&self, other: &Self) -> bool {
        self.dims() == other.dims() && self.data == other.data
    }
}

// Арифметика паникует при несовпадении размеров, как и индексация.
impl<T: Element> Add for &Matrix<T> {
    type Output = Matrix<T>;

    fn add(self, rhs: &Matrix<T>) -> Matrix<T> {
        self.zip_with(rhs, |a, b| a + b)
            .unwrap_or_else(|e| panic!("{e}"))
    }
}

impl<T: Element> Sub for &Matrix<T> {
    type Output = Matrix<T>;

    fn sub(self, rhs: &Matrix<T>) -> Matrix<T> {
        self.zip_with(rhs, |a, b| a - b)
            .unwrap_or_else(|e| panic!("{e}"))
    }
}

impl<T: Element> AddAssign<&Matrix<T>> for Matrix<T> {
    fn add_assign(&mut self, rhs: &Matrix<T>) {
        assert_eq!(self.dims(), rhs.dims(), "shape mismatch in +=");
        for (a, &b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a += b;
        }
    }
}

impl<T: Element> SubAssign<&Matrix<T>> for Matrix<T> {
    fn sub_assign(&mut self, rhs: &Matrix<T>) {
        assert_eq!(self.dims(), rhs.dims(), "shape mismatch in -=");
        for (a, &b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a -= b;
        }
    }
}

/// Матричное произведение на CPU
impl<T: Element> Mul for &Matrix<T> {
    type Output = Matrix<T>;

    fn mul(self, rhs: &Matrix<T>) -> Matrix<T> {
        self.product(rhs).unwrap_or_else(|e| panic!("{e}"))
    }
}

/// Умножение на скаляр
impl<T: Element> Mul<T> for &Matrix<T> {
    type Output = Matrix<T>;

    fn mul(self, value: T) -> Matrix<T> {
        Matrix {
            m: self.m,
            n: self.n,
            data: self.data.iter().map(|&x| value * x).collect(),
        }
    }
}

macro_rules! impl_scalar_lhs {
    ($($ty:ty),*) => {
        $(
            impl Mul<&Matrix<$ty>> for $ty {
                type Output = Matrix<$ty>;

                fn mul(self, rhs: &Matrix<$ty>) -> Matrix<$ty> {
                    rhs * self
                }
            }
        )*
    };
}

impl_scalar_lhs!(f32, f64, i32);

impl<T: Element> fmt::Display for Matrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[[")?;
        for i in 0..self.m {
            for j in 0..self.n {
                write!(f, " {}", self.get(i, j))?;
            }
            writeln!(f)?;
        }
        write!(f, "]]")
    }
}
