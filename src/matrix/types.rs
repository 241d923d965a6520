//! Типы элементов матриц и связанные структуры

use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use bytemuck::Pod;

/// Тег типа элемента
///
/// Сравнивается структурно, матрицы с разными тегами не перемножаются.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F32,
    F64,
    I32,
}

impl ElementType {
    /// Размер элемента в байтах (для выделения буферов на устройстве)
    pub fn size(self) -> usize {
        match self {
            ElementType::F32 => 4,
            ElementType::F64 => 8,
            ElementType::I32 => 4,
        }
    }

    /// Префикс имени ядра: `f32_product_v0` и т.д.
    pub fn prefix(self) -> &'static str {
        match self {
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::I32 => "i32",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "f32" => Some(ElementType::F32),
            "f64" => Some(ElementType::F64),
            "i32" => Some(ElementType::I32),
            _ => None,
        }
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Числовой тип, который может храниться в матрице и передаваться на GPU
pub trait Element:
    Pod
    + Default
    + PartialEq
    + PartialOrd
    + Debug
    + Display
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + AddAssign
    + SubAssign
{
    const TYPE: ElementType;

    fn zero() -> Self;
    fn one() -> Self;
    fn from_i64(value: i64) -> Self;
    fn from_usize(value: usize) -> Self;
    fn to_f64(self) -> f64;
}

/// Вещественные типы: для LU-разложения и сравнений с допуском
pub trait Real: Element + Neg<Output = Self> {
    fn abs(self) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $tag:ident, $zero:expr, $one:expr);* $(;)?) => {
        $(
            impl Element for $ty {
                const TYPE: ElementType = ElementType::$tag;

                fn zero() -> Self { $zero }
                fn one() -> Self { $one }
                fn from_i64(value: i64) -> Self { value as $ty }
                fn from_usize(value: usize) -> Self { value as $ty }
                fn to_f64(self) -> f64 { self as f64 }
            }
        )*
    };
}

impl_element! {
    f32 => F32, 0.0, 1.0;
    f64 => F64, 0.0, 1.0;
    i32 => I32, 0, 1;
}

impl Real for f32 {
    fn abs(self) -> Self {
        f32::abs(self)
    }
}

impl Real for f64 {
    fn abs(self) -> Self {
        f64::abs(self)
    }
}

/// Способ заполнения матриц для вычислений
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatrixType {
    /// Последовательные целые: element(i,j) = i*n + j
    Sequential,
    /// Случайные целые из [low, high], делённые на norm
    Random { low: i64, high: i64, norm: i64 },
    Identity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_distinct_per_type() {
        assert_eq!(<f32 as Element>::TYPE, ElementType::F32);
        assert_ne!(<f32 as Element>::TYPE, <f64 as Element>::TYPE);
        assert_ne!(<f32 as Element>::TYPE, <i32 as Element>::TYPE);
    }

    #[test]
    fn prefix_round_trips_through_parser() {
        for tag in [ElementType::F32, ElementType::F64, ElementType::I32] {
            assert_eq!(ElementType::from_prefix(tag.prefix()), Some(tag));
        }
        assert_eq!(ElementType::from_prefix("f16"), None);
    }

    #[test]
    fn sizes_match_rust_types() {
        assert_eq!(ElementType::F32.size(), std::mem::size_of::<f32>());
        assert_eq!(ElementType::F64.size(), std::mem::size_of::<f64>());
        assert_eq!(ElementType::I32.size(), std::mem::size_of::<i32>());
    }
}
