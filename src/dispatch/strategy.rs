//! Стратегии умножения и их геометрия запуска
//!
//! Каждая стратегия связывает ядро из файла с чистой функцией
//! `(tile, A, B) -> (global, local, work_per_thread, scratch)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::accelerator::NdRange;
use crate::error::DispatchError;
use crate::matrix::kernels::DEFAULT_BLOCK_SIZE;
use crate::matrix::ElementType;

/// Размер тайла (рабочей группы)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub rows: usize,
    pub cols: usize,
}

impl Tile {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::square(DEFAULT_BLOCK_SIZE)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Геометрия запуска ядра
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub range: NdRange,
    /// Сколько элементов C считает один поток по каждой оси
    pub work_per_thread: [usize; 2],
    /// Размер каждого из двух __local буферов в байтах
    pub scratch_bytes: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Один поток на элемент C, чтение из __global
    Naive,
    /// Тайлы A и B в __local памяти
    LocalTiled,
    /// Тайлы в __local, WORK_PER_THREAD_N элементов строки на поток
    ReductionTiled,
}

impl Strategy {
    /// Стратегии в порядке ядер в файле
    pub const ALL: [Strategy; 3] = [Strategy::Naive, Strategy::LocalTiled, Strategy::ReductionTiled];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Naive => "naive",
            Strategy::LocalTiled => "local-tiled",
            Strategy::ReductionTiled => "reduction-tiled",
        }
    }

    /// Номер версии ядра: `_v0`, `_v1`, `_v2`
    pub fn version(self) -> usize {
        match self {
            Strategy::Naive => 0,
            Strategy::LocalTiled => 1,
            Strategy::ReductionTiled => 2,
        }
    }

    pub fn kernel_name(self, element: ElementType) -> String {
        format!("{}_product_v{}", element.prefix(), self.version())
    }

    /// Стратегия использует __local буферы
    pub fn is_tiled(self) -> bool {
        !matches!(self, Strategy::Naive)
    }

    fn from_version(version: &str) -> Option<Self> {
        match version {
            "v0" => Some(Strategy::Naive),
            "v1" => Some(Strategy::LocalTiled),
            "v2" => Some(Strategy::ReductionTiled),
            _ => None,
        }
    }

    /// Разбирает имя ядра `<elem>_product_v<n>`
    pub fn parse_kernel_name(name: &str) -> Option<(ElementType, Strategy)> {
        let (prefix, rest) = name.split_once('_')?;
        let element = ElementType::from_prefix(prefix)?;
        let strategy = Self::from_version(rest.strip_prefix("product_")?)?;
        Some((element, strategy))
    }

    fn unaligned(self, tile: Tile, reason: String) -> DispatchError {
        DispatchError::UnalignedTile {
            strategy: self.name(),
            rows: tile.rows,
            cols: tile.cols,
            reason,
        }
    }

    /// Геометрия для C(m,n) = A(m,k) * B(k,n)
    ///
    /// Тайл, не делящий размерности задачи, отклоняется до обращения к устройству.
    pub fn geometry(
        self,
        tile: Tile,
        a_dims: (usize, usize),
        b_dims: (usize, usize),
        element: ElementType,
    ) -> Result<Geometry, DispatchError> {
        let (m, k) = a_dims;
        let n = b_dims.1;

        if tile.rows == 0 || tile.cols == 0 {
            return Err(self.unaligned(tile, "tile dimensions must be non-zero".to_string()));
        }
        if m % tile.rows != 0 {
            return Err(self.unaligned(tile, format!("rows of A ({m}) not divisible by tile rows")));
        }
        if n % tile.cols != 0 {
            return Err(self.unaligned(tile, format!("cols of B ({n}) not divisible by tile cols")));
        }
        if self.is_tiled() {
            if !tile.is_square() {
                return Err(self.unaligned(tile, "local tiles must be square".to_string()));
            }
            if k % tile.rows != 0 {
                return Err(self.unaligned(tile, format!("inner dimension ({k}) not divisible by tile size")));
            }
        }

        let scratch_bytes = self
            .is_tiled()
            .then(|| tile.rows * tile.cols * element.size());

        let geometry = match self {
            Strategy::Naive | Strategy::LocalTiled => Geometry {
                range: NdRange::new([m, n], [tile.rows, tile.cols]),
                work_per_thread: [1, 1],
                scratch_bytes,
            },
            Strategy::ReductionTiled => {
                let wpt = tile.cols;
                Geometry {
                    range: NdRange::new([m, n / wpt], [tile.rows, tile.cols / wpt]),
                    work_per_thread: [1, wpt],
                    scratch_bytes,
                }
            }
        };
        Ok(geometry)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "naive" => Ok(Strategy::Naive),
            "local-tiled" => Ok(Strategy::LocalTiled),
            "reduction-tiled" => Ok(Strategy::ReductionTiled),
            _ => Self::from_version(s)
                .or_else(|| Self::parse_kernel_name(s).map(|(_, strategy)| strategy))
                .ok_or_else(|| DispatchError::UnknownStrategy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_spelling() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.name().parse::<Strategy>().unwrap(), strategy);
            assert_eq!(format!("v{}", strategy.version()).parse::<Strategy>().unwrap(), strategy);
            assert_eq!(
                strategy.kernel_name(ElementType::F32).parse::<Strategy>().unwrap(),
                strategy
            );
        }
        assert_eq!(" naive ".parse::<Strategy>().unwrap(), Strategy::Naive);
    }

    #[test]
    fn unknown_name_is_an_error() {
        for name in ["", "v3", "tiled", "f16_product_v0", "f32_product_v5", "f32_sum_v0"] {
            assert!(matches!(
                name.parse::<Strategy>(),
                Err(DispatchError::UnknownStrategy(_))
            ), "{name}");
        }
    }

    #[test]
    fn kernel_names_follow_element_prefix() {
        assert_eq!(Strategy::Naive.kernel_name(ElementType::F32), "f32_product_v0");
        assert_eq!(Strategy::ReductionTiled.kernel_name(ElementType::F64), "f64_product_v2");
        assert_eq!(
            Strategy::parse_kernel_name("f64_product_v1"),
            Some((ElementType::F64, Strategy::LocalTiled))
        );
    }

    #[test]
    fn naive_geometry_uses_tile_as_local() {
        let g = Strategy::Naive
            .geometry(Tile::new(2, 4), (4, 3), (3, 8), ElementType::F32)
            .unwrap();
        assert_eq!(g.range, NdRange::new([4, 8], [2, 4]));
        assert_eq!(g.work_per_thread, [1, 1]);
        assert_eq!(g.scratch_bytes, None);
    }

    #[test]
    fn local_tiled_geometry_reserves_scratch() {
        let g = Strategy::LocalTiled
            .geometry(Tile::square(4), (16, 16), (16, 16), ElementType::F64)
            .unwrap();
        assert_eq!(g.range, NdRange::new([16, 16], [4, 4]));
        assert_eq!(g.scratch_bytes, Some(4 * 4 * 8));
    }

    #[test]
    fn reduction_geometry_divides_columns() {
        let g = Strategy::ReductionTiled
            .geometry(Tile::square(4), (16, 8), (8, 16), ElementType::F32)
            .unwrap();
        assert_eq!(g.range, NdRange::new([16, 4], [4, 1]));
        assert_eq!(g.work_per_thread, [1, 4]);
        assert_eq!(g.scratch_bytes, Some(64));
        assert!(g.range.is_aligned());
    }

    #[test]
    fn unaligned_tiles_are_rejected() {
        let cases = [
            (Strategy::Naive, Tile::new(0, 2), (4, 4), (4, 4)),
            (Strategy::Naive, Tile::new(3, 2), (4, 4), (4, 4)),
            (Strategy::Naive, Tile::new(2, 3), (4, 4), (4, 4)),
            (Strategy::LocalTiled, Tile::new(2, 4), (4, 4), (4, 4)),
            (Strategy::LocalTiled, Tile::square(2), (4, 3), (3, 4)),
            (Strategy::ReductionTiled, Tile::square(4), (4, 6), (6, 4)),
        ];
        for (strategy, tile, a, b) in cases {
            let err = strategy.geometry(tile, a, b, ElementType::F32).unwrap_err();
            assert!(matches!(err, DispatchError::UnalignedTile { .. }), "{strategy} {tile}");
        }
    }

    #[test]
    fn naive_accepts_any_inner_dimension() {
        assert!(Strategy::Naive
            .geometry(Tile::square(2), (4, 3), (3, 4), ElementType::I32)
            .is_ok());
    }

    #[test]
    fn tile_serializes_as_object() {
        let tile: Tile = serde_json::from_str(r#"{"rows": 4, "cols": 2}"#).unwrap();
        assert_eq!(tile, Tile::new(4, 2));
        assert_eq!(Tile::default(), Tile::square(8));
        assert_eq!(tile.to_string(), "4x2");
    }
}
