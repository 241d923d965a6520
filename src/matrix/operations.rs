//! Операции над матрицами: инициализация и сверка результатов

use tracing::{info, warn};

use super::dense::Matrix;
use super::types::{Element, MatrixType};

/// Инициализирует матрицы A(m x k) и B(k x n) заданного типа
pub fn initialize_matrices<T: Element>(
    matrix_type: MatrixType,
    m: usize,
    k: usize,
    n: usize,
) -> (Matrix<T>, Matrix<T>) {
    let mut a = Matrix::new(m, k);
    let mut b = Matrix::new(k, n);
    match matrix_type {
        MatrixType::Sequential => {
            a.fill_ints();
            b.fill_ints();
        }
        MatrixType::Random { low, high, norm } => {
            let norm = T::from_i64(norm);
            a.fill_rand(low, high, norm);
            b.fill_rand(low, high, norm);
        }
        MatrixType::Identity => {
            a = Matrix::identity(m, k);
            b = Matrix::identity(k, n);
        }
    }
    (a, b)
}

/// Результат сравнения двух матриц
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Количество различающихся элементов
    pub mismatches: usize,
    /// Максимальная разница
    pub max_diff: f64,
    pub shape_matches: bool,
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        self.shape_matches && self.mismatches == 0
    }
}

/// Сравнивает результат ускорителя с эталоном с допуском `epsilon`
pub fn compare_results<T: Element>(result: &Matrix<T>, reference: &Matrix<T>, epsilon: f64) -> Comparison {
    if result.dims() != reference.dims() {
        return Comparison {
            mismatches: result.as_slice().len().max(reference.as_slice().len()),
            max_diff: f64::INFINITY,
            shape_matches: false,
        };
    }

    let mut max_diff = 0.0f64;
    let mut mismatches = 0;
    for (&x, &y) in result.as_slice().iter().zip(reference.as_slice()) {
        let diff = (x.to_f64() - y.to_f64()).abs();
        // NaN никогда не проходит сравнение
        if !(diff <= epsilon) {
            mismatches += 1;
            max_diff = max_diff.max(diff);
        }
    }

    Comparison {
        mismatches,
        max_diff,
        shape_matches: true,
    }
}

/// Сверяет результаты всех стратегий с эталоном
///
/// Эталон: результат CPU, если он есть, иначе результат первого ядра
/// (ядро 0 в файле всегда наивная реализация).
pub fn equivalence_report<T: Element>(
    results: &[(String, Matrix<T>)],
    cpu: Option<&Matrix<T>>,
    epsilon: f64,
) -> Vec<(String, Comparison)> {
    let reference = match cpu.or_else(|| results.first().map(|(_, c)| c)) {
        Some(reference) => reference,
        None => return Vec::new(),
    };

    let report: Vec<(String, Comparison)> = results
        .iter()
        .map(|(name, c)| (name.clone(), compare_results(c, reference, epsilon)))
        .collect();

    for (name, cmp) in &report {
        if cmp.is_match() {
            info!(kernel = %name, "results match reference");
        } else {
            warn!(
                kernel = %name,
                mismatches = cmp.mismatches,
                max_diff = cmp.max_diff,
                "matrix inequivalence on kernel"
            );
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_matrices_have_requested_shapes() {
        let (a, b) = initialize_matrices::<f32>(MatrixType::Sequential, 2, 3, 4);
        assert_eq!(a.dims(), (2, 3));
        assert_eq!(b.dims(), (3, 4));
        assert_eq!(b.get(2, 3), 11.0);
    }

    #[test]
    fn random_matrices_are_normalized() {
        let (a, _) = initialize_matrices::<f64>(
            MatrixType::Random { low: 1, high: 10, norm: 10 },
            4,
            4,
            4,
        );
        assert!(a.as_slice().iter().all(|&x| x > 0.0 && x <= 1.0));
    }

    #[test]
    fn compare_counts_mismatches() {
        let a = Matrix::from_vec(1, 3, vec![1.0f32, 2.0, 3.0]).unwrap();
        let b = Matrix::from_vec(1, 3, vec![1.0f32, 2.5, 3.0]).unwrap();
        let cmp = compare_results(&a, &b, 1e-3);
        assert_eq!(cmp.mismatches, 1);
        assert!((cmp.max_diff - 0.5).abs() < 1e-9);
        assert!(!cmp.is_match());
        assert!(compare_results(&a, &a, 0.0).is_match());
    }

    #[test]
    fn compare_flags_shape_difference() {
        let a = Matrix::<f32>::new(2, 2);
        let b = Matrix::<f32>::new(1, 4);
        assert!(!compare_results(&a, &b, 1.0).shape_matches);
    }

    #[test]
    fn nan_is_a_mismatch() {
        let a = Matrix::from_vec(1, 1, vec![f32::NAN]).unwrap();
        let b = Matrix::from_vec(1, 1, vec![0.0f32]).unwrap();
        assert_eq!(compare_results(&a, &b, 1.0).mismatches, 1);
    }

    #[test]
    fn report_falls_back_to_first_kernel() {
        let good = Matrix::from_vec(1, 2, vec![1, 2]).unwrap();
        let bad = Matrix::from_vec(1, 2, vec![1, 3]).unwrap();
        let results = vec![
            ("i32_product_v0".to_string(), good.clone()),
            ("i32_product_v1".to_string(), bad),
        ];
        let report = equivalence_report(&results, None, 0.0);
        assert!(report[0].1.is_match());
        assert!(!report[1].1.is_match());
        assert!(equivalence_report::<i32>(&[], None, 0.0).is_empty());
    }
}
