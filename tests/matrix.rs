//! Свойства CPU алгебры

use opencl_mmul::matrix::Matrix;
use proptest::prelude::*;

/// Квадратная матрица с диагональным преобладанием: LU без выбора
/// ведущего элемента на ней устойчиво
fn dominant_matrix() -> impl Strategy<Value = Matrix<f64>> {
    (1usize..6).prop_flat_map(|n| {
        prop::collection::vec(-1.0f64..1.0, n * n).prop_map(move |mut data| {
            for i in 0..n {
                data[i * n + i] += (n + 1) as f64;
            }
            Matrix::from_vec(n, n, data).unwrap()
        })
    })
}

proptest! {
    #[test]
    fn det_is_transpose_invariant(a in dominant_matrix()) {
        let det = a.det();
        let det_t = a.transpose().det();
        prop_assert!((det - det_t).abs() <= 1e-9 * det.abs().max(1.0), "{det} vs {det_t}");
    }

    #[test]
    fn product_with_inverse_is_identity(a in dominant_matrix()) {
        let n = a.rows();
        let i = a.product(&a.inv()).unwrap();
        prop_assert!(i.approx_eq(&Matrix::identity(n, n), 1e-9), "{i}");
    }

    #[test]
    fn double_transpose_is_identity(m in 1usize..10, n in 1usize..10) {
        let mut a = Matrix::<i32>::new(m, n);
        a.fill_ints();
        prop_assert_eq!(a.get(m - 1, n - 1), (m * n - 1) as i32);
        prop_assert_eq!(a.transpose().transpose(), a);
    }

    #[test]
    fn product_distributes_over_addition(
        a in prop::collection::vec(-20i32..20, 6),
        b in prop::collection::vec(-20i32..20, 6),
        c in prop::collection::vec(-20i32..20, 6),
    ) {
        let a = Matrix::from_vec(2, 3, a).unwrap();
        let b = Matrix::from_vec(3, 2, b).unwrap();
        let c = Matrix::from_vec(3, 2, c).unwrap();
        let left = a.product(&(&b + &c)).unwrap();
        let right = &a.product(&b).unwrap() + &a.product(&c).unwrap();
        prop_assert_eq!(left, right);
    }
}

#[test]
fn singular_matrix_gives_non_finite_inverse() {
    let a = Matrix::from_vec(2, 2, vec![1.0f64, 2.0, 2.0, 4.0]).unwrap();
    assert_eq!(a.det(), 0.0);
    assert!(a.inv().as_slice().iter().any(|x| !x.is_finite()));
}

#[test]
fn row_and_column_updates() {
    let mut a = Matrix::<i32>::new(2, 3);
    a.update_row(0, &[1, 2, 3]).unwrap();
    a.update_col(2, &[7, 8]).unwrap();
    assert_eq!(a.as_slice(), &[1, 2, 7, 0, 0, 8]);
    assert!(a.update_row(0, &[1, 2]).is_err());
    assert_eq!(a.swap_row(0, 1).as_slice(), &[0, 0, 8, 1, 2, 7]);
}
