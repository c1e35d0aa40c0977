/*!
Cosine similarity over `ndarray` views.

Every entry point accepts rank-1 or rank-2 input. A single vector is reshaped
into a one-row batch first, so `cosine_similarity(v, w)` and
`cosine_similarity(batch_a, batch_b)` share one code path and always return
an `(rows_a, rows_b)` matrix. Rows with zero norm score 0.0 against everything.
*/

use ndarray::{s, Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Dimension, Ix1, Ix2};

use crate::error::{GraphError, Result};

/// View rank-1 input as a single-row matrix and pass rank-2 input through.
///
/// # Errors
///
/// `GraphError::Shape` for any other rank.
pub fn as_batch<S, D>(x: &ArrayBase<S, D>) -> Result<ArrayView2<'_, f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let shape_err = |e: ndarray::ShapeError| GraphError::Shape(e.to_string());
    match x.ndim() {
        1 => Ok(x
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(shape_err)?
            .insert_axis(Axis(0))),
        2 => x.view().into_dimensionality::<Ix2>().map_err(shape_err),
        n => Err(GraphError::Shape(format!("expected rank 1 or 2, got rank {n}"))),
    }
}

/// L2 norm of every row.
pub fn row_norms(x: &ArrayView2<'_, f32>) -> Array1<f32> {
    x.map_axis(Axis(1), |row| row.dot(&row).sqrt())
}

/// Copy of `x` with each row scaled to unit length; zero rows stay zero.
pub fn normalize_rows(x: &ArrayView2<'_, f32>) -> Array2<f32> {
    let mut out = x.to_owned();
    for (mut row, norm) in out.outer_iter_mut().zip(row_norms(x).iter()) {
        if *norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
    out
}

/// Cosine similarity between every row of `a` and every row of `b`.
///
/// # Returns
///
/// An `(rows_a, rows_b)` matrix. Two single vectors give a `1 x 1` matrix.
///
/// # Errors
///
/// `GraphError::Shape` when either input is not rank 1/2 or the widths differ.
pub fn cosine_similarity<S1, D1, S2, D2>(
    a: &ArrayBase<S1, D1>,
    b: &ArrayBase<S2, D2>,
) -> Result<Array2<f32>>
where
    S1: Data<Elem = f32>,
    D1: Dimension,
    S2: Data<Elem = f32>,
    D2: Dimension,
{
    let a = as_batch(a)?;
    let b = as_batch(b)?;
    if a.ncols() != b.ncols() {
        return Err(GraphError::Shape(format!(
            "vector widths differ: {} vs {}",
            a.ncols(),
            b.ncols()
        )));
    }
    let an = normalize_rows(&a);
    let bn = normalize_rows(&b);
    Ok(an.dot(&bn.t()))
}

/// Cosine similarity of two plain slices.
pub fn cosine_pair(a: &[f32], b: &[f32]) -> Result<f32> {
    let sim = cosine_similarity(&ArrayView1::from(a), &ArrayView1::from(b))?;
    Ok(sim[(0, 0)])
}

/// Stack equal-length vectors into an `(n, d)` matrix.
///
/// # Errors
///
/// `GraphError::Shape` when the vectors do not all have the same length.
pub fn stack_rows(rows: &[&[f32]]) -> Result<Array2<f32>> {
    let d = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut mat = Array2::<f32>::zeros((rows.len(), d));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != d {
            return Err(GraphError::Shape(format!(
                "row {i} has width {}, expected {d}",
                row.len()
            )));
        }
        mat.slice_mut(s![i, ..]).assign(&ArrayView1::from(*row));
    }
    Ok(mat)
}

/// Pairwise cosine similarity matrix `(n, n)` for the rows of `x`.
///
/// Only the upper triangle is computed (rows in parallel) and then mirrored, so
/// the result is exactly symmetric.
pub fn cosine_similarity_matrix(x: &ArrayView2<'_, f32>) -> Array2<f32> {
    use rayon::prelude::*;

    let n = x.nrows();
    let norms = row_norms(x);

    let upper_tri: Vec<Vec<f32>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let vi = x.row(i);
            (i..n)
                .map(|j| {
                    let denom = norms[i] * norms[j];
                    if denom == 0.0 {
                        0.0
                    } else {
                        vi.dot(&x.row(j)) / denom
                    }
                })
                .collect()
        })
        .collect();

    let mut sim = Array2::<f32>::zeros((n, n));
    for (i, row) in upper_tri.iter().enumerate() {
        for (offset, &val) in row.iter().enumerate() {
            let j = i + offset;
            sim[(i, j)] = val;
            sim[(j, i)] = val;
        }
    }
    sim
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array3};

    #[test]
    fn rank1_and_rank2_inputs_agree() {
        let v = arr1(&[1.0_f32, 2.0, 3.0]);
        let w = arr1(&[3.0_f32, 2.0, 1.0]);
        let single = cosine_similarity(&v, &w).unwrap();
        let batch = cosine_similarity(&arr2(&[[1.0_f32, 2.0, 3.0]]), &arr2(&[[3.0_f32, 2.0, 1.0]]))
            .unwrap();
        assert_eq!(single.shape(), &[1, 1]);
        assert!((single[(0, 0)] - batch[(0, 0)]).abs() < 1e-6);
        assert!((single[(0, 0)] - 10.0 / 14.0).abs() < 1e-6);
    }

    #[test]
    fn mixed_rank_gives_row_of_scores() {
        let q = arr1(&[1.0_f32, 0.0]);
        let batch = arr2(&[[1.0_f32, 0.0], [0.0, 1.0], [0.8, 0.6]]);
        let sim = cosine_similarity(&q, &batch).unwrap();
        assert_eq!(sim.shape(), &[1, 3]);
        assert!((sim[(0, 0)] - 1.0).abs() < 1e-6);
        assert!(sim[(0, 1)].abs() < 1e-6);
        assert!((sim[(0, 2)] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_pair(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), 0.0);
    }

    #[test]
    fn width_mismatch_and_rank3_are_errors() {
        assert!(cosine_pair(&[1.0, 0.0], &[1.0, 0.0, 0.0]).is_err());
        let cube = Array3::<f32>::zeros((2, 2, 2));
        assert!(as_batch(&cube).is_err());
    }

    #[test]
    fn pairwise_matrix_is_symmetric() {
        let x = arr2(&[[0.3_f32, -1.2, 4.0], [2.2, 0.1, -0.5], [0.0, 0.0, 0.0]]);
        let sim = cosine_similarity_matrix(&x.view());
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(sim[(i, j)], sim[(j, i)]);
            }
        }
        assert!((sim[(0, 0)] - 1.0).abs() < 1e-6);
        assert_eq!(sim[(2, 2)], 0.0);
        assert!((cosine_pair(&[0.3, -1.2, 4.0], &[2.2, 0.1, -0.5]).unwrap() - sim[(0, 1)]).abs() < 1e-5);
    }

    #[test]
    fn stack_rows_rejects_ragged_input() {
        let a = [1.0_f32, 2.0];
        let b = [1.0_f32];
        assert!(stack_rows(&[&a, &b]).is_err());
        assert_eq!(stack_rows(&[&a, &a]).unwrap().shape(), &[2, 2]);
    }
}
