// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix multiplication operation.

use super::{broadcast_offsets, f32_operand};
use crate::{Shape, Tensor, TensorError, TensorView};

/// Performs matrix multiplication with numpy `matmul` semantics.
///
/// The last two dimensions of each operand are multiplied; leading batch
/// dimensions broadcast. A 1-D `lhs` is treated as a row vector and a 1-D
/// `rhs` as a column vector, and the padded dimension is removed from the
/// result.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if inner or batch dimensions are
/// incompatible and [`TensorError::UnsupportedDType`] if either operand is
/// not `F32`.
pub fn matmul(lhs: &TensorView<'_>, rhs: &TensorView<'_>) -> Result<Tensor, TensorError> {
    let a = f32_operand("matmul", lhs)?;
    let b = f32_operand("matmul", rhs)?;

    let mismatch = || TensorError::ShapeMismatch {
        op: "matmul",
        lhs: lhs.shape().clone(),
        rhs: rhs.shape().clone(),
    };

    let lhs_dims = match lhs.shape().rank() {
        0 => return Err(mismatch()),
        1 => vec![1, lhs.shape().dims()[0]],
        _ => lhs.shape().dims().to_vec(),
    };
    let rhs_dims = match rhs.shape().rank() {
        0 => return Err(mismatch()),
        1 => vec![rhs.shape().dims()[0], 1],
        _ => rhs.shape().dims().to_vec(),
    };

    let (lb, lmat) = lhs_dims.split_at(lhs_dims.len() - 2);
    let (rb, rmat) = rhs_dims.split_at(rhs_dims.len() - 2);
    let (m, k) = (lmat[0], lmat[1]);
    let (k2, n) = (rmat[0], rmat[1]);
    if k != k2 {
        return Err(mismatch());
    }

    let lhs_batch = Shape::from(lb);
    let rhs_batch = Shape::from(rb);
    let batch = lhs_batch.broadcast(&rhs_batch).ok_or_else(mismatch)?;
    let lhs_offsets = broadcast_offsets(&lhs_batch, &batch);
    let rhs_offsets = broadcast_offsets(&rhs_batch, &batch);

    let mut out = vec![0.0f32; batch.num_elements() * m * n];
    for (bi, (&la, &ra)) in lhs_offsets.iter().zip(&rhs_offsets).enumerate() {
        matmul_f32_generic(
            &a[la * m * k..(la + 1) * m * k],
            &b[ra * k * n..(ra + 1) * k * n],
            &mut out[bi * m * n..(bi + 1) * m * n],
            m,
            k,
            n,
        );
    }

    let mut out_dims = batch.dims().to_vec();
    if lhs.shape().rank() > 1 {
        out_dims.push(m);
    }
    if rhs.shape().rank() > 1 {
        out_dims.push(n);
    }
    Tensor::from_f32(Shape::new(out_dims), &out)
}

/// Generic (portable) f32 matrix multiplication.
///
/// Uses ikj loop order so the inner loop is a saxpy over a row of `c`,
/// which is sequential in memory.
fn matmul_f32_generic(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    c.iter_mut().for_each(|x| *x = 0.0);
    for i in 0..m {
        for p in 0..k {
            let a_ip = a[i * k + p];
            let c_row = &mut c[i * n..(i + 1) * n];
            let b_row = &b[p * n..(p + 1) * n];
            for j in 0..n {
                c_row[j] += a_ip * b_row[j];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn test_matmul_2x3_times_3x2() {
        // A = [[1, 2, 3], [4, 5, 6]]
        // B = [[7, 8], [9, 10], [11, 12]]
        // C = [[58, 64], [139, 154]]
        let a = Tensor::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b =
            Tensor::from_f32(Shape::matrix(3, 2), &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();

        let c = matmul(&a.view(), &b.view()).unwrap();

        assert_eq!(c.shape(), &Shape::matrix(2, 2));
        assert_eq!(c.to_f32_vec().unwrap(), vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_batched_broadcast() {
        // [2, 1, 2] x [2, 1] -> [2, 1, 1]
        let a = Tensor::from_f32(Shape::new(vec![2, 1, 2]), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::from_f32(Shape::matrix(2, 1), &[1.0, 1.0]).unwrap();
        let c = matmul(&a.view(), &b.view()).unwrap();
        assert_eq!(c.shape(), &Shape::new(vec![2, 1, 1]));
        assert_eq!(c.to_f32_vec().unwrap(), vec![3.0, 7.0]);
    }

    #[test]
    fn test_matmul_vector_operands() {
        let v = Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap();
        let m = Tensor::from_f32(Shape::matrix(2, 2), &[1.0, 0.0, 0.0, 1.0]).unwrap();
        let c = matmul(&v.view(), &m.view()).unwrap();
        assert_eq!(c.shape(), &Shape::vector(2));
        assert_eq!(c.to_f32_vec().unwrap(), vec![1.0, 2.0]);

        let dot = matmul(&v.view(), &v.view()).unwrap();
        assert_eq!(dot.shape(), &Shape::scalar());
        assert_eq!(dot.to_f32_vec().unwrap(), vec![5.0]);
    }

    #[test]
    fn test_matmul_shape_mismatch() {
        let a = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        let b = Tensor::zeros(Shape::matrix(4, 2), DType::F32); // 4 != 3
        assert!(matches!(
            matmul(&a.view(), &b.view()),
            Err(TensorError::ShapeMismatch { op: "matmul", .. })
        ));
    }
}
