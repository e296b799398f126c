// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Data movement: tile and slice.
//!
//! Both kernels move raw elements and therefore accept any dtype.

use super::for_each_index;
use crate::{Shape, Tensor, TensorError, TensorView};

/// Repeats `input` `repeats[d]` times along every dimension `d`.
///
/// # Errors
/// `repeats` must hold one non-negative entry per dimension.
pub fn tile(input: &TensorView<'_>, repeats: &[i64]) -> Result<Tensor, TensorError> {
    let shape = input.shape();
    if repeats.len() != shape.rank() {
        return Err(TensorError::InvalidArgument {
            op: "tile",
            detail: format!(
                "{} repeats for a rank-{} input",
                repeats.len(),
                shape.rank()
            ),
        });
    }
    if let Some(r) = repeats.iter().find(|&&r| r < 0) {
        return Err(TensorError::InvalidArgument {
            op: "tile",
            detail: format!("negative repeat {r}"),
        });
    }

    let out_shape = Shape::new(
        shape
            .dims()
            .iter()
            .zip(repeats)
            .map(|(&d, &r)| d * r as usize)
            .collect(),
    );
    let in_strides = shape.strides();
    let elem = input.dtype().size_bytes();
    let src = input.as_bytes();

    let mut data = Vec::with_capacity(out_shape.size_bytes(input.dtype()));
    for_each_index(out_shape.dims(), |idx| {
        let off: usize = idx
            .iter()
            .zip(shape.dims())
            .zip(&in_strides)
            .map(|((&i, &d), &s)| (i % d) * s)
            .sum();
        data.extend_from_slice(&src[off * elem..(off + 1) * elem]);
    });
    Tensor::from_bytes(out_shape, input.dtype(), data)
}

/// Extracts a strided window of `input`.
///
/// `starts[i]`, `ends[i]` and `steps[i]` apply to dimension `axes[i]`. When
/// `axes` is `None` the entries address dimensions `0..starts.len()`; when
/// `steps` is `None` every step is 1. Negative indices count from the end
/// of the dimension and out-of-range indices are clamped, so a window that
/// lies outside the input yields an empty dimension rather than an error.
///
/// # Errors
/// Returns [`TensorError::InvalidArgument`] for mismatched argument lengths
/// or a zero step, and [`TensorError::AxisOutOfRange`] for a bad axis.
pub fn slice(
    input: &TensorView<'_>,
    starts: &[i64],
    ends: &[i64],
    axes: Option<&[i64]>,
    steps: Option<&[i64]>,
) -> Result<Tensor, TensorError> {
    let shape = input.shape();
    let rank = shape.rank();
    let default_axes: Vec<i64> = (0..starts.len() as i64).collect();
    let axes = axes.unwrap_or(&default_axes[..]);
    let ones = vec![1i64; starts.len()];
    let steps = steps.unwrap_or(&ones[..]);

    if ends.len() != starts.len() || axes.len() != starts.len() || steps.len() != starts.len() {
        return Err(TensorError::InvalidArgument {
            op: "slice",
            detail: format!(
                "starts/ends/axes/steps lengths differ ({}, {}, {}, {})",
                starts.len(),
                ends.len(),
                axes.len(),
                steps.len()
            ),
        });
    }

    // Per-dimension (start, step, count); untouched dimensions keep everything.
    let mut windows: Vec<(i64, i64, usize)> =
        shape.dims().iter().map(|&d| (0, 1, d)).collect();

    for i in 0..starts.len() {
        let axis = shape
            .normalize_axis(axes[i])
            .ok_or(TensorError::AxisOutOfRange {
                op: "slice",
                axis: axes[i],
                rank,
            })?;
        let step = steps[i];
        if step == 0 {
            return Err(TensorError::InvalidArgument {
                op: "slice",
                detail: format!("zero step on axis {axis}"),
            });
        }
        let dim = shape.dims()[axis] as i64;
        if dim == 0 {
            windows[axis] = (0, step, 0);
            continue;
        }
        let resolve = |v: i64| if v < 0 { v + dim } else { v };
        let (start, end) = if step > 0 {
            (
                resolve(starts[i]).clamp(0, dim),
                resolve(ends[i]).clamp(0, dim),
            )
        } else {
            (
                resolve(starts[i]).clamp(0, dim - 1),
                resolve(ends[i]).clamp(-1, dim - 1),
            )
        };
        let span = end - start;
        let count = if (step > 0 && span > 0) || (step < 0 && span < 0) {
            ((span.abs() + step.abs() - 1) / step.abs()) as usize
        } else {
            0
        };
        windows[axis] = (start, step, count);
    }

    let out_shape = Shape::new(windows.iter().map(|w| w.2).collect());
    let in_strides = shape.strides();
    let elem = input.dtype().size_bytes();
    let src = input.as_bytes();

    let mut data = Vec::with_capacity(out_shape.size_bytes(input.dtype()));
    for_each_index(out_shape.dims(), |idx| {
        let off: i64 = idx
            .iter()
            .zip(&windows)
            .zip(&in_strides)
            .map(|((&i, &(start, step, _)), &s)| (start + i as i64 * step) * s as i64)
            .sum();
        let off = off as usize;
        data.extend_from_slice(&src[off * elem..(off + 1) * elem]);
    });
    Tensor::from_bytes(out_shape, input.dtype(), data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Tensor {
        // [[0, 1, 2], [3, 4, 5]]
        Tensor::from_f32(Shape::matrix(2, 3), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap()
    }

    #[test]
    fn test_tile_2d() {
        let t = tile(&grid().view(), &[1, 2]).unwrap();
        assert_eq!(t.shape(), &Shape::matrix(2, 6));
        assert_eq!(
            t.to_f32_vec().unwrap(),
            vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 3.0, 4.0, 5.0]
        );
    }

    #[test]
    fn test_tile_integer_dtype() {
        let t = Tensor::from_i64(Shape::vector(2), &[7, 8]).unwrap();
        let r = tile(&t.view(), &[2]).unwrap();
        assert_eq!(r.to_i64_vec().unwrap(), vec![7, 8, 7, 8]);
    }

    #[test]
    fn test_tile_bad_repeats() {
        assert!(tile(&grid().view(), &[2]).is_err());
        assert!(tile(&grid().view(), &[1, -1]).is_err());
    }

    #[test]
    fn test_slice_columns() {
        let s = slice(&grid().view(), &[1], &[3], Some(&[1][..]), None).unwrap();
        assert_eq!(s.shape(), &Shape::matrix(2, 2));
        assert_eq!(s.to_f32_vec().unwrap(), vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_slice_negative_and_clamped() {
        // Last row, end far past the dimension.
        let s = slice(&grid().view(), &[-1], &[100], None, None).unwrap();
        assert_eq!(s.shape(), &Shape::matrix(1, 3));
        assert_eq!(s.to_f32_vec().unwrap(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_slice_reverse_step() {
        let s = slice(&grid().view(), &[-1], &[i64::MIN], Some(&[1][..]), Some(&[-1][..])).unwrap();
        assert_eq!(s.to_f32_vec().unwrap(), vec![2.0, 1.0, 0.0, 5.0, 4.0, 3.0]);
    }

    #[test]
    fn test_slice_empty_window() {
        let s = slice(&grid().view(), &[2], &[1], Some(&[1][..]), None).unwrap();
        assert_eq!(s.shape(), &Shape::matrix(2, 0));
        assert_eq!(s.size_bytes(), 0);
    }

    #[test]
    fn test_slice_zero_step() {
        assert!(matches!(
            slice(&grid().view(), &[0], &[1], None, Some(&[0][..])),
            Err(TensorError::InvalidArgument { op: "slice", .. })
        ));
    }
}
