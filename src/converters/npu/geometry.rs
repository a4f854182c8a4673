//! Output geometry for transposed convolution.
//!
//! The accelerator's deconvolution primitive takes its output size as an explicit
//! operand, so it has to be computed here from the input/filter shapes and the
//! stride/dilation/padding attributes.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("`{attr}` must have exactly 2 elements, got {actual}")]
    AttributeLength { attr: &'static str, actual: usize },
    #[error("`{attr}` must be positive, got {values:?}")]
    NonPositive { attr: &'static str, values: Vec<i32> },
    #[error("paddings must have 2 or 4 elements, got {0}")]
    PaddingLength(usize),
    #[error("expected 4D {operand} shape, got {rank}D")]
    Rank { operand: &'static str, rank: usize },
    #[error("output size {size} on spatial axis {axis} is not positive")]
    NonPositiveOutput { axis: usize, size: i64 },
    #[error("output size {size} on axis {axis} does not fit in int32")]
    OutputOverflow { axis: usize, size: i64 },
    #[error("filter extent {size} on spatial axis {axis} does not fit in int32")]
    KernelOverflow { axis: usize, size: u32 },
}

/// Expands `[p_h, p_w]` to `[p_h, p_h, p_w, p_w]`; a 4-element
/// `[top, bottom, left, right]` vector passes through unchanged.
pub fn normalize_paddings(paddings: &[i32]) -> Result<[i32; 4], GeometryError> {
    match *paddings {
        [p0, p1] => Ok([p0, p0, p1, p1]),
        [top, bottom, left, right] => Ok([top, bottom, left, right]),
        _ => Err(GeometryError::PaddingLength(paddings.len())),
    }
}

fn pair(attr: &'static str, values: &[i32]) -> Result<[i32; 2], GeometryError> {
    let pair: [i32; 2] = values
        .try_into()
        .map_err(|_| GeometryError::AttributeLength {
            attr,
            actual: values.len(),
        })?;
    if pair.iter().any(|&v| v <= 0) {
        return Err(GeometryError::NonPositive {
            attr,
            values: values.to_vec(),
        });
    }
    Ok(pair)
}

/// Validated transposed-convolution attributes with padding in 4-element form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvTransposeParams {
    pub strides: [i32; 2],
    pub dilations: [i32; 2],
    pub paddings: [i32; 4],
    pub groups: i32,
}

impl ConvTransposeParams {
    pub fn new(
        strides: &[i32],
        dilations: &[i32],
        paddings: &[i32],
        groups: i32,
    ) -> Result<Self, GeometryError> {
        let strides = pair("strides", strides)?;
        let dilations = pair("dilations", dilations)?;
        let paddings = normalize_paddings(paddings)?;
        if groups <= 0 {
            return Err(GeometryError::NonPositive {
                attr: "groups",
                values: vec![groups],
            });
        }
        Ok(Self {
            strides,
            dilations,
            paddings,
            groups,
        })
    }

    /// Leading padding of the pair for spatial axis `axis` (top for H, left for W).
    pub fn leading_padding(&self, axis: usize) -> i32 {
        self.paddings[2 * axis]
    }
}

fn rank4(operand: &'static str, dims: &[u32]) -> Result<[u32; 4], GeometryError> {
    dims.try_into().map_err(|_| GeometryError::Rank {
        operand,
        rank: dims.len(),
    })
}

/// Output sizes `[batch, out_channels, out_h, out_w]` for an NCHW input and a
/// `[in_channels / groups, out_channels / groups, k_h, k_w]` filter.
///
/// Only the leading padding of each axis enters the formula, mirroring the
/// accelerator's own size computation. Trailing padding is ignored here.
pub fn resolve_output_sizes(
    input_dims: &[u32],
    filter_dims: &[u32],
    params: &ConvTransposeParams,
) -> Result<[i32; 4], GeometryError> {
    let input = rank4("input", input_dims)?;
    let filter = rank4("filter", filter_dims)?;

    let mut sizes = [0i64; 4];
    sizes[0] = input[0] as i64;
    sizes[1] = filter[1] as i64 * params.groups as i64;
    for axis in 0..2 {
        let kernel_extent =
            params.dilations[axis] as i64 * (filter[axis + 2] as i64 - 1) + 1;
        let size = (input[axis + 2] as i64 - 1) * params.strides[axis] as i64 + kernel_extent
            - 2 * params.leading_padding(axis) as i64;
        if size <= 0 {
            return Err(GeometryError::NonPositiveOutput { axis, size });
        }
        sizes[axis + 2] = size;
    }

    let mut out = [0i32; 4];
    for (axis, (slot, size)) in out.iter_mut().zip(sizes).enumerate() {
        *slot = i32::try_from(size).map_err(|_| GeometryError::OutputOverflow { axis, size })?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(stride: i32, dilation: i32, paddings: &[i32], groups: i32) -> ConvTransposeParams {
        ConvTransposeParams::new(&[stride, stride], &[dilation, dilation], paddings, groups)
            .unwrap()
    }

    #[test]
    fn normalizes_two_element_paddings() {
        assert_eq!(normalize_paddings(&[1, 2]).unwrap(), [1, 1, 2, 2]);
        assert_eq!(normalize_paddings(&[0, 0]).unwrap(), [0, 0, 0, 0]);
    }

    #[test]
    fn four_element_paddings_pass_through() {
        assert_eq!(normalize_paddings(&[1, 0, 1, 0]).unwrap(), [1, 0, 1, 0]);
        assert_eq!(normalize_paddings(&[3, 2, 1, 0]).unwrap(), [3, 2, 1, 0]);
    }

    #[test]
    fn rejects_other_padding_lengths() {
        for len in [0usize, 1, 3, 5, 8] {
            let paddings = vec![1; len];
            assert_eq!(
                normalize_paddings(&paddings).unwrap_err(),
                GeometryError::PaddingLength(len)
            );
        }
    }

    #[test]
    fn rejects_bad_stride_and_dilation_lengths() {
        assert_eq!(
            ConvTransposeParams::new(&[2, 2, 2], &[1, 1], &[0, 0], 1).unwrap_err(),
            GeometryError::AttributeLength {
                attr: "strides",
                actual: 3
            }
        );
        assert_eq!(
            ConvTransposeParams::new(&[2, 2], &[1], &[0, 0], 1).unwrap_err(),
            GeometryError::AttributeLength {
                attr: "dilations",
                actual: 1
            }
        );
        assert!(matches!(
            ConvTransposeParams::new(&[0, 2], &[1, 1], &[0, 0], 1).unwrap_err(),
            GeometryError::NonPositive { attr: "strides", .. }
        ));
        assert!(matches!(
            ConvTransposeParams::new(&[1, 1], &[1, 1], &[0, 0], 0).unwrap_err(),
            GeometryError::NonPositive { attr: "groups", .. }
        ));
    }

    #[test]
    fn resolves_reference_example() {
        let p = params(2, 1, &[1, 1], 1);
        assert_eq!(p.paddings, [1, 1, 1, 1]);
        let sizes = resolve_output_sizes(&[1, 4, 8, 8], &[4, 8, 3, 3], &p).unwrap();
        assert_eq!(sizes, [1, 8, 15, 15]);
    }

    #[test]
    fn asymmetric_paddings_only_use_leading_value() {
        // [top=1, bottom=0, left=1, right=0]: the trailing zeros do not enter the formula,
        // so the result matches symmetric padding of 1.
        let p = params(2, 1, &[1, 0, 1, 0], 1);
        assert_eq!(p.paddings, [1, 0, 1, 0]);
        let sizes = resolve_output_sizes(&[1, 4, 8, 8], &[4, 8, 3, 3], &p).unwrap();
        assert_eq!(sizes, [1, 8, 15, 15]);

        let symmetric = params(2, 1, &[1, 1], 1);
        assert_eq!(
            resolve_output_sizes(&[1, 4, 8, 8], &[4, 8, 3, 3], &symmetric).unwrap(),
            sizes
        );
    }

    #[test]
    fn per_axis_paddings_apply_to_their_axis() {
        let p = params(1, 1, &[0, 2], 1);
        let sizes = resolve_output_sizes(&[1, 1, 5, 5], &[1, 1, 5, 5], &p).unwrap();
        // h: (5-1) + 5 - 0 = 9, w: (5-1) + 5 - 4 = 5
        assert_eq!(sizes, [1, 1, 9, 5]);
    }

    #[test]
    fn groups_multiply_filter_output_channels() {
        let p = params(1, 1, &[0, 0], 4);
        let sizes = resolve_output_sizes(&[2, 8, 4, 4], &[2, 3, 1, 1], &p).unwrap();
        assert_eq!(sizes, [2, 12, 4, 4]);
    }

    #[test]
    fn dilation_extends_kernel() {
        let p = params(1, 2, &[0, 0], 1);
        // kernel_extent = 2 * (3 - 1) + 1 = 5
        let sizes = resolve_output_sizes(&[1, 1, 4, 4], &[1, 1, 3, 3], &p).unwrap();
        assert_eq!(sizes, [1, 1, 8, 8]);
    }

    #[test]
    fn inverts_forward_convolution() {
        for stride in 1..=3 {
            for kernel in 1..=5u32 {
                for pad in 0..kernel as i32 {
                    for spatial in 1..=20i32 {
                        let span = spatial + 2 * pad - kernel as i32;
                        if span < 0 || span % stride != 0 {
                            continue;
                        }
                        let forward = span / stride + 1;
                        let p = params(stride, 1, &[pad, pad], 1);
                        let sizes = resolve_output_sizes(
                            &[1, 1, forward as u32, forward as u32],
                            &[1, 1, kernel, kernel],
                            &p,
                        )
                        .unwrap();
                        assert_eq!(
                            sizes[2], spatial,
                            "stride={stride} kernel={kernel} pad={pad} forward={forward}"
                        );
                        assert_eq!(sizes[3], spatial);
                    }
                }
            }
        }
    }

    #[test]
    fn rejects_non_4d_shapes() {
        let p = params(1, 1, &[0, 0], 1);
        assert_eq!(
            resolve_output_sizes(&[4, 8, 8], &[4, 8, 3, 3], &p).unwrap_err(),
            GeometryError::Rank {
                operand: "input",
                rank: 3
            }
        );
        assert_eq!(
            resolve_output_sizes(&[1, 4, 8, 8], &[4, 8, 3], &p).unwrap_err(),
            GeometryError::Rank {
                operand: "filter",
                rank: 3
            }
        );
    }

    #[test]
    fn rejects_non_positive_output() {
        let p = params(1, 1, &[3, 3], 1);
        assert_eq!(
            resolve_output_sizes(&[1, 1, 1, 1], &[1, 1, 3, 3], &p).unwrap_err(),
            GeometryError::NonPositiveOutput { axis: 0, size: -3 }
        );
    }
}
