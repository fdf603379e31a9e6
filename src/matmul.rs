//! Matrix products used by the dense layers.
//!
//! Everything funnels through one strided GEMM:
//! - default feature `matrixmultiply`: blocked, vectorized `sgemm`
//! - without it: a plain triple loop
//!
//! The three wrappers below cover the products a dense layer needs, with all matrices
//! stored row-major:
//! - forward:   `Y  = X  * W^T`  (`x_wt`)
//! - weights:   `dW = dY^T * X`  (`dyt_x`)
//! - inputs:    `dX = dY * W`    (`dy_w`)

/// `c[m x n] = alpha * a[m x k] * b[k x n] + beta * c`, with explicit row/column strides.
#[allow(clippy::too_many_arguments)]
#[inline]
fn gemm(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: (&[f32], usize, usize),
    b: (&[f32], usize, usize),
    beta: f32,
    c: (&mut [f32], usize, usize),
) {
    let (a, rsa, csa) = a;
    let (b, rsb, csb) = b;
    let (c, rsc, csc) = c;

    if m == 0 || n == 0 {
        return;
    }

    // The unsafe backend relies on these bounds.
    assert!(a.len() >= span(m, k, rsa, csa), "gemm: lhs buffer too small");
    assert!(b.len() >= span(k, n, rsb, csb), "gemm: rhs buffer too small");
    assert!(c.len() >= span(m, n, rsc, csc), "gemm: output buffer too small");

    #[cfg(feature = "matrixmultiply")]
    {
        // SAFETY: every strided view was bounds-checked against its buffer above.
        unsafe {
            matrixmultiply::sgemm(
                m,
                k,
                n,
                alpha,
                a.as_ptr(),
                rsa as isize,
                csa as isize,
                b.as_ptr(),
                rsb as isize,
                csb as isize,
                beta,
                c.as_mut_ptr(),
                rsc as isize,
                csc as isize,
            );
        }
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0_f32;
            for p in 0..k {
                acc = a[i * rsa + p * csa].mul_add(b[p * rsb + j * csb], acc);
            }
            let idx = i * rsc + j * csc;
            // beta == 0 must not read `c`: it may hold stale NaNs.
            c[idx] = if beta == 0.0 {
                alpha * acc
            } else {
                alpha * acc + beta * c[idx]
            };
        }
    }
}

/// Smallest buffer length addressed by a `rows x cols` strided view.
#[inline]
fn span(rows: usize, cols: usize, rs: usize, cs: usize) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        (rows - 1) * rs + (cols - 1) * cs + 1
    }
}

/// `y[batch x out] = x[batch x in] * w[out x in]^T`.
#[inline]
pub(crate) fn x_wt(
    batch: usize,
    in_dim: usize,
    out_dim: usize,
    x: &[f32],
    w: &[f32],
    y: &mut [f32],
) {
    gemm(
        batch,
        out_dim,
        in_dim,
        1.0,
        (x, in_dim, 1),
        (w, 1, in_dim),
        0.0,
        (y, out_dim, 1),
    );
}

/// `dw[out x in] = dy[batch x out]^T * x[batch x in]`.
#[inline]
pub(crate) fn dyt_x(
    batch: usize,
    in_dim: usize,
    out_dim: usize,
    dy: &[f32],
    x: &[f32],
    dw: &mut [f32],
) {
    if batch == 0 {
        dw.fill(0.0);
        return;
    }
    gemm(
        out_dim,
        in_dim,
        batch,
        1.0,
        (dy, 1, out_dim),
        (x, in_dim, 1),
        0.0,
        (dw, in_dim, 1),
    );
}

/// `dx[batch x in] = dy[batch x out] * w[out x in]`.
#[inline]
pub(crate) fn dy_w(
    batch: usize,
    in_dim: usize,
    out_dim: usize,
    dy: &[f32],
    w: &[f32],
    dx: &mut [f32],
) {
    gemm(
        batch,
        in_dim,
        out_dim,
        1.0,
        (dy, out_dim, 1),
        (w, in_dim, 1),
        0.0,
        (dx, in_dim, 1),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    // x: 2x3, w: 2x3 (out=2, in=3)
    const X: [f32; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    const W: [f32; 6] = [1.0, 0.0, -1.0, 0.5, 0.5, 0.5];

    #[test]
    fn forward_product_matches_hand_computation() {
        let mut y = [f32::NAN; 4];
        x_wt(2, 3, 2, &X, &W, &mut y);
        assert_eq!(y, [-2.0, 3.0, -2.0, 7.5]);
    }

    #[test]
    fn weight_gradient_product_matches_hand_computation() {
        let dy = [1.0_f32, 0.0, 0.0, 2.0];
        let mut dw = [f32::NAN; 6];
        dyt_x(2, 3, 2, &dy, &X, &mut dw);
        assert_eq!(dw, [1.0, 2.0, 3.0, 8.0, 10.0, 12.0]);
    }

    #[test]
    fn input_gradient_product_matches_hand_computation() {
        let dy = [1.0_f32, 2.0, 0.0, 1.0];
        let mut dx = [f32::NAN; 6];
        dy_w(2, 3, 2, &dy, &W, &mut dx);
        assert_eq!(dx, [2.0, 1.0, 0.0, 0.5, 0.5, 0.5]);
    }
}
