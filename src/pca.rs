use nalgebra::DMatrix;

/// Projects a row-per-contig matrix onto its first two principal components
/// and rescales each component to `[0, 1]`.
///
/// The projection is the usual one: centre every column, take the SVD of the
/// centred matrix, and keep the two leading score columns `u_i * sigma_i`.
/// Degenerate shapes are handled without fuss: zero rows give an empty
/// result, a component that is constant after centring stays all-zero, and a
/// matrix with fewer than two columns pads the missing component with zeros.
pub fn project_2d(rows: &[Vec<f64>]) -> Vec<(f64, f64)> {
    let nrows = rows.len();
    if nrows == 0 {
        return Vec::new();
    }
    let ncols = rows[0].len();
    if ncols == 0 {
        return vec![(0.0, 0.0); nrows];
    }

    let mut m = DMatrix::from_fn(nrows, ncols, |r, c| rows[r][c]);
    for c in 0..ncols {
        let mean = m.column(c).sum() / nrows as f64;
        for r in 0..nrows {
            m[(r, c)] -= mean;
        }
    }

    // Singular values come back sorted descending, so the first two score
    // columns are the two principal components.
    let svd = m.svd(true, false);
    let u = svd.u.expect("svd was asked for u");
    let s = &svd.singular_values;

    let mut pc1: Vec<f64> = (0..nrows).map(|r| u[(r, 0)] * s[0]).collect();
    let mut pc2: Vec<f64> = if s.len() > 1 {
        (0..nrows).map(|r| u[(r, 1)] * s[1]).collect()
    } else {
        vec![0.0; nrows]
    };

    rescale(&mut pc1);
    rescale(&mut pc2);
    pc1.into_iter().zip(pc2).collect()
}

// Shift to zero minimum, then divide by the new maximum. A constant
// component has nothing to stretch and is left at zero.
fn rescale(vals: &mut [f64]) {
    let min = vals.iter().cloned().fold(f64::INFINITY, f64::min);
    for v in vals.iter_mut() {
        *v -= min;
    }
    let max = vals.iter().cloned().fold(0.0_f64, f64::max);
    if max > 0.0 {
        for v in vals.iter_mut() {
            *v /= max;
        }
    } else {
        for v in vals.iter_mut() {
            *v = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matrix_gives_empty_projection() {
        assert!(project_2d(&[]).is_empty());
    }

    #[test]
    fn single_row_projects_to_origin() {
        let out = project_2d(&[vec![0.3, 0.7]]);
        assert_eq!(out, vec![(0.0, 0.0)]);
    }

    #[test]
    fn components_are_rescaled_to_unit_interval() {
        let rows = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.5, 0.5, 0.0],
        ];
        let out = project_2d(&rows);
        let pc1: Vec<f64> = out.iter().map(|p| p.0).collect();
        let pc2: Vec<f64> = out.iter().map(|p| p.1).collect();
        for v in pc1.iter().chain(pc2.iter()) {
            assert!((0.0..=1.0).contains(v), "value {v} out of range");
        }
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(pc1.iter().cloned().fold(f64::INFINITY, f64::min), 0.0));
        assert!(close(pc1.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 1.0));
        assert!(close(pc2.iter().cloned().fold(f64::INFINITY, f64::min), 0.0));
        assert!(close(pc2.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 1.0));
    }

    #[test]
    fn rank_one_data_leaves_second_component_flat() {
        // Two rows can only span one direction after centring.
        let out = project_2d(&[vec![0.0, 1.0], vec![1.0, 0.0]]);
        assert!(out.iter().all(|p| p.1 == 0.0));
        let pc1: Vec<f64> = out.iter().map(|p| p.0).collect();
        assert!(pc1.contains(&0.0) && pc1.contains(&1.0));
    }
}
