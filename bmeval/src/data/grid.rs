use crate::error::GridError;

/// Number of grid points of a scan.
pub fn grid_size(resolution: [usize; 3]) -> usize {
    resolution.iter().product()
}

/// Linear index of grid point `(x, y, z)`: `z·(X·Y) + y·X + x`.
#[inline]
pub fn linear_index(resolution: [usize; 3], x: usize, y: usize, z: usize) -> usize {
    z * (resolution[0] * resolution[1]) + y * resolution[0] + x
}

/// Grid indices of linear index `index`, no range check.
#[inline]
pub fn indices_from_linear(resolution: [usize; 3], index: usize) -> (usize, usize, usize) {
    let plane = resolution[0] * resolution[1];
    let z = index / plane;
    let y = (index % plane) / resolution[0];
    let x = index % resolution[0];
    (x, y, z)
}

/// Image key of grid point `(x, y, z)`.
///
/// # Example
///
/// ```rust
/// # use bmeval::data::grid::key_from_indices;
/// assert_eq!(key_from_indices([3, 2, 2], 1, 1, 1).unwrap(), "10");
/// assert!(key_from_indices([3, 2, 2], 3, 0, 0).is_err());
/// ```
pub fn key_from_indices(resolution: [usize; 3], x: usize, y: usize, z: usize) -> Result<String, GridError> {
    for (axis, index, bound) in [('x', x, resolution[0]), ('y', y, resolution[1]), ('z', z, resolution[2])] {
        if index >= bound {
            return Err(GridError::IndexOutOfRange { axis, index, bound });
        }
    }
    Ok(linear_index(resolution, x, y, z).to_string())
}

/// Grid indices of an image key, inverse of [`key_from_indices`].
pub fn indices_from_key(resolution: [usize; 3], key: &str) -> Result<(usize, usize, usize), GridError> {
    let index: usize = key
        .trim()
        .parse()
        .map_err(|_| GridError::InvalidKey(key.to_string()))?;
    if index >= grid_size(resolution) {
        return Err(GridError::InvalidKey(key.to_string()));
    }
    Ok(indices_from_linear(resolution, index))
}
