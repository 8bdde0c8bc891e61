/// A peak found on a one dimensional trace.
#[derive(Clone, Debug, PartialEq)]
pub struct Peak1D {
    pub index: usize,      // apex sample (middle of a flat plateau)
    pub apex: f64,         // value at the apex
    pub prominence: f64,
    pub left_base: usize,  // lowest point between apex and the next higher sample on the left
    pub right_base: usize,
    pub left_x: f64,       // fractional crossing at half prominence
    pub right_x: f64,
    pub width: f64,        // right_x - left_x, in samples
}

/// Indices of all local maxima; a flat plateau reports its middle sample.
///
/// Samples at the borders are never maxima.
pub fn local_maxima(y: &[f64]) -> Vec<usize> {
    let n = y.len();
    let mut maxima = Vec::new();
    if n < 3 { return maxima; }

    let i_max = n - 1;
    let mut i = 1;
    while i < i_max {
        if y[i - 1] < y[i] {
            let mut ahead = i + 1;
            while ahead < i_max && y[ahead] == y[i] {
                ahead += 1;
            }
            if y[ahead] < y[i] {
                maxima.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    maxima
}

/// Topographic prominence of the maximum at `peak` together with its bases.
fn prominence(y: &[f64], peak: usize) -> (f64, usize, usize) {
    let apex = y[peak];

    let mut left_min = apex;
    let mut left_base = peak;
    let mut i = peak;
    loop {
        if y[i] > apex { break; }
        if y[i] < left_min { left_min = y[i]; left_base = i; }
        if i == 0 { break; }
        i -= 1;
    }

    let mut right_min = apex;
    let mut right_base = peak;
    let mut i = peak;
    while i < y.len() && y[i] <= apex {
        if y[i] < right_min { right_min = y[i]; right_base = i; }
        i += 1;
    }

    (apex - left_min.max(right_min), left_base, right_base)
}

/// Width at half prominence with linearly interpolated crossings.
fn half_prominence_crossings(y: &[f64], peak: usize, prom: f64, left_base: usize, right_base: usize) -> (f64, f64) {
    let half = y[peak] - 0.5 * prom;

    let mut i = peak;
    while left_base < i && half < y[i] { i -= 1; }
    let mut left_x = i as f64;
    if y[i] < half && i + 1 < y.len() && y[i + 1] != y[i] {
        left_x += (half - y[i]) / (y[i + 1] - y[i]);
    }

    let mut i = peak;
    while i < right_base && half < y[i] { i += 1; }
    let mut right_x = i as f64;
    if y[i] < half && i > 0 && y[i - 1] != y[i] {
        right_x -= (half - y[i]) / (y[i - 1] - y[i]);
    }

    (left_x, right_x)
}

/// Find peaks on `y` by local-maximum and prominence analysis.
///
/// # Arguments
///
/// * `y` - the trace, must not contain NaN
/// * `height` - optional absolute floor the apex has to reach
/// * `min_prominence` - minimal topographic prominence
///
/// # Returns
///
/// Peaks ordered by index.
pub fn find_peaks(y: &[f64], height: Option<f64>, min_prominence: f64) -> Vec<Peak1D> {
    let mut peaks = Vec::new();

    for i in local_maxima(y) {
        let apex = y[i];
        if let Some(h) = height {
            if apex < h { continue; }
        }

        let (prom, left_base, right_base) = prominence(y, i);
        if prom < min_prominence { continue; }

        let (left_x, right_x) = half_prominence_crossings(y, i, prom, left_base, right_base);

        peaks.push(Peak1D {
            index: i,
            apex,
            prominence: prom,
            left_base,
            right_base,
            left_x,
            right_x,
            width: (right_x - left_x).max(0.0),
        });
    }

    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_maxima_plateau() {
        let y = vec![0.0, 1.0, 3.0, 3.0, 3.0, 1.0, 2.0, 0.0];
        assert_eq!(local_maxima(&y), vec![3, 6]);
    }

    #[test]
    fn test_find_peaks_prominence_and_width() {
        // triangle of height 10 on a flat floor of 0, half width 2 samples
        let y = vec![0.0, 0.0, 0.0, 5.0, 10.0, 5.0, 0.0, 0.0, 1.0, 0.0];
        let peaks = find_peaks(&y, None, 2.0);
        assert_eq!(peaks.len(), 1);

        let p = &peaks[0];
        assert_eq!(p.index, 4);
        assert!((p.prominence - 10.0).abs() < 1e-12);
        assert!((p.left_x - 3.0).abs() < 1e-12);
        assert!((p.right_x - 5.0).abs() < 1e-12);
        assert!((p.width - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_find_peaks_height_floor() {
        let y = vec![0.0, 4.0, 0.0, 8.0, 0.0];
        assert_eq!(find_peaks(&y, None, 1.0).len(), 2);
        let high = find_peaks(&y, Some(5.0), 1.0);
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].index, 3);
    }

    #[test]
    fn test_prominence_uses_higher_base() {
        // the small peak sits on the flank of the large one
        let y = vec![0.0, 10.0, 6.0, 7.0, 2.0, 0.0];
        let peaks = find_peaks(&y, None, 0.5);
        let small = peaks.iter().find(|p| p.index == 3).unwrap();
        assert!((small.prominence - 1.0).abs() < 1e-12);
    }
}
