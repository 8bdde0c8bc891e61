use std::fmt::Display;
use std::sync::OnceLock;

use bincode::{Decode, Encode};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::data::region::Region;

/// Per region, per frame, per peak `(lower, upper)` limits.
pub type TranslatedBounds = Vec<Vec<Vec<(f64, f64)>>>;

const GHZ: f64 = 1e9;

fn numeric_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").ok())
        .as_ref()
}

/// One side of a configured bound, as typed by the user.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum BoundToken {
    Min,
    Max,
    Inf,
    NegInf,
    /// A value in GHz.
    Value(f64),
    Invalid,
}

impl BoundToken {
    /// Case-insensitive parse, anything unrecognized becomes `Invalid`.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        match token.to_lowercase().as_str() {
            "min" => return BoundToken::Min,
            "max" => return BoundToken::Max,
            "inf" | "+inf" => return BoundToken::Inf,
            "-inf" => return BoundToken::NegInf,
            _ => {}
        }
        match numeric_pattern() {
            Some(pattern) if pattern.is_match(token) => token
                .parse::<f64>()
                .map(BoundToken::Value)
                .unwrap_or(BoundToken::Invalid),
            _ => BoundToken::Invalid,
        }
    }

    fn numeric(&self) -> Option<f64> {
        match self {
            BoundToken::Value(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for BoundToken {
    fn from(token: &str) -> Self {
        BoundToken::parse(token)
    }
}

impl Display for BoundToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundToken::Min => write!(f, "min"),
            BoundToken::Max => write!(f, "max"),
            BoundToken::Inf => write!(f, "Inf"),
            BoundToken::NegInf => write!(f, "-Inf"),
            BoundToken::Value(v) => write!(f, "{}", v),
            BoundToken::Invalid => write!(f, "invalid"),
        }
    }
}

/// Lower and upper token for one peak.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct BoundPair {
    pub lower: BoundToken,
    pub upper: BoundToken,
}

impl BoundPair {
    pub fn new(lower: &str, upper: &str) -> Self {
        BoundPair {
            lower: BoundToken::parse(lower),
            upper: BoundToken::parse(upper),
        }
    }

    fn tokens(&self) -> [BoundToken; 2] {
        [self.lower, self.upper]
    }

    /// Mixed regions are anti-Stokes when the finite values of the pair are
    /// negative on average.
    fn is_anti_stokes_peak(&self) -> bool {
        let values: Vec<f64> = self.tokens().iter().filter_map(|t| t.numeric()).collect();
        if values.is_empty() {
            return false;
        }
        let mean = values.iter().sum::<f64>() / (values.len() as f64);
        mean < 0.0
    }
}

/// Parse `(lower, upper)` string pairs.
pub fn parse_bounds<S: AsRef<str>>(pairs: &[(S, S)]) -> Vec<BoundPair> {
    pairs
        .iter()
        .map(|(lo, hi)| BoundPair::new(lo.as_ref(), hi.as_ref()))
        .collect()
}

fn nan_mean(a: f64, b: f64) -> f64 {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => 0.5 * (a + b),
        (false, true) => a,
        (true, false) => b,
        (true, true) => f64::NAN,
    }
}

fn sorted((a, b): (f64, f64)) -> (f64, f64) {
    if b < a { (b, a) } else { (a, b) }
}

fn frame_count(rayleigh: &[Vec<f64>]) -> Option<usize> {
    if rayleigh.len() < 2 {
        return None;
    }
    Some(rayleigh[0].len().min(rayleigh[1].len()))
}

/// Translate center bounds given in GHz relative to the Rayleigh peaks into
/// absolute positions on the frequency axis.
///
/// # Arguments
///
/// * `bounds` - one pair per fitted peak
/// * `regions` - the Brillouin regions
/// * `rayleigh` - fitted Rayleigh positions per Rayleigh region and frame;
///   the first two regions are the references
///
/// # Returns
///
/// Limits nested per region, frame and peak, or `None` when fewer than two
/// Rayleigh references are available.
pub fn translate_center_bounds(bounds: &[BoundPair], regions: &[Region], rayleigh: &[Vec<f64>]) -> Option<TranslatedBounds> {
    let frames = frame_count(rayleigh)?;

    let translated = regions
        .iter()
        .map(|region| {
            (0..frames)
                .map(|frame| {
                    let references = [rayleigh[0][frame], rayleigh[1][frame]];
                    let limit = nan_mean(references[0], references[1]);
                    let is_pure = (region.start >= limit) == (region.end >= limit);
                    let region_is_anti_stokes = region.mean() > limit;

                    bounds
                        .iter()
                        .map(|pair| {
                            let anti_stokes = if is_pure {
                                region_is_anti_stokes
                            } else {
                                pair.is_anti_stokes_peak()
                            };
                            let sign = if anti_stokes { -1.0 } else { 1.0 };
                            let edges = region.edges();
                            let reference = references[anti_stokes as usize];

                            let resolve = |token: BoundToken| match token {
                                BoundToken::Min => edges[anti_stokes as usize],
                                BoundToken::Max => edges[!anti_stokes as usize],
                                BoundToken::Inf => sign * f64::INFINITY,
                                BoundToken::NegInf => -sign * f64::INFINITY,
                                BoundToken::Value(v) => sign * v.abs() * GHZ + reference,
                                BoundToken::Invalid => f64::INFINITY,
                            };
                            sorted((resolve(pair.lower), resolve(pair.upper)))
                        })
                        .collect()
                })
                .collect()
        })
        .collect();

    Some(translated)
}

/// Translate FWHM bounds given in GHz into Hz.
///
/// `min` and `-Inf` become 0, `max` and `Inf` become infinity, anything
/// unparseable is infinity as well. Pairs keep their order.
pub fn translate_fwhm_bounds(bounds: &[BoundPair], regions: &[Region], rayleigh: &[Vec<f64>]) -> Option<TranslatedBounds> {
    let frames = frame_count(rayleigh)?;

    let resolve = |token: BoundToken| match token {
        BoundToken::Min | BoundToken::NegInf => 0.0,
        BoundToken::Max | BoundToken::Inf | BoundToken::Invalid => f64::INFINITY,
        BoundToken::Value(v) => v.abs() * GHZ,
    };
    let per_frame: Vec<(f64, f64)> = bounds
        .iter()
        .map(|pair| (resolve(pair.lower), resolve(pair.upper)))
        .collect();

    Some(vec![vec![per_frame; frames]; regions.len()])
}

#[cfg(test)]
mod tests {
    use super::*;

    // Rayleigh references at 0 and 15 GHz for two frames
    fn references() -> Vec<Vec<f64>> {
        vec![vec![0.0, 0.0], vec![15e9, 15e9]]
    }

    fn stokes_region() -> Region {
        Region::new(2e9, 7e9)
    }

    fn anti_stokes_region() -> Region {
        Region::new(9e9, 13e9)
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!(BoundToken::parse("MIN"), BoundToken::Min);
        assert_eq!(BoundToken::parse("Max"), BoundToken::Max);
        assert_eq!(BoundToken::parse("inf"), BoundToken::Inf);
        assert_eq!(BoundToken::parse("-INF"), BoundToken::NegInf);
        assert_eq!(BoundToken::parse(" 4.5 "), BoundToken::Value(4.5));
        assert_eq!(BoundToken::parse("-3"), BoundToken::Value(-3.0));
        assert_eq!(BoundToken::parse("1e-1"), BoundToken::Value(0.1));
        assert_eq!(BoundToken::parse("five"), BoundToken::Invalid);
        assert_eq!(BoundToken::parse("nan"), BoundToken::Invalid);
    }

    #[test]
    fn test_min_max_follow_polarity() {
        let bounds = parse_bounds(&[("min", "max")]);
        let regions = [stokes_region(), anti_stokes_region()];
        let t = translate_center_bounds(&bounds, &regions, &references()).unwrap();

        assert_eq!(t.len(), 2);
        assert_eq!(t[0].len(), 2);
        assert_eq!(t[0][1][0], (2e9, 7e9));
        assert_eq!(t[1][1][0], (9e9, 13e9));

        // a lone "min" resolves to the lower edge on the Stokes side and
        // to the upper edge on the anti-Stokes side
        let only_min = parse_bounds(&[("min", "inf")]);
        let t = translate_center_bounds(&only_min, &regions, &references()).unwrap();
        assert_eq!(t[0][0][0], (2e9, f64::INFINITY));
        assert_eq!(t[1][0][0], (f64::NEG_INFINITY, 13e9));
    }

    #[test]
    fn test_numeric_bounds_are_relative_to_rayleigh() {
        let bounds = parse_bounds(&[("3", "5"), ("5", "7")]);
        let regions = [stokes_region(), anti_stokes_region()];
        let t = translate_center_bounds(&bounds, &regions, &references()).unwrap();

        assert_eq!(t[0][0], vec![(3e9, 5e9), (5e9, 7e9)]);
        assert_eq!(t[1][0], vec![(10e9, 12e9), (8e9, 10e9)]);
        for region in &t {
            for frame in region {
                for &(lo, hi) in frame {
                    assert!(lo <= hi);
                }
            }
        }
    }

    #[test]
    fn test_mixed_region_uses_sign_of_values() {
        let bounds = parse_bounds(&[("-3", "-5"), ("3", "5"), ("min", "-Inf")]);
        let mixed = Region::new(2e9, 13e9);
        let t = translate_center_bounds(&bounds, &[mixed], &references()).unwrap();

        assert_eq!(t[0][0][0], (10e9, 12e9));
        assert_eq!(t[0][0][1], (3e9, 5e9));
        // no numeric value, treated as Stokes
        assert_eq!(t[0][0][2], (f64::NEG_INFINITY, 2e9));
    }

    #[test]
    fn test_mixed_region_averages_pair_values() {
        let bounds = parse_bounds(&[("-4", "2"), ("4", "-2"), ("-Inf", "-1")]);
        let mixed = Region::new(2e9, 13e9);
        let t = translate_center_bounds(&bounds, &[mixed], &references()).unwrap();

        // mean of -1 selects the anti-Stokes reference
        assert_eq!(t[0][0][0], (11e9, 13e9));
        // mean of 1 selects the Stokes reference
        assert_eq!(t[0][0][1], (2e9, 4e9));
        // only the finite value counts
        assert_eq!(t[0][0][2], (14e9, f64::INFINITY));
    }

    #[test]
    fn test_invalid_center_token_is_infinite() {
        let bounds = parse_bounds(&[("4", "bogus")]);
        let t = translate_center_bounds(&bounds, &[stokes_region()], &references()).unwrap();
        assert_eq!(t[0][0][0], (4e9, f64::INFINITY));
    }

    #[test]
    fn test_needs_two_references() {
        let bounds = parse_bounds(&[("min", "max")]);
        let single = vec![vec![0.0, 0.0]];
        assert!(translate_center_bounds(&bounds, &[stokes_region()], &single).is_none());
        assert!(translate_fwhm_bounds(&bounds, &[stokes_region()], &single).is_none());
    }

    #[test]
    fn test_fwhm_translation() {
        let bounds = parse_bounds(&[("min", "max"), ("0.1", "-0.5"), ("-Inf", "bogus")]);
        let t = translate_fwhm_bounds(&bounds, &[stokes_region(), anti_stokes_region()], &references())
            .unwrap();

        assert_eq!(t.len(), 2);
        assert_eq!(t[1].len(), 2);
        assert_eq!(
            t[0][0],
            vec![(0.0, f64::INFINITY), (1e8, 5e8), (0.0, f64::INFINITY)]
        );
    }
}
