//! # High/Low Classification
//!
//! The prediction series from upstream lists turning points without saying which
//! are highs and which are lows. Each point is labelled by comparing it with one
//! neighbour: the first point with the second, every later point with the one
//! before it.
//!
//! ## Ties
//! Equal neighbouring levels are not meaningful turning points and the upstream
//! never produces them in practice. They still get a label:
//! - first point equal to the second is `High` (it is not lower)
//! - any later point equal to its predecessor is `Low` (it is not higher)

use crate::{ClassifiedExtremum, RawObservation, TideError, TideKind};

/// Label every observation as a high or a low, preserving order.
///
/// Returns [`TideError::InsufficientData`] for fewer than two points, since a
/// lone point has nothing to compare against.
pub fn classify(points: &[RawObservation]) -> Result<Vec<ClassifiedExtremum>, TideError> {
    if points.len() < 2 {
        return Err(TideError::InsufficientData {
            needed: 2,
            got: points.len(),
        });
    }

    let first_kind = if points[0].level_meters < points[1].level_meters {
        TideKind::Low
    } else {
        TideKind::High
    };

    let rest = points.windows(2).map(|pair| ClassifiedExtremum {
        observation: pair[1],
        kind: if pair[1].level_meters > pair[0].level_meters {
            TideKind::High
        } else {
            TideKind::Low
        },
    });

    Ok(std::iter::once(ClassifiedExtremum {
        observation: points[0],
        kind: first_kind,
    })
    .chain(rest)
    .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series(levels: &[f64]) -> Vec<RawObservation> {
        let start = Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap();
        levels
            .iter()
            .enumerate()
            .map(|(i, &level_meters)| RawObservation {
                timestamp: start + Duration::minutes(372 * i as i64),
                level_meters,
            })
            .collect()
    }

    fn kinds(levels: &[f64]) -> Vec<TideKind> {
        classify(&series(levels))
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn test_alternating_series() {
        use TideKind::*;
        assert_eq!(kinds(&[1.2, 3.4, 0.8, 3.0]), vec![Low, High, Low, High]);
        assert_eq!(kinds(&[4.1, 0.5, 3.9]), vec![High, Low, High]);
    }

    #[test]
    fn test_order_and_values_preserved() {
        let input = series(&[2.0, 0.4, 2.5]);
        let out = classify(&input).unwrap();
        assert_eq!(out.len(), input.len());
        for (obs, extremum) in input.iter().zip(&out) {
            assert_eq!(*obs, extremum.observation);
        }
    }

    #[test]
    fn test_too_short_is_insufficient() {
        assert!(matches!(
            classify(&[]),
            Err(TideError::InsufficientData { needed: 2, got: 0 })
        ));
        assert!(matches!(
            classify(&series(&[1.0])),
            Err(TideError::InsufficientData { needed: 2, got: 1 })
        ));
    }

    /// Tie labels are a convention, not a tidal fact; pinned here so a change is deliberate.
    #[test]
    fn test_tie_labels_are_pinned() {
        use TideKind::*;
        assert_eq!(kinds(&[1.0, 1.0]), vec![High, Low]);
        assert_eq!(kinds(&[0.5, 2.0, 2.0]), vec![Low, High, Low]);
    }
}
