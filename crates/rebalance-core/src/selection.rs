//! Trailing-return ranking and top-N candidate selection.

use crate::{RebalanceError, Result, ReturnMatrix};
use serde::Serialize;

/// An asset and its trailing compounded return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedAsset {
    /// Asset identifier
    pub asset: String,
    /// Compounded return over the window
    pub score: f64,
}

/// Candidates ordered by descending score.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Selection {
    ranked: Vec<RankedAsset>,
}

impl Selection {
    /// Ranked candidates, best first.
    pub fn ranked(&self) -> &[RankedAsset] {
        &self.ranked
    }

    /// Candidate identifiers, best first.
    pub fn assets(&self) -> Vec<&str> {
        self.ranked.iter().map(|r| r.asset.as_str()).collect()
    }

    /// Score of a candidate.
    pub fn score(&self, asset: &str) -> Option<f64> {
        self.ranked.iter().find(|r| r.asset == asset).map(|r| r.score)
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    /// True when no asset was selected.
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Iterate over ranked candidates.
    pub fn iter(&self) -> std::slice::Iter<'_, RankedAsset> {
        self.ranked.iter()
    }
}

impl<'a> IntoIterator for &'a Selection {
    type Item = &'a RankedAsset;
    type IntoIter = std::slice::Iter<'a, RankedAsset>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Compounded return `prod(1 + r) - 1` per asset, in column order.
///
/// Missing periods are skipped rather than zeroing the product, so an asset
/// with no observations scores 0.
pub fn trailing_compounded_returns(returns: &ReturnMatrix) -> Vec<f64> {
    returns
        .values()
        .columns()
        .into_iter()
        .map(|column| {
            column
                .iter()
                .filter(|r| r.is_finite())
                .fold(1.0, |growth, r| growth * (1.0 + r))
                - 1.0
        })
        .collect()
}

/// Select the `top_n` assets with the highest trailing compounded return.
///
/// Ties keep the original column order. Fewer than `top_n` assets are
/// returned when the matrix is narrower.
pub fn select_top_n(returns: &ReturnMatrix, top_n: usize) -> Result<Selection> {
    if top_n == 0 {
        return Err(RebalanceError::InvalidConfig(
            "top_n must be greater than 0".to_string(),
        ));
    }

    let scores = trailing_compounded_returns(returns);
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // `sort_by` is stable, which keeps column order among equal scores.
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let ranked = order
        .into_iter()
        .take(top_n)
        .map(|j| RankedAsset {
            asset: returns.assets()[j].clone(),
            score: scores[j],
        })
        .collect();

    Ok(Selection { ranked })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Panel;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use ndarray::{Array2, array};

    fn month_ends(n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| {
                let months = u32::try_from(i).unwrap();
                NaiveDate::from_ymd_opt(2020, 1, 31)
                    .unwrap()
                    .checked_add_months(chrono::Months::new(months))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_select_top_n_returns_sorted_subset() {
        let assets: Vec<String> = (0..60).map(|i| format!("ETF{i:02}")).collect();
        let mut values = Array2::from_elem((60, 60), 0.01);
        values.column_mut(59).fill(0.03);
        values.column_mut(58).fill(0.025);
        let returns = Panel::new(month_ends(60), assets, values).unwrap();

        let top = select_top_n(&returns, 50).unwrap();
        assert_eq!(top.len(), 50);
        assert_eq!(top.ranked()[0].asset, "ETF59");
        assert_eq!(top.ranked()[1].asset, "ETF58");
        // Equal scores keep column order.
        assert_eq!(top.ranked()[2].asset, "ETF00");
        assert_eq!(top.ranked()[49].asset, "ETF47");
    }

    #[test]
    fn test_compounding_skips_missing() {
        let returns = Panel::new(
            month_ends(3),
            vec!["A".into(), "B".into()],
            array![[0.10, f64::NAN], [f64::NAN, f64::NAN], [0.10, f64::NAN]],
        )
        .unwrap();

        let scores = trailing_compounded_returns(&returns);
        assert_relative_eq!(scores[0], 0.21, epsilon = 1e-12);
        assert_relative_eq!(scores[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_select_more_than_available() {
        let returns = Panel::new(
            month_ends(2),
            vec!["A".into(), "B".into()],
            array![[0.01, 0.02], [0.01, 0.02]],
        )
        .unwrap();

        let top = select_top_n(&returns, 5).unwrap();
        assert_eq!(top.assets(), vec!["B", "A"]);
        assert!(top.score("B").unwrap() > top.score("A").unwrap());
    }

    #[test]
    fn test_select_rejects_zero() {
        let returns = Panel::empty(vec!["A".into()]);
        assert!(select_top_n(&returns, 0).is_err());
    }

    #[test]
    fn test_empty_matrix_selects_nothing() {
        let returns = Panel::empty(Vec::new());
        assert!(select_top_n(&returns, 3).unwrap().is_empty());
    }
}
