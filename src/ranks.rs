use serde::Serialize;

/// One rank on a belt scale, with its closed degree bounds.
///
/// `variant_threshold` is only set for the one rank that carries two visual
/// variants; degrees at or above the threshold resolve to the higher
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankSpec {
    pub name: &'static str,
    pub min_degree: i64,
    pub max_degree: i64,
    variant_threshold: Option<i64>,
}

impl RankSpec {
    const fn plain(name: &'static str, min_degree: i64, max_degree: i64) -> Self {
        Self {
            name,
            min_degree,
            max_degree,
            variant_threshold: None,
        }
    }
}

/// An ordered belt progression scale.
///
/// The product carries two incompatible scales in different areas (adult
/// and kids programs); they are deliberately kept as two distinct constants
/// behind one parameterized API rather than unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeltScale {
    pub name: &'static str,
    pub ranks: &'static [RankSpec],
}

/// The two-color variants of the coral belt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoralVariant {
    RedAndBlack,
    RedAndWhite,
}

pub static ADULT_SCALE: BeltScale = BeltScale {
    name: "adult",
    ranks: &[
        RankSpec::plain("white", 0, 4),
        RankSpec::plain("blue", 0, 4),
        RankSpec::plain("purple", 0, 4),
        RankSpec::plain("brown", 0, 4),
        RankSpec::plain("black", 0, 6),
        RankSpec {
            name: "coral",
            min_degree: 7,
            max_degree: 9,
            variant_threshold: Some(8),
        },
        RankSpec::plain("red", 10, 10),
    ],
};

pub static KIDS_SCALE: BeltScale = BeltScale {
    name: "kids",
    ranks: &[
        RankSpec::plain("white", 0, 4),
        RankSpec::plain("grey", 0, 4),
        RankSpec::plain("yellow", 0, 4),
        RankSpec::plain("orange", 0, 4),
        RankSpec::plain("green", 0, 4),
    ],
};

impl BeltScale {
    fn position(&self, rank: &str) -> Option<usize> {
        self.ranks
            .iter()
            .position(|spec| spec.name.eq_ignore_ascii_case(rank))
    }

    pub fn rank_spec(&self, rank: &str) -> Option<&'static RankSpec> {
        self.position(rank).map(|i| &self.ranks[i])
    }

    pub fn min_degree(&self, rank: &str) -> Option<i64> {
        self.rank_spec(rank).map(|spec| spec.min_degree)
    }

    pub fn max_degree(&self, rank: &str) -> Option<i64> {
        self.rank_spec(rank).map(|spec| spec.max_degree)
    }

    /// Clamps a degree into the rank's bounds, flooring to an integer first.
    ///
    /// `None` and NaN pass through as `None`: an absent degree means "no
    /// mutation intended", not an error. Out-of-range input is silently
    /// corrected rather than rejected; this is intentional, the scale owns
    /// the bounds and the caller's value is treated as a hint. Never fails.
    pub fn normalize_degree(&self, rank: &str, degree: Option<f64>) -> Option<i64> {
        let degree = degree?;
        if degree.is_nan() {
            return None;
        }

        let spec = self.rank_spec(rank)?;
        let floored = degree.floor() as i64;

        Some(floored.clamp(spec.min_degree, spec.max_degree))
    }

    /// The next rank up the scale. Saturates at the top: the highest rank
    /// maps to itself, never wraps and never errors. `None` only for rank
    /// names not on this scale.
    pub fn next_rank(&self, rank: &str) -> Option<&'static str> {
        let position = self.position(rank)?;
        let next = (position + 1).min(self.ranks.len() - 1);

        Some(self.ranks[next].name)
    }

    /// Resolves the two-color variant for the one rank that has them.
    /// Every other rank (and every kids rank) yields `None`.
    pub fn resolve_variant(&self, rank: &str, degree: i64) -> Option<CoralVariant> {
        let spec = self.rank_spec(rank)?;
        let threshold = spec.variant_threshold?;

        if degree >= threshold {
            Some(CoralVariant::RedAndWhite)
        } else {
            Some(CoralVariant::RedAndBlack)
        }
    }

    pub fn top_rank(&self) -> &'static str {
        // Both scales are non-empty static constants.
        self.ranks[self.ranks.len() - 1].name
    }
}
