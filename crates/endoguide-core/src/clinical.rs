//! Clinical vocabulary shared by the analysis stages and configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coarse bucket describing how deep a lesion penetrates the tissue layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvasionLevel {
    Superficial,
    Moderate,
    Deep,
    /// Depth estimation failed; treated as the most severe level.
    Unknown,
}

impl InvasionLevel {
    /// Levels that a depth estimate can produce, in order of severity.
    pub const GRADED: [InvasionLevel; 3] = [Self::Superficial, Self::Moderate, Self::Deep];

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Superficial => "superficial",
            Self::Moderate => "moderate",
            Self::Deep => "deep",
            Self::Unknown => "unknown",
        }
    }

    /// The graded level used when looking up standards. `Unknown` resolves to
    /// `Deep`.
    pub fn conservative(self) -> InvasionLevel {
        match self {
            Self::Unknown => Self::Deep,
            other => other,
        }
    }
}

impl std::fmt::Display for InvasionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Required resection margin in millimetres per invasion level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarginStandards {
    table: BTreeMap<InvasionLevel, f32>,
}

impl MarginStandards {
    /// Build a table from the three graded margins.
    pub fn new(superficial_mm: f32, moderate_mm: f32, deep_mm: f32) -> Self {
        let table = BTreeMap::from([
            (InvasionLevel::Superficial, superficial_mm),
            (InvasionLevel::Moderate, moderate_mm),
            (InvasionLevel::Deep, deep_mm),
        ]);
        Self { table }
    }

    /// Required margin for `level`. `Unknown` gets the deep margin.
    pub fn margin_for(&self, level: InvasionLevel) -> f32 {
        self.table
            .get(&level.conservative())
            .copied()
            .unwrap_or_else(|| self.table.values().copied().fold(0.0, f32::max))
    }

    /// Check that every graded level has a positive margin and that margins
    /// strictly increase with severity.
    pub fn validate(&self) -> Result<(), String> {
        if self.table.contains_key(&InvasionLevel::Unknown) {
            return Err("margin_standards must not define an 'unknown' level".into());
        }
        let mut previous: Option<(InvasionLevel, f32)> = None;
        for level in InvasionLevel::GRADED {
            let Some(&mm) = self.table.get(&level) else {
                return Err(format!("margin_standards is missing '{level}'"));
            };
            if !(mm.is_finite() && mm > 0.0) {
                return Err(format!("margin for '{level}' must be positive, got {mm}"));
            }
            if let Some((prev_level, prev_mm)) = previous {
                if mm <= prev_mm {
                    return Err(format!(
                        "margin for '{level}' ({mm} mm) must exceed '{prev_level}' ({prev_mm} mm)"
                    ));
                }
            }
            previous = Some((level, mm));
        }
        Ok(())
    }
}

impl Default for MarginStandards {
    fn default() -> Self {
        Self::new(2.0, 5.0, 10.0)
    }
}
