use serde::{Deserialize, Serialize};

use crate::hsv::HsvColor;

/// Coarse peel-color class a sampled pixel falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorBucket {
    Green,
    YellowGreen,
    Yellow,
    Speckled,
    Brown,
}

impl std::fmt::Display for ColorBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl ColorBucket {
    pub fn all() -> &'static [ColorBucket] {
        &[
            ColorBucket::Green,
            ColorBucket::YellowGreen,
            ColorBucket::Yellow,
            ColorBucket::Speckled,
            ColorBucket::Brown,
        ]
    }

    /// Wire name expected by the classification authority.
    pub fn name(&self) -> &'static str {
        match self {
            ColorBucket::Green => "green",
            ColorBucket::YellowGreen => "yellow-green",
            ColorBucket::Yellow => "yellow",
            ColorBucket::Speckled => "speckled",
            ColorBucket::Brown => "brown",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            ColorBucket::Green => 0,
            ColorBucket::YellowGreen => 1,
            ColorBucket::Yellow => 2,
            ColorBucket::Speckled => 3,
            ColorBucket::Brown => 4,
        }
    }

    /// First-match priority chain. The hue ranges overlap on purpose; the
    /// rule order decides, and pixels matching nothing land in `YellowGreen`.
    pub fn classify(hsv: HsvColor) -> ColorBucket {
        let HsvColor { hue: h, saturation: s, .. } = hsv;

        if (60..=180).contains(&h) && s >= 30 {
            ColorBucket::Green
        } else if (30..=80).contains(&h) && s >= 40 {
            ColorBucket::Yellow
        } else if (15..=45).contains(&h) && s >= 50 {
            ColorBucket::Speckled
        } else if h <= 30 && s >= 30 {
            ColorBucket::Brown
        } else {
            ColorBucket::YellowGreen
        }
    }
}
