//! Named integer tuning knobs and their documented defaults.

/// Every parameter the store recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    /// Pixel budget for a localization image. Larger images are box
    /// downsampled by the smallest integer factor that fits. `0` disables.
    LocalizationMaxPixels,
    /// Minimum number of feature matches the engine needs to report a pose.
    MinimumMatchCount,
    /// Confidence at which localization stops trying further candidates.
    /// Inclusive: a candidate whose confidence equals the threshold stops
    /// the search. `0` disables early stop.
    AcceptImmediatelyConfidence,
    /// Per-candidate time budget handed to the matching engine.
    MatchingBudgetMs,
    /// Upper bound on a single capture payload.
    CaptureMaxBytes,
}

impl Param {
    pub const ALL: [Param; 5] = [
        Param::LocalizationMaxPixels,
        Param::MinimumMatchCount,
        Param::AcceptImmediatelyConfidence,
        Param::MatchingBudgetMs,
        Param::CaptureMaxBytes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Param::LocalizationMaxPixels => "LocalizationMaxPixels",
            Param::MinimumMatchCount => "MinimumMatchCount",
            Param::AcceptImmediatelyConfidence => "AcceptImmediatelyConfidence",
            Param::MatchingBudgetMs => "MatchingBudgetMs",
            Param::CaptureMaxBytes => "CaptureMaxBytes",
        }
    }

    pub fn from_name(name: &str) -> Option<Param> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn default_value(self) -> i32 {
        match self {
            Param::LocalizationMaxPixels => 960 * 720,
            Param::MinimumMatchCount => 30,
            Param::AcceptImmediatelyConfidence => 0,
            Param::MatchingBudgetMs => 2000,
            Param::CaptureMaxBytes => 16 * 1024 * 1024,
        }
    }

    /// Smallest accepted value.
    pub fn minimum(self) -> i32 {
        match self {
            Param::LocalizationMaxPixels => 0,
            Param::MinimumMatchCount => 1,
            Param::AcceptImmediatelyConfidence => 0,
            Param::MatchingBudgetMs => 1,
            Param::CaptureMaxBytes => 0,
        }
    }
}

impl std::fmt::Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
