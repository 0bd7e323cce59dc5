use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ModelError;

/// Macro to generate an ordered enum with as_str + std::str::FromStr, serialized
/// through its display string.
macro_rules! display_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

display_enum!(
    /// CTCAE-style grade. Variant order is severity rank.
    Severity {
        Unknown => "Unknown",
        Grade1 => "Grade 1 - Mild",
        Grade2 => "Grade 2 - Moderate",
        Grade3 => "Grade 3 - Severe",
        Grade4 => "Grade 4 - Life-threatening",
    }
);

display_enum!(
    /// Triage level. Variant order is urgency rank.
    Urgency {
        Routine => "🟢 Routine monitoring",
        Soon => "🟡 Needs oncology review soon",
        Urgent => "🟠 Urgent (same day)",
        Emergency => "🔴 Emergency evaluation",
    }
);

display_enum!(Likelihood {
    Unlikely => "Unlikely",
    Uncertain => "Uncertain",
    Possible => "Possible",
    HighlyLikely => "Highly likely",
});

display_enum!(OrganSystem {
    Gastrointestinal => "Gastrointestinal",
    Hepatic => "Hepatic",
    Pulmonary => "Pulmonary",
    Endocrine => "Endocrine",
    Dermatologic => "Dermatologic",
    Neurologic => "Neurologic",
    Cardiac => "Cardiac",
    Renal => "Renal",
    Hematologic => "Hematologic",
    Musculoskeletal => "Musculoskeletal",
    Ocular => "Ocular",
});

display_enum!(DrugClass {
    Pd1 => "PD-1",
    Pdl1 => "PD-L1",
    Ctla4 => "CTLA-4",
});

display_enum!(RiskLevel {
    None => "none",
    Low => "low",
    Moderate => "moderate",
    High => "high",
});

display_enum!(
    /// Which reasoning path produced an assessment.
    AssessmentPath {
        RuleBased => "rule_based",
        ModelReconciled => "model_reconciled",
        RuleBasedFallback => "rule_based_fallback",
    }
);

impl Severity {
    /// Lenient parse for model output: accepts "Grade 3", "grade_3", "3",
    /// "severe" and the display strings. Anything else is Unknown.
    pub fn parse_lenient(s: &str) -> Self {
        if let Ok(parsed) = s.parse() {
            return parsed;
        }
        let lower = s.trim().to_lowercase();
        if lower.contains('4') || lower.contains("life") {
            Self::Grade4
        } else if lower.contains('3') || lower.contains("severe") {
            Self::Grade3
        } else if lower.contains('2') || lower.contains("moderate") {
            Self::Grade2
        } else if lower.contains('1') || lower.contains("mild") {
            Self::Grade1
        } else {
            Self::Unknown
        }
    }
}

impl Urgency {
    /// Lenient parse for model output. Unrecognised values become Routine;
    /// the safety floor raises them afterwards where required.
    pub fn parse_lenient(s: &str) -> Self {
        if let Ok(parsed) = s.parse() {
            return parsed;
        }
        let lower = s.trim().to_lowercase();
        if lower.contains("emergency") {
            Self::Emergency
        } else if lower.contains("urgent") || lower.contains("same day") {
            Self::Urgent
        } else if lower.contains("soon") {
            Self::Soon
        } else {
            Self::Routine
        }
    }
}

impl Likelihood {
    pub fn parse_lenient(s: &str) -> Self {
        if let Ok(parsed) = s.parse() {
            return parsed;
        }
        let lower = s.trim().to_lowercase();
        if lower.contains("highly") || (lower.contains("likely") && !lower.contains("unlikely")) {
            Self::HighlyLikely
        } else if lower.contains("unlikely") {
            Self::Unlikely
        } else if lower.contains("possible") {
            Self::Possible
        } else {
            Self::Uncertain
        }
    }
}

impl OrganSystem {
    /// The nine systems covered by a dedicated analyzer.
    pub const ANALYZED: [OrganSystem; 9] = [
        Self::Gastrointestinal,
        Self::Hepatic,
        Self::Pulmonary,
        Self::Endocrine,
        Self::Dermatologic,
        Self::Neurologic,
        Self::Cardiac,
        Self::Renal,
        Self::Hematologic,
    ];

    pub fn parse_lenient(s: &str) -> Option<Self> {
        if let Ok(parsed) = s.parse() {
            return Some(parsed);
        }
        let lower = s.trim().to_lowercase();
        let system = match lower.as_str() {
            l if l.starts_with("gastro") || l == "gi" || l.contains("colitis") => {
                Self::Gastrointestinal
            }
            l if l.starts_with("hepat") || l.contains("liver") => Self::Hepatic,
            l if l.starts_with("pulmon") || l.contains("lung") || l.contains("pneumon") => {
                Self::Pulmonary
            }
            l if l.starts_with("endocrin") || l.contains("thyroid") => Self::Endocrine,
            l if l.starts_with("derma") || l.contains("skin") => Self::Dermatologic,
            l if l.starts_with("neuro") => Self::Neurologic,
            l if l.starts_with("cardi") || l.contains("heart") => Self::Cardiac,
            l if l.starts_with("renal") || l.contains("kidney") || l.contains("nephr") => {
                Self::Renal
            }
            l if l.starts_with("hemat") || l.starts_with("haemat") || l.contains("blood") => {
                Self::Hematologic
            }
            l if l.starts_with("musculo") || l.contains("arthr") || l.contains("myositis") => {
                Self::Musculoskeletal
            }
            l if l.starts_with("ocular") || l.contains("eye") || l.contains("uveitis") => {
                Self::Ocular
            }
            _ => return None,
        };
        Some(system)
    }
}
