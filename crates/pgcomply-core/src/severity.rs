//! Severity levels for compliance controls

use serde::{Deserialize, Serialize};

/// Severity of a compliance control, ordered low to high.
///
/// Maps onto DISA STIG categories: CAT III = Low, CAT II = Medium,
/// CAT I = High.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// CAT III - limited impact on the security posture
    Low,
    /// CAT II - potential to degrade the security posture
    #[default]
    Medium,
    /// CAT I - direct and immediate loss of confidentiality/integrity
    High,
}

impl Severity {
    /// Convert a STIG category label ("I", "II", "III", "CAT I", ...) to a severity
    pub fn from_cat(cat: &str) -> Option<Self> {
        let cat = cat.trim().trim_start_matches("CAT").trim();
        match cat {
            "I" | "1" => Some(Severity::High),
            "II" | "2" => Some(Severity::Medium),
            "III" | "3" => Some(Severity::Low),
            _ => None,
        }
    }

    /// Get numeric value for sorting/comparison
    pub fn as_number(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
        }
    }

    /// Get display string
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cat_mapping() {
        assert_eq!(Severity::from_cat("I"), Some(Severity::High));
        assert_eq!(Severity::from_cat("CAT II"), Some(Severity::Medium));
        assert_eq!(Severity::from_cat("III"), Some(Severity::Low));
        assert_eq!(Severity::from_cat("IV"), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_parse() {
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert!("critical".parse::<Severity>().is_err());
    }
}
