use core::str::FromStr;

use serde::{Deserialize, Serialize};

use canopy_core::DomainError;

/// Commercial priority of a lead, keyed by phone number.
///
/// `Cold` is a hard policy block: no reservation, dispatch, or return may be
/// processed for a client whose lead record is cold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadPriority {
    Hot,
    Warm,
    Cold,
}

impl LeadPriority {
    pub fn blocks_commitments(self) -> bool {
        matches!(self, LeadPriority::Cold)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeadPriority::Hot => "hot",
            LeadPriority::Warm => "warm",
            LeadPriority::Cold => "cold",
        }
    }
}

impl FromStr for LeadPriority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hot" => Ok(LeadPriority::Hot),
            "warm" => Ok(LeadPriority::Warm),
            "cold" => Ok(LeadPriority::Cold),
            other => Err(DomainError::validation(format!(
                "priority must be one of: hot, warm, cold (got '{other}')"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cold_blocks_commitments() {
        assert!(LeadPriority::Cold.blocks_commitments());
        assert!(!LeadPriority::Warm.blocks_commitments());
        assert!(!LeadPriority::Hot.blocks_commitments());
    }

    #[test]
    fn parsing_is_case_insensitive() {
        assert_eq!("COLD".parse::<LeadPriority>().unwrap(), LeadPriority::Cold);
        assert!("tepid".parse::<LeadPriority>().is_err());
    }
}
