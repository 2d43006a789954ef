//! Brazilian individual taxpayer number (CPF) handling.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Eleven validated digits, stored without punctuation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cpf(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpfError {
    #[error("CPF deve conter 11 dígitos")]
    Length,
    #[error("CPF inválido")]
    Checksum,
}

impl Cpf {
    pub fn parse(raw: &str) -> Result<Self, CpfError> {
        let digits = digits_only(raw);
        if digits.len() != 11 {
            return Err(CpfError::Length);
        }
        if !checksum_matches(&digits) {
            return Err(CpfError::Checksum);
        }
        Ok(Self(digits))
    }

    /// Wraps digits already validated by storage.
    pub fn from_trusted(digits: impl Into<String>) -> Self {
        Self(digits.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `000.000.000-00` presentation.
    pub fn formatted(&self) -> String {
        if self.0.len() != 11 {
            return self.0.clone();
        }
        format!(
            "{}.{}.{}-{}",
            &self.0[0..3],
            &self.0[3..6],
            &self.0[6..9],
            &self.0[9..11]
        )
    }
}

impl fmt::Display for Cpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Cpf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Cpf {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Cpf::parse(&raw).map_err(serde::de::Error::custom)
    }
}

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

pub fn is_valid_cpf(raw: &str) -> bool {
    Cpf::parse(raw).is_ok()
}

fn checksum_matches(digits: &str) -> bool {
    let values: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if values.len() != 11 {
        return false;
    }
    if values.iter().all(|value| *value == values[0]) {
        return false;
    }

    check_digit(&values[..9]) == values[9] && check_digit(&values[..10]) == values[10]
}

/// Modulo-11 verifier over a prefix, weights counting down to 2.
fn check_digit(prefix: &[u32]) -> u32 {
    let top_weight = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(index, value)| value * (top_weight - index as u32))
        .sum();
    let remainder = sum % 11;
    if remainder < 2 {
        0
    } else {
        11 - remainder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_valid_numbers() {
        for raw in ["529.982.247-25", "52998224725", "111.444.777-35", "39053344705"] {
            assert!(is_valid_cpf(raw), "{raw} should be valid");
        }
    }

    #[test]
    fn rejects_wrong_check_digits() {
        assert_eq!(Cpf::parse("52998224724"), Err(CpfError::Checksum));
        assert_eq!(Cpf::parse("11144477734"), Err(CpfError::Checksum));
    }

    #[test]
    fn rejects_repeated_digits() {
        for digit in 0..=9 {
            let raw = digit.to_string().repeat(11);
            assert!(!is_valid_cpf(&raw), "{raw} should be rejected");
        }
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(Cpf::parse("5299822472"), Err(CpfError::Length));
        assert_eq!(Cpf::parse(""), Err(CpfError::Length));
    }

    #[test]
    fn exactly_one_check_digit_pair_fits_each_prefix() {
        let prefix = "123456789";
        let valid: Vec<String> = (0..100)
            .map(|suffix| format!("{prefix}{suffix:02}"))
            .filter(|candidate| is_valid_cpf(candidate))
            .collect();
        assert_eq!(valid, vec!["12345678909".to_string()]);
    }

    #[test]
    fn formats_with_punctuation() {
        let cpf = Cpf::parse("52998224725").expect("valid cpf");
        assert_eq!(cpf.formatted(), "529.982.247-25");
    }
}
