use std::fmt;

use serde::Serialize;

/// GSTIN の長さ。
pub const GSTIN_LENGTH: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GstinError {
    #[error("GSTIN must be {GSTIN_LENGTH} characters")]
    InvalidLength,
    #[error("GSTIN has an invalid character at position {0}")]
    InvalidCharacter(usize),
}

/// Gstin は 15 桁の GST 登録番号。先頭 2 桁は州コード。
///
/// 形式: `99AAAAA9999A9Z9`（州コード 2 桁、PAN 10 桁、登録番号 1 桁、`Z`、チェック 1 桁）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Gstin(String);

impl Gstin {
    pub fn parse(raw: &str) -> Result<Self, GstinError> {
        let value = raw.trim().to_ascii_uppercase();
        if value.len() != GSTIN_LENGTH || !value.is_ascii() {
            return Err(GstinError::InvalidLength);
        }

        for (i, c) in value.chars().enumerate() {
            let ok = match i {
                0 | 1 | 7..=10 => c.is_ascii_digit(),
                2..=6 | 11 => c.is_ascii_uppercase(),
                12 => c.is_ascii_uppercase() || ('1'..='9').contains(&c),
                13 => c == 'Z',
                _ => c.is_ascii_alphanumeric(),
            };
            if !ok {
                return Err(GstinError::InvalidCharacter(i));
            }
        }

        Ok(Self(value))
    }

    pub fn state_code(&self) -> &str {
        &self.0[..2]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Gstin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 州コードが 2 桁の数字かどうかを判定する。
pub fn is_valid_state_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_gstin() {
        let gstin = Gstin::parse(" 27aapfu0939f1zv ").unwrap();
        assert_eq!(gstin.as_str(), "27AAPFU0939F1ZV");
        assert_eq!(gstin.state_code(), "27");
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        assert_eq!(Gstin::parse("27AAPFU0939F1Z"), Err(GstinError::InvalidLength));
    }

    #[test]
    fn test_parse_rejects_missing_z() {
        assert_eq!(
            Gstin::parse("27AAPFU0939F1XV"),
            Err(GstinError::InvalidCharacter(13))
        );
    }

    #[test]
    fn test_state_code() {
        assert!(is_valid_state_code("07"));
        assert!(!is_valid_state_code("7"));
        assert!(!is_valid_state_code("A7"));
    }
}
