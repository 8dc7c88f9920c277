use chrono::NaiveDate;
use uuid::Uuid;

pub const GRN_PREFIX: &str = "GRN";
pub const INVOICE_PREFIX: &str = "INV";
pub const JOURNAL_PREFIX: &str = "JE";

/// 伝票番号 `PREFIX-YYYYMMDD-XXXXXXXX` を採番する。
/// 末尾 8 桁は UUID v4 由来の 16 進大文字で、採番テーブルを持たずに一意性を確保する。
pub fn generate(prefix: &str, date: NaiveDate) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect::<String>()
        .to_ascii_uppercase();
    format!("{prefix}-{}-{suffix}", date.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let number = generate(INVOICE_PREFIX, date);
        assert!(number.starts_with("INV-20240309-"));
        let suffix = number.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generate_is_unique() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_ne!(generate(GRN_PREFIX, date), generate(GRN_PREFIX, date));
    }
}
