//! Human-readable case numbers.
//!
//! Format: `MR-<yyyyMMddHHmmss UTC>-<6 random Crockford base32 chars>`.
//! Uniqueness is enforced by the store, not here.

use chrono::{DateTime, Utc};

use crate::new_ulid;

/// Fixed prefix of every case number.
pub const PREFIX: &str = "MR";

const TIMESTAMP_LEN: usize = 14;
const SUFFIX_LEN: usize = 6;

/// Generates a case number for `now`.
pub fn generate(now: DateTime<Utc>) -> String {
    let id = new_ulid().to_string();
    // The tail of a ULID is its random part.
    let suffix = &id[id.len() - SUFFIX_LEN..];
    format!("{PREFIX}-{}-{suffix}", now.format("%Y%m%d%H%M%S"))
}

/// True if `s` has the shape produced by [`generate`].
pub fn is_well_formed(s: &str) -> bool {
    let mut parts = s.split('-');
    let (Some(prefix), Some(ts), Some(suffix), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    prefix == PREFIX
        && ts.len() == TIMESTAMP_LEN
        && ts.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == SUFFIX_LEN
        && suffix.bytes().all(is_crockford)
}

fn is_crockford(b: u8) -> bool {
    matches!(b, b'0'..=b'9' | b'A'..=b'H' | b'J' | b'K' | b'M' | b'N' | b'P'..=b'T' | b'V'..=b'Z')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_numbers_are_well_formed() {
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 9, 5, 7).unwrap();
        for _ in 0..50 {
            let n = generate(now);
            assert!(is_well_formed(&n), "{n}");
            assert!(n.starts_with("MR-20250131090507-"));
        }
    }

    #[test]
    fn rejects_foreign_shapes() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("MR-2025-ABCDEF"));
        assert!(!is_well_formed("XX-20250131090507-ABCDEF"));
        assert!(!is_well_formed("MR-20250131090507-abcdef"));
        assert!(!is_well_formed("MR-20250131090507-ABCDEI"));
        assert!(!is_well_formed("MR-20250131090507-ABCDEF-1"));
    }
}
