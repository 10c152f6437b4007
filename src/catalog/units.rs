//! SI-prefixed number strings ("2.2k", "10M") to integers.

use regex_lite::Regex;
use std::sync::LazyLock;

static SI_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([+-]?\d+(?:\.\d+)?)\s*([a-zA-Zµ]?)").unwrap()
});

/// Converts a string like "2.2k" or "47" into an integer, using `base` per prefix step.
///
/// Case follows SI: `M`/`P` are mega/peta while `m`/`p` are milli/pico. Sub-unit
/// prefixes have no integer representation, so they yield `None`. Trailing unit
/// text after the prefix ("4.7kOhms") is ignored. A letter that is not a
/// prefix is taken as the start of the unit ("47 Ohms" is 47). A value that
/// still has a fractional part after scaling ("1.5", "0.0001k") is `None`.
pub fn si_to_int(s: &str, base: u64) -> Option<i64> {
    let caps = SI_NUMBER.captures(s)?;
    let number = caps.get(1)?.as_str();
    let prefix = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    let exponent = match prefix.chars().next() {
        Some('k' | 'K') => 1,
        Some('M') => 2,
        Some('G' | 'g') => 3,
        Some('T' | 't') => 4,
        Some('P') => 5,
        Some('E') => 6,
        Some('Z') => 7,
        Some('Y') => 8,
        Some('m' | 'µ' | 'u' | 'n' | 'p' | 'f' | 'a' | 'z' | 'y') => return None,
        _ => 0,
    };

    // Exact decimal arithmetic: digits as one integer over 10^scale.
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    let digits: i128 = format!("{}{}", whole, fraction).parse().ok()?;
    let divisor = 10i128.checked_pow(u32::try_from(fraction.len()).ok()?)?;
    let scaled = digits.checked_mul(i128::from(base).checked_pow(exponent)?)?;

    if scaled % divisor != 0 {
        return None;
    }
    i64::try_from(scaled / divisor).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_numbers() {
        assert_eq!(si_to_int("47", 1000), Some(47));
        assert_eq!(si_to_int("  100 ", 1000), Some(100));
        assert_eq!(si_to_int("-5", 1000), Some(-5));
    }

    #[test]
    fn test_positive_prefixes() {
        assert_eq!(si_to_int("2k", 1000), Some(2_000));
        assert_eq!(si_to_int("2.2k", 1000), Some(2_200));
        assert_eq!(si_to_int("2.2K", 1000), Some(2_200));
        assert_eq!(si_to_int("10M", 1000), Some(10_000_000));
        assert_eq!(si_to_int("1G", 1000), Some(1_000_000_000));
        assert_eq!(si_to_int("4.7kOhms", 1000), Some(4_700));
    }

    #[test]
    fn test_binary_base() {
        assert_eq!(si_to_int("4k", 1024), Some(4_096));
        assert_eq!(si_to_int("1M", 1024), Some(1_048_576));
    }

    #[test]
    fn test_unit_without_prefix() {
        assert_eq!(si_to_int("47 Ohms", 1000), Some(47));
        assert_eq!(si_to_int("12V", 1000), Some(12));
    }

    #[test]
    fn test_sub_unit_prefixes_rejected() {
        assert_eq!(si_to_int("10m", 1000), None);
        assert_eq!(si_to_int("100n", 1000), None);
        assert_eq!(si_to_int("2.2µ", 1000), None);
        assert_eq!(si_to_int("100p", 1000), None);
    }

    #[test]
    fn test_fractional_results_rejected() {
        assert_eq!(si_to_int("0.4", 1000), None);
        assert_eq!(si_to_int("1.5", 1000), None);
        assert_eq!(si_to_int("0.0001k", 1000), None);
        assert_eq!(si_to_int("2.5k", 1000), Some(2_500));
        assert_eq!(si_to_int("1.50", 1000), None);
        assert_eq!(si_to_int("3.0", 1000), Some(3));
        assert_eq!(si_to_int("-0.5k", 1000), Some(-500));
        assert_eq!(si_to_int("0.5k", 1024), Some(512));
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(si_to_int("10E", 1000), None);
        assert_eq!(si_to_int("9223372036854775807", 1000), Some(i64::MAX));
        assert_eq!(si_to_int("9223372036854775808", 1000), None);
    }

    #[test]
    fn test_garbage() {
        assert_eq!(si_to_int("", 1000), None);
        assert_eq!(si_to_int("k", 1000), None);
        assert_eq!(si_to_int("abc", 1000), None);
        assert_eq!(si_to_int("1Y", 1000), None);
    }
}
