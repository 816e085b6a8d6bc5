//! Bandwidth string parsing, grounded on `iperf_utils.py::bandwidth`.

use crate::error::IperfError;

/// Parse a bandwidth specification like `"10M"`, `"1g"`, or a bare integer
/// (bytes/sec) into bytes/sec.
///
/// Suffix table: `K` = 125, `k` = 1000, `M` = 125_000, `m` = 1_000_000,
/// `G` = 125_000_000, `g` = 1_000_000_000 (multiplied by the leading
/// digits); unsuffixed input passes through as a plain integer.
pub fn parse_bitrate(input: &str) -> Result<u64, IperfError> {
    let input = input.trim();
    let mut digit_end = 0;
    for (i, c) in input.char_indices() {
        if c.is_ascii_digit() {
            digit_end = i + c.len_utf8();
        } else {
            break;
        }
    }
    if digit_end == 0 {
        return Err(IperfError::Framing(format!(
            "bandwidth string {input:?} has no leading digits"
        )));
    }
    let digits: u64 = input[..digit_end]
        .parse()
        .map_err(|_| IperfError::Framing(format!("bandwidth string {input:?} digits overflow")))?;
    let suffix = &input[digit_end..];

    let multiplier = match suffix {
        "" => 1,
        "K" => 125,
        "k" => 1000,
        "M" => 125_000,
        "m" => 1_000_000,
        "G" => 125_000_000,
        "g" => 1_000_000_000,
        other => {
            return Err(IperfError::Framing(format!(
                "unrecognized bandwidth suffix {other:?}"
            )))
        }
    };

    Ok(digits * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_documented_suffix() {
        assert_eq!(parse_bitrate("1K").unwrap(), 125);
        assert_eq!(parse_bitrate("1k").unwrap(), 1000);
        assert_eq!(parse_bitrate("1M").unwrap(), 125_000);
        assert_eq!(parse_bitrate("1m").unwrap(), 1_000_000);
        assert_eq!(parse_bitrate("1G").unwrap(), 125_000_000);
        assert_eq!(parse_bitrate("1g").unwrap(), 1_000_000_000);
        assert_eq!(parse_bitrate("500").unwrap(), 500);
    }

    #[test]
    fn scales_with_leading_digit_count() {
        assert_eq!(parse_bitrate("10M").unwrap(), 1_250_000);
        assert_eq!(parse_bitrate("2g").unwrap(), 2_000_000_000);
    }

    #[test]
    fn rejects_unknown_suffix() {
        assert!(parse_bitrate("10X").is_err());
    }

    #[test]
    fn rejects_no_digits() {
        assert!(parse_bitrate("M").is_err());
    }
}
