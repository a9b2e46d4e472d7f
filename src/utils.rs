use crate::{Result, DetectorError};

/// Value the capture tool layout uses when a field was not present.
pub const MISSING_VALUE: &str = "0";

pub fn validate_session_id(session: &str) -> Result<()> {
    if session.is_empty() || session == "." || session == ".." {
        return Err(DetectorError::InvalidSession(format!("'{}'", session)));
    }
    if session.contains(['/', '\\']) {
        return Err(DetectorError::InvalidSession(format!(
            "'{}' must not contain path separators",
            session
        )));
    }
    Ok(())
}

pub fn normalize_bssid(bssid: &str) -> String {
    bssid.trim().to_uppercase()
}

/// Decodes a `0x`-prefixed (or bare) hexadecimal cell such as `0x0008`.
pub fn parse_hex_field(column: &str, value: &str) -> Result<u64> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    u64::from_str_radix(digits, 16).map_err(|_| DetectorError::HexDecode {
        column: column.to_string(),
        value: value.to_string(),
    })
}

pub fn parse_numeric_field(column: &str, value: &str) -> Result<f64> {
    let invalid = || DetectorError::FeatureParse {
        column: column.to_string(),
        value: value.to_string(),
    };

    // `f64::from_str` accepts "NaN" and "inf"; neither is a usable feature.
    let parsed = value.trim().parse::<f64>().map_err(|_| invalid())?;
    if !parsed.is_finite() {
        return Err(invalid());
    }
    Ok(parsed)
}
