use crate::error::friendly_status_hint;
use opcua::types::{DateTime, StatusCode};

/// Convert a value's status code to a display quality.
///
/// Bad codes carry the friendly hint when one is known.
pub fn quality_to_string(status: StatusCode) -> String {
    if status.is_good() {
        "Good".to_string()
    } else if status.is_uncertain() {
        "Uncertain".to_string()
    } else {
        let hint = friendly_status_hint(status).map_or_else(|| status.to_string(), str::to_string);
        format!("Bad — {hint}")
    }
}

/// Convert an OPC UA timestamp to a human-readable local time string.
pub fn timestamp_to_string(timestamp: Option<&DateTime>) -> String {
    match timestamp {
        Some(dt) if !dt.is_null() => dt
            .as_chrono()
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        _ => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_to_string() {
        assert_eq!(quality_to_string(StatusCode::Good), "Good");
        assert_eq!(quality_to_string(StatusCode::UncertainInitialValue), "Uncertain");

        let bad = quality_to_string(StatusCode::BadNodeIdUnknown);
        assert!(bad.starts_with("Bad — "), "{bad}");
        assert!(bad.contains("BadNodeIdUnknown"));
    }

    #[test]
    fn test_timestamp_to_string() {
        assert_eq!(timestamp_to_string(None), "N/A");
        assert_eq!(timestamp_to_string(Some(&DateTime::null())), "N/A");

        let formatted = timestamp_to_string(Some(&DateTime::now()));
        assert_eq!(formatted.len(), "2026-01-01 00:00:00".len());
    }
}
