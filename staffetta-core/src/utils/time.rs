use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Formatta un istante UTC come RFC3339 (es. "2025-11-02T12:34:56Z").
pub fn format_timestamp(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).expect("error formatting timestamp")
}
