//! Checked conversions between `u64` values and signed integer columns.

use spaces_core::error::IndexerError;

/// Value to bind into a BIGINT / INTEGER column.
pub(crate) fn to_i64(field: &str, value: u64) -> Result<i64, IndexerError> {
    i64::try_from(value)
        .map_err(|_| IndexerError::Storage(format!("{field} {value} exceeds the column range")))
}

/// Optional variant of [`to_i64`].
pub(crate) fn opt_to_i64(field: &str, value: Option<u64>) -> Result<Option<i64>, IndexerError> {
    value.map(|v| to_i64(field, v)).transpose()
}

/// Value read back from a signed column. Negative values are corrupt rows.
pub(crate) fn to_u64(field: &str, value: i64) -> Result<u64, IndexerError> {
    u64::try_from(value)
        .map_err(|_| IndexerError::Storage(format!("{field} column holds negative value {value}")))
}

pub(crate) fn opt_to_u64(field: &str, value: Option<i64>) -> Result<Option<u64>, IndexerError> {
    value.map(|v| to_u64(field, v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_beyond_i64_are_rejected() {
        assert_eq!(to_i64("height", 42).unwrap(), 42);
        assert_eq!(to_i64("height", i64::MAX as u64).unwrap(), i64::MAX);
        let err = to_i64("bid_amount", u64::MAX).unwrap_err();
        assert!(err.to_string().contains("bid_amount"));
        assert_eq!(opt_to_i64("bid_amount", None).unwrap(), None);
    }

    #[test]
    fn negative_columns_are_rejected() {
        assert_eq!(to_u64("end_height", 7).unwrap(), 7);
        assert!(to_u64("end_height", -1).is_err());
        assert!(opt_to_u64("bid_amount", Some(-5)).is_err());
        assert_eq!(opt_to_u64("bid_amount", None).unwrap(), None);
    }
}
