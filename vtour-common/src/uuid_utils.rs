//! UUID utilities

use uuid::Uuid;

use crate::{Error, Result};

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID read back from a TEXT column
pub fn parse_column(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|source| Error::InvalidUuid {
        column: column.to_string(),
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_v4_and_unique() {
        let a = generate();
        let b = generate();
        assert_eq!(a.get_version_num(), 4);
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_column_rejects_garbage() {
        let err = parse_column("marker_id", "not-a-uuid").unwrap_err();
        assert!(matches!(&err, Error::InvalidUuid { column, .. } if column == "marker_id"));
        assert!(err.to_string().contains("column marker_id"));
    }
}
