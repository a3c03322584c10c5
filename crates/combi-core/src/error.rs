use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Protocol errors
    #[error("Unknown frame tag: 0x{0:02X}")]
    UnknownTag(u8),

    #[error("Truncated {tag} frame: expected {expected} bytes, got {actual}")]
    Truncated {
        tag: char,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Unsupported label type: {0}")]
    UnsupportedLabel(char),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid property {name}: {value}")]
    InvalidProperty { name: String, value: String },
}

impl Error {
    pub fn invalid_field(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
        }
    }

    pub fn invalid_property(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidProperty {
            name: name.into(),
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::UnknownTag(b'Q').to_string(),
            "Unknown frame tag: 0x51"
        );
        assert_eq!(
            Error::Truncated {
                tag: 'S',
                expected: 15,
                actual: 4
            }
            .to_string(),
            "Truncated S frame: expected 15 bytes, got 4"
        );
        assert_eq!(
            Error::invalid_property("MaxRetry", "abc").to_string(),
            "Invalid property MaxRetry: abc"
        );
    }
}
