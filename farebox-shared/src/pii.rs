use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for sensitive contact fields that masks the value in Debug and
/// Display output while serializing the real value for API responses.
#[derive(Clone, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Responses need the real value; the masking is aimed at log macros
        // like tracing::info!("{:?}", ...).
        self.0.serialize(serializer)
    }
}

impl<T: PartialEq> PartialEq for Masked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Masked<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_masked() {
        let phone = Masked::new("+1-555-0100".to_string());
        assert_eq!(format!("{:?}", phone), "********");
        assert_eq!(format!("{}", phone), "********");
    }

    #[test]
    fn serialization_keeps_the_value() {
        let email = Masked::new("rider@example.com".to_string());
        let json = serde_json::to_string(&email).unwrap();
        assert_eq!(json, "\"rider@example.com\"");
    }
}
