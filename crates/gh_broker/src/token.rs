use std::fmt;

/// OAuth bearer token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into().trim().to_string();
        (!secret.is_empty()).then_some(Self(secret))
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let token = BearerToken::new("ghp_secret").unwrap();
        assert_eq!(format!("{token:?}"), "BearerToken(***)");
        assert_eq!(token.header_value(), "Bearer ghp_secret");
    }

    #[test]
    fn blank_token_is_rejected() {
        assert!(BearerToken::new("   ").is_none());
    }
}
