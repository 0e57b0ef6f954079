use std::fmt;
use uuid::Uuid;

/// Longest caller-supplied token accepted as a correlation id
const MAX_CALLER_TOKEN_LEN: usize = 128;

/// Joins the log lines of one logical request.
///
/// Created at request entry and passed explicitly to every component; never
/// outlives the request's logs and response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId {
    value: String,
    caller_supplied: bool,
}

impl CorrelationId {
    /// Fresh UUID v4 id
    pub fn generate() -> Self {
        Self {
            value: Uuid::new_v4().to_string(),
            caller_supplied: false,
        }
    }

    /// Adopt the caller's token when it is usable, otherwise generate one
    pub fn from_caller(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some(t) if Self::is_usable(t) => Self {
                value: t.to_string(),
                caller_supplied: true,
            },
            _ => Self::generate(),
        }
    }

    fn is_usable(token: &str) -> bool {
        !token.is_empty()
            && token.len() <= MAX_CALLER_TOKEN_LEN
            && token.chars().all(|c| c.is_ascii_graphic())
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The caller's token, if that is what this id is
    pub fn echo(&self) -> Option<&str> {
        self.caller_supplied.then_some(self.value.as_str())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_uuids() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
                assert_eq!(a.echo(), None);
    }

    #[test]
    fn test_caller_token_is_adopted() {
        let id = CorrelationId::from_caller(Some(" run-42 "));
        assert_eq!(id.as_str(), "run-42");
        assert_eq!(id.echo(), Some("run-42"));
    }

    #[test]
    fn test_unusable_tokens_are_replaced() {
        for token in ["", "   ", "has space", "line\nbreak"] {
            let id = CorrelationId::from_caller(Some(token));
            assert_eq!(id.echo(), None, "token {:?} was adopted", token);
        }

        let long = "x".repeat(MAX_CALLER_TOKEN_LEN + 1);
        assert_eq!(CorrelationId::from_caller(Some(&long)).echo(), None);
        assert_eq!(CorrelationId::from_caller(None).echo(), None);
    }
}
