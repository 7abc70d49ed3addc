/// Audit identity for a request, taken from the `x-initiator` header.
///
/// Purely informational: it is logged alongside mutating operations and
/// never used for authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatorContext {
    initiator: String,
}

impl InitiatorContext {
    pub fn new(initiator: impl Into<String>) -> Self {
        let initiator = initiator.into();
        let trimmed = initiator.trim();
        if trimmed.is_empty() {
            Self::unknown()
        } else {
            Self {
                initiator: trimmed.to_string(),
            }
        }
    }

    pub fn unknown() -> Self {
        Self {
            initiator: "unknown".to_string(),
        }
    }

    pub fn initiator(&self) -> &str {
        &self.initiator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_initiator_falls_back_to_unknown() {
        assert_eq!(InitiatorContext::new("  ").initiator(), "unknown");
        assert_eq!(InitiatorContext::new("ops@team").initiator(), "ops@team");
    }
}
