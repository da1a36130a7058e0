use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const MAX_AGENT_NAME_LEN: usize = 64;

/// Accepts only the canonical lowercase hyphenated uuid, so an id maps to
/// exactly one file name under `runs/`.
fn canonical_uuid(kind: &str, raw: &str) -> Result<String, String> {
    let parsed = Uuid::try_parse(raw).map_err(|_| format!("{kind} `{raw}` is not a uuid"))?;
    let canonical = parsed.hyphenated().to_string();
    if canonical != raw {
        return Err(format!(
            "{kind} `{raw}` must be written as a lowercase hyphenated uuid ({canonical})"
        ));
    }
    Ok(canonical)
}

macro_rules! uuid_id {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, String> {
                canonical_uuid($kind, raw).map(Self)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4().hyphenated().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

uuid_id!(RunId, "run id");
uuid_id!(MessageId, "message id");

pub fn validate_agent_name(raw: &str) -> Result<(), String> {
    if raw.is_empty() || raw.len() > MAX_AGENT_NAME_LEN {
        return Err(format!(
            "agent name `{raw}` must be 1 to {MAX_AGENT_NAME_LEN} characters"
        ));
    }
    let valid = raw
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid {
        return Err(format!(
            "agent name `{raw}` may only use ASCII letters, digits, '-' or '_'"
        ));
    }
    Ok(())
}

/// Worker template name, as configured under `agents:` or built in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentName(String);

impl AgentName {
    pub fn parse(raw: &str) -> Result<Self, String> {
        validate_agent_name(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentName {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        validate_agent_name(&raw)?;
        Ok(Self(raw))
    }
}

impl From<AgentName> for String {
    fn from(name: AgentName) -> Self {
        name.0
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_canonical_uuids() {
        let generated = RunId::generate();
        assert_eq!(RunId::parse(generated.as_str()), Ok(generated.clone()));
        assert_ne!(generated, RunId::generate());

        assert!(RunId::parse("run-1").is_err());
        assert!(RunId::parse("../etc/passwd").is_err());
        assert!(MessageId::parse("").is_err());
        let upper = generated.as_str().to_ascii_uppercase();
        assert!(RunId::parse(&upper).is_err());
    }

    #[test]
    fn documents_reject_malformed_ids_on_load() {
        let err = serde_json::from_str::<RunId>("\"not-a-uuid\"").expect_err("invalid");
        assert!(err.to_string().contains("not a uuid"));
        let id: MessageId =
            serde_json::from_str("\"6f1c2a9e-8d4b-4f0a-9a3e-1b2c3d4e5f60\"").expect("valid");
        assert_eq!(id.as_str(), "6f1c2a9e-8d4b-4f0a-9a3e-1b2c3d4e5f60");
    }

    #[test]
    fn agent_names_are_plain_words() {
        assert!(AgentName::parse("claude_code-2").is_ok());
        assert!(AgentName::parse("claude code").is_err());
        assert!(AgentName::parse(&"a".repeat(65)).is_err());
    }
}
