use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Textual form of the anonymous principal.
pub const ANONYMOUS_PRINCIPAL: &str = "2vxsx-fae";

const GROUP_LEN: usize = 5;

/// A stable identifier naming a caller or a deployed service instance.
///
/// Only the textual shape is validated (lowercase base32 groups of five
/// characters separated by `-`, the last group possibly shorter). The
/// checksum embedded in the first group is not verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrincipalError {
    #[error("principal text is empty")]
    Empty,
    #[error("invalid character {0:?} in principal text")]
    InvalidChar(char),
    #[error("malformed principal group {0:?}")]
    MalformedGroup(String),
}

impl Principal {
    /// The well-known sentinel for "no authenticated caller".
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_PRINCIPAL.to_string())
    }

    pub fn from_text(text: &str) -> Result<Self, PrincipalError> {
        if text.is_empty() {
            return Err(PrincipalError::Empty);
        }
        if let Some(c) = text
            .chars()
            .find(|c| !matches!(c, 'a'..='z' | '2'..='7' | '-'))
        {
            return Err(PrincipalError::InvalidChar(c));
        }

        let groups: Vec<&str> = text.split('-').collect();
        let last = groups.len() - 1;
        for (i, group) in groups.iter().enumerate() {
            let ok = if i == last {
                !group.is_empty() && group.len() <= GROUP_LEN
            } else {
                group.len() == GROUP_LEN
            };
            if !ok {
                return Err(PrincipalError::MalformedGroup((*group).to_string()));
            }
        }

        Ok(Self(text.to_string()))
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_PRINCIPAL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Principal {
    type Err = PrincipalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl Serialize for Principal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_text(&text).map_err(de::Error::custom)
    }
}
