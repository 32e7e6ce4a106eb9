use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::error::{InvalidIdSnafu, RemoteError, RemoteResult};

// Both identifiers are opaque keys owned by the remote store; one macro keeps them identical.
macro_rules! define_remote_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> RemoteResult<Self> {
                ensure!(
                    !raw.trim().is_empty(),
                    InvalidIdSnafu {
                        stage: "parse-remote-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                    }
                );
                Ok(Self(raw.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = RemoteError;

            fn from_str(raw: &str) -> RemoteResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_remote_id!(UserId, "user-id");
define_remote_id!(SessionId, "session-id");

impl SessionId {
    /// Builds the timestamp-derived identifier used for sessions created on this client.
    pub fn from_unix_millis(millis: i64) -> Self {
        Self(millis.to_string())
    }

    /// Creation time encoded in the identifier, when it is an integer.
    pub fn unix_millis(&self) -> Option<i64> {
        self.0.parse::<i64>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_ids_verbatim_and_rejects_blank_ones() {
        let user = UserId::parse("u1").expect("valid id");
        assert_eq!(user.as_str(), "u1");
        let padded = SessionId::parse(" abc").expect("valid id");
        assert_eq!(padded.as_str(), " abc");
        assert_ne!(padded, SessionId::parse("abc").expect("valid id"));

        let error = SessionId::parse("   ").expect_err("blank id");
        assert!(matches!(
            error,
            RemoteError::InvalidId {
                id_type: "session-id",
                ..
            }
        ));
    }

    #[test]
    fn session_id_exposes_encoded_timestamp() {
        let session = SessionId::from_unix_millis(1_700_000_000_000);
        assert_eq!(session.as_str(), "1700000000000");
        assert_eq!(session.unix_millis(), Some(1_700_000_000_000));

        let named = SessionId::parse("Chat 3").expect("valid id");
        assert_eq!(named.unix_millis(), None);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let session = SessionId::parse("abc").expect("valid id");
        assert_eq!(serde_json::to_string(&session).expect("json"), "\"abc\"");
    }
}
