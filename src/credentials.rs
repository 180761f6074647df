use crate::error::QsError;
use std::env;
use std::fmt::{Debug, Formatter};

#[derive(Debug, Clone)]
pub struct AccessKeyId(pub String);

impl AsRef<str> for AccessKeyId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl AccessKeyId {
    pub fn new(access_key_id: String) -> Self {
        Self(access_key_id)
    }
}

#[derive(Clone)]
pub struct AccessKeySecret(pub String);

impl Debug for AccessKeySecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessKeySecret(<hidden>)")
    }
}

impl AsRef<str> for AccessKeySecret {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl AccessKeySecret {
    pub fn new(secret_access_key: String) -> Self {
        Self(secret_access_key)
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: AccessKeyId,
    pub secret_access_key: AccessKeySecret,
}

impl Credentials {
    pub fn new<S>(key: S, secret: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            access_key_id: AccessKeyId(key.into()),
            secret_access_key: AccessKeySecret(secret.into()),
        }
    }

    pub fn try_from_env() -> Result<Self, QsError> {
        let access_key_id = env::var("QS_ACCESS_KEY_ID")?;
        let secret_access_key = env::var("QS_SECRET_ACCESS_KEY")?;

        Ok(Self {
            access_key_id: AccessKeyId(access_key_id),
            secret_access_key: AccessKeySecret(secret_access_key),
        })
    }

    /// Requests are signed only when both halves are present.
    pub fn is_complete(&self) -> bool {
        !self.access_key_id.0.is_empty() && !self.secret_access_key.0.is_empty()
    }
}
