//! Exchange credentials
//!
//! A `Credential` is shaped into `(exchange_id, secret_payload)` before it is
//! handed to a worker. Only fields that were explicitly set are sent; absent
//! fields are omitted rather than nulled so the library never treats an
//! empty placeholder as "provided".

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CredentialError;
use crate::normalize::Record;

/// Exchange credential. Not `Serialize`: secrets leave the process only
/// through [`Credential::shape`].
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credential {
    /// Exchange identifier, e.g. `binance`
    pub name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Two-factor secret
    #[serde(default)]
    pub twofa: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

impl Record for Credential {
    const NAME: &'static str = "Credential";
    const FIELDS: &'static [&'static str] = &[
        "name",
        "api_key",
        "secret",
        "password",
        "login",
        "uid",
        "token",
        "twofa",
        "private_key",
        "wallet_address",
    ];
    const OPAQUE: &'static [&'static str] = &[];
}

impl Credential {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn api_key(mut self, value: impl Into<String>) -> Self {
        self.api_key = Some(value.into());
        self
    }

    pub fn secret(mut self, value: impl Into<String>) -> Self {
        self.secret = Some(value.into());
        self
    }

    pub fn password(mut self, value: impl Into<String>) -> Self {
        self.password = Some(value.into());
        self
    }

    pub fn login(mut self, value: impl Into<String>) -> Self {
        self.login = Some(value.into());
        self
    }

    pub fn uid(mut self, value: impl Into<String>) -> Self {
        self.uid = Some(value.into());
        self
    }

    pub fn token(mut self, value: impl Into<String>) -> Self {
        self.token = Some(value.into());
        self
    }

    pub fn twofa(mut self, value: impl Into<String>) -> Self {
        self.twofa = Some(value.into());
        self
    }

    pub fn private_key(mut self, value: impl Into<String>) -> Self {
        self.private_key = Some(value.into());
        self
    }

    pub fn wallet_address(mut self, value: impl Into<String>) -> Self {
        self.wallet_address = Some(value.into());
        self
    }

    /// Wire name paired with the field value
    fn fields(&self) -> [(&'static str, Option<&String>); 9] {
        [
            ("apiKey", self.api_key.as_ref()),
            ("secret", self.secret.as_ref()),
            ("password", self.password.as_ref()),
            ("login", self.login.as_ref()),
            ("uid", self.uid.as_ref()),
            ("token", self.token.as_ref()),
            ("twofa", self.twofa.as_ref()),
            ("privateKey", self.private_key.as_ref()),
            ("walletAddress", self.wallet_address.as_ref()),
        ]
    }

    fn is_set(value: Option<&String>) -> bool {
        value.map_or(false, |v| !v.trim().is_empty())
    }

    /// Splits the credential into the exchange id and the minimal secret map.
    pub fn shape(&self) -> Result<(String, Map<String, Value>), CredentialError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CredentialError::MissingName);
        }

        let payload = self
            .fields()
            .into_iter()
            .filter(|(_, value)| Self::is_set(*value))
            .filter_map(|(key, value)| value.map(|v| (key.to_string(), Value::from(v.clone()))))
            .collect();

        Ok((name.to_string(), payload))
    }

    /// Presence shape for diagnostics, never the secret values.
    pub fn presence(&self) -> BTreeMap<&'static str, bool> {
        self.fields()
            .into_iter()
            .map(|(key, value)| (key, Self::is_set(value)))
            .collect()
    }

    /// Checks this credential against the exchange's requirement set.
    pub fn validate(&self, required: &RequiredCredentials) -> Result<(), CredentialError> {
        let missing: Vec<String> = self
            .fields()
            .into_iter()
            .filter(|(key, value)| required.requires(key) && !Self::is_set(*value))
            .map(|(key, _)| key.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CredentialError::MissingFields {
                exchange: self.name.clone(),
                missing,
            })
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Credential");
        s.field("name", &self.name);
        for (key, value) in self.fields() {
            s.field(key, &if Self::is_set(value) { "set" } else { "unset" });
        }
        s.finish()
    }
}

/// Which credential fields an exchange needs, as reported by the library
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredCredentials {
    fields: BTreeMap<String, bool>,
}

impl RequiredCredentials {
    /// Parses the library's `{apiKey: true, secret: true, uid: false, ...}` map.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let fields = map
            .iter()
            .map(|(k, v)| (k.clone(), v.as_bool().unwrap_or(false)))
            .collect();
        Some(Self { fields })
    }

    pub fn requires(&self, field: &str) -> bool {
        self.fields.get(field).copied().unwrap_or(false)
    }

    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, required)| **required)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

impl FromIterator<&'static str> for RequiredCredentials {
    fn from_iter<I: IntoIterator<Item = &'static str>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|k| (k.to_string(), true)).collect(),
        }
    }
}
