//! Transit-backed [`Cipher`] bound to one mount and key.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Map, Value};
use tracing::debug;
use vaultsync_spec::{Cipher, Error, Result, TransitApi};

#[derive(Clone, Debug)]
pub struct CryptoService<T> {
    api: T,
    mount: String,
    key: String,
}

impl<T: TransitApi> CryptoService<T> {
    pub fn new(api: T, mount: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            api,
            mount: mount.into().trim_matches('/').to_string(),
            key: key.into(),
        }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn api(&self) -> &T {
        &self.api
    }

    fn operation_path(&self, operation: &str) -> String {
        format!("{}/{operation}/{}", self.mount, self.key)
    }

    fn call(&self, operation: &str, input: (&str, String), result_field: &str) -> Result<String> {
        let (field, payload) = input;
        let mut body = Map::new();
        body.insert(field.to_string(), Value::String(payload));
        let response = self.api.write(&self.operation_path(operation), body)?;
        match response.get(result_field) {
            Some(Value::String(value)) => Ok(value.clone()),
            Some(other) => Err(Error::Encoding(format!(
                "{operation} response field {result_field} is {}, expected a string",
                vaultsync_spec::value_kind(other)
            ))),
            None => Err(Error::Encoding(format!(
                "{operation} response missing {result_field}"
            ))),
        }
    }
}

impl<T: TransitApi> Cipher for CryptoService<T> {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        debug!(mount = %self.mount, key = %self.key, "transit encrypt");
        self.call(
            "encrypt",
            ("plaintext", STANDARD.encode(plaintext.as_bytes())),
            "ciphertext",
        )
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        debug!(mount = %self.mount, key = %self.key, "transit decrypt");
        let encoded = self.call(
            "decrypt",
            ("ciphertext", ciphertext.to_string()),
            "plaintext",
        )?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|err| Error::Encoding(format!("decrypted plaintext is not base64: {err}")))?;
        String::from_utf8(bytes)
            .map_err(|err| Error::Encoding(format!("decrypted plaintext is not utf-8: {err}")))
    }
}
