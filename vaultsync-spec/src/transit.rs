use crate::error::Result;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A configured client for a transit-style encryption service.
///
/// `write` performs one request/response round trip against `path` (relative
/// to the service root, e.g. `transit/encrypt/app`) and returns the response's
/// `data` object.
pub trait TransitApi: Send + Sync {
    fn write(&self, path: &str, body: Map<String, Value>) -> Result<Map<String, Value>>;
}

/// Encrypt and decrypt under a fixed key.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

impl<T> TransitApi for Arc<T>
where
    T: TransitApi + ?Sized,
{
    fn write(&self, path: &str, body: Map<String, Value>) -> Result<Map<String, Value>> {
        (**self).write(path, body)
    }
}

impl<T> TransitApi for Box<T>
where
    T: TransitApi + ?Sized,
{
    fn write(&self, path: &str, body: Map<String, Value>) -> Result<Map<String, Value>> {
        (**self).write(path, body)
    }
}

impl<T> Cipher for Arc<T>
where
    T: Cipher + ?Sized,
{
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        (**self).encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        (**self).decrypt(ciphertext)
    }
}

impl<T> Cipher for Box<T>
where
    T: Cipher + ?Sized,
{
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        (**self).encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        (**self).decrypt(ciphertext)
    }
}
