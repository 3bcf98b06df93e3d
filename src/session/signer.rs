use actix_web::cookie::{Cookie, CookieJar, Key};

use crate::errors::{ClicktrailError, Result};

/// HMAC 签名密钥最短长度（字节）
pub const MIN_SECRET_LEN: usize = 32;

/// Signs and verifies token values with the cookie crate's signed jar.
///
/// The cookie name is part of the MAC input, so a value signed for the session
/// cookie does not verify as a dedup marker and vice versa.
#[derive(Clone)]
pub struct TokenSigner {
    key: Key,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ClicktrailError::config(format!(
                "tracking.secret must be at least {} bytes, got {}",
                MIN_SECRET_LEN,
                secret.len()
            )));
        }
        Ok(Self {
            key: Key::derive_from(secret),
        })
    }

    /// 随机密钥（进程重启后旧 token 全部失效）
    pub fn random() -> Self {
        Self {
            key: Key::generate(),
        }
    }

    pub fn sign(&self, name: &str, value: &str) -> String {
        let mut jar = CookieJar::new();
        jar.signed_mut(&self.key)
            .add(Cookie::new(name.to_string(), value.to_string()));
        jar.get(name)
            .map(|cookie| cookie.value().to_string())
            .unwrap_or_default()
    }

    /// 校验签名，返回原文；签名不符返回 None
    pub fn verify(&self, name: &str, signed: &str) -> Option<String> {
        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(name.to_string(), signed.to_string()));
        jar.signed(&self.key)
            .get(name)
            .map(|cookie| cookie.value().to_string())
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSigner(..)")
    }
}
