use std::collections::HashMap;

use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use tracing::warn;

use super::signer::TokenSigner;
use super::{ClickSession, DedupMarker};

/// 延迟传输 cookie 的生命周期（秒）
pub const DEFERRED_LIFETIME_SECS: i64 = 60;

/// Cookie 名称与属性
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub session_name: String,
    pub dedup_name: String,
    pub deferred_name: String,
    pub secure: bool,
    pub session_lifetime_secs: u64,
}

/// Reads and writes the visitor-held tokens.
///
/// Values are signed with [`TokenSigner`] and percent-encoded, since the
/// token grammar uses `,` which is not a valid cookie-octet.
#[derive(Debug, Clone)]
pub struct VisitorTokens {
    signer: TokenSigner,
    settings: CookieSettings,
}

impl VisitorTokens {
    pub fn new(signer: TokenSigner, settings: CookieSettings) -> Self {
        Self { signer, settings }
    }

    pub fn settings(&self) -> &CookieSettings {
        &self.settings
    }

    fn read_signed(&self, cookies: &HashMap<String, String>, name: &str) -> Option<String> {
        let raw = cookies.get(name)?;
        let decoded = urlencoding::decode(raw).ok()?;
        let verified = self.signer.verify(name, &decoded);
        if verified.is_none() {
            warn!("Discarding {} cookie with an invalid signature", name);
        }
        verified
    }

    fn encode_signed(&self, name: &str, value: &str) -> String {
        urlencoding::encode(&self.signer.sign(name, value)).into_owned()
    }

    /// 读取 session，缺失、签名错误或语法错误都得到空 session
    pub fn read_session(
        &self,
        cookies: &HashMap<String, String>,
        max_entries: usize,
    ) -> ClickSession {
        self.read_signed(cookies, &self.settings.session_name)
            .map(|token| ClickSession::parse_or_empty(&token, max_entries))
            .unwrap_or_else(|| ClickSession::new(max_entries))
    }

    /// 读取转化去重标记
    pub fn read_dedup(&self, cookies: &HashMap<String, String>, max_entries: usize) -> DedupMarker {
        self.read_signed(cookies, &self.settings.dedup_name)
            .map(|token| DedupMarker::parse_or_empty(&token, max_entries))
            .unwrap_or_else(|| DedupMarker::new(max_entries))
    }

    /// 读取延迟传输 cookie（同意回传时用于恢复点击时间戳）
    pub fn read_deferred(
        &self,
        cookies: &HashMap<String, String>,
        max_entries: usize,
    ) -> ClickSession {
        self.read_signed(cookies, &self.settings.deferred_name)
            .map(|token| ClickSession::parse_or_empty(&token, max_entries))
            .unwrap_or_else(|| ClickSession::new(max_entries))
    }

    fn visitor_cookie(&self, name: &str, value: String, max_age_secs: i64) -> Cookie<'static> {
        let mut cookie = Cookie::new(name.to_string(), value);
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_secure(self.settings.secure);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_max_age(CookieDuration::seconds(max_age_secs));
        cookie
    }

    pub fn session_cookie(&self, session: &ClickSession) -> Cookie<'static> {
        let name = self.settings.session_name.as_str();
        self.visitor_cookie(
            name,
            self.encode_signed(name, &session.serialize()),
            self.settings.session_lifetime_secs as i64,
        )
    }

    /// 去重标记 cookie，生命周期 = 去重窗口，且不超过 session 生命周期
    pub fn dedup_cookie(&self, marker: &DedupMarker, window_secs: u64) -> Cookie<'static> {
        let name = self.settings.dedup_name.as_str();
        let lifetime = window_secs.min(self.settings.session_lifetime_secs);
        self.visitor_cookie(
            name,
            self.encode_signed(name, &marker.serialize()),
            lifetime as i64,
        )
    }

    /// 延迟传输 cookie：客户端脚本可读（非 HttpOnly），60 秒有效
    pub fn deferred_cookie(&self, pending: &ClickSession) -> Cookie<'static> {
        let name = self.settings.deferred_name.as_str();
        let mut cookie =
            self.visitor_cookie(name, self.encode_signed(name, &pending.serialize()), DEFERRED_LIFETIME_SECS);
        cookie.set_http_only(false);
        cookie
    }

    /// 延迟传输 URL fragment：`name=<signed token>`
    pub fn deferred_fragment(&self, pending: &ClickSession) -> String {
        let name = self.settings.deferred_name.as_str();
        format!("{}={}", name, self.encode_signed(name, &pending.serialize()))
    }

    /// 清除延迟传输 cookie
    pub fn clear_deferred_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.settings.deferred_name.clone(), "");
        cookie.set_path("/");
        cookie.make_removal();
        cookie
    }
}
