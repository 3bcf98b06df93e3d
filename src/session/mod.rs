//! Visitor session tokens
//!
//! A session is an ordered map `tracking id -> unix timestamp of the most
//! recent click`, serialized as `id:ts[,id:ts]*`. The same codec backs the
//! conversion dedup marker. Tokens are signed by [`TokenSigner`] and carried in
//! cookies built by [`VisitorTokens`].

mod cookies;
mod signer;

pub use cookies::{CookieSettings, DEFERRED_LIFETIME_SECS, VisitorTokens};
pub use signer::TokenSigner;

use tracing::warn;

use crate::errors::{ClicktrailError, Result};
use crate::utils::is_valid_tracking_id;

/// 单个时间戳最多 10 位数字
const MAX_TIMESTAMP_DIGITS: usize = 10;

/// 默认容量
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Ordered `tracking id -> timestamp` map with bounded size.
///
/// Insertion order is kept so serialization is stable; overwriting an existing
/// id refreshes its timestamp in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickSession {
    entries: Vec<(String, i64)>,
    max_entries: usize,
}

/// 转化去重标记与 session 共用同一编码
pub type DedupMarker = ClickSession;

impl ClickSession {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Parse a token, rejecting it as a whole on any grammar violation.
    ///
    /// An empty token yields an empty session. A token that carries more than
    /// `max_entries` ids is trimmed by the normal eviction rule.
    pub fn parse(token: &str, max_entries: usize) -> Result<Self> {
        let mut session = Self::new(max_entries);
        if token.is_empty() {
            return Ok(session);
        }

        for (index, pair) in token.split(',').enumerate() {
            let (id, ts) = pair.split_once(':').ok_or_else(|| {
                ClicktrailError::invalid_token(format!("entry {} has no ':' separator", index))
            })?;
            if !is_valid_tracking_id(id) {
                return Err(ClicktrailError::invalid_token(format!(
                    "entry {} has a malformed tracking id",
                    index
                )));
            }
            if ts.is_empty()
                || ts.len() > MAX_TIMESTAMP_DIGITS
                || !ts.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(ClicktrailError::invalid_token(format!(
                    "entry {} has a malformed timestamp",
                    index
                )));
            }
            // 10 位以内的数字必然落在 i64 范围内
            let ts: i64 = ts
                .parse()
                .map_err(|_| ClicktrailError::invalid_token("timestamp out of range"))?;
            session.add(id, ts);
        }

        Ok(session)
    }

    /// Parse, logging and discarding the whole token when it is malformed.
    pub fn parse_or_empty(token: &str, max_entries: usize) -> Self {
        match Self::parse(token, max_entries) {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding malformed session token: {}", e);
                Self::new(max_entries)
            }
        }
    }

    /// Insert or refresh `id`, then evict the oldest entries beyond capacity.
    pub fn add(&mut self, id: &str, ts: i64) {
        match self.entries.iter_mut().find(|(existing, _)| existing == id) {
            Some(entry) => entry.1 = ts,
            None => self.entries.push((id.to_string(), ts)),
        }
        self.evict();
    }

    /// [`add`](Self::add) stamped with the current time.
    pub fn add_now(&mut self, id: &str) {
        self.add(id, chrono::Utc::now().timestamp());
    }

    fn evict(&mut self) {
        while self.entries.len() > self.max_entries {
            // 时间戳最小者出局，并列时取最早插入的
            let oldest = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(index, (_, ts))| (*ts, *index))
                .map(|(index, _)| index);
            match oldest {
                Some(index) => {
                    self.entries.remove(index);
                }
                None => break,
            }
        }
    }

    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|(id, ts)| format!("{}:{}", id, ts))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn get(&self, id: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, ts)| *ts)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// 只保留满足条件的条目
    pub fn retain<F: FnMut(&str, i64) -> bool>(&mut self, mut keep: F) {
        self.entries.retain(|(id, ts)| keep(id, *ts));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(id, ts)| (id.as_str(), *ts))
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }
}
