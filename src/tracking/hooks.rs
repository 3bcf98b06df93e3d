//! Named extension-point registries
//!
//! 观察者按名称注册，同名注册会替换旧条目但保留原位置；调用按注册顺序同步进行。

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ConsentState, RequestContext};
use crate::storage::{ClickRecord, TrackingDefinition};

/// Ordered registry of named handlers.
pub struct HookRegistry<T: ?Sized> {
    entries: RwLock<Vec<(String, Arc<T>)>>,
}

impl<T: ?Sized> Default for HookRegistry<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> HookRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, handler: Arc<T>) {
        let name = name.into();
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = handler,
            None => entries.push((name, handler)),
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| existing != name);
        entries.len() != before
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, handler)| Arc::clone(handler))
    }

    /// 拷贝当前条目，调用期间不持有锁
    pub fn snapshot(&self) -> Vec<(String, Arc<T>)> {
        self.entries.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: ?Sized> std::fmt::Debug for HookRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Payload of the click-observed extension point.
///
/// `click` is `None` for repeat visits inside the click dedup window.
#[derive(Debug, Clone)]
pub struct ClickEvent<'a> {
    pub tracking_id: &'a str,
    pub definition: &'a TrackingDefinition,
    pub click: Option<&'a ClickRecord>,
    pub consent: ConsentState,
    pub platform_ids: &'a BTreeMap<String, String>,
    pub raw_query: &'a str,
    pub ctx: &'a RequestContext,
}

pub trait ClickObserver: Send + Sync {
    fn on_click(&self, event: &ClickEvent<'_>);
}

impl<F> ClickObserver for F
where
    F: Fn(&ClickEvent<'_>) + Send + Sync,
{
    fn on_click(&self, event: &ClickEvent<'_>) {
        self(event)
    }
}

/// Payload of the conversion-recorded notification.
#[derive(Debug, Clone)]
pub struct ConversionEvent<'a> {
    /// 全部存活标识符的权重（包括 0）
    pub weights: &'a [(String, f64)],
    pub ctx: &'a RequestContext,
}

pub trait ConversionObserver: Send + Sync {
    fn on_conversion(&self, event: &ConversionEvent<'_>);
}

impl<F> ConversionObserver for F
where
    F: Fn(&ConversionEvent<'_>) + Send + Sync,
{
    fn on_conversion(&self, event: &ConversionEvent<'_>) {
        self(event)
    }
}
