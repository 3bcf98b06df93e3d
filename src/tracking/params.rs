//! Campaign query parameters
//!
//! Per-visit dimension resolution and platform click identifier capture.

use std::collections::BTreeMap;

use super::RequestContext;
use crate::storage::CampaignDimensions;

/// 广告平台点击标识参数
pub const PLATFORM_CLICK_PARAMS: &[&str] = &[
    "gclid", "gbraid", "wbraid", "fbclid", "msclkid", "ttclid", "li_fat_id", "twclid",
];

/// 平台标识值最长保留长度
const MAX_PLATFORM_ID_LEN: usize = 512;

/// 从查询参数中提取平台点击标识
pub fn extract_platform_ids(ctx: &RequestContext) -> BTreeMap<String, String> {
    PLATFORM_CLICK_PARAMS
        .iter()
        .filter_map(|name| {
            ctx.query_param(name)
                .filter(|v| v.len() <= MAX_PLATFORM_ID_LEN)
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

fn incoming(ctx: &RequestContext, utm: &str, mtm: &str) -> Option<String> {
    ctx.query_param(utm)
        .or_else(|| ctx.query_param(mtm))
        .map(str::to_string)
}

/// 合并定义维度与本次访问的查询参数
///
/// - source / medium / campaign：定义值优先，空缺时依次取 `utm_*`、`mtm_*`
/// - content / term：本次访问的 `utm_*` / `mtm_*` 覆盖定义值
pub fn resolve_dimensions(stored: &CampaignDimensions, ctx: &RequestContext) -> CampaignDimensions {
    CampaignDimensions {
        source: stored
            .source
            .clone()
            .or_else(|| incoming(ctx, "utm_source", "mtm_source")),
        medium: stored
            .medium
            .clone()
            .or_else(|| incoming(ctx, "utm_medium", "mtm_medium")),
        campaign: stored
            .campaign
            .clone()
            .or_else(|| incoming(ctx, "utm_campaign", "mtm_campaign")),
        content: incoming(ctx, "utm_content", "mtm_content").or_else(|| stored.content.clone()),
        term: incoming(ctx, "utm_term", "mtm_kwd").or_else(|| stored.term.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> CampaignDimensions {
        CampaignDimensions {
            source: Some("newsletter".to_string()),
            medium: None,
            campaign: None,
            content: Some("hero".to_string()),
            term: None,
        }
    }

    #[test]
    fn test_backfill_prefers_stored_then_utm_then_mtm() {
        let ctx = RequestContext::default().with_query(
            "utm_source=google&utm_medium=cpc&mtm_medium=ignored&mtm_campaign=spring",
        );
        let dims = resolve_dimensions(&stored(), &ctx);
        assert_eq!(dims.source.as_deref(), Some("newsletter"));
        assert_eq!(dims.medium.as_deref(), Some("cpc"));
        assert_eq!(dims.campaign.as_deref(), Some("spring"));
    }

    #[test]
    fn test_content_and_term_overridden_per_visit() {
        let ctx = RequestContext::default().with_query("utm_content=sidebar&mtm_kwd=shoes");
        let dims = resolve_dimensions(&stored(), &ctx);
        assert_eq!(dims.content.as_deref(), Some("sidebar"));
        assert_eq!(dims.term.as_deref(), Some("shoes"));

        let untouched = resolve_dimensions(&stored(), &RequestContext::default());
        assert_eq!(untouched.content.as_deref(), Some("hero"));
    }

    #[test]
    fn test_extract_platform_ids() {
        let ctx = RequestContext::default()
            .with_query("gclid=abc&fbclid=&msclkid=xyz&utm_source=google");
        let ids = extract_platform_ids(&ctx);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.get("gclid").map(String::as_str), Some("abc"));
        assert_eq!(ids.get("msclkid").map(String::as_str), Some("xyz"));
    }
}
