use woothee::parser::Parser;

use super::RequestContext;

/// Decides whether a request comes from automated traffic.
pub trait BotDetector: Send + Sync {
    fn is_bot(&self, ctx: &RequestContext) -> bool;
}

impl<F> BotDetector for F
where
    F: Fn(&RequestContext) -> bool + Send + Sync,
{
    fn is_bot(&self, ctx: &RequestContext) -> bool {
        self(ctx)
    }
}

/// User-Agent heuristic: woothee `crawler` category, a missing UA, or any of
/// the configured substrings.
pub struct UserAgentBotDetector {
    parser: Parser,
    markers: Vec<String>,
}

impl UserAgentBotDetector {
    pub fn new(markers: &[String]) -> Self {
        Self {
            parser: Parser::new(),
            markers: markers
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }
}

impl BotDetector for UserAgentBotDetector {
    fn is_bot(&self, ctx: &RequestContext) -> bool {
        let ua = match ctx.user_agent.as_deref().map(str::trim) {
            Some(ua) if !ua.is_empty() => ua,
            _ => return true,
        };

        if self
            .parser
            .parse(ua)
            .is_some_and(|result| result.category == "crawler")
        {
            return true;
        }

        let lower = ua.to_lowercase();
        self.markers.iter().any(|marker| lower.contains(marker))
    }
}
