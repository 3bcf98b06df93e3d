use actix_web::HttpRequest;
use actix_web::http::header;

use crate::tracking::RequestContext;
use crate::utils::ip::extract_client_ip;

fn header_value(req: &HttpRequest, name: header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
}

/// 从 actix 请求构建引擎的请求上下文
pub fn request_context(req: &HttpRequest, trusted_proxies: &[String]) -> RequestContext {
    let mut ctx = RequestContext::new(req.path()).with_query(req.query_string());
    ctx.ip = extract_client_ip(&req.connection_info(), req.headers(), trusted_proxies);
    ctx.user_agent = header_value(req, header::USER_AGENT);
    ctx.referrer = header_value(req, header::REFERER);
    if let Ok(cookies) = req.cookies() {
        for cookie in cookies.iter() {
            ctx.cookies
                .insert(cookie.name().to_string(), cookie.value().to_string());
        }
    }
    ctx
}
