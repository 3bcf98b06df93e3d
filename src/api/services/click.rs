use actix_web::cookie::Cookie;
use actix_web::http::{StatusCode, header};
use actix_web::{HttpRequest, HttpResponse, web};
use tracing::trace;

use crate::api::{AppState, request_context};
use crate::config::RedirectMode;
use crate::tracking::ClickOutcome;

pub struct ClickService;

impl ClickService {
    /// `GET {prefix}/{id}`
    pub async fn handle_click(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
        let id = req.match_info().get("id").unwrap_or_default().to_string();
        let ctx = request_context(&req, &state.trusted_proxies);
        let engine = &state.engine;

        match engine.recorder.handle(&id, &ctx).await {
            ClickOutcome::PassThrough => match &engine.settings.fallback_url {
                Some(fallback) => {
                    trace!("Empty tracking id, sending visitor to fallback {}", fallback);
                    HttpResponse::Found()
                        .insert_header((header::LOCATION, fallback.as_str()))
                        .insert_header((header::CACHE_CONTROL, "no-store"))
                        .finish()
                }
                None => not_found_response(),
            },
            ClickOutcome::NotFound => not_found_response(),
            ClickOutcome::Redirect {
                location,
                mode,
                cookies,
                ..
            } => render_redirect(&location, mode, cookies),
        }
    }
}

pub fn not_found_response() -> HttpResponse {
    HttpResponse::build(StatusCode::NOT_FOUND)
        .insert_header((header::CONTENT_TYPE, "text/html; charset=utf-8"))
        .insert_header((header::CACHE_CONTROL, "public, max-age=60"))
        .body("Not Found")
}

/// 302 或客户端执行的 HTML 跳转页
pub fn render_redirect(
    location: &str,
    mode: RedirectMode,
    cookies: Vec<Cookie<'static>>,
) -> HttpResponse {
    let mut builder = match mode {
        RedirectMode::Http => {
            let mut builder = HttpResponse::Found();
            builder.insert_header((header::LOCATION, location));
            builder
        }
        RedirectMode::Client => {
            let mut builder = HttpResponse::Ok();
            builder.insert_header((header::CONTENT_TYPE, "text/html; charset=utf-8"));
            builder
        }
    };
    builder.insert_header((header::CACHE_CONTROL, "no-store"));
    for cookie in cookies {
        builder.cookie(cookie);
    }

    match mode {
        RedirectMode::Http => builder.finish(),
        RedirectMode::Client => builder.body(client_redirect_page(location)),
    }
}

fn client_redirect_page(location: &str) -> String {
    let attr = escape_html(location);
    // JSON 字符串字面量可直接嵌入脚本，再转义 `</` 防止提前闭合 script
    let js = serde_json::to_string(location)
        .unwrap_or_else(|_| "\"/\"".to_string())
        .replace("</", "<\\/");
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
         <meta name=\"robots\" content=\"noindex\">\
         <meta http-equiv=\"refresh\" content=\"0;url={attr}\">\
         <title>Redirecting</title></head>\
         <body><a href=\"{attr}\">Continue</a>\
         <script>window.location.replace({js});</script></body></html>\n"
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
