use actix_web::{HttpRequest, HttpResponse, web};

use crate::api::{AppState, request_context};

pub struct ConversionService;

impl ConversionService {
    /// `POST {prefix}/conversion`
    ///
    /// Fire-and-forget: always 204, only the dedup cookie may change.
    pub async fn handle_conversion(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
        let ctx = request_context(&req, &state.trusted_proxies);
        let outcome = state.engine.calculator.on_conversion(&ctx).await;

        let mut builder = HttpResponse::NoContent();
        builder.insert_header(("Cache-Control", "no-store"));
        for cookie in outcome.cookies() {
            builder.cookie(cookie.clone());
        }
        builder.finish()
    }
}
