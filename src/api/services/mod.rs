pub mod click;
pub mod consent;
pub mod conversion;
pub mod health;

use actix_governor::{Governor, GovernorConfig};
use actix_web::{Scope, web};
use governor::middleware::NoOpMiddleware;

pub use click::{ClickService, not_found_response, render_redirect};
pub use consent::{
    ConsentKeyExtractor, ConsentRequest, ConsentResponse, ConsentService, consent_rate_limit_config,
};
pub use conversion::ConversionService;
pub use health::HealthService;

/// 追踪前缀下的全部路由
///
/// - `GET  {prefix}` / `GET {prefix}/{id}`：点击跳转（空标识符走回退地址）
/// - `POST {prefix}/conversion`：转化触发，始终 204
/// - `POST {prefix}/consent`：同意回传，按 IP 限流
pub fn tracking_routes(
    prefix: &str,
    consent_limit: &GovernorConfig<ConsentKeyExtractor, NoOpMiddleware>,
) -> Scope {
    web::scope(prefix)
        .route("/conversion", web::post().to(ConversionService::handle_conversion))
        .service(
            web::resource("/consent")
                .wrap(Governor::new(consent_limit))
                .route(web::post().to(ConsentService::handle_consent)),
        )
        .route("", web::get().to(ClickService::handle_click))
        .route("/", web::get().to(ClickService::handle_click))
        .route("/{id}", web::get().to(ClickService::handle_click))
}

pub fn health_routes() -> actix_web::Resource {
    web::resource("/health").route(web::get().to(HealthService::health_check))
}
