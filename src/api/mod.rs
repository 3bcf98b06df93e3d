//! HTTP surface
//!
//! actix-web 适配层：把请求转换为 [`RequestContext`](crate::tracking::RequestContext)，
//! 把引擎结果转换为响应。业务逻辑全部在 `tracking` 中。

pub mod context;
pub mod middleware;
pub mod services;
pub mod state;

pub use context::request_context;
pub use state::AppState;
