//! 转化归因集成测试

mod common;

use std::sync::Arc;

use actix_web::cookie::Cookie;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use clicktrail::config::WeightingModel;
use clicktrail::engine::Engine;
use clicktrail::session::ClickSession;
use clicktrail::tracking::{ClickOutcome, ConsentState, ConversionEvent, ConversionOutcome};

use common::*;

/// 以浏览器身份点击，返回 session cookie
async fn click_at(
    engine: &Engine,
    id: &str,
    cookies: &[Cookie<'static>],
    at: DateTime<Utc>,
) -> Vec<Cookie<'static>> {
    let ctx = carry(browser(&format!("/go/{}", id)), cookies);
    match engine.recorder.handle_at(id, &ctx, at).await {
        ClickOutcome::Redirect { cookies, .. } => cookies,
        other => panic!("expected redirect, got {:?}", other),
    }
}

fn weight_of(weights: &[(String, f64)], id: &str) -> f64 {
    weights
        .iter()
        .find(|(i, _)| i == id)
        .map(|(_, w)| *w)
        .unwrap_or_else(|| panic!("{} missing from weights", id))
}

#[tokio::test]
async fn test_single_click_gets_full_credit() {
    let db = test_db().await;
    let engine = build_engine(&test_config(), &db.storage);
    let x = insert_definition(&db.storage, Some("/landing")).await;

    let t0 = Utc::now();
    let session = click_at(&engine, &x, &[], t0).await;

    let ctx = carry(browser("/thanks"), &session);
    let outcome = engine
        .calculator
        .on_conversion_at(&ctx, t0 + Duration::seconds(3600))
        .await;

    let ConversionOutcome::Attributed {
        weights,
        conversion_ids,
        cookies,
    } = outcome
    else {
        panic!("expected attribution, got {:?}", outcome);
    };
    assert_eq!(weights, vec![(x.clone(), 1.0)]);
    assert_eq!(conversion_ids.len(), 1);
    // 去重窗口为 0 时不写标记
    assert!(cookies.is_empty());

    let records = db.storage.conversions_for(&x).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, 1.0);
    let click = db.storage.latest_click(&x).await.unwrap().unwrap();
    assert_eq!(records[0].click_id, click.id);
}

#[tokio::test]
async fn test_last_click_writes_no_record_for_zero_weight() {
    let db = test_db().await;
    let engine = build_engine(&test_config(), &db.storage);
    let x = insert_definition(&db.storage, Some("/landing")).await;
    let y = insert_definition(&db.storage, Some("/landing")).await;

    let t0 = Utc::now();
    let session = click_at(&engine, &x, &[], t0).await;
    let session = click_at(&engine, &y, &session, t0 + Duration::seconds(3600)).await;

    let outcome = engine
        .calculator
        .on_conversion_at(
            &carry(browser("/thanks"), &session),
            t0 + Duration::seconds(7200),
        )
        .await;
    let ConversionOutcome::Attributed { weights, .. } = outcome else {
        panic!("expected attribution, got {:?}", outcome);
    };

    assert_eq!(weight_of(&weights, &y), 1.0);
    assert_eq!(weight_of(&weights, &x), 0.0);
    assert_eq!(db.storage.conversions_for(&y).await.unwrap().len(), 1);
    assert!(db.storage.conversions_for(&x).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_linear_and_time_decay_split_credit() {
    let db = test_db().await;
    let t0 = Utc::now();

    let mut config = test_config();
    config.tracking.weighting = WeightingModel::Linear;
    let engine = build_engine(&config, &db.storage);
    let x = insert_definition(&db.storage, Some("/landing")).await;
    let y = insert_definition(&db.storage, Some("/landing")).await;
    let session = click_at(&engine, &x, &[], t0).await;
    let session = click_at(&engine, &y, &session, t0 + Duration::seconds(60)).await;

    let outcome = engine
        .calculator
        .on_conversion_at(&carry(browser("/thanks"), &session), t0 + Duration::seconds(120))
        .await;
    let ConversionOutcome::Attributed { weights, .. } = outcome else {
        panic!("expected attribution, got {:?}", outcome);
    };
    assert_eq!(weight_of(&weights, &x), 0.5);
    assert_eq!(weight_of(&weights, &y), 0.5);

    config.tracking.weighting = WeightingModel::TimeDecay;
    config.tracking.time_decay_half_life_secs = 60;
    let engine = build_engine(&config, &db.storage);
    let outcome = engine
        .calculator
        .on_conversion_at(&carry(browser("/thanks"), &session), t0 + Duration::seconds(120))
        .await;
    let ConversionOutcome::Attributed { weights, .. } = outcome else {
        panic!("expected attribution, got {:?}", outcome);
    };
    assert!((weight_of(&weights, &y) - 2.0 / 3.0).abs() < 1e-9);
    assert!((weight_of(&weights, &x) - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(db.storage.conversions_for(&x).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_conversion_dedup_is_idempotent_within_window() {
    let db = test_db().await;
    let mut config = test_config();
    config.tracking.conversion_dedup_window_secs = 3600;
    let engine = build_engine(&config, &db.storage);
    let x = insert_definition(&db.storage, Some("/landing")).await;

    let t0 = Utc::now();
    let session = click_at(&engine, &x, &[], t0).await;
    let ctx = carry(browser("/thanks"), &session);

    let first = engine
        .calculator
        .on_conversion_at(&ctx, t0 + Duration::seconds(10))
        .await;
    assert!(first.is_attributed());
    assert_eq!(first.cookies().len(), 1);
    assert_eq!(first.cookies()[0].name(), "ct_conv");

    let ctx = carry(ctx, first.cookies());
    let again = engine
        .calculator
        .on_conversion_at(&ctx, t0 + Duration::seconds(20))
        .await;
    assert!(matches!(again, ConversionOutcome::Deduplicated));
    assert_eq!(db.storage.count_conversions().await.unwrap(), 1);

    let later = engine
        .calculator
        .on_conversion_at(&ctx, t0 + Duration::seconds(10 + 3600))
        .await;
    assert!(later.is_attributed());
    assert_eq!(db.storage.count_conversions().await.unwrap(), 2);
}

#[tokio::test]
async fn test_conversion_dedup_marks_zero_weight_ids_too() {
    let db = test_db().await;
    let mut config = test_config();
    config.tracking.conversion_dedup_window_secs = 3600;
    let engine = build_engine(&config, &db.storage);
    let x = insert_definition(&db.storage, Some("/landing")).await;
    let y = insert_definition(&db.storage, Some("/landing")).await;

    let t0 = Utc::now();
    let session = click_at(&engine, &x, &[], t0).await;
    let session = click_at(&engine, &y, &session, t0 + Duration::seconds(10)).await;
    let ctx = carry(browser("/thanks"), &session);

    let first = engine
        .calculator
        .on_conversion_at(&ctx, t0 + Duration::seconds(20))
        .await;
    let ConversionOutcome::Attributed { weights, cookies, .. } = &first else {
        panic!("expected attribution, got {:?}", first);
    };
    assert_eq!(weight_of(weights, &x), 0.0);
    assert_eq!(weight_of(weights, &y), 1.0);

    let marker = engine
        .tokens
        .read_dedup(&carry(browser("/thanks"), cookies).cookies, 50);
    assert!(marker.contains(&x));
    assert!(marker.contains(&y));

    // X 的权重为 0，但仍在窗口内，不能单独再归因一次
    let again = engine
        .calculator
        .on_conversion_at(&carry(ctx, cookies), t0 + Duration::seconds(30))
        .await;
    assert!(matches!(again, ConversionOutcome::Deduplicated));
    assert_eq!(db.storage.count_conversions().await.unwrap(), 1);
    assert!(db.storage.conversions_for(&x).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_conversion_requires_granted_consent_and_human_visitor() {
    let db = test_db().await;
    let engine = build_engine(&test_config(), &db.storage);
    let x = insert_definition(&db.storage, Some("/landing")).await;
    let session = click_at(&engine, &x, &[], Utc::now()).await;

    let mut denied_config = test_config();
    denied_config.tracking.default_consent = ConsentState::Denied;
    let denied = build_engine(&denied_config, &db.storage);
    let outcome = denied
        .calculator
        .on_conversion(&carry(browser("/thanks"), &session))
        .await;
    assert!(matches!(
        outcome,
        ConversionOutcome::ConsentNotGranted(ConsentState::Denied)
    ));
    assert!(outcome.cookies().is_empty());

    // 未明确同意同样不归因
    let mut pending_config = test_config();
    pending_config.tracking.consent_cookie = Some("cmp".to_string());
    let pending = build_engine(&pending_config, &db.storage);
    let outcome = pending
        .calculator
        .on_conversion(&carry(browser("/thanks"), &session))
        .await;
    assert!(matches!(
        outcome,
        ConversionOutcome::ConsentNotGranted(ConsentState::Undetermined)
    ));
    assert!(outcome.cookies().is_empty());

    let bot = carry(
        clicktrail::tracking::RequestContext::new("/thanks").with_user_agent(BOT_UA),
        &session,
    );
    assert!(matches!(
        engine.calculator.on_conversion(&bot).await,
        ConversionOutcome::Bot
    ));

    assert!(matches!(
        engine.calculator.on_conversion(&browser("/thanks")).await,
        ConversionOutcome::NoSession
    ));
    assert_eq!(db.storage.count_conversions().await.unwrap(), 0);
}

#[tokio::test]
async fn test_deactivated_definitions_are_dropped_from_session() {
    let db = test_db().await;
    let engine = build_engine(&test_config(), &db.storage);
    let x = insert_definition(&db.storage, Some("/landing")).await;
    let session = click_at(&engine, &x, &[], Utc::now()).await;

    db.storage.deactivate_definition(&x).await.unwrap();
    let outcome = engine
        .calculator
        .on_conversion(&carry(browser("/thanks"), &session))
        .await;
    assert!(matches!(outcome, ConversionOutcome::NoActiveDefinitions));
}

#[tokio::test]
async fn test_missing_click_rolls_back_whole_conversion() {
    let db = test_db().await;
    let mut config = test_config();
    config.tracking.weighting = WeightingModel::Linear;
    let engine = build_engine(&config, &db.storage);
    let clicked = insert_definition(&db.storage, Some("/landing")).await;
    let never_clicked = insert_definition(&db.storage, Some("/landing")).await;

    let t0 = Utc::now();
    click_at(&engine, &clicked, &[], t0).await;

    // session 中混入一个从未被点击过的有效标识符
    let mut session = ClickSession::new(50);
    session.add(&clicked, t0.timestamp());
    session.add(&never_clicked, t0.timestamp());
    let cookie = engine.tokens.session_cookie(&session);

    let outcome = engine
        .calculator
        .on_conversion_at(
            &carry(browser("/thanks"), &[cookie]),
            t0 + Duration::seconds(60),
        )
        .await;
    assert!(matches!(outcome, ConversionOutcome::Failed));
    assert_eq!(db.storage.count_conversions().await.unwrap(), 0);
}

#[tokio::test]
async fn test_tampered_session_is_ignored() {
    let db = test_db().await;
    let engine = build_engine(&test_config(), &db.storage);
    let x = insert_definition(&db.storage, Some("/landing")).await;

    let ctx = browser("/thanks").with_cookie("ct_clicks", format!("{}:1700000000", x));
    assert!(matches!(
        engine.calculator.on_conversion(&ctx).await,
        ConversionOutcome::NoSession
    ));
}

#[tokio::test]
async fn test_observers_and_reporters_run_after_attribution() {
    let db = test_db().await;
    let mut config = test_config();
    config.reporters.log = true;
    let engine = build_engine(&config, &db.storage);
    let x = insert_definition(&db.storage, Some("/landing")).await;
    let session = click_at(&engine, &x, &[], Utc::now()).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.conversion_observers.register(
        "capture",
        Arc::new(move |event: &ConversionEvent<'_>| {
            sink.lock().extend(event.weights.iter().cloned());
        }),
    );

    let outcome = engine
        .calculator
        .on_conversion(&carry(browser("/thanks"), &session))
        .await;
    assert!(outcome.is_attributed());
    assert_eq!(*seen.lock(), vec![(x.clone(), 1.0)]);

    let stats = engine.queue.stats().await.unwrap();
    assert_eq!(stats.pending, 1);
    let job = engine
        .queue
        .dequeue(10)
        .await
        .unwrap()
        .pop()
        .expect("one report job");
    assert_eq!(job.reporter, "log");
    assert_eq!(job.payload["clicks"][0]["tracking_id"], x.as_str());
    assert_eq!(job.payload["landing_path"], "/thanks");
}
