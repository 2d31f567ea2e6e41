//! End-to-end pipeline scenarios on the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use formgate_core::audit::AuditAction;
use formgate_core::clock::Clock;
use formgate_core::form::graph::{ChoiceOption, FormGraph, FormTemplate, QuantityItem, Step};
use formgate_core::form::traversal::{AnswerValue, QuantityAnswer};
use formgate_core::intake::{IntakeError, IntakePipeline};
use formgate_core::inventory::provision_items;
use formgate_core::ratelimit::{Quota, RateLimiter, RatePurpose};
use formgate_core::store::{
    FormBinding, FormCatalog, InventoryKey, InventoryLedger, Offering,
};
use formgate_core::submission::SubmitRequest;
use formgate_core::types::{
    BindingId, ChoiceId, OfferingId, ShareToken, StepId, TemplateId,
};
use formgate_testing::{FailingAuditSink, FailingSubmissionStore, FixedClock, MemoryStore, RecordingAuditSink};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn template() -> FormTemplate {
    let graph = FormGraph {
        root_step_id: StepId::new("name"),
        steps: [
            (
                StepId::new("name"),
                Step::Linear {
                    question: "Your name?".to_string(),
                    next_step_id: Some(StepId::new("meal")),
                },
            ),
            (
                StepId::new("meal"),
                Step::Choice {
                    question: "Meal preference?".to_string(),
                    options: vec![
                        ChoiceOption {
                            id: ChoiceId::new("veg"),
                            label: "Vegetarian".to_string(),
                            next_step_id: Some(StepId::new("addons")),
                        },
                        ChoiceOption {
                            id: ChoiceId::new("fish"),
                            label: "Fish".to_string(),
                            next_step_id: Some(StepId::new("addons")),
                        },
                    ],
                },
            ),
            (
                StepId::new("addons"),
                Step::Quantity {
                    question: "Add-ons?".to_string(),
                    items: vec![
                        QuantityItem {
                            choice_id: ChoiceId::new("kayak"),
                            label: "Kayak Tour".to_string(),
                            price: 4500,
                            limit: Some(2),
                            excluded_from_inventory: false,
                        },
                        QuantityItem {
                            choice_id: ChoiceId::new("lunch"),
                            label: "Lunch".to_string(),
                            price: 1500,
                            limit: Some(10),
                            excluded_from_inventory: false,
                        },
                    ],
                    next_step_id: Some(StepId::new("done")),
                },
            ),
            (
                StepId::new("done"),
                Step::Terminal {
                    thank_you_message: "Thanks!".to_string(),
                    submit_label: "Send".to_string(),
                },
            ),
        ]
        .into_iter()
        .collect(),
    };
    graph.validate().expect("fixture graph is valid");
    FormTemplate {
        id: TemplateId::new(),
        name: "Retreat intake".to_string(),
        graph,
        created_at: FixedClock::new().now(),
    }
}

struct Fixture {
    store: MemoryStore,
    audit: RecordingAuditSink,
    pipeline: IntakePipeline,
    token: ShareToken,
    template_id: TemplateId,
    offering_id: OfferingId,
}

async fn fixture_with(published: bool, active: bool) -> Fixture {
    let store = MemoryStore::new();
    let audit = RecordingAuditSink::new();
    let clock = Arc::new(FixedClock::new());
    let now = clock.now();

    let template = template();
    let template_id = template.id;
    store.insert_template(&template).await.unwrap();

    let offering = Offering {
        id: OfferingId::new(),
        template_id,
        name: "Spring retreat".to_string(),
        is_published: published,
        created_at: now,
    };
    let offering_id = offering.id;
    store.insert_offering(&offering).await.unwrap();

    let token = ShareToken::generate();
    let binding = FormBinding {
        id: BindingId::new(),
        share_token: token.clone(),
        template_id,
        offering_id: Some(offering_id),
        stage: None,
        is_active: active,
        created_at: now,
    };
    store.insert_binding(&binding).await.unwrap();
    store
        .provision(offering_id, &provision_items(&template.graph))
        .await
        .unwrap();

    let limiter = Arc::new(RateLimiter::new(clock.clone()).with_quota(
        RatePurpose::PublicSubmission,
        Quota { max: 1000, window: Duration::from_secs(60) },
    ));
    let pipeline = IntakePipeline::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(audit.clone()),
        limiter,
        clock,
    );

    Fixture {
        store,
        audit,
        pipeline,
        token,
        template_id,
        offering_id,
    }
}

async fn fixture() -> Fixture {
    fixture_with(true, true).await
}

fn request(kayak: u32, lunch: u32) -> SubmitRequest {
    let mut answers: BTreeMap<StepId, AnswerValue> = BTreeMap::new();
    answers.insert(StepId::new("name"), AnswerValue::Scalar("Ada".to_string()));
    answers.insert(StepId::new("meal"), AnswerValue::Scalar("veg".to_string()));
    answers.insert(
        StepId::new("addons"),
        AnswerValue::Quantities(vec![
            QuantityAnswer {
                choice_id: ChoiceId::new("kayak"),
                label: "Kayak Tour".to_string(),
                quantity: kayak,
                price: 4500,
            },
            QuantityAnswer {
                choice_id: ChoiceId::new("lunch"),
                label: "Lunch".to_string(),
                quantity: lunch,
                price: 1500,
            },
        ]),
    );
    SubmitRequest {
        answers,
        customer_name: Some("Ada".to_string()),
        customer_phone: "+1 555 867 5309".to_string(),
    }
}

fn kayak_key(offering_id: OfferingId) -> InventoryKey {
    InventoryKey {
        offering_id,
        step_id: StepId::new("addons"),
        choice_id: ChoiceId::new("kayak"),
    }
}

#[tokio::test]
async fn successful_intake_persists_and_reserves() {
    let fx = fixture().await;

    let submission = fx
        .pipeline
        .submit(&fx.token, "10.0.0.1", request(1, 2))
        .await
        .expect("intake succeeds");

    assert_eq!(submission.template_id, fx.template_id);
    assert_eq!(submission.offering_id, Some(fx.offering_id));
    assert!(!submission.is_viewed);
    assert_eq!(fx.store.submission_count().unwrap(), 1);
    assert_eq!(
        fx.store.total_ordered(&kayak_key(fx.offering_id)).unwrap(),
        Some(1)
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx
        .audit
        .events()
        .iter()
        .any(|e| e.action == AuditAction::SubmissionReceived));
}

#[tokio::test]
async fn oversell_boundary_scenario() {
    let fx = fixture().await;

    // Submission 1 takes the last two kayak seats.
    fx.pipeline
        .submit(&fx.token, "10.0.0.1", request(2, 0))
        .await
        .expect("first submission succeeds");
    assert_eq!(
        fx.store.total_ordered(&kayak_key(fx.offering_id)).unwrap(),
        Some(2)
    );

    // Submission 2 is rejected with the exact public message and no row.
    let err = fx
        .pipeline
        .submit(&fx.token, "10.0.0.2", request(1, 0))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Not enough stock for Kayak Tour. Only 0 remaining."
    );
    assert_eq!(fx.store.submission_count().unwrap(), 1);
}

#[tokio::test]
async fn all_or_nothing_reservation() {
    let fx = fixture().await;

    // Lunch (10 available) is fine, kayak (2 available) is not: neither
    // counter may move and no submission row may be written.
    let err = fx
        .pipeline
        .submit(&fx.token, "10.0.0.1", request(3, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, IntakeError::InsufficientStock { .. }));

    assert_eq!(
        fx.store.total_ordered(&kayak_key(fx.offering_id)).unwrap(),
        Some(0)
    );
    let lunch_key = InventoryKey {
        offering_id: fx.offering_id,
        step_id: StepId::new("addons"),
        choice_id: ChoiceId::new("lunch"),
    };
    assert_eq!(fx.store.total_ordered(&lunch_key).unwrap(), Some(0));
    assert_eq!(fx.store.submission_count().unwrap(), 0);
}

#[tokio::test]
async fn reads_never_mutate() {
    let fx = fixture().await;

    let view = fx.pipeline.form_view(&fx.token).await.expect("view");
    assert_eq!(view.inventory.len(), 2);
    let snapshot = fx.pipeline.inventory_view(&fx.token).await.expect("snapshot");
    assert_eq!(snapshot.len(), 2);

    assert_eq!(
        fx.store.total_ordered(&kayak_key(fx.offering_id)).unwrap(),
        Some(0)
    );
}

#[tokio::test]
async fn unpublished_offering_is_unavailable_with_zero_side_effects() {
    let fx = fixture_with(false, true).await;

    let err = fx
        .pipeline
        .submit(&fx.token, "10.0.0.1", request(1, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, IntakeError::NotAvailable));
    assert_eq!(
        fx.store.total_ordered(&kayak_key(fx.offering_id)).unwrap(),
        Some(0)
    );
    assert_eq!(fx.store.submission_count().unwrap(), 0);
}

#[tokio::test]
async fn inactive_binding_is_unavailable() {
    let fx = fixture_with(true, false).await;
    let err = fx.pipeline.form_view(&fx.token).await.unwrap_err();
    assert!(matches!(err, IntakeError::NotAvailable));
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let fx = fixture().await;
    let err = fx
        .pipeline
        .submit(&ShareToken::new("nope"), "10.0.0.1", request(0, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, IntakeError::NotFound));
}

#[tokio::test]
async fn rate_gate_runs_before_resolution() {
    let store = MemoryStore::new();
    let clock = Arc::new(FixedClock::new());
    let limiter = Arc::new(RateLimiter::new(clock.clone()).with_quota(
        RatePurpose::PublicSubmission,
        Quota { max: 2, window: Duration::from_secs(60) },
    ));
    let pipeline = IntakePipeline::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store),
        Arc::new(RecordingAuditSink::new()),
        limiter,
        clock,
    );

    // Bad tokens still consume budget: two misses exhaust the quota.
    for _ in 0..2 {
        let err = pipeline
            .submit(&ShareToken::new("nope"), "10.0.0.9", request(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::NotFound));
    }
    let err = pipeline
        .submit(&ShareToken::new("nope"), "10.0.0.9", request(0, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, IntakeError::RateLimited(_)));
}

#[tokio::test]
async fn invalid_phone_is_rejected_before_reservation() {
    let fx = fixture().await;
    let mut req = request(1, 0);
    req.customer_phone = "12345".to_string();

    let err = fx.pipeline.submit(&fx.token, "10.0.0.1", req).await.unwrap_err();
    assert!(matches!(err, IntakeError::Validation(_)));
    assert_eq!(
        fx.store.total_ordered(&kayak_key(fx.offering_id)).unwrap(),
        Some(0)
    );
}

#[tokio::test]
async fn audit_failure_never_surfaces() {
    let store = MemoryStore::new();
    let clock = Arc::new(FixedClock::new());
    let now = clock.now();

    let template = template();
    store.insert_template(&template).await.unwrap();
    let token = ShareToken::generate();
    store
        .insert_binding(&FormBinding {
            id: BindingId::new(),
            share_token: token.clone(),
            template_id: template.id,
            offering_id: None,
            stage: None,
            is_active: true,
            created_at: now,
        })
        .await
        .unwrap();

    let limiter = Arc::new(RateLimiter::new(clock.clone()));
    let pipeline = IntakePipeline::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(FailingAuditSink),
        limiter,
        clock,
    );

    pipeline
        .submit(&token, "10.0.0.1", request(0, 0))
        .await
        .expect("audit failure must not affect the response");
    assert_eq!(store.submission_count().unwrap(), 1);
}

#[tokio::test]
async fn legacy_binding_skips_reservation() {
    let store = MemoryStore::new();
    let clock = Arc::new(FixedClock::new());
    let now = clock.now();

    let template = template();
    store.insert_template(&template).await.unwrap();
    let token = ShareToken::generate();
    store
        .insert_binding(&FormBinding {
            id: BindingId::new(),
            share_token: token.clone(),
            template_id: template.id,
            offering_id: None,
            stage: None,
            is_active: true,
            created_at: now,
        })
        .await
        .unwrap();

    let limiter = Arc::new(RateLimiter::new(clock.clone()));
    let pipeline = IntakePipeline::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(RecordingAuditSink::new()),
        limiter,
        clock,
    );

    // Quantity answers persist as data; no counters exist, nothing reserves.
    let submission = pipeline
        .submit(&token, "10.0.0.1", request(2, 0))
        .await
        .expect("legacy intake succeeds");
    assert_eq!(submission.offering_id, None);
    assert_eq!(store.submission_count().unwrap(), 1);

    // The read path reports an empty snapshot for legacy bindings.
    let view = pipeline.form_view(&token).await.unwrap();
    assert!(view.inventory.is_empty());
}

#[tokio::test]
async fn persist_failure_after_reservation_is_an_audited_anomaly() {
    let fx = fixture().await;
    let clock = Arc::new(FixedClock::new());
    let audit = RecordingAuditSink::new();
    let limiter = Arc::new(RateLimiter::new(clock.clone()));
    let pipeline = IntakePipeline::new(
        Arc::new(fx.store.clone()),
        Arc::new(fx.store.clone()),
        Arc::new(FailingSubmissionStore),
        Arc::new(audit.clone()),
        limiter,
        clock,
    );

    let err = pipeline
        .submit(&fx.token, "10.0.0.1", request(1, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, IntakeError::Store(_)));

    // The reservation went through and is reported, not silently lost.
    assert_eq!(
        fx.store.total_ordered(&kayak_key(fx.offering_id)).unwrap(),
        Some(1)
    );
    // The dispatch task is spawned; give it a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let recorded = audit.events();
    assert!(recorded
        .iter()
        .any(|e| e.action == AuditAction::ReservationAnomaly));
}

#[tokio::test]
async fn limit_floor_scenario() {
    let fx = fixture().await;
    fx.pipeline
        .submit(&fx.token, "10.0.0.1", request(2, 0))
        .await
        .expect("submission succeeds");

    let key = kayak_key(fx.offering_id);
    let err = fx.store.set_limit(&key, Some(1)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "limit cannot be set below the 2 units already ordered"
    );

    // Limit unchanged: a third unit still does not fit.
    let err = fx
        .pipeline
        .submit(&fx.token, "10.0.0.2", request(1, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, IntakeError::InsufficientStock { .. }));

    // Raising the limit works and leaves the counter alone.
    fx.store.set_limit(&key, Some(5)).await.expect("raise limit");
    assert_eq!(fx.store.total_ordered(&key).unwrap(), Some(2));
}

#[tokio::test]
async fn provisioning_is_idempotent() {
    let fx = fixture().await;
    fx.pipeline
        .submit(&fx.token, "10.0.0.1", request(1, 0))
        .await
        .expect("submission succeeds");

    // Re-provisioning (e.g. a new stage binding) must not reset counters.
    let graph = template().graph;
    fx.store
        .provision(fx.offering_id, &provision_items(&graph))
        .await
        .unwrap();
    assert_eq!(
        fx.store.total_ordered(&kayak_key(fx.offering_id)).unwrap(),
        Some(1)
    );
}

#[tokio::test]
async fn stage_binding_wins_over_legacy_for_same_token() {
    let store = MemoryStore::new();
    let clock = Arc::new(FixedClock::new());
    let now = clock.now();

    let template = template();
    store.insert_template(&template).await.unwrap();
    let offering = Offering {
        id: OfferingId::new(),
        template_id: template.id,
        name: "Spring retreat".to_string(),
        is_published: true,
        created_at: now,
    };
    store.insert_offering(&offering).await.unwrap();

    let token = ShareToken::new("shared-token");
    store
        .insert_binding(&FormBinding {
            id: BindingId::new(),
            share_token: token.clone(),
            template_id: template.id,
            offering_id: None,
            stage: None,
            is_active: true,
            created_at: now,
        })
        .await
        .unwrap();
    store
        .insert_binding(&FormBinding {
            id: BindingId::new(),
            share_token: token.clone(),
            template_id: template.id,
            offering_id: Some(offering.id),
            stage: Some("deposit".to_string()),
            is_active: true,
            created_at: now,
        })
        .await
        .unwrap();

    let resolved = store.resolve_share_token(&token).await.unwrap().unwrap();
    assert_eq!(resolved.binding.stage.as_deref(), Some("deposit"));
    assert_eq!(resolved.offering.map(|o| o.id), Some(offering.id));
}
