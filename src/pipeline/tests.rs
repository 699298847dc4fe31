use super::*;
use crate::api::{BoothApi, Method, MockReply, MockTransport};
use crate::config::{BoothConfig, PipelineConfig};
use crate::error::GENERIC_ERROR_MESSAGE;
use crate::events::{BoothEvent, EventBus};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn pipeline_config(print_enabled: bool, promo_enabled: bool) -> PipelineConfig {
    let mut config = BoothConfig::default().pipeline;
    config.print_enabled = print_enabled;
    config.promo_enabled = promo_enabled;
    config.event_code = "EV1".to_string();
    config.station_code = "ST1".to_string();
    config.printer_name = "DNP".to_string();
    config
}

fn backend() -> Arc<MockTransport> {
    let transport = Arc::new(MockTransport::new());
    transport.on(
        Method::Post,
        "/gallery/generate/qrcode",
        MockReply::success(json!({ "qrcode": "AB12" })),
    );
    transport.on(
        Method::Post,
        "/gallery/upload",
        MockReply::success(json!({ "url": "https://cdn.example/AB12.jpg" })),
    );
    transport
}

fn orchestrator(transport: &Arc<MockTransport>, config: PipelineConfig) -> PipelineOrchestrator {
    PipelineOrchestrator::new(BoothApi::new(transport.clone()), config)
}

fn states(run: &PipelineRun) -> Vec<StepState> {
    run.steps().iter().map(|(_, state)| *state).collect()
}

#[test]
fn test_plan_preseeds_disabled_printer_steps() {
    let plan = StepPlan::new(PipelineCapabilities {
        print_enabled: false,
        promo_enabled: false,
    });

    for (step, state) in plan.steps() {
        let expected = if step.is_printer() {
            StepState::Success
        } else {
            StepState::Idle
        };
        assert_eq!(*state, expected, "step {}", step);
    }
    assert_eq!(plan.live_steps().count(), 8);
}

#[test]
fn test_step_keys_keep_declaration_order() {
    let mut sorted = StepKey::ALL.to_vec();
    sorted.sort();
    assert_eq!(sorted, StepKey::ALL.to_vec());
    assert_eq!(StepKey::ALL[0], StepKey::Clear);
    assert_eq!(StepKey::ALL[9], StepKey::Cleanup);
}

#[tokio::test]
async fn test_full_run_executes_every_step_in_order() {
    let transport = backend();
    let orchestrator = orchestrator(&transport, pipeline_config(true, false));
    orchestrator.open();

    let outcome = orchestrator.run().await;

    let result = match outcome {
        RunOutcome::Completed(result) => result,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(result.qrcode, "AB12");
    assert_eq!(
        result.result_url.as_deref(),
        Some("https://cdn.example/AB12.jpg")
    );

    assert_eq!(
        transport.routes_called(),
        vec![
            "POST /manage/clear-path",
            "GET /capture/make-input",
            "POST /gallery/generate/qrcode",
            "POST /render/image",
            "POST /render/draw-text",
            "POST /gallery/upload/pre-upload",
            "POST /gallery/upload",
            "POST /printer/pre-print",
            "POST /printer/print/windows",
            "GET /capture/clear-all-capture",
        ]
    );

    let run = orchestrator.snapshot().unwrap();
    assert!(run.is_complete());
    assert!(!run.running);
    assert!(run.error_message.is_none());
}

#[tokio::test]
async fn test_generated_code_is_drawn_onto_render() {
    let transport = backend();
    let orchestrator = orchestrator(&transport, pipeline_config(false, false));
    orchestrator.open();

    orchestrator.run().await;

    let draw = transport.calls_to("/render/draw-text");
    assert_eq!(draw.len(), 1);
    let body = draw[0].body.clone().unwrap();
    assert_eq!(body["text"], "AB12");
    assert_eq!(body["qrcode"], "AB12");

    let render = transport.calls_to("/render/image");
    assert_eq!(render[0].body.as_ref().unwrap()["qrcode"], "AB12");
}

#[tokio::test]
async fn test_printing_disabled_makes_no_printer_calls() {
    let transport = backend();
    let orchestrator = orchestrator(&transport, pipeline_config(false, false));

    let opened = orchestrator.open();
    assert_eq!(opened.state(StepKey::PrinterPrepare), StepState::Success);
    assert_eq!(opened.state(StepKey::PrinterPrint), StepState::Success);

    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let orchestrator = orchestrator.with_event_bus(bus);
    orchestrator.open();

    assert!(matches!(orchestrator.run().await, RunOutcome::Completed(_)));
    assert_eq!(transport.call_count("/printer"), 0);

    let run = orchestrator.snapshot().unwrap();
    assert_eq!(run.state(StepKey::PrinterPrepare), StepState::Success);
    assert_eq!(run.state(StepKey::PrinterPrint), StepState::Success);

    // Pre-seeded steps never pass through running
    while let Ok(event) = rx.try_recv() {
        if let BoothEvent::StepChanged { step, .. } = event {
            assert!(!step.is_printer());
        }
    }
}

#[tokio::test]
async fn test_failure_halts_at_failing_step() {
    let transport = backend();
    transport.on(
        Method::Post,
        "/render/image",
        MockReply::error("Template missing"),
    );
    let orchestrator = orchestrator(&transport, pipeline_config(true, false));
    orchestrator.open();

    let outcome = orchestrator.run().await;

    assert_eq!(
        outcome,
        RunOutcome::Failed {
            step: StepKey::Render,
            message: "Template missing".to_string(),
        }
    );

    let run = orchestrator.snapshot().unwrap();
    let k = StepKey::ALL
        .iter()
        .position(|s| *s == StepKey::Render)
        .unwrap();
    let states = states(&run);
    assert!(states[..k].iter().all(|s| *s == StepState::Success));
    assert_eq!(states[k], StepState::Error);
    assert!(states[k + 1..].iter().all(|s| *s == StepState::Idle));
    assert_eq!(run.error_message.as_deref(), Some("Template missing"));
    assert!(!run.running);

    assert_eq!(transport.call_count("/render/draw-text"), 0);
    assert_eq!(transport.call_count("/gallery/upload"), 0);
    assert_eq!(transport.call_count("/printer"), 0);
    assert_eq!(orchestrator.close(), None);
}

#[tokio::test]
async fn test_failure_without_server_message_uses_generic_text() {
    let transport = backend();
    transport.on(
        Method::Get,
        "/capture/make-input",
        MockReply::Body(json!({ "status": "error", "message": "  " })),
    );
    let orchestrator = orchestrator(&transport, pipeline_config(true, false));
    orchestrator.open();

    match orchestrator.run().await {
        RunOutcome::Failed { step, message } => {
            assert_eq!(step, StepKey::MakeInput);
            assert_eq!(message, GENERIC_ERROR_MESSAGE);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_network_failure_is_reported_as_step_error() {
    let transport = backend();
    transport.on(
        Method::Post,
        "/gallery/upload",
        MockReply::Unreachable("connection refused".to_string()),
    );
    let orchestrator = orchestrator(&transport, pipeline_config(true, false));
    orchestrator.open();

    let outcome = orchestrator.run().await;

    assert!(matches!(
        outcome,
        RunOutcome::Failed {
            step: StepKey::Upload,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_abandons_without_error() {
    let transport = backend();
    transport.delay(Method::Post, "/render/image", Duration::from_secs(5));
    let orchestrator = Arc::new(orchestrator(&transport, pipeline_config(true, false)));
    orchestrator.open();

    let running = Arc::clone(&orchestrator);
    let handle = tokio::spawn(async move { running.run().await });

    sleep(Duration::from_millis(100)).await;
    assert!(orchestrator.is_running());
    assert_eq!(
        orchestrator.snapshot().unwrap().running_step(),
        Some(StepKey::Render)
    );

    orchestrator.cancel();
    let outcome = handle.await.unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);

    let run = orchestrator.snapshot().unwrap();
    assert_eq!(run.state(StepKey::GenerateCode), StepState::Success);
    assert_eq!(run.state(StepKey::Render), StepState::Idle);
    assert!(run.failed_step().is_none());
    assert!(run.error_message.is_none());
    assert!(!run.running);
    assert_eq!(transport.call_count("/render/draw-text"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_mid_run_discards_result() {
    let transport = backend();
    transport.delay(Method::Post, "/gallery/upload", Duration::from_secs(5));
    let orchestrator = Arc::new(orchestrator(&transport, pipeline_config(true, false)));
    orchestrator.open();

    let running = Arc::clone(&orchestrator);
    let handle = tokio::spawn(async move { running.run().await });

    sleep(Duration::from_millis(100)).await;
    assert_eq!(orchestrator.close(), None);
    assert_eq!(handle.await.unwrap(), RunOutcome::Cancelled);
    assert!(!orchestrator.is_open());
    assert_eq!(transport.call_count("/printer"), 0);
}

#[tokio::test]
async fn test_close_after_completion_surfaces_result() {
    let transport = backend();
    let orchestrator = orchestrator(&transport, pipeline_config(false, false));
    orchestrator.open();
    orchestrator.run().await;

    let result = orchestrator.close().unwrap();
    assert_eq!(result.qrcode, "AB12");
    assert_eq!(orchestrator.close(), None);
}

#[tokio::test]
async fn test_run_requires_open_run() {
    let transport = backend();
    let orchestrator = orchestrator(&transport, pipeline_config(true, false));

    assert_eq!(orchestrator.run().await, RunOutcome::Skipped);
    assert!(transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_run_while_running_is_skipped() {
    let transport = backend();
    transport.delay(Method::Post, "/manage/clear-path", Duration::from_secs(1));
    let orchestrator = Arc::new(orchestrator(&transport, pipeline_config(false, false)));
    orchestrator.open();

    let running = Arc::clone(&orchestrator);
    let handle = tokio::spawn(async move { running.run().await });
    sleep(Duration::from_millis(10)).await;

    assert_eq!(orchestrator.run().await, RunOutcome::Skipped);
    assert!(matches!(handle.await.unwrap(), RunOutcome::Completed(_)));
    assert_eq!(transport.call_count("/manage/clear-path"), 1);
}

#[tokio::test]
async fn test_rerun_after_failure_restarts_whole_chain() {
    let transport = backend();
    transport.once(Method::Post, "/render/image", MockReply::error("Busy"));
    let orchestrator = orchestrator(&transport, pipeline_config(false, false));
    orchestrator.open();

    assert!(matches!(
        orchestrator.run().await,
        RunOutcome::Failed { .. }
    ));
    assert!(matches!(
        orchestrator.run().await,
        RunOutcome::Completed(_)
    ));

    assert_eq!(transport.call_count("/manage/clear-path"), 2);
    let run = orchestrator.snapshot().unwrap();
    assert!(run.is_complete());
    assert!(run.error_message.is_none());
}

#[tokio::test]
async fn test_at_most_one_step_running() {
    let transport = backend();
    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let orchestrator = orchestrator(&transport, pipeline_config(true, false)).with_event_bus(bus);
    orchestrator.open();
    orchestrator.run().await;

    let mut running: Option<StepKey> = None;
    let mut seen = 0;
    while let Ok(event) = rx.try_recv() {
        if let BoothEvent::StepChanged { step, state, .. } = event {
            match state {
                StepState::Running => {
                    assert!(running.is_none(), "{} started while another ran", step);
                    running = Some(step);
                }
                StepState::Success => {
                    assert_eq!(running.take(), Some(step));
                    seen += 1;
                }
                other => panic!("unexpected state {}", other),
            }
        }
    }
    assert_eq!(seen, StepKey::ALL.len());
}

fn recipient() -> Recipient {
    Recipient {
        id: "77".to_string(),
        name: "Dana".to_string(),
        phone: "0812345".to_string(),
    }
}

#[tokio::test]
async fn test_promo_link_runs_after_completion() {
    let transport = backend();
    let orchestrator = orchestrator(&transport, pipeline_config(false, true));
    orchestrator.open();
    orchestrator.select_recipient(Some(recipient()));

    assert!(matches!(
        orchestrator.run().await,
        RunOutcome::Completed(_)
    ));
    orchestrator.wait_side_effects().await;

    let links = transport.calls_to("/promotion-code/link-person");
    assert_eq!(links.len(), 1);
    let body = links[0].body.clone().unwrap();
    assert_eq!(body["code"], "AB12");
    assert_eq!(body["person_id"], "77");
}

#[tokio::test]
async fn test_promo_failure_is_reported_but_run_stays_complete() {
    let transport = backend();
    transport.on(
        Method::Post,
        "/promotion-code/link-person",
        MockReply::error("Code already used"),
    );
    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let orchestrator =
        orchestrator(&transport, pipeline_config(false, true)).with_event_bus(bus);
    orchestrator.open();
    orchestrator.select_recipient(Some(recipient()));

    assert!(matches!(
        orchestrator.run().await,
        RunOutcome::Completed(_)
    ));
    orchestrator.wait_side_effects().await;

    let run = orchestrator.snapshot().unwrap();
    assert!(run.is_complete());
    assert!(run.failed_step().is_none());
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .contains("Code already used"));

    let mut reported = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, BoothEvent::SideEffectFailed { .. }) {
            reported = true;
        }
    }
    assert!(reported);
    assert!(orchestrator.close().is_some());
}

#[tokio::test]
async fn test_promo_disabled_skips_link() {
    let transport = backend();
    let orchestrator = orchestrator(&transport, pipeline_config(false, false));
    orchestrator.open();
    orchestrator.select_recipient(Some(recipient()));

    orchestrator.run().await;
    orchestrator.wait_side_effects().await;

    assert_eq!(transport.call_count("/promotion-code"), 0);
}

#[test]
fn test_recipient_accepts_numeric_id() {
    let recipient: Recipient =
        serde_json::from_value(json!({ "id": 5, "fullname": "Kim", "phone_number": "0800" }))
            .unwrap();
    assert_eq!(recipient.id, "5");
    assert_eq!(recipient.name, "Kim");
    assert_eq!(recipient.phone, "0800");
}

#[tokio::test(start_paused = true)]
async fn test_recipient_search_only_sends_last_keystroke() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
        Method::Get,
        "/person/search-by-phone/081234",
        MockReply::success(json!([{ "id": 1, "name": "Ari", "phone": "081234" }])),
    );
    let search = RecipientSearch::new(BoothApi::new(transport.clone()), Duration::from_millis(400));

    search.input("08");
    sleep(Duration::from_millis(100)).await;
    search.input("0812");
    sleep(Duration::from_millis(100)).await;
    search.input("081 234");
    sleep(Duration::from_millis(500)).await;

    assert_eq!(
        transport.routes_called(),
        vec!["GET /person/search-by-phone/081234"]
    );
    assert_eq!(search.query(), "081234");
    let results = search.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Ari");
}

#[tokio::test(start_paused = true)]
async fn test_recipient_search_cleared_input_drops_results() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
        Method::Get,
        "/person/search-by-phone/0812",
        MockReply::success(json!([{ "id": 1, "name": "Ari", "phone": "0812" }])),
    );
    let search = RecipientSearch::new(BoothApi::new(transport.clone()), Duration::from_millis(300));

    search.input("0812");
    sleep(Duration::from_millis(400)).await;
    assert_eq!(search.results().len(), 1);

    search.input("");
    sleep(Duration::from_millis(400)).await;
    assert!(search.results().is_empty());
    assert_eq!(transport.call_count("/person"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_finished_side_effects_are_pruned() {
    let transport = backend();
    let orchestrator = orchestrator(&transport, pipeline_config(false, true));

    for _ in 0..3 {
        orchestrator.open();
        orchestrator.select_recipient(Some(recipient()));
        assert!(matches!(
            orchestrator.run().await,
            RunOutcome::Completed(_)
        ));
        sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(transport.call_count("/promotion-code/link-person"), 3);
    assert_eq!(orchestrator.tracked_side_effects(), 1);
    assert_eq!(orchestrator.pending_side_effects(), 0);
}

#[test]
fn test_best_match_prefers_exact_phone_then_single_hit() {
    let other = Recipient {
        id: "78".to_string(),
        name: "Kim".to_string(),
        phone: "08123456".to_string(),
    };

    let both = vec![other.clone(), recipient()];
    assert_eq!(best_match("0812 345", &both), Some(recipient()));
    assert_eq!(best_match("0899", &both), None);
    assert_eq!(best_match("0899", &[other.clone()]), Some(other));
    assert_eq!(best_match("0899", &[]), None);
}

#[tokio::test(start_paused = true)]
async fn test_recipient_search_settles_on_latest_query() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
        Method::Get,
        "/person/search-by-phone/0812",
        MockReply::success(json!([{ "id": 1, "name": "Ari", "phone": "0812" }])),
    );
    let search = RecipientSearch::new(BoothApi::new(transport.clone()), Duration::from_millis(300));

    search.input("08");
    search.input("0812");
    let results = search.settled().await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "1");
    assert_eq!(transport.routes_called(), vec!["GET /person/search-by-phone/0812"]);
}
