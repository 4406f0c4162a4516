mod common;

use std::sync::Arc;

use baton_guardrail::{GuardrailError, GuardrailFunctionOutput, InputGuardrail, OutputGuardrail};
use baton_runner::{Agent, RunConfig, RunError, RunState, Runner};
use baton_types::RunItem;
use common::{MockModel, text};
use serde_json::json;

fn blocks_on(word: &'static str) -> InputGuardrail<()> {
    InputGuardrail::from_fn("keyword", move |_ctx, input: Vec<RunItem>| async move {
        let hit = input
            .iter()
            .filter_map(RunItem::text)
            .any(|text| text.contains(word));
        Ok(if hit {
            GuardrailFunctionOutput::tripwire(json!({ "matched": word }))
        } else {
            GuardrailFunctionOutput::pass()
        })
    })
}

fn broken_input() -> InputGuardrail<()> {
    InputGuardrail::from_fn("classifier", |_ctx, _input| async {
        Err(GuardrailError::CheckFailed("classifier offline".into()))
    })
}

fn broken_output() -> OutputGuardrail<()> {
    OutputGuardrail::from_fn("pii", |_ctx, _output| async {
        Err(GuardrailError::CheckFailed("scanner offline".into()))
    })
}

#[tokio::test]
async fn input_tripwire_stops_before_any_model_call() {
    let agent = Agent::<()>::builder("assistant")
        .input_guardrail(blocks_on("homework"))
        .build_arc();
    let model = Arc::new(MockModel::repeating(text("sure")));
    let runner = Runner::from_arc(Arc::clone(&model));

    let err = runner
        .run(&agent, "do my homework", (), RunConfig::default())
        .await
        .unwrap_err();

    match err {
        RunError::InputGuardrailTripwire(result) => {
            assert_eq!(result.guardrail, "keyword");
            assert_eq!(result.agent, "assistant");
            assert_eq!(result.output.output_info, json!({ "matched": "homework" }));
        }
        other => panic!("expected tripwire, got {other:?}"),
    }
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn passing_input_guardrails_are_reported() {
    let agent = Agent::<()>::builder("assistant")
        .input_guardrail(blocks_on("homework"))
        .build_arc();
    let model = Arc::new(MockModel::new(vec![text("hello")]));
    let runner = Runner::from_arc(Arc::clone(&model));

    let result = runner
        .run(&agent, "hi there", (), RunConfig::default())
        .await
        .unwrap();

    assert_eq!(result.input_guardrail_results().len(), 1);
    assert!(!result.input_guardrail_results()[0].output.tripwire_triggered);
}

#[tokio::test]
async fn input_guardrail_failure_is_resumable() {
    let agent = Agent::<()>::builder("assistant").build_arc();
    let model = Arc::new(MockModel::new(vec![text("hello")]));
    let runner = Runner::from_arc(Arc::clone(&model));

    let err = runner
        .run(
            &agent,
            "hi",
            (),
            RunConfig::default().with_input_guardrail(broken_input()),
        )
        .await
        .unwrap_err();

    assert!(err.is_recoverable());
    assert!(matches!(
        &err,
        RunError::GuardrailExecution { guardrail, .. } if guardrail == "classifier"
    ));
    assert_eq!(model.calls(), 0);

    let json = err.into_state().unwrap().to_json().unwrap();
    let state = RunState::from_json(&json).unwrap();
    let result = runner
        .resume(&agent, state, (), RunConfig::default())
        .await
        .unwrap();

    assert_eq!(result.final_output_text(), Some("hello"));
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn output_tripwire_discards_the_candidate() {
    let agent = Agent::<()>::builder("assistant")
        .output_guardrail(OutputGuardrail::from_fn("no_secrets", |_ctx, output| async move {
            let leaked = output.as_str().is_some_and(|text| text.contains("hunter2"));
            Ok(if leaked {
                GuardrailFunctionOutput::tripwire(json!("password in output"))
            } else {
                GuardrailFunctionOutput::pass()
            })
        }))
        .build_arc();
    let model = Arc::new(MockModel::new(vec![text("the password is hunter2")]));
    let runner = Runner::from_arc(Arc::clone(&model));

    let err = runner
        .run(&agent, "what is the password", (), RunConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::OutputGuardrailTripwire(ref result) if result.guardrail == "no_secrets"
    ));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn output_guardrail_failure_resumes_without_another_model_call() {
    let agent = Agent::<()>::builder("assistant").build_arc();
    let model = Arc::new(MockModel::new(vec![text("final answer")]));
    let runner = Runner::from_arc(Arc::clone(&model));

    let err = runner
        .run(
            &agent,
            "question",
            (),
            RunConfig::default().with_output_guardrail(broken_output()),
        )
        .await
        .unwrap_err();
    let state = err.into_state().unwrap();
    assert_eq!(state.turn_count(), 1);

    let checked = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&checked);
    let config = RunConfig::default().with_output_guardrail(OutputGuardrail::from_fn(
        "pii",
        move |_ctx, output| {
            let flag = Arc::clone(&flag);
            async move {
                assert_eq!(output, json!("final answer"));
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(GuardrailFunctionOutput::pass())
            }
        },
    ));
    let result = runner.resume(&agent, state, (), config).await.unwrap();

    assert_eq!(result.final_output_text(), Some("final answer"));
    assert_eq!(model.calls(), 1);
    assert!(checked.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(result.output_guardrail_results().len(), 1);
}

#[tokio::test]
async fn config_and_agent_guardrails_both_run() {
    let agent = Agent::<()>::builder("assistant")
        .input_guardrail(blocks_on("homework"))
        .build_arc();
    let model = Arc::new(MockModel::new(vec![text("hi")]));
    let runner = Runner::from_arc(Arc::clone(&model));

    let err = runner
        .run(
            &agent,
            "tell me about exams",
            (),
            RunConfig::default().with_input_guardrail(blocks_on("exams")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::InputGuardrailTripwire(_)));
    assert_eq!(model.calls(), 0);
}
