//! Tool execution for one turn.
//!
//! Each call is planned first (lookup, argument parsing, approval policy),
//! then every runnable call executes concurrently. Results come back in
//! call order regardless of completion order.

use std::sync::Arc;

use baton_tool::{BoxFuture, RegisteredTool, ToolError};
use baton_types::{RunContext, RunItem, ToolCallItem, parse_json};

use crate::agent::Agent;
use crate::error::RunError;
use crate::hooks::HookSet;
use crate::state::RunState;

/// What to do with one tool call.
pub(crate) enum Planned<C> {
    /// Run the tool.
    Invoke {
        call: ToolCallItem,
        tool: Arc<RegisteredTool<C>>,
        args: serde_json::Value,
    },
    /// Answer without running anything (bad arguments, rejected call).
    Respond { call: ToolCallItem, output: String },
    /// Hold until a human decides.
    AwaitApproval { call: ToolCallItem },
}

/// Outcome of one tool call.
#[derive(Debug)]
pub(crate) enum Executed {
    /// An output item to append.
    Output { call: ToolCallItem, item: RunItem },
    /// Waiting on approval.
    Pending { call: ToolCallItem },
    /// Failed with a tool that propagates its errors.
    Failed { call: ToolCallItem, error: ToolError },
}

/// Resolve a call against the agent's tools and its approval policy.
///
/// `preapproved` skips the policy for calls a human already approved.
pub(crate) fn plan<C: Send + Sync>(
    agent: &Agent<C>,
    call: &ToolCallItem,
    ctx: &RunContext<C>,
    state: &RunState,
    preapproved: bool,
) -> Result<Planned<C>, RunError> {
    let tool = agent.tools().get(&call.name).ok_or_else(|| {
        RunError::Protocol(format!(
            "agent `{}` has no tool named `{}`",
            agent.name(),
            call.name
        ))
    })?;

    let args = match parse_json(&call.arguments) {
        Ok(args) => args,
        Err(e) => {
            tracing::debug!(tool = %call.name, call_id = %call.call_id, error = %e, "baton.tool.invalid_arguments");
            return Ok(Planned::Respond {
                call: call.clone(),
                output: format!("Invalid arguments for tool `{}`: {e}", call.name),
            });
        }
    };

    let needs_approval = !preapproved
        && !state.is_always_approved(&call.name)
        && tool.options().approval().requires_approval(ctx, &args);
    if needs_approval {
        tracing::debug!(tool = %call.name, call_id = %call.call_id, "baton.tool.approval_required");
        return Ok(Planned::AwaitApproval { call: call.clone() });
    }

    Ok(Planned::Invoke {
        call: call.clone(),
        tool,
        args,
    })
}

/// Run every planned call concurrently; results are in plan order.
pub(crate) async fn execute<'a, C: Send + Sync>(
    planned: Vec<Planned<C>>,
    ctx: &'a RunContext<C>,
    hooks: &'a HookSet<'a, C>,
    agent: &'a Agent<C>,
) -> Vec<Executed> {
    let futures: Vec<BoxFuture<'a, Executed>> = planned
        .into_iter()
        .map(|p| -> BoxFuture<'a, Executed> {
            match p {
                Planned::Invoke { call, tool, args } => Box::pin(invoke(call, tool, args, ctx, hooks, agent)),
                Planned::Respond { call, output } => Box::pin(async move {
                    let item = RunItem::tool_output(call.call_id.clone(), output, true);
                    Executed::Output { call, item }
                }),
                Planned::AwaitApproval { call } => Box::pin(async move { Executed::Pending { call } }),
            }
        })
        .collect();
    futures::future::join_all(futures).await
}

async fn invoke<C: Send + Sync>(
    call: ToolCallItem,
    tool: Arc<RegisteredTool<C>>,
    args: serde_json::Value,
    ctx: &RunContext<C>,
    hooks: &HookSet<'_, C>,
    agent: &Agent<C>,
) -> Executed {
    hooks.tool_start(ctx, agent, &call).await;
    tracing::debug!(tool = %call.name, call_id = %call.call_id, "baton.tool.pre_execution");

    let (output, is_error) = match tool.tool().call_dyn(args, ctx).await {
        Ok(output) => (output, false),
        Err(ToolError::InvalidInput(message)) => (
            format!("Invalid arguments for tool `{}`: {message}", call.name),
            true,
        ),
        Err(error) => match tool.options().on_error().render(&error) {
            Some(output) => {
                tracing::warn!(tool = %call.name, call_id = %call.call_id, error = %error, "baton.tool.error");
                (output, true)
            }
            None => {
                tracing::warn!(tool = %call.name, call_id = %call.call_id, error = %error, "baton.tool.error_propagated");
                return Executed::Failed { call, error };
            }
        },
    };

    tracing::debug!(
        tool = %call.name,
        call_id = %call.call_id,
        is_error,
        output_len = output.len(),
        "baton.tool.post_execution"
    );
    hooks.tool_end(ctx, agent, &call, &output).await;
    let item = RunItem::tool_output(call.call_id.clone(), output, is_error);
    Executed::Output { call, item }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_tool::{ToolOptions, function_tool};
    use baton_types::Usage;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Sleep {
        ms: u64,
        tag: String,
    }

    fn agent() -> Agent<()> {
        Agent::builder("worker")
            .tool(function_tool(
                "sleep",
                "Sleep then echo the tag",
                |_ctx, args: Sleep| async move {
                    tokio::time::sleep(Duration::from_millis(args.ms)).await;
                    Ok::<_, ToolError>(args.tag)
                },
            ))
            .tool_with(
                function_tool("deploy", "Deploy", |_ctx, _args: serde_json::Value| async {
                    Ok::<_, ToolError>("deployed")
                }),
                ToolOptions::new().needs_approval(true),
            )
            .tool_with(
                function_tool("explode", "Always fails", |_ctx, _args: serde_json::Value| async {
                    Err::<String, _>(ToolError::failed("kaboom"))
                }),
                ToolOptions::new().propagate_errors(),
            )
            .build()
    }

    fn ctx() -> RunContext<()> {
        RunContext::new(Arc::new(()), "worker", 1, Usage::default())
    }

    fn call(id: &str, name: &str, args: &str) -> ToolCallItem {
        ToolCallItem {
            call_id: id.into(),
            name: name.into(),
            arguments: args.into(),
        }
    }

    #[test]
    fn unknown_tool_is_a_protocol_error() {
        let state = RunState::new("worker", vec![], 10);
        let err = plan(&agent(), &call("c1", "nope", "{}"), &ctx(), &state, false)
            .err()
            .unwrap();
        assert!(matches!(err, RunError::Protocol(_)));
    }

    #[test]
    fn malformed_json_becomes_a_response() {
        let state = RunState::new("worker", vec![], 10);
        let planned = plan(&agent(), &call("c1", "sleep", "{not json"), &ctx(), &state, false).unwrap();
        assert!(matches!(planned, Planned::Respond { .. }));
    }

    #[test]
    fn approval_policy_and_overrides() {
        let agent = agent();
        let mut state = RunState::new("worker", vec![], 10);
        let deploy = call("c1", "deploy", "{}");
        assert!(matches!(
            plan(&agent, &deploy, &ctx(), &state, false).unwrap(),
            Planned::AwaitApproval { .. }
        ));
        assert!(matches!(
            plan(&agent, &deploy, &ctx(), &state, true).unwrap(),
            Planned::Invoke { .. }
        ));
        state.always_approve_tool("deploy");
        assert!(matches!(
            plan(&agent, &deploy, &ctx(), &state, false).unwrap(),
            Planned::Invoke { .. }
        ));
    }

    #[tokio::test]
    async fn outputs_follow_call_order() {
        let agent = agent();
        let state = RunState::new("worker", vec![], 10);
        let ctx = ctx();
        let calls = [
            call("c1", "sleep", r#"{"ms":40,"tag":"slow"}"#),
            call("c2", "sleep", r#"{"ms":0,"tag":"fast"}"#),
            call("c3", "sleep", r#"{"tag":"missing ms"}"#),
        ];
        let planned = calls
            .iter()
            .map(|c| plan(&agent, c, &ctx, &state, false).unwrap())
            .collect();
        let hooks = HookSet::new(None, &agent);
        let executed = execute(planned, &ctx, &hooks, &agent).await;

        let outputs: Vec<(String, String, bool)> = executed
            .into_iter()
            .map(|e| match e {
                Executed::Output {
                    item: RunItem::ToolCallOutput(out),
                    ..
                } => (out.call_id, out.output, out.is_error),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(outputs[0], ("c1".into(), "slow".into(), false));
        assert_eq!(outputs[1], ("c2".into(), "fast".into(), false));
        assert_eq!(outputs[2].0, "c3");
        assert!(outputs[2].2);
        assert!(outputs[2].1.contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn propagating_tool_reports_failure() {
        let agent = agent();
        let state = RunState::new("worker", vec![], 10);
        let ctx = ctx();
        let planned = vec![plan(&agent, &call("c1", "explode", "{}"), &ctx, &state, false).unwrap()];
        let hooks = HookSet::new(None, &agent);
        let executed = execute(planned, &ctx, &hooks, &agent).await;
        assert!(matches!(
            &executed[0],
            Executed::Failed { call, error: ToolError::ExecutionFailed(_) } if call.call_id == "c1"
        ));
    }
}
