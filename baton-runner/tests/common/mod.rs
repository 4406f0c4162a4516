//! Scripted model backends shared by the integration suites.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use baton_types::{
    Model, ModelError, ModelRequest, ModelResponse, ModelStream, ModelStreamEvent, RunItem, Usage,
};

/// Pops one queued response per call and records every request.
pub struct MockModel {
    responses: Mutex<VecDeque<ModelResponse>>,
    fallback: Option<ModelResponse>,
    requests: Mutex<Vec<ModelRequest>>,
    call_count: AtomicUsize,
}

impl MockModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Answers every call with `response` once the queue is empty.
    pub fn repeating(response: ModelResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(vec![])
        }
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn request(&self, index: usize) -> ModelRequest {
        self.requests.lock().unwrap()[index].clone()
    }

    fn next(&self, request: ModelRequest) -> ModelResponse {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let queued = self.responses.lock().unwrap().pop_front();
        queued
            .or_else(|| self.fallback.clone())
            .expect("MockModel: no more responses queued")
    }
}

impl Model for MockModel {
    fn get_response(
        &self,
        request: ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send {
        let response = self.next(request);
        async move { Ok(response) }
    }
}

/// Streams a fixed list of events, ignoring the request.
pub struct ScriptedStream {
    events: Mutex<VecDeque<Vec<ModelStreamEvent>>>,
}

impl ScriptedStream {
    pub fn new(turns: Vec<Vec<ModelStreamEvent>>) -> Self {
        Self {
            events: Mutex::new(turns.into()),
        }
    }
}

impl Model for ScriptedStream {
    fn get_response(
        &self,
        _request: ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send {
        async { Err(ModelError::RequestFailed("streaming only".into())) }
    }

    fn stream_response(
        &self,
        _request: ModelRequest,
    ) -> impl Future<Output = Result<ModelStream, ModelError>> + Send {
        let events = self
            .events
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedStream: no more turns queued");
        async move {
            let stream: ModelStream = Box::pin(futures::stream::iter(events.into_iter().map(Ok)));
            Ok(stream)
        }
    }
}

pub fn respond(items: Vec<RunItem>) -> ModelResponse {
    ModelResponse {
        output: items,
        usage: Usage::new(10, 5),
        response_id: None,
    }
}

pub fn text(message: &str) -> ModelResponse {
    respond(vec![RunItem::assistant(message)])
}

pub fn call(call_id: &str, name: &str, arguments: &str) -> RunItem {
    RunItem::tool_call(call_id, name, arguments)
}

pub fn calls(items: &[(&str, &str, &str)]) -> ModelResponse {
    respond(
        items
            .iter()
            .map(|(id, name, args)| call(id, name, args))
            .collect(),
    )
}

/// Output items in history answering `call_id`.
pub fn outputs_for<'a>(history: &'a [RunItem], call_id: &str) -> Vec<&'a RunItem> {
    history
        .iter()
        .filter(|item| matches!(item, RunItem::ToolCallOutput(out) if out.call_id == call_id))
        .collect()
}

/// Output text for `call_id`, if exactly one output exists.
pub fn output_text(history: &[RunItem], call_id: &str) -> Option<(String, bool)> {
    match outputs_for(history, call_id).as_slice() {
        [RunItem::ToolCallOutput(out)] => Some((out.output.clone(), out.is_error)),
        _ => None,
    }
}
