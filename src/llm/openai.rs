use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, CreateChatCompletionStreamResponse, FunctionCall,
        FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use std::collections::VecDeque;
use tracing::{debug, info};

use super::{ChatMessage, ChatModel, ModelEvent, ModelStream, ToolCallAccumulator};
use crate::error::LlmError;
use crate::tools::ToolSpec;

/// OpenAI-compatible chat-completions client.
#[derive(Clone)]
pub struct LLMClient {
    pub client: Client<OpenAIConfig>,
    pub model: String,
}

impl LLMClient {
    pub fn new(api_key: String, base_url: Option<String>, model: String) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url.trim_end_matches('/'));
        }
        let client = Client::with_config(config);
        Self { client, model }
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, LlmError> {
    let converted: ChatCompletionRequestMessage = match message {
        ChatMessage::System { content } => ChatCompletionRequestSystemMessageArgs::default()
            .content(content.as_str())
            .build()?
            .into(),
        ChatMessage::User { content } => ChatCompletionRequestUserMessageArgs::default()
            .content(content.as_str())
            .build()?
            .into(),
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if let Some(content) = content {
                args.content(content.as_str());
            }
            if !tool_calls.is_empty() {
                args.tool_calls(
                    tool_calls
                        .iter()
                        .map(|call| ChatCompletionMessageToolCall {
                            id: call.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect::<Vec<_>>(),
                );
            }
            args.build()?.into()
        }
        ChatMessage::Tool {
            tool_call_id,
            content,
        } => ChatCompletionRequestToolMessageArgs::default()
            .content(content.as_str())
            .tool_call_id(tool_call_id.as_str())
            .build()?
            .into(),
    };
    Ok(converted)
}

fn to_tool(spec: &ToolSpec) -> Result<ChatCompletionTool, LlmError> {
    let function = FunctionObjectArgs::default()
        .name(spec.name.as_str())
        .description(spec.description.as_str())
        .parameters(spec.parameters.clone())
        .build()?;

    Ok(ChatCompletionToolArgs::default()
        .r#type(ChatCompletionToolType::Function)
        .function(function)
        .build()?)
}

struct StreamState<S> {
    upstream: S,
    calls: ToolCallAccumulator,
    pending: VecDeque<Result<ModelEvent, LlmError>>,
    finished: bool,
}

impl<S> StreamState<S> {
    fn absorb(&mut self, chunk: CreateChatCompletionStreamResponse) {
        // Only the first choice is ever requested
        for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    self.pending.push_back(Ok(ModelEvent::Token(content)));
                }
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match call.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                self.calls.push(call.index, call.id, name, arguments);
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        match std::mem::take(&mut self.calls).finish() {
            Ok(calls) => self
                .pending
                .extend(calls.into_iter().map(|c| Ok(ModelEvent::ToolCall(c)))),
            Err(e) => self.pending.push_back(Err(e)),
        }
    }
}

/// Flatten provider chunks into tokens, then the assembled tool calls.
fn model_events<S>(upstream: S) -> impl Stream<Item = Result<ModelEvent, LlmError>> + Send
where
    S: Stream<Item = Result<CreateChatCompletionStreamResponse, async_openai::error::OpenAIError>>
        + Send
        + Unpin,
{
    let state = StreamState {
        upstream,
        calls: ToolCallAccumulator::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.upstream.next().await {
                Some(Ok(chunk)) => state.absorb(chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    state.pending.push_back(Err(LlmError::Api(e)));
                }
                None => state.finish(),
            }
        }
    })
}

#[async_trait]
impl ChatModel for LLMClient {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelStream, LlmError> {
        info!(
            "🤖 Sending streaming request to LLM (Model: {}, messages: {})...",
            self.model,
            messages.len()
        );

        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages).stream(true);
        if !tools.is_empty() {
            let tools = tools.iter().map(to_tool).collect::<Result<Vec<_>, _>>()?;
            args.tools(tools);
        }
        let request = args.build()?;

        let upstream = self.client.chat().create_stream(request).await?;
        debug!("🤖 LLM stream opened.");

        Ok(Box::pin(model_events(upstream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;
    use serde_json::json;

    fn chunk(delta: serde_json::Value) -> CreateChatCompletionStreamResponse {
        serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1700000000,
            "model": "test-model",
            "choices": [{"index": 0, "delta": delta, "finish_reason": null}]
        }))
        .unwrap()
    }

    async fn collect(
        chunks: Vec<Result<CreateChatCompletionStreamResponse, async_openai::error::OpenAIError>>,
    ) -> Vec<Result<ModelEvent, LlmError>> {
        model_events(stream::iter(chunks)).collect().await
    }

    #[tokio::test]
    async fn test_tokens_pass_through_in_order() {
        let events = collect(vec![
            Ok(chunk(json!({"role": "assistant", "content": ""}))),
            Ok(chunk(json!({"content": "AAPL is "}))),
            Ok(chunk(json!({"content": "trading at $190.12."}))),
        ])
        .await;

        let tokens: Vec<ModelEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            tokens,
            vec![
                ModelEvent::Token("AAPL is ".to_string()),
                ModelEvent::Token("trading at $190.12.".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_call_chunks_are_assembled_at_end() {
        let events = collect(vec![
            Ok(chunk(json!({"tool_calls": [{
                "index": 0,
                "id": "call_1",
                "type": "function",
                "function": {"name": "get_stock_price", "arguments": ""}
            }]}))),
            Ok(chunk(json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"ticker\":"}}]}))),
            Ok(chunk(json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"AAPL\"}"}}]}))),
        ])
        .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(ModelEvent::ToolCall(call)) => assert_eq!(
                call,
                &ToolCall {
                    id: "call_1".to_string(),
                    name: "get_stock_price".to_string(),
                    arguments: "{\"ticker\":\"AAPL\"}".to_string(),
                }
            ),
            other => panic!("Expected tool call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interleaved_tool_calls_keep_index_order() {
        let events = collect(vec![
            Ok(chunk(json!({"tool_calls": [{
                "index": 1,
                "id": "call_b",
                "type": "function",
                "function": {"name": "get_dividends", "arguments": "{\"ticker\":"}
            }]}))),
            Ok(chunk(json!({"tool_calls": [{
                "index": 0,
                "id": "call_a",
                "type": "function",
                "function": {"name": "get_stock_price", "arguments": "{\"ticker\":\"KO\"}"}
            }]}))),
            Ok(chunk(json!({"tool_calls": [{"index": 1, "function": {"arguments": "\"KO\"}"}}]}))),
        ])
        .await;

        let names: Vec<String> = events
            .into_iter()
            .map(|e| match e {
                Ok(ModelEvent::ToolCall(call)) => call.name,
                other => panic!("Expected tool call, got {:?}", other),
            })
            .collect();
        assert_eq!(names, vec!["get_stock_price", "get_dividends"]);
    }

    #[tokio::test]
    async fn test_upstream_error_ends_stream() {
        let events = collect(vec![
            Ok(chunk(json!({"content": "partial"}))),
            Err(async_openai::error::OpenAIError::StreamError(
                "connection reset".to_string(),
            )),
            Ok(chunk(json!({"content": "never seen"}))),
        ])
        .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(ModelEvent::Token(t)) if t == "partial"));
        assert!(matches!(&events[1], Err(LlmError::Api(_))));
    }

    #[test]
    fn test_message_conversion_roles() {
        let messages = vec![
            ChatMessage::system("be helpful"),
            ChatMessage::user("price of AAPL?"),
            ChatMessage::Assistant {
                content: None,
                tool_calls: vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "get_stock_price".to_string(),
                    arguments: "{\"ticker\":\"AAPL\"}".to_string(),
                }],
            },
            ChatMessage::Tool {
                tool_call_id: "call_1".to_string(),
                content: "190.12".to_string(),
            },
        ];

        let converted: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| serde_json::to_value(to_request_message(m).unwrap()).unwrap())
            .collect();

        assert_eq!(converted[0]["role"], "system");
        assert_eq!(converted[1]["role"], "user");
        assert_eq!(converted[1]["content"], "price of AAPL?");
        assert_eq!(converted[2]["role"], "assistant");
        assert_eq!(converted[2]["tool_calls"][0]["function"]["name"], "get_stock_price");
        assert_eq!(converted[3]["role"], "tool");
        assert_eq!(converted[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_tool_declaration() {
        let spec = ToolSpec {
            name: "get_dividends".to_string(),
            description: "Return dividend history for a ticker.".to_string(),
            parameters: json!({"type": "object", "properties": {"ticker": {"type": "string"}}}),
        };

        let tool = serde_json::to_value(to_tool(&spec).unwrap()).unwrap();

        assert_eq!(tool["type"], "function");
        assert_eq!(tool["function"]["name"], "get_dividends");
        assert_eq!(tool["function"]["parameters"]["properties"]["ticker"]["type"], "string");
    }
}
