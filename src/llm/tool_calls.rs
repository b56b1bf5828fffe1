use std::collections::BTreeMap;

use super::ToolCall;
use crate::error::LlmError;

#[derive(Default, Debug)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Reassembles tool calls from streamed deltas.
///
/// Providers send the id and name once, then the argument JSON in pieces,
/// all tagged with the call's index within the message.
#[derive(Default, Debug)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<i32, PartialCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        index: i32,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    ) {
        let call = self.calls.entry(index).or_default();
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            call.id = Some(id);
        }
        if let Some(name) = name {
            call.name.push_str(&name);
        }
        if let Some(arguments) = arguments {
            call.arguments.push_str(&arguments);
        }
    }

    /// Completed calls ordered by index. Missing ids are synthesized.
    pub fn finish(self) -> Result<Vec<ToolCall>, LlmError> {
        self.calls
            .into_iter()
            .map(|(index, call)| {
                if call.name.is_empty() {
                    return Err(LlmError::Stream(format!(
                        "tool call at index {index} has no function name"
                    )));
                }
                Ok(ToolCall {
                    id: call
                        .id
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                    name: call.name,
                    arguments: call.arguments,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_are_joined_per_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(0, Some("call_a".into()), Some("get_stock_price".into()), Some("{\"tic".into()));
        acc.push(1, Some("call_b".into()), Some("get_dividends".into()), None);
        acc.push(0, None, None, Some("ker\":\"AAPL\"}".into()));
        acc.push(1, None, None, Some("{\"ticker\":\"KO\"}".into()));

        let calls = acc.finish().unwrap();

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].name, "get_stock_price");
        assert_eq!(calls[0].arguments, "{\"ticker\":\"AAPL\"}");
        assert_eq!(calls[1].name, "get_dividends");
        assert_eq!(calls[1].arguments, "{\"ticker\":\"KO\"}");
    }

    #[test]
    fn test_missing_id_is_synthesized() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(0, Some(String::new()), Some("get_news".into()), Some("{}".into()));

        let calls = acc.finish().unwrap();
        assert!(calls[0].id.starts_with("call_"));
        assert!(calls[0].id.len() > "call_".len());
    }

    #[test]
    fn test_nameless_call_is_an_error() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(3, Some("call_x".into()), None, Some("{}".into()));

        assert!(matches!(acc.finish(), Err(LlmError::Stream(_))));
    }

    #[test]
    fn test_empty() {
        let acc = ToolCallAccumulator::new();
        assert!(acc.finish().unwrap().is_empty());
    }
}
