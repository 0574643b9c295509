//! Interpretation of model responses into decisions.
//!
//! Model servers do not agree on one encoding for tool calls, and the same server can switch
//! between them from one response to the next. The parser therefore runs an ordered chain of
//! strategies, from the most structured encoding to the least, and the first one that
//! recognizes something wins.
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::harmony;
use crate::models::decision::Decision;
use crate::models::message::{Message, CHANNEL_ANALYSIS, CHANNEL_FINAL};
use crate::models::response::ModelResponse;
use crate::models::tool::BASH_TOOL_NAME;

/// Channels whose message body is itself a shell command
const SHELL_CHANNELS: [&str; 4] = ["bash", "sh", "shell", "cmd"];

lazy_static! {
    static ref SHELL_BLOCK: Regex =
        Regex::new(r"(?is)```(?:bash|sh|shell)[ \t]*\r?\n(.*?)\r?\n[ \t]*```").unwrap();
}

/// One way of recognizing a decision in a model response
pub trait ParseStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Return a decision if this strategy recognizes the response, `None` to defer to the next
    fn parse(&self, response: &ModelResponse) -> Option<Decision>;
}

/// The first native tool call, when it names the bash tool
pub struct NativeToolCall {
    pub tool_name: String,
}

impl ParseStrategy for NativeToolCall {
    fn name(&self) -> &'static str {
        "native_tool_call"
    }

    fn parse(&self, response: &ModelResponse) -> Option<Decision> {
        let call = response.tool_calls.first()?;
        if !names_tool(&call.name, &self.tool_name) {
            tracing::debug!(name = %call.name, "first tool call is not the bash tool");
            return None;
        }
        match call.decoded_arguments() {
            Ok(arguments) => command_from_arguments(&arguments),
            Err(e) => {
                tracing::debug!(error = %e, "could not decode tool call arguments");
                None
            }
        }
    }
}

/// The whole message content is a JSON object with a `command`
pub struct JsonBody;

impl ParseStrategy for JsonBody {
    fn name(&self) -> &'static str {
        "json_body"
    }

    fn parse(&self, response: &ModelResponse) -> Option<Decision> {
        let content = response.content_text().trim();
        if content.is_empty() {
            return None;
        }
        let body: Value = serde_json::from_str(content).ok()?;
        command_from_arguments(&body)
    }
}

/// A harmony message addressed to the bash tool
pub struct HarmonyToolCall {
    pub tool_name: String,
}

impl ParseStrategy for HarmonyToolCall {
    fn name(&self) -> &'static str {
        "harmony_tool_call"
    }

    fn parse(&self, response: &ModelResponse) -> Option<Decision> {
        let text = response.full_text();
        if !text.contains(&self.tool_name) {
            return None;
        }
        for message in harmony::decode(&text) {
            let Some(recipient) = message.recipient.as_deref() else {
                continue;
            };
            if !recipient.contains(&self.tool_name) {
                continue;
            }
            let Some(part) = message.first_part() else {
                tracing::debug!(recipient, "tool call message has no content");
                continue;
            };
            match part.as_json() {
                Ok(arguments) => {
                    if let Some(decision) = command_from_arguments(&arguments) {
                        return Some(decision);
                    }
                    tracing::debug!(recipient, "tool call payload has no command");
                }
                Err(e) => tracing::debug!(recipient, error = %e, "tool call payload is not JSON"),
            }
        }
        None
    }
}

/// A harmony message on a shell channel, e.g. `<|channel|>bash<|message|>ls -la`
pub struct ShellChannel;

impl ParseStrategy for ShellChannel {
    fn name(&self) -> &'static str {
        "shell_channel"
    }

    fn parse(&self, response: &ModelResponse) -> Option<Decision> {
        decode_markup(response)?
            .iter()
            .filter(|message| {
                message
                    .channel
                    .as_deref()
                    .is_some_and(|channel| SHELL_CHANNELS.contains(&channel))
            })
            .map(|message| message.text().trim().to_string())
            .find(|command| !command.is_empty())
            .map(Decision::run)
    }
}

/// `{"cmd": ["bash", "-lc", "<command>"]}` on the analysis channel; the last element is the command
pub struct AnalysisCommandList;

impl ParseStrategy for AnalysisCommandList {
    fn name(&self) -> &'static str {
        "analysis_command_list"
    }

    fn parse(&self, response: &ModelResponse) -> Option<Decision> {
        for message in decode_markup(response)? {
            if message.channel.as_deref() != Some(CHANNEL_ANALYSIS) {
                continue;
            }
            let Some(Ok(body)) = message.first_part().map(|part| part.as_json()) else {
                continue;
            };
            let command = body
                .get("cmd")
                .and_then(Value::as_array)
                .and_then(|cmd| cmd.last())
                .and_then(Value::as_str);
            match command {
                Some(command) if !command.trim().is_empty() => return Some(Decision::run(command)),
                _ => tracing::debug!("analysis message has no usable cmd list"),
            }
        }
        None
    }
}

/// Fenced ```bash blocks in the text, joined in order
pub struct ShellCodeBlock;

impl ParseStrategy for ShellCodeBlock {
    fn name(&self) -> &'static str {
        "shell_code_block"
    }

    fn parse(&self, response: &ModelResponse) -> Option<Decision> {
        let blocks: Vec<&str> = SHELL_BLOCK
            .captures_iter(response.answer_text())
            .filter_map(|captures| captures.get(1))
            .map(|block| block.as_str())
            .filter(|block| !block.trim().is_empty())
            .collect();
        if blocks.is_empty() {
            return None;
        }
        Some(Decision::run(blocks.join("\n")))
    }
}

/// Text that reads as a finished answer
pub struct NaturalLanguageAnswer;

impl ParseStrategy for NaturalLanguageAnswer {
    fn name(&self) -> &'static str {
        "natural_language_answer"
    }

    fn parse(&self, response: &ModelResponse) -> Option<Decision> {
        let text = response.answer_text();
        if text.trim().is_empty() {
            return None;
        }
        if !harmony::has_markup(text) {
            return Some(Decision::answer(text));
        }

        // markup that did not yield a command is only an answer if nothing in it looks
        // like a failed tool call
        let messages = harmony::decode(text);
        if messages.iter().any(|message| message.is_tool_call()) {
            return None;
        }
        let last_text = |keep: &dyn Fn(&Message) -> bool| {
            messages
                .iter()
                .rev()
                .filter(|message| keep(message))
                .map(|message| message.text().trim().to_string())
                .find(|answer| !answer.is_empty())
        };
        last_text(&|message: &Message| message.channel.as_deref() == Some(CHANNEL_FINAL))
            .or_else(|| last_text(&|message: &Message| message.channel.is_none()))
            .or_else(|| Some(harmony::strip_markup(text)))
            .filter(|answer| !answer.is_empty())
            .map(Decision::answer)
    }
}

/// Turns model responses into decisions by trying each strategy in order
pub struct ResponseParser {
    strategies: Vec<Box<dyn ParseStrategy>>,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(BASH_TOOL_NAME)
    }
}

impl ResponseParser {
    /// The standard chain for a bash tool with the given name
    pub fn new(tool_name: &str) -> Self {
        Self::with_strategies(vec![
            Box::new(NativeToolCall {
                tool_name: tool_name.to_string(),
            }),
            Box::new(JsonBody),
            Box::new(HarmonyToolCall {
                tool_name: tool_name.to_string(),
            }),
            Box::new(ShellChannel),
            Box::new(AnalysisCommandList),
            Box::new(ShellCodeBlock),
            Box::new(NaturalLanguageAnswer),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ParseStrategy>>) -> Self {
        Self { strategies }
    }

    /// Interpret a response. Never fails: anything unrecognized is `Decision::Unparseable`.
    pub fn parse(&self, response: &ModelResponse) -> Decision {
        for strategy in &self.strategies {
            if let Some(decision) = strategy.parse(response) {
                tracing::debug!(strategy = strategy.name(), ?decision, "parsed model response");
                return decision;
            }
        }
        tracing::debug!("no strategy recognized the model response");
        Decision::Unparseable
    }
}

/// The bash tool may be addressed by its full name or just as `bash`
fn names_tool(name: &str, tool_name: &str) -> bool {
    name.contains(tool_name) || name == "bash"
}

/// Decoded messages of the full completion text, when it has any markup
fn decode_markup(response: &ModelResponse) -> Option<Vec<Message>> {
    let text = response.full_text();
    if !harmony::has_markup(&text) {
        return None;
    }
    Some(harmony::decode(&text))
}

fn command_from_arguments(arguments: &Value) -> Option<Decision> {
    let command = arguments.get("command")?.as_str()?;
    if command.trim().is_empty() {
        return None;
    }
    Some(Decision::run(command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolCall;
    use indoc::indoc;
    use serde_json::json;

    fn parse(response: &ModelResponse) -> Decision {
        ResponseParser::default().parse(response)
    }

    #[test]
    fn test_native_tool_call() {
        let response = ModelResponse::default().with_tool_call(ToolCall::new(
            "call_1",
            "execute_bash",
            json!("{\"command\": \"ls -la\"}"),
        ));
        assert_eq!(parse(&response), Decision::run("ls -la"));

        let response = ModelResponse::default().with_tool_call(ToolCall::new(
            "call_1",
            "functions.execute_bash",
            json!({"command": "pwd"}),
        ));
        assert_eq!(parse(&response), Decision::run("pwd"));
    }

    #[test]
    fn test_native_tool_call_only_considers_first_entry() {
        let response = ModelResponse::default()
            .with_tool_call(ToolCall::new("1", "get_weather", json!("{}")))
            .with_tool_call(ToolCall::new("2", "execute_bash", json!("{\"command\":\"ls\"}")));
        assert_eq!(parse(&response), Decision::Unparseable);
    }

    #[test]
    fn test_broken_native_call_falls_through_to_content() {
        let response = ModelResponse::text("{\"command\": \"whoami\"}")
            .with_tool_call(ToolCall::new("1", "execute_bash", json!("{not json")));
        assert_eq!(parse(&response), Decision::run("whoami"));

        let response = ModelResponse::text("All good.")
            .with_tool_call(ToolCall::new("1", "execute_bash", json!("{\"cmd\": \"ls\"}")));
        assert_eq!(parse(&response), Decision::answer("All good."));
    }

    #[test]
    fn test_json_body() {
        for command in ["ls -d */", "find . -name '*.py' | wc -l", "echo \"hi\" > out.txt"] {
            let body = json!({ "command": command }).to_string();
            assert_eq!(parse(&ModelResponse::text(body)), Decision::run(command));
        }

        let padded = ModelResponse::text("\n  {\"command\": \"uptime\", \"reason\": \"check\"}  ");
        assert_eq!(parse(&padded), Decision::run("uptime"));
    }

    #[test]
    fn test_json_body_without_string_command() {
        let response = ModelResponse::text("{\"command\": 42}");
        assert_eq!(parse(&response), Decision::answer("{\"command\": 42}"));

        let response = ModelResponse::text("{\"command\": \"\"}");
        assert_eq!(parse(&response), Decision::answer("{\"command\": \"\"}"));
    }

    #[test]
    fn test_harmony_tool_call() {
        let response = ModelResponse::text(
            "<|channel|>commentary to=functions.execute_bash <|constrain|>json<|message|>{\"command\":\"ls -la\"}<|call|>",
        );
        assert_eq!(parse(&response), Decision::run("ls -la"));
    }

    #[test]
    fn test_harmony_tool_call_in_reasoning() {
        let response = ModelResponse::default().with_reasoning(indoc! {r#"
            <|channel|>analysis<|message|>User wants folders.<|end|>
            <|start|>assistant<|channel|>commentary to=functions.execute_bash json<|message|>{"command": "ls -d */"}<|call|>"#});
        assert_eq!(parse(&response), Decision::run("ls -d */"));
    }

    #[test]
    fn test_harmony_scan_continues_past_bad_payloads() {
        let response = ModelResponse::text(indoc! {r#"
            <|start|>assistant<|channel|>commentary to=functions.execute_bash<|message|>{"command": <|call|>
            <|start|>assistant<|channel|>commentary to=functions.execute_bash<|message|>{"cmd": "ls"}<|call|>
            <|start|>assistant<|channel|>commentary to=functions.execute_bash<|message|><|call|>
            <|start|>assistant<|channel|>commentary to=functions.execute_bash<|message|>{"command": "df -h"}<|call|>"#});
        assert_eq!(parse(&response), Decision::run("df -h"));
    }

    #[test]
    fn test_harmony_undecodable_call_is_unparseable() {
        let response = ModelResponse::text(
            "<|channel|>commentary to=functions.execute_bash<|message|>ls -la<|call|>",
        );
        assert_eq!(parse(&response), Decision::Unparseable);
    }

    #[test]
    fn test_harmony_final_channel_is_answer() {
        let response = ModelResponse::text(
            "<|channel|>analysis<|message|>Summarize.<|end|><|start|>assistant<|channel|>final<|message|>There are 3 folders.<|return|>",
        );
        assert_eq!(parse(&response), Decision::answer("There are 3 folders."));

        // markup with neither a call nor a final message falls back to its text
        let response = ModelResponse::text("<|channel|>analysis<|message|>Still thinking");
        assert_eq!(parse(&response), Decision::answer("Still thinking"));
    }

    #[test]
    fn test_reasoning_markup_does_not_hide_content_answer() {
        let response = ModelResponse::text("There are 3 folders.").with_reasoning(
            "<|channel|>analysis<|message|>The listing shows 3 folders.<|end|>",
        );
        assert_eq!(parse(&response), Decision::answer("There are 3 folders."));
    }

    #[test]
    fn test_answer_with_stray_markup() {
        let response = ModelResponse::text("There are 3 folders.<|return|>");
        assert_eq!(parse(&response), Decision::answer("There are 3 folders."));

        let response = ModelResponse::text(
            "<|channel|>analysis<|message|>think<|end|>There are 3 folders.",
        );
        assert_eq!(parse(&response), Decision::answer("There are 3 folders."));

        // a final message wins over trailing plain text
        let response = ModelResponse::text(
            "<|channel|>final<|message|>Three.<|end|>trailing",
        );
        assert_eq!(parse(&response), Decision::answer("Three."));
    }

    #[test]
    fn test_shell_channel() {
        let response = ModelResponse::text("<|channel|>bash<|message|>ls -la<|end|>");
        assert_eq!(parse(&response), Decision::run("ls -la"));

        let response = ModelResponse::default().with_reasoning(indoc! {"
            <|channel|>analysis<|message|>Count them.<|end|>
            <|start|>assistant<|channel|>sh<|message|>
            find . -name '*.py' | wc -l
            <|end|>"});
        assert_eq!(parse(&response), Decision::run("find . -name '*.py' | wc -l"));

        // an empty shell message is not a command
        let response = ModelResponse::text("<|channel|>cmd<|message|>  <|end|>");
        assert_eq!(parse(&response), Decision::Unparseable);
    }

    #[test]
    fn test_analysis_command_list() {
        let response = ModelResponse::text(
            "<|channel|>analysis<|message|>{\"cmd\":[\"bash\",\"-lc\",\"ls -la\"]}<|call|>",
        );
        assert_eq!(parse(&response), Decision::run("ls -la"));

        let response = ModelResponse::default().with_reasoning(
            "<|channel|>analysis<|message|>{\"cmd\": [\"pwd\"]}<|end|>",
        );
        assert_eq!(parse(&response), Decision::run("pwd"));
    }

    #[test]
    fn test_analysis_without_command_list_is_not_a_command() {
        for body in ["{\"cmd\": []}", "{\"cmd\": \"ls\"}", "{\"cmd\": [1, 2]}"] {
            let response =
                ModelResponse::text(format!("<|channel|>analysis<|message|>{body}<|end|>"));
            assert_eq!(parse(&response), Decision::answer(body), "{body}");
        }
    }

    #[test]
    fn test_shell_code_block() {
        let response = ModelResponse::text(indoc! {"
            Let me check:

            ```bash
            ls -la | head -5
            ```
            "});
        assert_eq!(parse(&response), Decision::run("ls -la | head -5"));

        let response = ModelResponse::text("```SH\nfind . -name '*.py'\nwc -l *.py\n```");
        assert_eq!(parse(&response), Decision::run("find . -name '*.py'\nwc -l *.py"));
    }

    #[test]
    fn test_shell_code_blocks_are_joined() {
        let response = ModelResponse::text(indoc! {"
            First make the directory:

            ```bash
            mkdir -p build
            ```

            then list it:

            ```shell
            ls build
            ```
            "});
        assert_eq!(parse(&response), Decision::run("mkdir -p build\nls build"));
    }

    #[test]
    fn test_other_code_blocks_are_answers() {
        let text = "Here is an example:\n```python\nprint('hi')\n```";
        assert_eq!(parse(&ModelResponse::text(text)), Decision::answer(text));
    }

    #[test]
    fn test_plain_text_is_final_answer() {
        let text = "The directory contains three folders: src, tests and docs.";
        assert_eq!(parse(&ModelResponse::text(text)), Decision::answer(text));

        // answers are passed through exactly
        let text = "  Done.\n";
        assert_eq!(parse(&ModelResponse::text(text)), Decision::answer(text));
    }

    #[test]
    fn test_reasoning_only_is_final_answer() {
        let response = ModelResponse::text("").with_reasoning("Nothing left to do.");
        assert_eq!(parse(&response), Decision::answer("Nothing left to do."));
    }

    #[test]
    fn test_empty_response_is_unparseable() {
        assert_eq!(parse(&ModelResponse::default()), Decision::Unparseable);
        assert_eq!(parse(&ModelResponse::text(" \n\t")), Decision::Unparseable);
    }

    #[test]
    fn test_priority_order() {
        // native call beats JSON content
        let response = ModelResponse::text("{\"command\": \"second\"}")
            .with_tool_call(ToolCall::new("1", "execute_bash", json!("{\"command\":\"first\"}")));
        assert_eq!(parse(&response), Decision::run("first"));

        // harmony beats an embedded code block
        let response = ModelResponse::text(
            "```bash\nsecond\n```\n<|channel|>commentary to=functions.execute_bash<|message|>{\"command\":\"first\"}<|call|>",
        );
        assert_eq!(parse(&response), Decision::run("first"));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let parser = ResponseParser::default();
        let responses = [
            ModelResponse::text("{\"command\": \"ls\"}"),
            ModelResponse::text("<|channel|>commentary to=functions.execute_bash<|message|>{\"command\":\"ls\"}<|call|>"),
            ModelResponse::text("Done."),
            ModelResponse::default(),
        ];
        for response in &responses {
            assert_eq!(parser.parse(response), parser.parse(response));
        }
    }

    #[test]
    fn test_custom_strategy_chain() {
        struct AlwaysPwd;
        impl ParseStrategy for AlwaysPwd {
            fn name(&self) -> &'static str {
                "always_pwd"
            }
            fn parse(&self, _response: &ModelResponse) -> Option<Decision> {
                Some(Decision::run("pwd"))
            }
        }

        let parser = ResponseParser::with_strategies(vec![Box::new(JsonBody), Box::new(AlwaysPwd)]);
        assert_eq!(parser.parse(&ModelResponse::text("{\"command\":\"ls\"}")), Decision::run("ls"));
        assert_eq!(parser.parse(&ModelResponse::text("hello")), Decision::run("pwd"));
    }
}
