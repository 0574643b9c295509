//! Text-level codec for harmony tagged messages.
//!
//! A harmony message looks like
//! `<|start|>assistant<|channel|>commentary to=functions.execute_bash <|constrain|>json<|message|>{"command":"ls"}<|call|>`.
//! The header before `<|message|>` names the author, an optional recipient (`to=`), an
//! optional channel and an optional content type. Completions returned by a server usually
//! start mid-message (at `<|channel|>`) and may be cut off, so decoding is lenient by default.
use std::borrow::Cow;
use std::str::FromStr;

use serde_json::Value;

use crate::errors::HarmonyError;
use crate::models::content::ContentPart;
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, FUNCTIONS_NAMESPACE};

pub const START: &str = "<|start|>";
pub const END: &str = "<|end|>";
pub const MESSAGE: &str = "<|message|>";
pub const CHANNEL: &str = "<|channel|>";
pub const CONSTRAIN: &str = "<|constrain|>";
pub const CALL: &str = "<|call|>";
pub const RETURN: &str = "<|return|>";

const SPECIAL_TOKENS: [&str; 7] = [START, END, MESSAGE, CHANNEL, CONSTRAIN, CALL, RETURN];

/// Models sometimes get stuck emitting `<|call|>` over and over; anything past this many is dropped
pub const MAX_CALL_TOKENS: usize = 10;

/// Whether the text contains any harmony special token
pub fn has_markup(text: &str) -> bool {
    SPECIAL_TOKENS.iter().any(|token| text.contains(token))
}

/// Decode a completion into messages, accepting partial and slightly malformed markup
pub fn decode(text: &str) -> Vec<Message> {
    let mut messages = Vec::new();
    // lenient decoding never produces an error
    let _ = decode_into(text, false, &mut messages);
    messages
}

/// Decode well-formed harmony text, rejecting anything that does not follow the grammar
pub fn decode_strict(text: &str) -> Result<Vec<Message>, HarmonyError> {
    let mut messages = Vec::new();
    decode_into(text, true, &mut messages)?;
    Ok(messages)
}

fn decode_into(text: &str, strict: bool, messages: &mut Vec<Message>) -> Result<(), HarmonyError> {
    let text = limit_repeated_calls(text);
    let mut offset = 0;
    for (index, run) in text.split(START).enumerate() {
        // only the text before the first <|start|> has an implied author
        decode_run(run, index == 0, offset, strict, messages)?;
        offset += run.len() + START.len();
    }
    Ok(())
}

/// Cut the text after the `MAX_CALL_TOKENS`th `<|call|>`
pub fn limit_repeated_calls(text: &str) -> Cow<'_, str> {
    let count = text.matches(CALL).count();
    if count <= MAX_CALL_TOKENS {
        return Cow::Borrowed(text);
    }
    tracing::warn!(
        count,
        "completion repeats {} too often, truncating before decoding",
        CALL
    );
    let cut = text
        .match_indices(CALL)
        .nth(MAX_CALL_TOKENS - 1)
        .map(|(index, token)| index + token.len())
        .unwrap_or(text.len());
    Cow::Owned(text[..cut].to_string())
}

/// Decode the text between two `<|start|>` tokens, which holds one message and
/// possibly more header-led messages that omitted their own `<|start|>`
fn decode_run(
    run: &str,
    implicit_author: bool,
    offset: usize,
    strict: bool,
    messages: &mut Vec<Message>,
) -> Result<(), HarmonyError> {
    let mut rest = run;
    let mut consumed = 0;
    let mut first = true;

    while !rest.trim().is_empty() {
        let explicit_author = first && !implicit_author;
        let Some(header_end) = rest.find(MESSAGE) else {
            if strict {
                return Err(if explicit_author {
                    HarmonyError::UnterminatedHeader(offset + consumed)
                } else {
                    HarmonyError::StrayText(offset + consumed)
                });
            }
            if !explicit_author {
                // plain text, e.g. an answer after `<|end|>` or before a stray `<|return|>`
                let plain = plain_prefix(rest);
                if !plain.is_empty() {
                    messages.push(Message::assistant().with_text(plain));
                }
            }
            break;
        };

        let header = &rest[..header_end];
        let after_header = &rest[header_end + MESSAGE.len()..];
        let (body, next) = split_body(after_header);

        let mut message = parse_header(header, explicit_author, strict)?;
        message.content.push(ContentPart::text(body));
        messages.push(message);

        consumed += rest.len() - next.len();
        rest = next;
        first = false;
    }
    Ok(())
}

/// Text up to the first special token, trimmed
fn plain_prefix(text: &str) -> &str {
    let end = SPECIAL_TOKENS
        .iter()
        .filter_map(|token| text.find(token))
        .min()
        .unwrap_or(text.len());
    text[..end].trim()
}

/// The message bodies of a completion, one per line, without headers or special tokens
pub fn strip_markup(text: &str) -> String {
    decode(text)
        .iter()
        .map(|message| message.text())
        .filter(|body| !body.trim().is_empty())
        .map(|body| body.trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a message body from whatever follows its terminator
fn split_body(text: &str) -> (&str, &str) {
    let consuming = [END, CALL, RETURN]
        .iter()
        .filter_map(|token| text.find(token).map(|index| (index, index + token.len())));
    // a new header without a terminator also ends the body, but is left for the next message
    let boundary = text.find(CHANNEL).map(|index| (index, index));

    match consuming.chain(boundary).min_by_key(|(index, _)| *index) {
        Some((body_end, next_start)) => (&text[..body_end], &text[next_start..]),
        None => (text, ""),
    }
}

enum HeaderPart<'a> {
    Text(&'a str),
    Token(&'a str),
}

fn split_special(header: &str) -> Vec<HeaderPart<'_>> {
    let mut parts = Vec::new();
    let mut rest = header;
    while let Some((index, token)) = SPECIAL_TOKENS
        .iter()
        .filter_map(|token| rest.find(token).map(|index| (index, *token)))
        .min_by_key(|(index, _)| *index)
    {
        if index > 0 {
            parts.push(HeaderPart::Text(&rest[..index]));
        }
        parts.push(HeaderPart::Token(token));
        rest = &rest[index + token.len()..];
    }
    if !rest.is_empty() {
        parts.push(HeaderPart::Text(rest));
    }
    parts
}

fn parse_header(header: &str, explicit_author: bool, strict: bool) -> Result<Message, HarmonyError> {
    let mut message = Message::assistant();
    let mut after: Option<&str> = None;

    for part in split_special(header) {
        match part {
            HeaderPart::Token(token) => after = Some(token),
            HeaderPart::Text(text) => {
                let mut words = text.split_whitespace();
                match after {
                    None => {
                        if let Some(word) = words.next() {
                            if let Some(recipient) = word.strip_prefix("to=") {
                                message.recipient = Some(recipient.to_string());
                            } else if let Some((role, name)) = parse_author(word) {
                                message.role = role;
                                message.author_name = name;
                            } else if strict {
                                return Err(HarmonyError::UnknownAuthor(word.to_string()));
                            } else if explicit_author {
                                tracing::debug!(author = word, "unknown harmony author");
                            }
                        }
                    }
                    Some(CHANNEL) => {
                        if let Some(channel) = words.next() {
                            message.channel = Some(channel.to_string());
                        }
                    }
                    Some(CONSTRAIN) => {
                        if let Some(content_type) = words.next() {
                            message.content_type = Some(content_type.to_string());
                        }
                    }
                    Some(_) => {}
                }
                for word in words {
                    if let Some(recipient) = word.strip_prefix("to=") {
                        message.recipient = Some(recipient.to_string());
                    } else if after == Some(CHANNEL) && message.content_type.is_none() {
                        // bare content type, as in `<|channel|>commentary to=functions.x json`
                        message.content_type = Some(word.to_string());
                    }
                }
            }
        }
    }
    Ok(message)
}

fn parse_author(word: &str) -> Option<(Role, Option<String>)> {
    if let Ok(role) = Role::from_str(word) {
        return Some((role, None));
    }
    if word.contains('.') {
        return Some((Role::Tool, Some(word.to_string())));
    }
    None
}

/// Render a message back to harmony text
pub fn render_message(message: &Message) -> String {
    let mut header = message.author();
    if message.role == Role::Tool {
        if let Some(recipient) = &message.recipient {
            header.push_str(&format!(" to={}", recipient));
        }
    }
    if let Some(channel) = &message.channel {
        header.push_str(&format!("{}{}", CHANNEL, channel));
    }
    if message.role != Role::Tool {
        if let Some(recipient) = &message.recipient {
            header.push_str(&format!(" to={}", recipient));
        }
    }
    if let Some(content_type) = &message.content_type {
        header.push_str(&format!(" {}{}", CONSTRAIN, content_type));
    }

    let terminator = if message.is_tool_call() { CALL } else { END };
    format!(
        "{}{}{}{}{}",
        START,
        header,
        MESSAGE,
        message.text(),
        terminator
    )
}

/// Render a whole conversation, one message after another
pub fn render_conversation(messages: &[Message]) -> String {
    messages.iter().map(render_message).collect()
}

/// Render tools the way a developer message declares them to the model
pub fn render_tool_namespace(tools: &[Tool]) -> String {
    let mut out = format!("## {}\n\nnamespace {} {{\n", FUNCTIONS_NAMESPACE, FUNCTIONS_NAMESPACE);
    for tool in tools {
        out.push_str(&format!("\n// {}\n", tool.description));
        out.push_str(&format!("type {} = (_: {{\n", tool.name));
        let required: Vec<&str> = tool.parameters["required"]
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if let Some(properties) = tool.parameters["properties"].as_object() {
            for (name, schema) in properties {
                if let Some(description) = schema["description"].as_str() {
                    out.push_str(&format!("// {}\n", description));
                }
                let optional = if required.contains(&name.as_str()) { "" } else { "?" };
                out.push_str(&format!("{}{}: {},\n", name, optional, typescript_type(schema)));
            }
        }
        out.push_str("}) => any;\n");
    }
    out.push_str(&format!("\n}} // namespace {}", FUNCTIONS_NAMESPACE));
    out
}

fn typescript_type(schema: &Value) -> String {
    if let Some(options) = schema["enum"].as_array() {
        return options
            .iter()
            .map(|option| option.to_string())
            .collect::<Vec<_>>()
            .join(" | ");
    }
    match schema["type"].as_str() {
        Some("string") => "string".to_string(),
        Some("number") | Some("integer") => "number".to_string(),
        Some("boolean") => "boolean".to_string(),
        Some("array") => format!("{}[]", typescript_type(&schema["items"])),
        Some("object") => "object".to_string(),
        _ => "any".to_string(),
    }
}
