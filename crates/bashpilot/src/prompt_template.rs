use chrono::NaiveDate;
use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

use crate::harmony::render_tool_namespace;
use crate::models::tool::Tool;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const DEVELOPER_TEMPLATE: &str = include_str!("prompts/developer.md");

#[derive(Serialize)]
struct SystemContext<'a> {
    identity: &'a str,
    date: String,
    reasoning_effort: &'a str,
}

#[derive(Serialize)]
struct DeveloperContext<'a> {
    instructions: &'a str,
    tool_namespace: String,
}

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered.trim_end().to_string())
}

/// The system message: who the model is, today's date and how hard to think
pub fn system_prompt(
    identity: &str,
    date: NaiveDate,
    reasoning_effort: &str,
) -> Result<String, TeraError> {
    load_prompt(
        SYSTEM_TEMPLATE,
        &SystemContext {
            identity,
            date: date.format("%Y-%m-%d").to_string(),
            reasoning_effort,
        },
    )
}

/// The developer message: task instructions followed by the declared tools
pub fn developer_prompt(instructions: &str, tools: &[Tool]) -> Result<String, TeraError> {
    load_prompt(
        DEVELOPER_TEMPLATE,
        &DeveloperContext {
            instructions,
            tool_namespace: render_tool_namespace(tools),
        },
    )
}
