//! Script generation through an OpenAI-compatible chat-completions endpoint.

use reqwest::blocking::Client;
use serde_json::json;

use scenescope_core::{GenerateConfig, ScopeError, ScopeResult};

const SYSTEM_PROMPT: &str = "You are an expert Manim animation generator.";

const PROMPT_TEMPLATE: &str = r#"
You are an expert Python programmer specialized in creating animations with the Manim library.

Task: Generate a complete Python script using Manim that visualizes the mathematical concept described by the user.

REQUIREMENTS:
1. Use `Scene` class
2. Include explanatory text using `Text` or `Tex` objects
3. Position text so it does NOT overlap with main objects (use .to_edge(), .next_to(), .shift())
4. Add mathematical formulas using `MathTex` when appropriate
5. Animate both visualization AND explanatory text
6. Title should appear at top of screen
7. Use proper timing with self.wait()
8. Make the animation clear and educational
9. Output ONLY the Python code
10. To prevent text overflow:
   - Use `.scale_to_fit_width(config.frame_width * 0.8)`
   - Position text at bottom using `.to_edge(DOWN)`

User input: {user_prompt}

Generate the complete Manim script:
"#;

/// Fill the generation template with the user's request.
pub fn build_prompt(user_prompt: &str) -> String {
    PROMPT_TEMPLATE.replace("{user_prompt}", user_prompt)
}

/// Ask the configured model for a script and return its Python code.
pub fn request_script(config: &GenerateConfig, user_prompt: &str) -> ScopeResult<String> {
    if user_prompt.trim().is_empty() {
        return Err(ScopeError::InvalidArgument("prompt is empty".to_string()));
    }

    let api_key = std::env::var(&config.api_key_env).map_err(|_| {
        ScopeError::Generation(format!(
            "{} is not set (needed for the chat-completions endpoint)",
            config.api_key_env
        ))
    })?;

    let body = json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": build_prompt(user_prompt) },
        ],
    });

    tracing::info!(endpoint = %config.endpoint, model = %config.model, "requesting script");

    let res = Client::new()
        .post(&config.endpoint)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .map_err(|e| ScopeError::Generation(format!("request failed: {e}")))?;

    if !res.status().is_success() {
        let status = res.status();
        let text = res.text().unwrap_or_default();
        return Err(ScopeError::Generation(format!("{}: {}", status, text)));
    }

    let raw: serde_json::Value = res
        .json()
        .map_err(|e| ScopeError::Generation(format!("invalid response JSON: {e}")))?;
    let reply = reply_content(&raw)?;
    Ok(extract_python_code(reply))
}

/// `choices[0].message.content` of a chat-completions response.
fn reply_content(raw: &serde_json::Value) -> ScopeResult<&str> {
    raw["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ScopeError::Generation("response has no message content".to_string()))
}

/// The body of the first fenced code block (untagged or tagged `python`),
/// or the whole reply when there is none. Surrounding whitespace is trimmed.
pub fn extract_python_code(reply: &str) -> String {
    let mut rest = reply;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let body = after
            .strip_prefix("python\n")
            .or_else(|| after.strip_prefix('\n'));
        if let Some(body) = body {
            if let Some(close) = body.find("```") {
                return body[..close].trim().to_string();
            }
            break;
        }
        rest = after;
    }
    reply.trim().to_string()
}
