use crate::request::ExecResponse;

/// Renders a response as a chat-friendly status line plus fenced output.
#[must_use]
pub fn format_exec_result(result: &ExecResponse) -> String {
    if result.success {
        return format!("✅ Command succeeded\n```\n{}\n```", result.stdout);
    }

    let output = [
        result.stderr.as_str(),
        result.stdout.as_str(),
        result.error.as_deref().unwrap_or(""),
    ]
    .into_iter()
    .find(|value| !value.is_empty())
    .unwrap_or("No output");
    format!("❌ Command failed\n```\n{output}\n```")
}
