use crate::protocol::grammar::scan;

/// Removes every complete command tag from a finished reply and trims the result.
///
/// Prose around the tags is kept byte for byte. Unclosed or unknown tags are left
/// verbatim. Pure; does not touch any extractor state.
#[must_use]
pub fn strip_command_tags(full_text: &str) -> String {
    let mut visible = String::with_capacity(full_text.len());
    let mut last = 0;

    for found in scan(full_text, true) {
        visible.push_str(&full_text[last..found.start]);
        last = found.end;
    }
    visible.push_str(&full_text[last..]);

    visible.trim().to_string()
}
