/// Normalizes an agent-supplied path into tree segments.
///
/// Agents write `./src/a.ts`, `/src/a.ts` and `src//a.ts` interchangeably; all of
/// them address `src/a.ts`. `.` segments are dropped and `..` pops the previous
/// segment lexically (never above the workspace root). Backslashes are treated as
/// separators. An empty result means the path addresses nothing.
#[must_use]
pub fn normalize_path(raw: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in raw.trim().split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    segments
}

/// Joins normalized segments back into a tree id.
#[must_use]
pub fn join_segments(segments: &[&str]) -> String {
    segments.join("/")
}
