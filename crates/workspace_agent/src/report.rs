//! Plain-text rendering of a turn's results for the CLI.

use agent_workspace::{FileNode, Workspace};
use command_exec::{format_exec_result, ExecResponse};

/// Indented tree, folders suffixed with `/`, files with their content size.
pub fn render_tree(workspace: &Workspace) -> String {
    let mut out = String::new();
    for node in workspace.tree() {
        render_node(workspace, node, 0, &mut out);
    }
    out
}

fn render_node(workspace: &Workspace, node: &FileNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    if node.is_folder() {
        out.push_str(&format!("{indent}{}/\n", node.name));
        for child in &node.children {
            render_node(workspace, child, depth + 1, out);
        }
    } else {
        let bytes = workspace.file_content(&node.id).len();
        out.push_str(&format!("{indent}{} ({bytes} bytes)\n", node.name));
    }
}

pub fn render_execution(response: &ExecResponse) -> String {
    format!("$ {}\n{}", response.command, format_exec_result(response))
}

#[cfg(test)]
mod tests {
    use agent_workspace::{extract_all, Workspace};
    use command_exec::ExecResponse;
    use pretty_assertions::assert_eq;

    use super::{render_execution, render_tree};

    #[test]
    fn tree_lists_folders_before_their_children() {
        let mut workspace = Workspace::new();
        workspace.apply_commands(&extract_all(concat!(
            "<makef path=\"./src/components/Counter.tsx\"/>",
            "<writf path=\"./package.json\">{}</writf>",
        )));

        assert_eq!(
            render_tree(&workspace),
            "src/\n  components/\n    Counter.tsx (0 bytes)\npackage.json (2 bytes)\n"
        );
    }

    #[test]
    fn empty_workspace_renders_nothing() {
        assert_eq!(render_tree(&Workspace::new()), "");
    }

    #[test]
    fn execution_shows_command_and_outcome() {
        assert_eq!(
            render_execution(&ExecResponse::succeeded("echo hi", "hi")),
            "$ echo hi\n✅ Command succeeded\n```\nhi\n```"
        );
    }
}
