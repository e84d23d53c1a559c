use agent_workspace::{
    extract_all, strip_command_tags, BatchFingerprint, Command, CommandExtractor, NodeKind,
    Workspace,
};
use pretty_assertions::assert_eq;

#[test]
fn self_closing_makef_creates_root_file() {
    let commands = CommandExtractor::new().parse("<makef path=\"a.txt\"/>");
    assert_eq!(
        commands,
        vec![Command::CreatePath {
            path: "a.txt".to_string(),
        }]
    );

    let mut workspace = Workspace::new();
    workspace.apply_commands(&commands);
    assert_eq!(workspace.paths(), vec!["a.txt"]);
    assert_eq!(
        workspace.find_node("a.txt").map(|node| node.kind),
        Some(NodeKind::File)
    );
}

#[test]
fn write_split_across_chunks_is_held_until_closed() {
    let mut extractor = CommandExtractor::new();

    assert!(extractor.parse("<writf path=\"x.ts\">hello").is_empty());
    assert_eq!(extractor.buffer(), "<writf path=\"x.ts\">hello");

    assert_eq!(
        extractor.parse(" world</writf>"),
        vec![Command::WriteFile {
            path: "x.ts".to_string(),
            content: "hello world".to_string(),
        }]
    );
    assert!(extractor.is_empty_buffer());
}

#[test]
fn nested_write_builds_expanded_folders() {
    let mut workspace = Workspace::new();
    workspace.apply_commands(&extract_all("<writf path=\"a/b/c.ts\">x</writf>"));

    assert_eq!(workspace.paths(), vec!["a", "a/b", "a/b/c.ts"]);
    assert_eq!(
        workspace.find_node("a/b").map(|node| node.kind),
        Some(NodeKind::Folder)
    );
    assert_eq!(workspace.file_content("a/b/c.ts"), "x");
    assert_eq!(
        workspace.expanded_folders().iter().collect::<Vec<_>>(),
        vec!["a", "a/b"]
    );
}

#[test]
fn final_text_strips_to_prose_and_yields_one_execute() {
    let text = "Done! <exe>bun install</exe>";

    assert_eq!(strip_command_tags(text), "Done!");
    assert_eq!(
        extract_all(text),
        vec![Command::Execute {
            command: "bun install".to_string(),
        }]
    );
}

#[test]
fn replayed_snapshots_converge_to_one_projection() {
    let text = "<makef path=\"./src/app.ts\"/><writf path=\"./src/app.ts\">v1</writf>";

    let mut once = Workspace::new();
    once.apply_commands(&extract_all(text));

    let first = extract_all(text);
    let second = extract_all(text);
    assert_eq!(BatchFingerprint::of(&first), BatchFingerprint::of(&second));

    let mut twice = Workspace::new();
    twice.apply_commands(&first);
    twice.apply_commands(&second);
    assert_eq!(twice, once);
}
