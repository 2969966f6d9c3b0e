//! Syntax checks for `ast_py` injections (tree-sitter)

use tree_sitter::{Node, Parser, Tree};

fn parse(source: &str) -> Option<Tree> {
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
    let mut parser = Parser::new();
    parser.set_language(&language).ok()?;
    parser.parse(source.as_bytes(), None)
}

/// Whether `source` parses as Python without syntax errors
pub fn parses(source: &str) -> bool {
    parse(source).is_some_and(|tree| !tree.root_node().has_error())
}

/// Whether line `row` (0-based) of `source` holds a comment node
pub fn is_comment_line(source: &str, row: usize) -> bool {
    let Some(tree) = parse(source) else {
        return false;
    };
    has_comment_on_row(&tree.root_node(), row)
}

fn has_comment_on_row(node: &Node, row: usize) -> bool {
    if node.start_position().row > row || node.end_position().row < row {
        return false;
    }
    if node.kind() == "comment" && node.start_position().row == row {
        return true;
    }
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| has_comment_on_row(&child, row));
    found
}

/// Validate an `ast_py` injection: the anchor must be a comment in the
/// original and the updated source must parse.
pub fn check_injection(
    original: &str,
    anchor_row: Option<usize>,
    updated: &str,
) -> Result<(), String> {
    if let Some(row) = anchor_row {
        if !is_comment_line(original, row) {
            return Err(format!("anchor on line {} is not a Python comment", row + 1));
        }
    }
    if !parses(updated) {
        return Err("injected source does not parse as Python".to_string());
    }
    Ok(())
}
