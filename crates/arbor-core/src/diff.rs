//! Side-by-side diff alignment.
//!
//! [`parse_unified`] turns `git diff` output into typed [`DiffLine`]s and
//! [`align`] pairs them into dual-column [`Row`]s in a single pass. Removed
//! runs are paired index-for-index with the added run that directly follows
//! them; the shorter side is padded with [`Cell::Empty`].

use serde::{Deserialize, Serialize};

/// Kind of a line in a change report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Header,
    Context,
    Added,
    Removed,
}

/// One typed line of a change report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: LineKind,
    /// Line content without the leading `+`/`-`/space marker
    pub text: String,
    /// File the line belongs to, when known
    pub file: Option<String>,
}

impl DiffLine {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            file: None,
        }
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// One side of an aligned row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cell", content = "line", rename_all = "snake_case")]
pub enum Cell {
    Line(DiffLine),
    /// Placeholder that keeps the column defined
    Empty,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn line(&self) -> Option<&DiffLine> {
        match self {
            Self::Line(line) => Some(line),
            Self::Empty => None,
        }
    }
}

/// A dual-column row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub left: Cell,
    pub right: Cell,
}

impl Row {
    fn mirrored(line: &DiffLine) -> Self {
        Self {
            left: Cell::Line(line.clone()),
            right: Cell::Line(line.clone()),
        }
    }
}

/// Pair a linear change report into side-by-side rows.
///
/// Headers and context lines appear on both sides. A run of removed lines
/// consumes the run of added lines immediately after it and the two are
/// zipped up to the longer length. An added run with no removed run before
/// it sits opposite empty cells.
pub fn align(lines: &[DiffLine]) -> Vec<Row> {
    let mut rows = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        match lines[i].kind {
            LineKind::Header | LineKind::Context => {
                rows.push(Row::mirrored(&lines[i]));
                i += 1;
            }
            LineKind::Removed | LineKind::Added => {
                let removed_start = i;
                while i < lines.len() && lines[i].kind == LineKind::Removed {
                    i += 1;
                }
                let removed = &lines[removed_start..i];

                let added_start = i;
                while i < lines.len() && lines[i].kind == LineKind::Added {
                    i += 1;
                }
                let added = &lines[added_start..i];

                let height = removed.len().max(added.len());
                for k in 0..height {
                    rows.push(Row {
                        left: removed.get(k).cloned().map_or(Cell::Empty, Cell::Line),
                        right: added.get(k).cloned().map_or(Cell::Empty, Cell::Line),
                    });
                }
            }
        }
    }

    rows
}

/// Parse unified diff text into typed lines tagged with their file.
///
/// `diff --git`, index, mode and `@@` hunk lines are headers. `---`/`+++`
/// file markers set the current file and are also emitted as headers.
/// `\ No newline at end of file` markers are dropped.
pub fn parse_unified(text: &str) -> Vec<DiffLine> {
    let mut lines = Vec::new();
    let mut file: Option<String> = None;
    let mut in_hunk = false;

    for raw in text.lines() {
        if raw.starts_with("diff --git ") {
            in_hunk = false;
            file = raw.rsplit(" b/").next().map(str::to_string);
            lines.push(tagged(LineKind::Header, raw, &file));
            continue;
        }
        if !in_hunk && (raw.starts_with("--- ") || raw.starts_with("+++ ")) {
            if let Some(path) = raw[4..].strip_prefix("b/") {
                file = Some(path.to_string());
            }
            lines.push(tagged(LineKind::Header, raw, &file));
            continue;
        }
        if raw.starts_with("@@") {
            in_hunk = true;
            lines.push(tagged(LineKind::Header, raw, &file));
            continue;
        }
        if raw.starts_with('\\') {
            continue;
        }
        if !in_hunk {
            lines.push(tagged(LineKind::Header, raw, &file));
            continue;
        }

        let (kind, body) = match raw.chars().next() {
            Some('+') => (LineKind::Added, &raw[1..]),
            Some('-') => (LineKind::Removed, &raw[1..]),
            Some(' ') => (LineKind::Context, &raw[1..]),
            _ => (LineKind::Context, raw),
        };
        lines.push(tagged(kind, body, &file));
    }

    lines
}

fn tagged(kind: LineKind, text: &str, file: &Option<String>) -> DiffLine {
    DiffLine {
        kind,
        text: text.to_string(),
        file: file.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(kind: LineKind, text: &str) -> DiffLine {
        DiffLine::new(kind, text)
    }

    fn texts(cell: &Cell) -> &str {
        cell.line().map_or("", |l| l.text.as_str())
    }

    #[test]
    fn test_context_and_headers_are_mirrored() {
        let rows = align(&[
            line(LineKind::Header, "@@ -1,2 +1,2 @@"),
            line(LineKind::Context, "fn main() {"),
        ]);
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.left, row.right);
        }
    }

    #[test]
    fn test_replacement_pairs_index_for_index() {
        let rows = align(&[
            line(LineKind::Removed, "a"),
            line(LineKind::Removed, "b"),
            line(LineKind::Added, "A"),
            line(LineKind::Added, "B"),
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!((texts(&rows[0].left), texts(&rows[0].right)), ("a", "A"));
        assert_eq!((texts(&rows[1].left), texts(&rows[1].right)), ("b", "B"));
    }

    #[test]
    fn test_shorter_side_is_padded() {
        let rows = align(&[
            line(LineKind::Removed, "a"),
            line(LineKind::Removed, "b"),
            line(LineKind::Removed, "c"),
            line(LineKind::Added, "A"),
        ]);
        assert_eq!(rows.len(), 3);
        assert_eq!(texts(&rows[0].right), "A");
        assert!(rows[1].right.is_empty());
        assert!(rows[2].right.is_empty());

        let rows = align(&[
            line(LineKind::Removed, "a"),
            line(LineKind::Added, "A"),
            line(LineKind::Added, "B"),
        ]);
        assert_eq!(rows.len(), 2);
        assert!(rows[1].left.is_empty());
        assert_eq!(texts(&rows[1].right), "B");
    }

    #[test]
    fn test_pure_addition_sits_opposite_empty() {
        let rows = align(&[
            line(LineKind::Context, "x"),
            line(LineKind::Added, "new 1"),
            line(LineKind::Added, "new 2"),
            line(LineKind::Context, "y"),
        ]);
        assert_eq!(rows.len(), 4);
        assert!(rows[1].left.is_empty());
        assert!(rows[2].left.is_empty());
        assert_eq!(texts(&rows[3].left), "y");
    }

    #[test]
    fn test_added_then_removed_are_separate_runs() {
        let rows = align(&[
            line(LineKind::Added, "A"),
            line(LineKind::Removed, "a"),
        ]);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].left.is_empty());
        assert_eq!(texts(&rows[0].right), "A");
        assert_eq!(texts(&rows[1].left), "a");
        assert!(rows[1].right.is_empty());
    }

    #[test]
    fn test_order_is_preserved() {
        let input: Vec<DiffLine> = (0..6)
            .map(|n| {
                let kind = if n % 2 == 0 { LineKind::Context } else { LineKind::Removed };
                line(kind, &n.to_string())
            })
            .collect();
        let rows = align(&input);
        let left: Vec<&str> = rows.iter().map(|r| texts(&r.left)).collect();
        assert_eq!(left, vec!["0", "1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(align(&[]).is_empty());
    }

    const SAMPLE: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 83db48f..bf269f4 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,4 +1,4 @@
 use std::fmt;
-fn old() {}
+fn new() {}
+fn extra() {}
 // end
\\ No newline at end of file
diff --git a/README.md b/README.md
--- a/README.md
+++ b/README.md
@@ -1 +1 @@
-# Old
+# New
";

    #[test]
    fn test_parse_unified_tags_files_and_kinds() {
        let lines = parse_unified(SAMPLE);
        let body: Vec<(LineKind, &str)> = lines
            .iter()
            .filter(|l| l.kind != LineKind::Header)
            .map(|l| (l.kind, l.text.as_str()))
            .collect();
        assert_eq!(
            body,
            vec![
                (LineKind::Context, "use std::fmt;"),
                (LineKind::Removed, "fn old() {}"),
                (LineKind::Added, "fn new() {}"),
                (LineKind::Added, "fn extra() {}"),
                (LineKind::Context, "// end"),
                (LineKind::Removed, "# Old"),
                (LineKind::Added, "# New"),
            ]
        );

        let readme_lines = lines
            .iter()
            .filter(|l| l.file.as_deref() == Some("README.md"))
            .count();
        assert_eq!(readme_lines, 6);
        assert!(lines.iter().all(|l| !l.text.starts_with('\\')));
    }

    #[test]
    fn test_parse_then_align_keeps_every_row_filled() {
        let rows = align(&parse_unified(SAMPLE));
        let removed_added = rows
            .iter()
            .filter(|r| {
                r.left.line().is_some_and(|l| l.kind == LineKind::Removed)
                    || r.right.line().is_some_and(|l| l.kind == LineKind::Added)
            })
            .count();
        // lib.rs: max(1, 2) = 2 rows; README: max(1, 1) = 1 row
        assert_eq!(removed_added, 3);
    }
}
