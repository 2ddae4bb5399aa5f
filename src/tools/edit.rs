//! The `str_replace_editor` tool: viewing and editing local files with a
//! per-file undo history.
//!
//! Every mutation is written to a temporary file next to the target and then
//! persisted over it, so a failed edit never leaves a half-written file.

use super::{Tool, ToolResult, ToolSchema};
use crate::core::error::ToolError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const EDIT_TOOL_NAME: &str = "str_replace_editor";

/// Lines of context shown around an edit.
const SNIPPET_LINES: usize = 4;

/// Result of a `view` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOutput {
    File {
        path: PathBuf,
        content: String,
        first_line: usize,
    },
    Directory {
        path: PathBuf,
        entries: Vec<String>,
    },
}

impl ViewOutput {
    pub fn render(&self) -> String {
        match self {
            ViewOutput::File {
                path,
                content,
                first_line,
            } => numbered(content, &path.display().to_string(), *first_line),
            ViewOutput::Directory { path, entries } => format!(
                "Here's the files and directories up to 2 levels deep in {}, excluding hidden items:\n{}\n",
                path.display(),
                entries.join("\n")
            ),
        }
    }
}

/// Performs file operations and remembers prior contents for `undo_edit`.
pub struct FileEditor {
    base_dir: PathBuf,
    history: HashMap<PathBuf, Vec<String>>,
}

impl FileEditor {
    /// Relative paths given to the editor resolve against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            history: HashMap::new(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        if path.trim().is_empty() {
            return Err(ToolError::InvalidParameter("`path` must not be empty".to_string()));
        }
        let path = Path::new(path);
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.base_dir.join(path))
        }
    }

    pub fn view(&self, path: &str, view_range: Option<&[i64]>) -> Result<ViewOutput, ToolError> {
        let path = self.resolve(path)?;
        if path.is_dir() {
            if view_range.is_some() {
                return Err(ToolError::InvalidParameter(
                    "`view_range` is not allowed when `path` points to a directory".to_string(),
                ));
            }
            let mut entries = Vec::new();
            list_dir(&path, 2, &mut entries)?;
            return Ok(ViewOutput::Directory { path, entries });
        }

        let content = read_file(&path)?;
        let Some(range) = view_range else {
            return Ok(ViewOutput::File {
                path,
                content,
                first_line: 1,
            });
        };

        let [start, end] = range else {
            return Err(ToolError::InvalidParameter(
                "`view_range` must be a list of two integers".to_string(),
            ));
        };
        let (start, end) = (*start, *end);
        let lines: Vec<&str> = content.split('\n').collect();
        let n_lines = lines.len() as i64;

        if start < 1 || start > n_lines {
            return Err(ToolError::OutOfRange(format!(
                "Invalid `view_range`: {range:?}. Its first element `{start}` should be within the range of lines of the file: [1, {n_lines}]"
            )));
        }
        if end > n_lines {
            return Err(ToolError::OutOfRange(format!(
                "Invalid `view_range`: {range:?}. Its second element `{end}` should be smaller than the number of lines in the file: `{n_lines}`"
            )));
        }
        if end != -1 && end < start {
            return Err(ToolError::OutOfRange(format!(
                "Invalid `view_range`: {range:?}. Its second element `{end}` should be larger or equal than its first `{start}`"
            )));
        }

        let first = (start - 1) as usize;
        let selected = if end == -1 {
            &lines[first..]
        } else {
            &lines[first..end as usize]
        };
        Ok(ViewOutput::File {
            path,
            content: selected.join("\n"),
            first_line: start as usize,
        })
    }

    pub fn create(&mut self, path: &str, file_text: &str) -> Result<String, ToolError> {
        let path = self.resolve(path)?;
        if path.is_file() {
            return Err(ToolError::AlreadyExists(path.display().to_string()));
        }
        if path.is_dir() {
            return Err(ToolError::InvalidParameter(format!(
                "The path {} is a directory",
                path.display()
            )));
        }

        create_atomic(&path, file_text)?;
        self.history.entry(path.clone()).or_default().push(String::new());
        Ok(format!("File created successfully at: {}", path.display()))
    }

    pub fn str_replace(
        &mut self,
        path: &str,
        old_str: &str,
        new_str: &str,
    ) -> Result<String, ToolError> {
        let path = self.resolve(path)?;
        ensure_file(&path)?;
        if old_str.is_empty() {
            return Err(ToolError::InvalidParameter("`old_str` must not be empty".to_string()));
        }

        let content = read_file(&path)?;
        let offsets: Vec<usize> = content.match_indices(old_str).map(|(i, _)| i).collect();
        match offsets.as_slice() {
            [] => {
                return Err(ToolError::NotFound(format!(
                    "No replacement was performed, old_str `{}` did not appear verbatim in {}.",
                    old_str,
                    path.display()
                )));
            }
            [_] => {}
            many => {
                let lines: Vec<String> = many
                    .iter()
                    .map(|&offset| line_of(&content, offset).to_string())
                    .collect();
                return Err(ToolError::Ambiguous(format!(
                    "No replacement was performed. Multiple occurrences of old_str `{}` in lines {}. Please ensure it is unique",
                    old_str,
                    lines.join(", ")
                )));
            }
        }

        let new_content = content.replacen(old_str, new_str, 1);
        write_atomic(&path, &new_content)?;

        let replaced_at = line_of(&content, offsets[0]) - 1;
        let start = replaced_at.saturating_sub(SNIPPET_LINES);
        let end = replaced_at + SNIPPET_LINES + new_str.matches('\n').count();
        let snippet: Vec<&str> = new_content
            .split('\n')
            .skip(start)
            .take(end - start + 1)
            .collect();

        self.history.entry(path.clone()).or_default().push(content);
        debug!(path = %path.display(), "str_replace applied");

        Ok(format!(
            "The file {} has been edited. {}Review the changes and make sure they are as expected. Edit the file again if necessary.",
            path.display(),
            numbered(
                &snippet.join("\n"),
                &format!("a snippet of {}", path.display()),
                start + 1
            )
        ))
    }

    pub fn insert(
        &mut self,
        path: &str,
        insert_line: usize,
        new_str: &str,
    ) -> Result<String, ToolError> {
        let path = self.resolve(path)?;
        ensure_file(&path)?;

        let content = read_file(&path)?;
        let lines: Vec<&str> = content.split('\n').collect();
        if insert_line > lines.len() {
            return Err(ToolError::OutOfRange(format!(
                "Invalid `insert_line` parameter: {}. It should be within the range of lines of the file: [0, {}]",
                insert_line,
                lines.len()
            )));
        }

        let new_lines: Vec<&str> = new_str.split('\n').collect();
        let updated: Vec<&str> = lines[..insert_line]
            .iter()
            .chain(new_lines.iter())
            .chain(lines[insert_line..].iter())
            .copied()
            .collect();
        write_atomic(&path, &updated.join("\n"))?;

        let snippet_start = insert_line.saturating_sub(SNIPPET_LINES);
        let snippet_end = (insert_line + SNIPPET_LINES).min(lines.len());
        let snippet: Vec<&str> = lines[snippet_start..insert_line]
            .iter()
            .chain(new_lines.iter())
            .chain(lines[insert_line..snippet_end].iter())
            .copied()
            .collect();

        self.history.entry(path.clone()).or_default().push(content.clone());

        Ok(format!(
            "The file {} has been edited. {}Review the changes and make sure they are as expected (correct indentation, no duplicate lines, etc). Edit the file again if necessary.",
            path.display(),
            numbered(&snippet.join("\n"), "a snippet of the edited file", snippet_start + 1)
        ))
    }

    pub fn undo_edit(&mut self, path: &str) -> Result<String, ToolError> {
        let path = self.resolve(path)?;
        let previous = self
            .history
            .get_mut(&path)
            .and_then(|stack| stack.pop())
            .ok_or_else(|| ToolError::NoHistory(path.display().to_string()))?;

        if let Err(e) = write_atomic(&path, &previous) {
            // keep the entry so a retry can still restore it
            self.history.entry(path.clone()).or_default().push(previous);
            return Err(e);
        }

        Ok(format!(
            "Last edit to {} undone successfully. {}",
            path.display(),
            numbered(&previous, &path.display().to_string(), 1)
        ))
    }
}

/// Renders `content` the way `cat -n` would.
fn numbered(content: &str, descriptor: &str, first_line: usize) -> String {
    let body: Vec<String> = content
        .split('\n')
        .enumerate()
        .map(|(i, line)| format!("{:6}\t{}", i + first_line, line))
        .collect();
    format!(
        "Here's the result of running `cat -n` on {}:\n{}\n",
        descriptor,
        body.join("\n")
    )
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset].matches('\n').count() + 1
}

fn ensure_file(path: &Path) -> Result<(), ToolError> {
    if path.is_dir() {
        return Err(ToolError::InvalidParameter(format!(
            "The path {} is a directory and only the `view` command can be used on directories",
            path.display()
        )));
    }
    if !path.exists() {
        return Err(ToolError::NotFound(format!(
            "The path {} does not exist. Please provide a valid path.",
            path.display()
        )));
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<String, ToolError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ToolError::NotFound(format!(
            "The path {} does not exist. Please provide a valid path.",
            path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Writes `contents` to a temp file next to `path`, ready to be persisted.
fn stage(path: &Path, contents: &str) -> Result<NamedTempFile, ToolError> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(contents.as_bytes())?;
    temp_file.as_file_mut().sync_all()?;
    Ok(temp_file)
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), ToolError> {
    let temp_file = stage(path, contents)?;
    if let Ok(meta) = fs::metadata(path) {
        temp_file.as_file().set_permissions(meta.permissions())?;
    }
    temp_file.persist(path).map_err(|e| ToolError::Io { source: e.error })?;
    Ok(())
}

/// Like [`write_atomic`], but never replaces a file that appeared meanwhile.
fn create_atomic(path: &Path, contents: &str) -> Result<(), ToolError> {
    stage(path, contents)?
        .persist_noclobber(path)
        .map_err(|e| match e.error.kind() {
            std::io::ErrorKind::AlreadyExists => {
                ToolError::AlreadyExists(path.display().to_string())
            }
            _ => ToolError::Io { source: e.error },
        })?;
    Ok(())
}

fn list_dir(dir: &Path, depth: usize, out: &mut Vec<String>) -> Result<(), ToolError> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            out.push(format!("{}/", path.display()));
            if depth > 1 {
                list_dir(&path, depth - 1, out)?;
            }
        } else {
            out.push(path.display().to_string());
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum EditCommand {
    View {
        path: String,
        #[serde(default)]
        view_range: Option<Vec<i64>>,
    },
    Create {
        path: String,
        file_text: String,
    },
    StrReplace {
        path: String,
        old_str: String,
        #[serde(default)]
        new_str: Option<String>,
    },
    Insert {
        path: String,
        insert_line: usize,
        new_str: String,
    },
    UndoEdit {
        path: String,
    },
}

/// Tool adapter exposing a [`FileEditor`] to the model.
pub struct EditTool {
    editor: FileEditor,
    schema: ToolSchema,
    max_output_bytes: usize,
}

impl EditTool {
    pub fn new(editor: FileEditor, max_output_bytes: usize) -> Self {
        Self {
            editor,
            schema: edit_schema(),
            max_output_bytes,
        }
    }
}

fn edit_schema() -> ToolSchema {
    ToolSchema {
        name: EDIT_TOOL_NAME.to_string(),
        description: "Custom editing tool for viewing, creating and editing files.\n\
* State is persistent across calls.\n\
* If `path` is a file, `view` displays the result of `cat -n`. If `path` is a directory, `view` lists non-hidden files and directories up to 2 levels deep.\n\
* The `create` command cannot be used if the specified `path` already exists as a file.\n\
* `undo_edit` reverts the last edit made to the file at `path`.\n\
* `old_str` must match EXACTLY one location in the file, including whitespace; make it unique by including enough context.\n\
* `new_str` holds the replacement for `old_str`, or the text to insert for `insert`."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["view", "create", "str_replace", "insert", "undo_edit"],
                    "description": "The command to run."
                },
                "path": {
                    "type": "string",
                    "description": "Path to the file or directory. Relative paths resolve against the client's working directory."
                },
                "file_text": {
                    "type": "string",
                    "description": "Required for `create`: content of the file to be created."
                },
                "old_str": {
                    "type": "string",
                    "description": "Required for `str_replace`: the exact text to replace."
                },
                "new_str": {
                    "type": "string",
                    "description": "Optional for `str_replace` (defaults to empty), required for `insert`."
                },
                "insert_line": {
                    "type": "integer",
                    "description": "Required for `insert`: `new_str` is inserted AFTER this line (0 inserts at the top)."
                },
                "view_range": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "description": "Optional for `view` on a file: [start, end] 1-based inclusive; -1 as end shows to the end of the file."
                }
            },
            "required": ["command", "path"]
        }),
    }
}

#[async_trait]
impl Tool for EditTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(
        &mut self,
        args: Value,
        _cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let command: EditCommand = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidParameter(e.to_string()))?;
        debug!(?command, "editor command");

        let output = match command {
            EditCommand::View { path, view_range } => self
                .editor
                .view(&path, view_range.as_deref())?
                .render(),
            EditCommand::Create { path, file_text } => self.editor.create(&path, &file_text)?,
            EditCommand::StrReplace {
                path,
                old_str,
                new_str,
            } => self
                .editor
                .str_replace(&path, &old_str, new_str.as_deref().unwrap_or_default())?,
            EditCommand::Insert {
                path,
                insert_line,
                new_str,
            } => self.editor.insert(&path, insert_line, &new_str)?,
            EditCommand::UndoEdit { path } => self.editor.undo_edit(&path)?,
        };

        Ok(ToolResult::success(output).clipped(self.max_output_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn editor() -> (TempDir, FileEditor) {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let editor = FileEditor::new(dir.path());
        (dir, editor)
    }

    fn file_content(editor: &FileEditor, path: &str) -> String {
        match editor.view(path, None).expect("view failed") {
            ViewOutput::File { content, .. } => content,
            other => panic!("expected a file, got {other:?}"),
        }
    }

    #[test]
    fn create_then_view_round_trips() {
        let (_dir, mut editor) = editor();
        let text = "first line\n\tsecond line\n\nlast";
        editor.create("a/b/notes.txt", text).unwrap();
        assert_eq!(file_content(&editor, "a/b/notes.txt"), text);
    }

    #[test]
    fn create_refuses_existing_file() {
        let (dir, mut editor) = editor();
        let path = dir.path().join("existing.txt");
        fs::write(&path, "keep me").unwrap();

        let err = editor.create("existing.txt", "clobber").unwrap_err();
        assert!(matches!(err, ToolError::AlreadyExists(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn create_never_replaces_a_file_that_appeared_late() {
        let (dir, _editor) = editor();
        let path = dir.path().join("raced.txt");
        fs::write(&path, "written elsewhere").unwrap();

        let err = create_atomic(&path, "clobber").unwrap_err();
        assert!(matches!(err, ToolError::AlreadyExists(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "written elsewhere");
    }

    #[test]
    fn str_replace_rejects_ambiguous_match() {
        let (dir, mut editor) = editor();
        let path = dir.path().join("dup.txt");
        fs::write(&path, "foo\nbar\nfoo\n").unwrap();

        let err = editor.str_replace("dup.txt", "foo", "baz").unwrap_err();
        match err {
            ToolError::Ambiguous(msg) => assert!(msg.contains("lines 1, 3"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "foo\nbar\nfoo\n");
    }

    #[test]
    fn str_replace_reports_missing_text() {
        let (dir, mut editor) = editor();
        fs::write(dir.path().join("f.txt"), "alpha").unwrap();
        let err = editor.str_replace("f.txt", "beta", "gamma").unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn str_replace_edits_and_undo_restores() {
        let (dir, mut editor) = editor();
        let path = dir.path().join("code.rs");
        let original = "fn main() {\n    println!(\"hi\");\n}\n";
        fs::write(&path, original).unwrap();

        let out = editor
            .str_replace("code.rs", "\"hi\"", "\"hello\"")
            .unwrap();
        assert!(out.contains("     2\t    println!(\"hello\");"), "{out}");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "fn main() {\n    println!(\"hello\");\n}\n"
        );

        editor.undo_edit("code.rs").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), original);

        let err = editor.undo_edit("code.rs").unwrap_err();
        assert!(matches!(err, ToolError::NoHistory(_)));
    }

    #[test]
    fn undo_after_create_leaves_empty_file() {
        let (dir, mut editor) = editor();
        editor.create("new.txt", "content").unwrap();
        editor.undo_edit("new.txt").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("new.txt")).unwrap(), "");
    }

    #[test]
    fn undo_without_edits_fails() {
        let (dir, mut editor) = editor();
        fs::write(dir.path().join("untouched.txt"), "x").unwrap();
        let err = editor.undo_edit("untouched.txt").unwrap_err();
        assert!(matches!(err, ToolError::NoHistory(_)));
    }

    #[test]
    fn insert_adds_lines_after_target() {
        let (dir, mut editor) = editor();
        let path = dir.path().join("list.txt");
        fs::write(&path, "one\ntwo\nthree").unwrap();

        editor.insert("list.txt", 1, "one and a half").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "one\none and a half\ntwo\nthree"
        );

        editor.insert("list.txt", 0, "zero").unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("zero\none\n"));

        editor.undo_edit("list.txt").unwrap();
        editor.undo_edit("list.txt").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\nthree");
    }

    #[test]
    fn insert_past_end_is_out_of_range() {
        let (dir, mut editor) = editor();
        let path = dir.path().join("short.txt");
        fs::write(&path, "a\nb").unwrap();

        let err = editor.insert("short.txt", 3, "c").unwrap_err();
        assert!(matches!(err, ToolError::OutOfRange(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb");

        let err = editor.undo_edit("short.txt").unwrap_err();
        assert!(matches!(err, ToolError::NoHistory(_)));
    }

    #[test]
    fn insert_counts_the_piece_after_a_final_newline_as_a_line() {
        let (dir, mut editor) = editor();
        let path = dir.path().join("trailing.txt");
        fs::write(&path, "a\nb\n").unwrap();

        editor.insert("trailing.txt", 3, "c").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\n\nc");

        let err = editor.insert("trailing.txt", 5, "d").unwrap_err();
        assert!(matches!(err, ToolError::OutOfRange(_)));
    }

    #[test]
    fn view_range_selects_lines() {
        let (dir, editor) = editor();
        fs::write(dir.path().join("five.txt"), "1\n2\n3\n4\n5").unwrap();

        let view = editor.view("five.txt", Some(&[2, 3][..])).unwrap();
        assert_eq!(
            view.render().lines().skip(1).collect::<Vec<_>>(),
            vec!["     2\t2", "     3\t3"]
        );

        match editor.view("five.txt", Some(&[4, -1][..])).unwrap() {
            ViewOutput::File {
                content,
                first_line,
                ..
            } => {
                assert_eq!(content, "4\n5");
                assert_eq!(first_line, 4);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            editor.view("five.txt", Some(&[0, 2][..])),
            Err(ToolError::OutOfRange(_))
        ));
        assert!(matches!(
            editor.view("five.txt", Some(&[3, 9][..])),
            Err(ToolError::OutOfRange(_))
        ));
        assert!(matches!(
            editor.view("five.txt", Some(&[1][..])),
            Err(ToolError::InvalidParameter(_))
        ));
    }

    #[test]
    fn view_directory_skips_hidden_and_stops_at_two_levels() {
        let (dir, editor) = editor();
        fs::create_dir_all(dir.path().join("src/deep/deeper")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        fs::write(dir.path().join("src/deep/deeper/x.rs"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();

        let ViewOutput::Directory { entries, .. } = editor.view(".", None).unwrap() else {
            panic!("expected a directory listing");
        };
        let names: Vec<String> = entries
            .iter()
            .map(|e| e.rsplit_once("/./").map_or(e.clone(), |(_, rest)| rest.to_string()))
            .collect();
        assert_eq!(names, vec!["src/", "src/deep/", "src/lib.rs"]);
    }

    #[test]
    fn view_missing_path_is_not_found() {
        let (_dir, editor) = editor();
        assert!(matches!(
            editor.view("nope.txt", None),
            Err(ToolError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn tool_reports_bad_arguments_as_invalid() {
        let (_dir, editor) = editor();
        let mut tool = EditTool::new(editor, 16_000);
        let cancel = CancellationToken::new();

        let err = tool
            .call(json!({"command": "create", "path": "x.txt"}), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter(_)));

        let err = tool
            .call(json!({"command": "delete", "path": "x.txt"}), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn tool_create_and_view() {
        let (dir, editor) = editor();
        let mut tool = EditTool::new(editor, 16_000);
        let cancel = CancellationToken::new();

        let result = tool
            .call(
                json!({"command": "create", "path": "hello.txt", "file_text": "hello\nworld"}),
                &cancel,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(
            fs::read_to_string(dir.path().join("hello.txt")).unwrap(),
            "hello\nworld"
        );

        let result = tool
            .call(json!({"command": "view", "path": "hello.txt"}), &cancel)
            .await
            .unwrap();
        assert!(result.output.ends_with("     1\thello\n     2\tworld\n"));
    }
}
