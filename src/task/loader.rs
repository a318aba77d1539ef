//! Loading task descriptors from files and directories.
//!
//! Accepted inputs:
//! - `.json`: one task object or an array of tasks
//! - `.jsonl`: one task object per line
//! - `.yaml` / `.yml`: one task mapping or a sequence of tasks
//!
//! A directory is walked recursively and every file with one of those
//! extensions is loaded in path order. Any malformed descriptor, invalid
//! task, or duplicate `instance_id` fails the whole load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use super::Task;
use crate::error::TaskLoadError;

/// On-disk format of a task file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFormat {
    Json,
    JsonLines,
    Yaml,
}

impl TaskFormat {
    /// Picks the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "jsonl" => Some(Self::JsonLines),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Parses every task contained in `content`.
///
/// `path` is only used for error messages.
pub fn parse_tasks(
    content: &str,
    format: TaskFormat,
    path: &Path,
) -> Result<Vec<Task>, TaskLoadError> {
    let parse_err = |message: String| TaskLoadError::Parse {
        path: path.to_path_buf(),
        message,
    };

    match format {
        TaskFormat::Json => {
            let value: serde_json::Value =
                serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?;
            if value.is_array() {
                serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))
            } else {
                serde_json::from_value(value)
                    .map(|task| vec![task])
                    .map_err(|e| parse_err(e.to_string()))
            }
        }
        TaskFormat::JsonLines => content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str::<Task>(line)
                    .map_err(|e| parse_err(format!("line {}: {e}", idx + 1)))
            })
            .collect(),
        TaskFormat::Yaml => {
            let value: serde_yaml::Value =
                serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
            if value.is_sequence() {
                serde_yaml::from_value(value).map_err(|e| parse_err(e.to_string()))
            } else {
                serde_yaml::from_value(value)
                    .map(|task| vec![task])
                    .map_err(|e| parse_err(e.to_string()))
            }
        }
    }
}

/// Finds all task files under `dir`, sorted by path.
pub fn discover_task_files(dir: &Path) -> Result<Vec<PathBuf>, TaskLoadError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| TaskLoadError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
        })?;
        if entry.file_type().is_file() && TaskFormat::from_path(entry.path()).is_some() {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

fn load_file(path: &Path) -> Result<Vec<Task>, TaskLoadError> {
    let format = TaskFormat::from_path(path)
        .ok_or_else(|| TaskLoadError::UnsupportedFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path).map_err(|source| TaskLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let tasks = parse_tasks(&content, format, path)?;
    debug!(path = %path.display(), count = tasks.len(), "Parsed task file");
    Ok(tasks)
}

/// Loads tasks from a single file or a directory of task files.
///
/// All tasks are validated and checked for duplicate ids before `limit` is
/// applied, so a bad descriptor anywhere in the input is always reported.
pub fn load_tasks(path: &Path, limit: Option<usize>) -> Result<Vec<Task>, TaskLoadError> {
    let files = if path.is_dir() {
        discover_task_files(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut tasks = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    for file in &files {
        for task in load_file(file)? {
            task.validate()?;
            if let Some(first) = seen.get(&task.instance_id) {
                return Err(TaskLoadError::DuplicateId {
                    id: task.instance_id.clone(),
                    first: first.clone(),
                    second: file.clone(),
                });
            }
            seen.insert(task.instance_id.clone(), file.clone());
            tasks.push(task);
        }
    }

    if tasks.is_empty() {
        return Err(TaskLoadError::NoTasks(path.to_path_buf()));
    }

    info!(
        "Loaded {} tasks from {} file(s) under {}",
        tasks.len(),
        files.len(),
        path.display()
    );

    if let Some(limit) = limit {
        tasks.truncate(limit);
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskCategory;

    fn task_json(id: &str, category: &str) -> String {
        format!(
            r#"{{"instance_id":"{id}","problem_statement":"Set it up","success_command":"echo 'Setup successful'","base_image":"ubuntu:22.04","task_type":"{category}"}}"#
        )
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(TaskFormat::from_path(Path::new("a.json")), Some(TaskFormat::Json));
        assert_eq!(TaskFormat::from_path(Path::new("a.JSONL")), Some(TaskFormat::JsonLines));
        assert_eq!(TaskFormat::from_path(Path::new("a.yml")), Some(TaskFormat::Yaml));
        assert_eq!(TaskFormat::from_path(Path::new("a.txt")), None);
        assert_eq!(TaskFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_parse_single_json_object() {
        let tasks = parse_tasks(
            &task_json("one", "repo_setup"),
            TaskFormat::Json,
            Path::new("one.json"),
        )
        .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].category, TaskCategory::RepoSetup);
    }

    #[test]
    fn test_parse_json_array() {
        let content = format!(
            "[{}, {}]",
            task_json("a", "database_setup"),
            task_json("b", "dependency_resolution")
        );
        let tasks = parse_tasks(&content, TaskFormat::Json, Path::new("batch.json")).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].instance_id, "b");
    }

    #[test]
    fn test_parse_jsonl_skips_blank_lines() {
        let content = format!(
            "{}\n\n{}\n",
            task_json("a", "repo_setup"),
            task_json("b", "repo_setup")
        );
        let tasks = parse_tasks(&content, TaskFormat::JsonLines, Path::new("t.jsonl")).unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn test_parse_jsonl_reports_line_number() {
        let content = format!("{}\nnot json\n", task_json("a", "repo_setup"));
        let err = parse_tasks(&content, TaskFormat::JsonLines, Path::new("t.jsonl")).unwrap_err();
        assert!(err.to_string().contains("line 2"), "got: {err}");
    }

    #[test]
    fn test_parse_yaml_sequence() {
        let content = r#"
- instance_id: svc-redis
  problem_statement: Run redis as a service
  success_command: redis-cli ping | grep -q PONG && echo 'Setup successful'
  base_image: debian:12
  category: background_service
"#;
        let tasks = parse_tasks(content, TaskFormat::Yaml, Path::new("t.yaml")).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].category, TaskCategory::BackgroundService);
    }

    #[test]
    fn test_parse_missing_field_is_error() {
        let content = r#"{"instance_id":"a","problem_statement":"x","base_image":"ubuntu","task_type":"repo_setup"}"#;
        let err = parse_tasks(content, TaskFormat::Json, Path::new("a.json")).unwrap_err();
        assert!(matches!(err, TaskLoadError::Parse { .. }));
        assert!(err.to_string().contains("success_command"));
    }

    #[test]
    fn test_load_directory_sorted_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.json"), task_json("b", "repo_setup")).unwrap();
        std::fs::write(dir.path().join("a.json"), task_json("a", "repo_setup")).unwrap();
        std::fs::write(
            dir.path().join("nested").join("c.jsonl"),
            task_json("c", "repo_setup"),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let tasks = load_tasks(dir.path(), None).unwrap();
        let ids: Vec<_> = tasks.iter().map(|t| t.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let limited = load_tasks(dir.path(), Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_load_duplicate_ids_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), task_json("same", "repo_setup")).unwrap();
        std::fs::write(dir.path().join("b.json"), task_json("same", "repo_setup")).unwrap();

        let err = load_tasks(dir.path(), None).unwrap_err();
        assert!(matches!(err, TaskLoadError::DuplicateId { ref id, .. } if id == "same"));
    }

    #[test]
    fn test_load_empty_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_tasks(dir.path(), None),
            Err(TaskLoadError::NoTasks(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_tasks(&dir.path().join("missing.json"), None).unwrap_err();
        assert!(matches!(err, TaskLoadError::Io { .. }));
    }

    #[test]
    fn test_load_unsupported_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.toml");
        std::fs::write(&path, "x = 1").unwrap();
        assert!(matches!(
            load_tasks(&path, None),
            Err(TaskLoadError::UnsupportedFormat(_))
        ));
    }
}
