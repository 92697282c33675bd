//! Best-effort access to the output log a background subagent writes.
//!
//! Output is advisory: any read failure yields `None` (logged at debug).

use std::path::Path;

/// Read the whole output file.
pub async fn read_output(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Some(contents),
        Err(e) => {
            tracing::debug!(path = %path.display(), "Output file unreadable: {}", e);
            None
        }
    }
}

/// Read the last `lines` lines of the output file, joined with `\n`.
pub async fn read_output_tail(path: &Path, lines: usize) -> Option<String> {
    read_output(path).await.map(|contents| tail(&contents, lines))
}

fn tail(contents: &str, lines: usize) -> String {
    let all: Vec<&str> = contents.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        let text = (0..10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(tail(&text, 3), "line 7\nline 8\nline 9");
        assert_eq!(tail(&text, 0), "");
        assert_eq!(tail("only", 5), "only");
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(read_output(&tmp.path().join("nope.log")).await.is_none());
    }

    #[tokio::test]
    async fn tail_reads_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out.log");
        std::fs::write(&path, "a\nb\nc\n").unwrap();
        assert_eq!(read_output_tail(&path, 2).await.as_deref(), Some("b\nc"));
    }
}
