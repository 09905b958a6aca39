//! Read-only job summaries for the periodic stats reporter.

use crate::job::JobState;
use serde::Serialize;

/// One line of the stats listing.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    /// Job name.
    pub name: String,
    /// Coarse running/non-running, separate from the progress string.
    pub running: bool,
    /// Coarse lifecycle state.
    pub state: JobState,
    /// Progress string per the reporter contract.
    pub progress: String,
}

/// Render summaries as one line per job for the reporter log.
pub fn render(summaries: &[JobSummary]) -> String {
    if summaries.is_empty() {
        return "no replication jobs".to_string();
    }
    let mut out = String::new();
    for s in summaries {
        let state = match &s.state {
            JobState::Initializing => "initializing".to_string(),
            JobState::Running => "running".to_string(),
            JobState::Paused => "paused".to_string(),
            JobState::Stopped => "stopped".to_string(),
            JobState::Error { fault, scope } => {
                if scope.is_empty() {
                    format!("error ({fault})")
                } else {
                    format!("error ({fault}; tables {})", scope.join(","))
                }
            }
        };
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("{}: {} {}", s.name, state, s.progress));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[]), "no replication jobs");
    }

    #[test]
    fn test_render_one_per_line() {
        let summaries = vec![
            JobSummary {
                name: "a".into(),
                running: true,
                state: JobState::Running,
                progress: "DBIncrementalSync".into(),
            },
            JobSummary {
                name: "b".into(),
                running: false,
                state: JobState::Error { fault: "binlog disabled".into(), scope: vec![] },
                progress: "TableInit".into(),
            },
        ];
        let text = render(&summaries);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "a: running DBIncrementalSync");
        assert!(lines[1].contains("error (binlog disabled)"));
    }

    #[test]
    fn test_render_error_scope() {
        let summaries = vec![JobSummary {
            name: "sales".into(),
            running: false,
            state: JobState::Error { fault: "restore failed".into(), scope: vec!["t3".into()] },
            progress: "DBPartialSync:t3".into(),
        }];
        let text = render(&summaries);
        assert!(text.contains("tables t3"));
    }
}
