use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::community_search::QueryOutcome;
use crate::error::{CommunityError, Result};
use crate::types::VInt;

/// Layout of the per-query result file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `query : [a, b, c] (3)`
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Serialize)]
struct QueryRecord<'a> {
    query: VInt,
    status: &'static str,
    members: &'a [VInt],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Read query node ids, one per line. Blank lines are skipped.
pub fn read_query_nodes(path: impl AsRef<Path>) -> Result<Vec<VInt>> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| CommunityError::ingestion(path, 0, format!("cannot open query file: {}", e)))?;
    read_query_nodes_from(BufReader::new(file), path)
}

pub fn read_query_nodes_from<R: BufRead>(reader: R, source: &Path) -> Result<Vec<VInt>> {
    let mut query_nodes = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| CommunityError::ingestion(source, line_no, e.to_string()))?;
        let token = line.trim();
        if token.is_empty() {
            continue;
        }
        let id = token
            .parse::<VInt>()
            .map_err(|_| CommunityError::ingestion(source, line_no, format!("invalid query node '{}'", token)))?;
        query_nodes.push(id);
    }
    Ok(query_nodes)
}

/// `[a, b, c] (3)`
pub fn format_members(members: &[VInt]) -> String {
    format!("[{}] ({})", members.iter().join(", "), members.len())
}

pub fn write_outcomes<W: Write>(writer: &mut W, outcomes: &[(VInt, QueryOutcome)], format: OutputFormat) -> Result<()> {
    for (query, outcome) in outcomes {
        match format {
            OutputFormat::Text => match outcome {
                QueryOutcome::InvalidSeed => writeln!(writer, "{} : invalid seed", query)?,
                QueryOutcome::Failed(message) => writeln!(writer, "{} : failed ({})", query, message)?,
                _ => writeln!(writer, "{} : {}", query, format_members(outcome.members()))?,
            },
            OutputFormat::Json => {
                let status = match outcome {
                    QueryOutcome::Community(_) => "found",
                    QueryOutcome::TimedOut => "timeout",
                    QueryOutcome::InvalidSeed => "invalid_seed",
                    QueryOutcome::Failed(_) => "failed",
                };
                let record = QueryRecord {
                    query: *query,
                    status,
                    members: outcome.members(),
                    error: match outcome {
                        QueryOutcome::Failed(message) => Some(message.as_str()),
                        _ => None,
                    },
                };
                serde_json::to_writer(&mut *writer, &record).map_err(std::io::Error::from)?;
                writeln!(writer)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_partition<W: Write>(writer: &mut W, partition: &[Vec<VInt>]) -> Result<()> {
    for community in partition {
        writeln!(writer, "{}", format_members(community))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod test_query {
    use std::io::Cursor;
    use std::path::Path;

    use crate::community_search::QueryOutcome;
    use crate::error::CommunityError;
    use crate::query::{format_members, read_query_nodes_from, write_outcomes, write_partition, OutputFormat};

    #[test]
    fn test_read_queries() {
        let queries = read_query_nodes_from(Cursor::new("3\n\n 17 \n1\n"), Path::new("q.txt")).unwrap();
        assert_eq!(queries, vec![3, 17, 1]);

        let queries = read_query_nodes_from(Cursor::new("-4\n0\n"), Path::new("q.txt")).unwrap();
        assert_eq!(queries, vec![-4, 0]);

        let err = read_query_nodes_from(Cursor::new("3\nabc\n"), Path::new("q.txt")).unwrap_err();
        assert!(matches!(err, CommunityError::Ingestion { line: 2, .. }));
    }

    #[test]
    fn test_text_output() {
        let outcomes = vec![
            (1, QueryOutcome::Community(vec![1, 2, 3])),
            (5, QueryOutcome::TimedOut),
            (9, QueryOutcome::InvalidSeed),
            (-2, QueryOutcome::Failed("disk on fire".to_owned())),
        ];
        let mut buf = Vec::new();
        write_outcomes(&mut buf, &outcomes, OutputFormat::Text).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "1 : [1, 2, 3] (3)\n5 : [] (0)\n9 : invalid seed\n-2 : failed (disk on fire)\n"
        );
    }

    #[test]
    fn test_json_output() {
        let outcomes = vec![
            (4, QueryOutcome::Community(vec![2, 4])),
            (8, QueryOutcome::TimedOut),
            (3, QueryOutcome::Failed("broken".to_owned())),
        ];
        let mut buf = Vec::new();
        write_outcomes(&mut buf, &outcomes, OutputFormat::Json).unwrap();
        let lines: Vec<serde_json::Value> = String::from_utf8(buf)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines[0]["query"], 4);
        assert_eq!(lines[0]["status"], "found");
        assert_eq!(lines[0]["members"], serde_json::json!([2, 4]));
        assert_eq!(lines[1]["status"], "timeout");
        assert!(lines[1].get("error").is_none());
        assert_eq!(lines[2]["status"], "failed");
        assert_eq!(lines[2]["error"], "broken");
    }

    #[test]
    fn test_partition_output() {
        let mut buf = Vec::new();
        write_partition(&mut buf, &[vec![1, 2], vec![7]]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "[1, 2] (2)\n[7] (1)\n");
        assert_eq!(format_members(&[]), "[] (0)");
    }
}
