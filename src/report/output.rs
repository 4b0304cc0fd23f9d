use std::path::Path;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::report::{ReportRow, ReportSchema};
use crate::util::{write_json_pretty, write_text};

pub const CONTENT_TEXT_FIELD: &str = "rca_content_text";

pub fn render_csv(schema: &ReportSchema, rows: &[ReportRow]) -> String {
    let mut out = String::new();
    push_csv_line(
        &mut out,
        schema.headers().into_iter().map(ToOwned::to_owned),
    );
    for row in rows {
        push_csv_line(&mut out, row.cells.iter().map(|cell| cell.render()));
    }
    out
}

fn push_csv_line(out: &mut String, cells: impl Iterator<Item = String>) {
    let line = cells
        .map(|cell| escape_csv_cell(&cell))
        .collect::<Vec<String>>()
        .join(",");
    out.push_str(&line);
    out.push('\n');
}

pub fn escape_csv_cell(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn render_json_rows(
    schema: &ReportSchema,
    rows: &[ReportRow],
    include_content: bool,
) -> Vec<Value> {
    rows.iter()
        .map(|row| {
            let mut object = Map::new();
            for (column, cell) in schema.columns.iter().zip(&row.cells) {
                object.insert(column.name().to_string(), cell.to_json());
            }
            if include_content {
                object.insert(
                    CONTENT_TEXT_FIELD.to_string(),
                    row.content_text
                        .as_ref()
                        .map_or(Value::Null, |text| Value::String(text.clone())),
                );
            }
            Value::Object(object)
        })
        .collect()
}

pub fn write_csv(path: &Path, schema: &ReportSchema, rows: &[ReportRow]) -> Result<()> {
    write_text(path, &render_csv(schema, rows))
}

pub fn write_json_rows(
    path: &Path,
    schema: &ReportSchema,
    rows: &[ReportRow],
    include_content: bool,
) -> Result<()> {
    write_json_pretty(path, &render_json_rows(schema, rows, include_content))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::report::{CellValue, Column};

    fn schema() -> ReportSchema {
        ReportSchema {
            columns: vec![Column::TicketKey, Column::QualityFeedback, Column::QualityScore],
        }
    }

    fn row(feedback: CellValue, score: CellValue) -> ReportRow {
        ReportRow {
            ticket_key: "IR-1".to_string(),
            cells: vec![CellValue::Text("IR-1".to_string()), feedback, score],
            content_text: Some("Summary text".to_string()),
        }
    }

    #[test]
    fn csv_escapes_commas_quotes_and_newlines() {
        let rows = vec![
            row(
                CellValue::Text("Good, but \"thin\"\nsecond line".to_string()),
                CellValue::Integer(72),
            ),
            row(CellValue::Empty, CellValue::Empty),
        ];
        assert_eq!(
            render_csv(&schema(), &rows),
            "Ticket Key,Quality Feedback,RCA Quality Score\n\
             IR-1,\"Good, but \"\"thin\"\"\nsecond line\",72\n\
             IR-1,,\n"
        );
    }

    #[test]
    fn plain_cells_are_not_quoted() {
        assert_eq!(escape_csv_cell("plain text"), "plain text");
        assert_eq!(escape_csv_cell("a\rb"), "\"a\rb\"");
    }

    #[test]
    fn json_rows_use_column_names_and_nulls() {
        let rows = vec![row(CellValue::Empty, CellValue::Integer(88))];
        let values = render_json_rows(&schema(), &rows, false);
        assert_eq!(
            values[0],
            serde_json::json!({"ticket_key": "IR-1", "quality_feedback": null, "quality_score": 88})
        );

        let with_content = render_json_rows(&schema(), &rows, true);
        assert_eq!(with_content[0][CONTENT_TEXT_FIELD], "Summary text");
    }

    #[test]
    fn description_column_reaches_json_rows_when_selected() {
        use std::collections::HashMap;

        use chrono::{TimeZone, Utc};

        use crate::model::{Incident, IncidentStatus};
        use crate::report::assemble;

        let incident = Incident {
            key: "IR-360".to_string(),
            title: "App crashing".to_string(),
            priority: None,
            description: "Android app crashes on launch after 5.2 release".to_string(),
            teams: Default::default(),
            created: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            status: IncidentStatus::Resolved,
            comments: Vec::new(),
        };
        let schema = ReportSchema {
            columns: vec![Column::TicketKey, Column::Description],
        };
        let rows = assemble(
            &schema,
            &[incident],
            &HashMap::new(),
            &HashMap::new(),
            &HashMap::new(),
        );

        let values = render_json_rows(&schema, &rows, false);
        assert_eq!(
            values[0],
            serde_json::json!({
                "ticket_key": "IR-360",
                "description": "Android app crashes on launch after 5.2 release"
            })
        );
        assert!(!ReportSchema::default().columns.contains(&Column::Description));
        let parsed: ReportSchema =
            serde_json::from_str(r#"["ticket_key", "description"]"#).expect("schema json");
        assert_eq!(parsed, schema);
    }

    #[test]
    fn writes_files_under_new_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("nested").join("report.csv");
        let json_path = dir.path().join("nested").join("report.json");
        let rows = vec![row(CellValue::Text("ok".to_string()), CellValue::Integer(1))];

        write_csv(&csv_path, &schema(), &rows).expect("write csv");
        write_json_rows(&json_path, &schema(), &rows, true).expect("write json");

        let csv = std::fs::read_to_string(&csv_path).expect("read csv");
        assert!(csv.starts_with("Ticket Key,"));
        let json: Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).expect("read json"))
                .expect("parse json");
        assert_eq!(json.as_array().map(Vec::len), Some(1));
    }
}
