//! CSV decomposition: one document per data row.

use tracing::{debug, warn};

/// Parse CSV text into records. Quoted fields may contain separators, line
/// breaks and doubled quotes. Rows may have any number of fields. Blank
/// lines are skipped, and a malformed record is logged and dropped.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    reader
        .records()
        .filter_map(|record| match record {
            Ok(record) => Some(record.iter().map(String::from).collect::<Vec<_>>()),
            Err(e) => {
                warn!(error = %e, "Malformed CSV record, skipping");
                None
            }
        })
        .filter(|record| !(record.len() == 1 && record[0].trim().is_empty()))
        .collect()
}

/// Turn a CSV file into row documents.
///
/// With both `question` and `context` columns each row becomes
/// `Question: …\nContext: …`, and rows missing either are skipped.
/// Otherwise each row is rendered as `header: value` lines.
pub fn row_documents(text: &str) -> Vec<String> {
    let mut records = parse_csv(text).into_iter();
    let Some(header) = records.next() else {
        return Vec::new();
    };
    let header: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    let column = |name: &str| header.iter().position(|h| h == name);
    let cell = |row: &[String], idx: usize| {
        row.get(idx).map(|v| v.trim().to_string()).unwrap_or_default()
    };

    match (column("question"), column("context")) {
        (Some(q), Some(c)) => records
            .filter_map(|row| {
                let question = cell(&row, q);
                let context = cell(&row, c);
                if question.is_empty() || context.is_empty() {
                    debug!("CSV row missing question or context, skipping");
                    return None;
                }
                Some(format!("Question: {question}\nContext: {context}"))
            })
            .collect(),
        _ => records
            .map(|row| {
                header
                    .iter()
                    .enumerate()
                    .map(|(i, name)| format!("{name}: {}", cell(&row, i)))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_fields() {
        let records = parse_csv("a,b,c\n\"x, y\",\"say \"\"hi\"\"\",\"multi\nline\"\r\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], vec!["x, y", "say \"hi\"", "multi\nline"]);
    }

    #[test]
    fn skips_blank_lines_and_handles_missing_final_newline() {
        let records = parse_csv("h1,h2\n\n1,2\n\n3,4");
        assert_eq!(records, vec![vec!["h1", "h2"], vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn empty_trailing_field_is_kept() {
        assert_eq!(parse_csv("a,b\n1,\n"), vec![vec!["a", "b"], vec!["1", ""]]);
    }

    #[test]
    fn question_context_rows() {
        let docs = row_documents(concat!(
            "id,question,context\n",
            "1,What is X?,X is a thing\n",
            "2,,no question\n",
            "3,Why?,\"Because, reasons\"\n",
        ));
        assert_eq!(
            docs,
            vec![
                "Question: What is X?\nContext: X is a thing".to_string(),
                "Question: Why?\nContext: Because, reasons".to_string(),
            ]
        );
    }

    #[test]
    fn generic_rows_use_header_value_lines() {
        let docs = row_documents("name,role\nAda,engineer\nGrace\n");
        assert_eq!(
            docs,
            vec!["name: Ada\nrole: engineer".to_string(), "name: Grace\nrole: ".to_string()]
        );
    }

    #[test]
    fn byte_order_mark_and_whitespace_lines_are_ignored() {
        let records = parse_csv("\u{feff}question,context\n   \nQ,C\n");
        assert_eq!(records, vec![vec!["question", "context"], vec!["Q", "C"]]);
    }

    #[test]
    fn header_only_has_no_documents() {
        assert!(row_documents("question,context\n").is_empty());
        assert!(row_documents("").is_empty());
    }
}
