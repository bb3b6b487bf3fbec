use serde_json::Value;
use std::io;

/// Nested objects that hold a report's headline figures.
const HEADLINE_SECTIONS: [&str; 2] = ["valuation", "structure"];

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());
    for record in csv_records(value) {
        let _ = wtr.write_record(&record);
    }
    let _ = wtr.flush();
}

/// Rows for a command's output: field/value pairs for a single report,
/// one row per ticker for batch output.
fn csv_records(value: &Value) -> Vec<Vec<String>> {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                // Fair-value and capital reports: headline figures only
                let headline = HEADLINE_SECTIONS
                    .iter()
                    .find_map(|section| result.get(*section))
                    .unwrap_or(result);
                match headline {
                    Value::Object(fields) => field_records(fields),
                    other => vec![vec![format_csv_value(other)]],
                }
            } else if let Some(Value::Array(rows)) = map.get("results") {
                array_records(rows)
            } else {
                field_records(map)
            }
        }
        Value::Array(arr) => array_records(arr),
        _ => vec![vec![format_csv_value(value)]],
    }
}

fn field_records(fields: &serde_json::Map<String, Value>) -> Vec<Vec<String>> {
    let mut records = vec![vec!["field".to_string(), "value".to_string()]];
    records.extend(
        fields
            .iter()
            .map(|(key, val)| vec![key.clone(), format_csv_value(val)]),
    );
    records
}

fn array_records(arr: &[Value]) -> Vec<Vec<String>> {
    let Some(Value::Object(first)) = arr.first() else {
        return arr.iter().map(|item| vec![format_csv_value(item)]).collect();
    };

    // Headers from the first row; batch rows all share one shape
    let headers: Vec<String> = first.keys().cloned().collect();
    let mut records = vec![headers.clone()];
    for item in arr {
        if let Value::Object(map) = item {
            records.push(
                headers
                    .iter()
                    .map(|h| map.get(h).map(format_csv_value).unwrap_or_default())
                    .collect(),
            );
        }
    }
    records
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fair_value_report_flattens_to_headline_fields() {
        let output = json!({
            "result": {
                "valuation": {
                    "ticker": "ACME",
                    "regime": "fcff",
                    "fair_value_per_share": "123.45",
                },
                "capital": { "structure": { "wacc": "0.08" } },
                "model": { "model": "fcff" },
            },
            "methodology": "FCFF two-stage",
        });
        let records = csv_records(&output);
        assert_eq!(records[0], vec!["field", "value"]);
        assert!(records.contains(&vec!["fair_value_per_share".into(), "123.45".into()]));
        assert!(records.iter().all(|r| r[0] != "capital" && r[0] != "model"));
    }

    #[test]
    fn test_capital_report_uses_structure() {
        let output = json!({
            "result": {
                "structure": { "wacc": "0.081", "enterprise_value": "1000" },
                "roc": "0.15",
            },
        });
        let records = csv_records(&output);
        assert!(records.contains(&vec!["wacc".into(), "0.081".into()]));
        assert!(records.iter().all(|r| r[0] != "structure"));
    }

    #[test]
    fn test_batch_rows() {
        let output = json!({
            "results": [
                { "ticker": "A", "fair_value_per_share": "10", "error": null },
                { "ticker": "B", "fair_value_per_share": null, "error": "unknown ticker" },
            ],
        });
        let records = csv_records(&output);
        assert_eq!(records.len(), 3);
        let column = |name: &str| records[0].iter().position(|h| h == name).unwrap();
        assert_eq!(records[2][column("ticker")], "B");
        assert_eq!(records[2][column("error")], "unknown ticker");
        assert_eq!(records[2][column("fair_value_per_share")], "");
    }
}
