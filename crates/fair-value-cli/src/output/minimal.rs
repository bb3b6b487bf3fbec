use serde_json::Value;

/// Print just the key answer value from the output.
///
/// Heuristic: look for well-known result fields in order of priority,
/// then fall back to the first field in the result object.
pub fn print_minimal(value: &Value) {
    // Try to extract the "result" envelope
    let mut result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    // Fair-value and capital reports nest the headline figures one level down
    for nested in ["valuation", "structure"] {
        if let Some(inner) = result_obj.get(nested) {
            result_obj = inner;
            break;
        }
    }

    // Batch output: one line per ticker
    if let Some(Value::Array(rows)) = value.get("results") {
        for row in rows {
            let ticker = row.get("ticker").map(format_minimal).unwrap_or_default();
            let answer = row
                .get("fair_value_per_share")
                .filter(|v| !v.is_null())
                .or_else(|| row.get("error"))
                .map(format_minimal)
                .unwrap_or_default();
            println!("{}\t{}", ticker, answer);
        }
        return;
    }

    // Priority list of key output fields
    let priority_keys = [
        "fair_value_per_share",
        "implied_growth_rate",
        "regime",
        "wacc",
    ];

    if let Value::Object(map) = result_obj {
        // Try priority keys first (skip null values)
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }

        // Fall back to first field
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    // Not an object, just print directly
    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
