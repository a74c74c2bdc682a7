//! Notebook support: a `.ipynb` file is JSON; only its code cells are
//! fed to the syntactic analyzer.

use serde_json::Value;

/// Extract and concatenate all code cells, blank-line separated.
/// Returns `None` when the document is not notebook-shaped.
pub fn extract_code_cells(raw: &str) -> Option<String> {
    let doc: Value = serde_json::from_str(raw).ok()?;
    let cells = doc.get("cells")?.as_array()?;

    let mut sources = Vec::new();
    for cell in cells {
        if cell.get("cell_type").and_then(Value::as_str) != Some("code") {
            continue;
        }
        let Some(source) = cell.get("source") else {
            continue;
        };
        // Notebook sources are either a string or a list of lines.
        let text = match source {
            Value::String(s) => s.clone(),
            Value::Array(lines) => lines
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .concat(),
            _ => continue,
        };
        sources.push(text);
    }

    Some(sources.join("\n\n"))
}
