use std::cmp;
use std::fmt::Write as _;

use anyhow::Result;

use crate::models::{IndexBackendKind, IndexSummary, SearchResult};

const MAX_COLUMN_WIDTH: usize = 40;

/// Render a `SearchResult` in human-readable text form.
///
/// Each hit is one line: `#<id>` followed by its non-empty display
/// values separated by spaces.
pub fn print_text(result: &SearchResult) -> Result<()> {
    print!("{}", render_text(result));
    Ok(())
}

fn render_text(result: &SearchResult) -> String {
    let mut out = String::new();

    if result.hits.is_empty() && result.summary.total_matches == 0 {
        let _ = writeln!(out, "no matching records for {:?}", result.query);
        return out;
    }

    for hit in &result.hits {
        let _ = write!(out, "#{}", hit.id);
        for field in hit.fields.iter().filter(|f| !f.value.is_empty()) {
            let _ = write!(out, " {}", field.value);
        }
        out.push('\n');
    }

    if result.summary.truncated {
        let _ = writeln!(
            out,
            "... {} of {} matches shown",
            result.hits.len(),
            result.summary.total_matches
        );
    }

    out
}

/// Render a `SearchResult` as a simple table.
///
/// Columns are `ID` followed by the display fields of the first hit.
/// Widths are counted in characters and capped at `MAX_COLUMN_WIDTH`.
/// Full-width (CJK) characters occupy two terminal cells, so columns
/// holding Japanese text line up only approximately in a terminal.
pub fn print_table(result: &SearchResult) -> Result<()> {
    print!("{}", render_table(result));
    Ok(())
}

fn render_table(result: &SearchResult) -> String {
    let mut out = String::new();

    let Some(first) = result.hits.first() else {
        return out;
    };

    let mut headers = vec!["ID".to_string()];
    headers.extend(first.fields.iter().map(|f| f.name.clone()));

    let rows: Vec<Vec<String>> = result
        .hits
        .iter()
        .map(|hit| {
            let mut row = vec![hit.id.to_string()];
            row.extend(hit.fields.iter().map(|f| f.value.clone()));
            row
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(col, header)| {
            let max_cell = rows
                .iter()
                .map(|r| r.get(col).map(|c| c.chars().count()).unwrap_or(0))
                .max()
                .unwrap_or(0);
            cmp::min(cmp::max(header.chars().count(), max_cell), MAX_COLUMN_WIDTH)
        })
        .collect();

    write_row(&mut out, &headers, &widths);
    for row in &rows {
        write_row(&mut out, row, &widths);
    }

    out
}

fn write_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line = widths
        .iter()
        .enumerate()
        .map(|(col, &width)| {
            let cell = truncate(cells.get(col).map(String::as_str).unwrap_or(""), width);
            if col == 0 {
                format!("{cell:>width$}")
            } else {
                format!("{cell:<width$}")
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Render an `IndexSummary` in human-readable text form.
pub fn print_index_summary_text(summary: &IndexSummary) -> Result<()> {
    print!("{}", render_index_summary(summary));
    Ok(())
}

fn render_index_summary(summary: &IndexSummary) -> String {
    let backend_str = match summary.backend {
        IndexBackendKind::File => "file",
        IndexBackendKind::Sqlite => "sqlite",
    };

    let mut out = String::new();
    let _ = writeln!(out, "backend      : {backend_str}");
    let _ = writeln!(out, "index_path   : {}", summary.index_path.display());

    if let Some(corpus) = &summary.corpus_path {
        let _ = writeln!(out, "corpus_path  : {corpus}");
    }
    if let Some(schema) = &summary.schema_version {
        let _ = writeln!(out, "schema       : {schema}");
    }
    if let Some(tool) = &summary.tool_version {
        let _ = writeln!(out, "tool_version : {tool}");
    }
    if let Some(created) = &summary.created_at {
        let _ = writeln!(out, "created_at   : {created}");
    }
    if let Some(updated) = &summary.updated_at {
        let _ = writeln!(out, "updated_at   : {updated}");
    }

    let _ = writeln!(out, "ngram_size   : {}", summary.ngram_size);
    let _ = writeln!(out, "documents    : {}", summary.documents_indexed);
    let _ = writeln!(out, "ngrams       : {}", summary.ngrams_indexed);
    let _ = writeln!(out, "postings     : {}", summary.postings);

    out
}

fn truncate(s: &str, max_width: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_width {
        s.to_string()
    } else if max_width <= 1 {
        "…".to_string()
    } else {
        s.chars()
            .take(max_width.saturating_sub(1))
            .collect::<String>()
            + "…"
    }
}
