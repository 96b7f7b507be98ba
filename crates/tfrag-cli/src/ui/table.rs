//! Table rendering with comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `tfrag ask` | `render_sources_table()` |
//! | `tfrag health` | `render_collections_table()` |
//! | `tfrag classify` | `render_intent_scores()` |

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ColumnConstraint, Table, Width};
use tfrag_core::health::CollectionHealth;
use tfrag_core::SourceInfo;

use super::format::{format_count, single_line, truncate_str};

/// Page or line reference shown next to a source.
fn source_location(source: &SourceInfo) -> String {
    source
        .metadata
        .get("pages")
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
        .unwrap_or("-")
        .to_string()
}

/// Sources consulted for an answer.
///
/// ```text
/// #  COLLECTION          SCORE  PAGE  SOURCE
/// 1  examples_terraform  0.912  -     modules/storage/main.tf
/// 2  terraform_book      0.801  42    books/terraform_up_and_running.pdf
/// ```
///
/// `preview_width` > 0 adds a PREVIEW column with the first characters of the
/// chunk text.
pub fn render_sources_table(sources: &[SourceInfo], preview_width: usize) -> String {
    if sources.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);

    let mut headers = vec![
        Cell::new("#").set_alignment(CellAlignment::Right),
        Cell::new("COLLECTION"),
        Cell::new("SCORE").set_alignment(CellAlignment::Right),
        Cell::new("PAGE"),
        Cell::new("SOURCE"),
    ];
    if preview_width > 0 {
        headers.push(Cell::new("PREVIEW"));
    }
    table.set_header(headers);

    let mut constraints = vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(2)),
        ColumnConstraint::LowerBoundary(Width::Fixed(12)),
        ColumnConstraint::LowerBoundary(Width::Fixed(6)),
        ColumnConstraint::LowerBoundary(Width::Fixed(4)),
        ColumnConstraint::LowerBoundary(Width::Fixed(10)),
    ];
    if preview_width > 0 {
        constraints.push(ColumnConstraint::UpperBoundary(Width::Fixed(
            preview_width as u16,
        )));
    }
    table.set_constraints(constraints);

    for (i, source) in sources.iter().enumerate() {
        let mut row = vec![
            Cell::new(i + 1).set_alignment(CellAlignment::Right),
            Cell::new(&source.collection),
            Cell::new(format!("{:.3}", source.score)).set_alignment(CellAlignment::Right),
            Cell::new(source_location(source)),
            Cell::new(truncate_str(&source.source, 60)),
        ];
        if preview_width > 0 {
            let preview = source
                .content
                .as_deref()
                .map(|c| truncate_str(&single_line(c), preview_width))
                .unwrap_or_default();
            row.push(Cell::new(preview));
        }
        table.add_row(row);
    }

    table.trim_fmt().to_string()
}

/// Per-collection document counts for `tfrag health`.
///
/// ```text
/// COLLECTION          DOCUMENTS
/// terraform_book          1,204
/// examples_terraform          -
/// ```
pub fn render_collections_table(collections: &[CollectionHealth]) -> String {
    if collections.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("COLLECTION"),
        Cell::new("DOCUMENTS").set_alignment(CellAlignment::Right),
    ]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(18)),
        ColumnConstraint::LowerBoundary(Width::Fixed(9)),
    ]);

    for collection in collections {
        table.add_row(vec![
            Cell::new(&collection.name),
            Cell::new(format_count(collection.documents)).set_alignment(CellAlignment::Right),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Intent scores, highest first; zero scores are left out.
pub fn render_intent_scores(scores: &[(String, f64)]) -> String {
    let mut positive: Vec<&(String, f64)> = scores.iter().filter(|(_, s)| *s > 0.0).collect();
    if positive.is_empty() {
        return String::new();
    }
    positive.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("INTENT"),
        Cell::new("SCORE").set_alignment(CellAlignment::Right),
    ]);

    for (name, score) in positive {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(format!("{:.2}", score)).set_alignment(CellAlignment::Right),
        ]);
    }

    table.trim_fmt().to_string()
}
