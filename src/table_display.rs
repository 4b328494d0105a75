use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use crossterm::style::Stylize;
use serde_json::Value;

use jsonl_viewer::api::models::{AnalysisTask, ColumnAnalysis, DatasetOverview};
use jsonl_viewer::data::cell_value::CellValue;
use jsonl_viewer::services::GridOrchestrator;

/// Print the current page, marking rows that match the global search
pub fn display_page(grid: &GridOrchestrator) {
    if let Some(error) = grid.error() {
        eprintln!("{}", format!("Error: {}", error).red());
    }
    if let Some(error) = grid.search_error() {
        eprintln!("{}", format!("Search error: {}", error).red());
    }

    let rows = grid.rows();
    if rows.is_empty() {
        println!("{}", "No results found.".yellow());
        return;
    }

    let columns = grid.visible_columns();
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut headers = vec![Cell::new("#").add_attribute(Attribute::Bold)];
    headers.extend(columns.iter().map(|name| {
        let label = match grid.sort() {
            Some(rule) if &rule.column == name => format!("{} ({:?})", name, rule.order),
            _ => name.clone(),
        };
        Cell::new(label).add_attribute(Attribute::Bold)
    }));
    table.set_header(headers);

    let (start, _) = grid.pagination().page_range();
    for (local, row) in rows.iter().enumerate() {
        let highlighted = grid.search_overlay().is_highlighted(local);
        let marker = if highlighted {
            format!("*{}", start + local)
        } else {
            (start + local).to_string()
        };

        let mut cells = vec![Cell::new(marker)];
        cells.extend(columns.iter().map(|name| {
            let cell = Cell::new(CellValue::from_row(row, name).display());
            if highlighted {
                cell.fg(Color::Yellow)
            } else {
                cell
            }
        }));
        table.add_row(cells);
    }

    println!("{table}");

    let pagination = grid.pagination();
    println!(
        "\n{}",
        format!(
            "Page {} of {} ({} records, {} per page)",
            pagination.page(),
            pagination.total_pages(),
            pagination.total_records(),
            pagination.page_size()
        )
        .green()
    );
    if let Some(result) = grid.search_overlay().result() {
        println!(
            "{}",
            format!(
                "'{}': {} matches, {} on this page",
                result.query,
                result.total_matches,
                grid.highlighted_rows().len()
            )
            .cyan()
        );
    }
}

/// Print the dataset schema
pub fn display_overview(overview: &DatasetOverview) {
    let quality = &overview.data_quality;
    println!(
        "{} records, {} columns, {} bytes",
        overview.basic_info.total_records,
        overview.basic_info.total_columns,
        overview.basic_info.file_size
    );
    println!(
        "{}",
        format!(
            "Completeness {:.1}%, {} empty rows, {} empty columns",
            quality.completeness_score * 100.0,
            quality.empty_rows,
            quality.empty_columns
        )
        .cyan()
    );

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Column").add_attribute(Attribute::Bold),
        Cell::new("Type").add_attribute(Attribute::Bold),
        Cell::new("Nulls").add_attribute(Attribute::Bold),
        Cell::new("Unique").add_attribute(Attribute::Bold),
        Cell::new("Top values").add_attribute(Attribute::Bold),
    ]);
    for column in &overview.column_stats {
        let top: Vec<String> = column
            .top_values
            .iter()
            .map(|v| format!("{} ({})", v.value, v.count))
            .collect();
        let nulls = Cell::new(format!("{} ({:.1}%)", column.null_count, column.null_ratio * 100.0));
        table.add_row(vec![
            Cell::new(&column.name),
            Cell::new(&column.data_type),
            if column.null_count > 0 {
                nulls.fg(Color::Yellow)
            } else {
                nulls
            },
            Cell::new(column.unique_count),
            Cell::new(top.join(", ")),
        ]);
    }
    println!("{table}");
}

pub fn display_schema(grid: &GridOrchestrator) {
    let Some(dataset) = grid.dataset() else {
        return;
    };

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Column").add_attribute(Attribute::Bold),
        Cell::new("Type").add_attribute(Attribute::Bold),
        Cell::new("Nullable").add_attribute(Attribute::Bold),
        Cell::new("Width").add_attribute(Attribute::Bold),
        Cell::new("Samples").add_attribute(Attribute::Bold),
    ]);
    for column in &dataset.columns {
        let samples: Vec<String> = column
            .sample_values
            .iter()
            .map(|v| CellValue::from(v).display())
            .collect();
        table.add_row(vec![
            Cell::new(&column.name),
            Cell::new(column.data_type.as_str()),
            Cell::new(column.nullable),
            Cell::new(grid.layout().width(&column.name)),
            Cell::new(samples.join(", ")),
        ]);
    }
    println!("{} ({} records)", dataset.filename.clone().bold(), dataset.total_records);
    println!("{table}");
}

pub fn display_tasks(tasks: &[AnalysisTask]) {
    for task in tasks {
        println!(
            "{}",
            format!("{} [{:?}] {:.0}%", task.name, task.status, task.progress).cyan()
        );
    }
}

/// Print an analysis result, typed when it has the usual shape
pub fn display_analysis(column: &str, result: &Value) {
    let Some(analysis) = ColumnAnalysis::from_value(result) else {
        println!("{}", format!("Analysis of '{}':", column).bold());
        println!(
            "{}",
            serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
        );
        return;
    };

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Metric").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![Cell::new("Type"), Cell::new(&analysis.data_type)]);
    table.add_row(vec![Cell::new("Records"), Cell::new(analysis.total_records)]);
    table.add_row(vec![
        Cell::new("Nulls"),
        Cell::new(format!(
            "{} ({:.1}%)",
            analysis.null_count, analysis.null_percentage
        )),
    ]);
    table.add_row(vec![
        Cell::new("Unique"),
        Cell::new(format!(
            "{} ({:.1}%)",
            analysis.unique_count, analysis.unique_percentage
        )),
    ]);
    if let Some(stats) = &analysis.numeric_stats {
        table.add_row(vec![
            Cell::new("Range"),
            Cell::new(format!("{} .. {}", stats.min, stats.max)),
        ]);
        table.add_row(vec![
            Cell::new("Mean / median"),
            Cell::new(format!("{:.3} / {:.3}", stats.mean, stats.median)),
        ]);
        table.add_row(vec![
            Cell::new("Std dev"),
            Cell::new(format!("{:.3}", stats.std_dev)),
        ]);
    }
    if let Some(stats) = &analysis.length_stats {
        table.add_row(vec![
            Cell::new("Length"),
            Cell::new(format!(
                "{} .. {} (mean {:.1})",
                stats.min, stats.max, stats.mean
            )),
        ]);
    }
    for (value, count) in analysis.most_common_values.iter().take(5) {
        table.add_row(vec![
            Cell::new(format!("  {}", value)),
            Cell::new(count),
        ]);
    }

    println!("{}", format!("Analysis of '{}'", column).bold());
    println!("{table}");
}
