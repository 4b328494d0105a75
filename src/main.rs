use anyhow::{anyhow, bail, Context, Result};
use crossterm::style::Stylize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use jsonl_viewer::api::client::ApiClient;
use jsonl_viewer::api::models::{
    DatasetInfo, ExportFormat, FilterOperator, FilterRule, SortOrder,
};
use jsonl_viewer::api::service::DataService;
use jsonl_viewer::config::Config;
use jsonl_viewer::data::jsonl_datasource::LocalDataService;
use jsonl_viewer::services::task_poller::TaskOutcome;
use jsonl_viewer::services::{ExportService, GridOrchestrator, GridSettings, Submission};
use jsonl_viewer::utils::app_paths::AppPaths;
use jsonl_viewer::utils::logging::init_tracing;

mod table_display;

use table_display::{
    display_analysis, display_overview, display_page, display_schema, display_tasks,
};

#[derive(Debug, Default, PartialEq)]
struct Options {
    file: Option<String>,
    server: Option<String>,
    dataset: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
    sort: Option<(String, SortOrder)>,
    filters: Vec<FilterRule>,
    column_searches: Vec<(String, String)>,
    global: Option<String>,
    columns: Option<Vec<String>>,
    fit: bool,
    schema: bool,
    overview: bool,
    analyze: Vec<String>,
    export: Option<(ExportFormat, Option<PathBuf>)>,
    stats: bool,
}

fn print_help() {
    println!("{}", "JSONL Viewer - page through large JSONL datasets".blue().bold());
    println!();
    println!("{}", "Usage:".yellow());
    println!("  jsonl-viewer [OPTIONS] [FILE.jsonl]");
    println!();
    println!("{}", "Source:".yellow());
    println!("  {}            - Open a local file in memory", "FILE.jsonl".green());
    println!(
        "  {}     - Use a data service (FILE is loaded by the service)",
        "--server URL".green()
    );
    println!("  {}     - Open a dataset the service already holds", "--dataset ID".green());
    println!();
    println!("{}", "Query:".yellow());
    println!("  {}            - Page to show", "--page N".green());
    println!("  {}       - Rows per page", "--page-size N".green());
    println!("  {} - Sort by a column", "--sort COL[:asc|desc]".green());
    println!(
        "  {} - Add a filter (repeatable), e.g. score:greater_than:5",
        "--filter COL:OP[:VALUE]".green()
    );
    println!("  {}  - Substring search in one column", "--search COL=TEXT".green());
    println!("  {}     - Highlight matches in any column", "--global TEXT".green());
    println!();
    println!("{}", "Layout:".yellow());
    println!("  {}   - Visible columns, in order", "--columns a,b,c".green());
    println!("  {}               - Size columns to the page", "--fit".green());
    println!("  {}            - Show the dataset schema", "--schema".green());
    println!("  {}          - Show null/unique counts for the whole dataset", "--overview".green());
    println!();
    println!("{}", "Analysis and export:".yellow());
    println!("  {}       - Analyze a column (repeatable)", "--analyze COL".green());
    println!(
        "  {} - Export the current query (json, jsonl, csv, excel)",
        "--export FORMAT[:PATH]".green()
    );
    println!("  {}             - Include statistics in the export", "--stats".green());
    println!();
    println!("{}", "Configuration:".yellow());
    println!("  {}       - Write a default config file", "--init-config".green());
    println!("  {}   - Print a commented config file", "--generate-config".green());
    println!();
}

fn next_value<'a>(args: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<&'a String> {
    args.next()
        .ok_or_else(|| anyhow!("{} requires a value", flag))
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--server" => options.server = Some(next_value(&mut iter, arg)?.clone()),
            "--dataset" => options.dataset = Some(next_value(&mut iter, arg)?.clone()),
            "--page" => options.page = Some(parse_number(next_value(&mut iter, arg)?, arg)?),
            "--page-size" => {
                options.page_size = Some(parse_number(next_value(&mut iter, arg)?, arg)?)
            }
            "--sort" => options.sort = Some(parse_sort(next_value(&mut iter, arg)?)?),
            "--filter" => options.filters.push(parse_filter(next_value(&mut iter, arg)?)?),
            "--search" => {
                let value = next_value(&mut iter, arg)?;
                let (column, text) = value
                    .split_once('=')
                    .ok_or_else(|| anyhow!("--search expects COL=TEXT, got '{}'", value))?;
                options
                    .column_searches
                    .push((column.to_string(), text.to_string()));
            }
            "--global" => options.global = Some(next_value(&mut iter, arg)?.clone()),
            "--columns" => {
                let names = next_value(&mut iter, arg)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                options.columns = Some(names);
            }
            "--fit" => options.fit = true,
            "--schema" => options.schema = true,
            "--overview" => options.overview = true,
            "--analyze" => options.analyze.push(next_value(&mut iter, arg)?.clone()),
            "--export" => options.export = Some(parse_export(next_value(&mut iter, arg)?)?),
            "--stats" => options.stats = true,
            other if other.starts_with("--") => bail!("Unknown option '{}'", other),
            file => options.file = Some(file.to_string()),
        }
    }

    Ok(options)
}

fn parse_number(value: &str, flag: &str) -> Result<usize> {
    value
        .parse()
        .with_context(|| format!("{} expects a number, got '{}'", flag, value))
}

fn parse_sort(value: &str) -> Result<(String, SortOrder)> {
    let (column, order) = match value.rsplit_once(':') {
        Some((column, "asc")) => (column, SortOrder::Asc),
        Some((column, "desc")) => (column, SortOrder::Desc),
        _ => (value, SortOrder::Asc),
    };
    if column.is_empty() {
        bail!("--sort expects COL[:asc|desc]");
    }
    Ok((column.to_string(), order))
}

/// `COL:OP[:VALUE]`. Values are read as JSON when they parse, text otherwise;
/// `in`/`not_in` split on commas.
fn parse_filter(value: &str) -> Result<FilterRule> {
    let mut parts = value.splitn(3, ':');
    let column = parts.next().unwrap_or_default();
    let op = parts
        .next()
        .ok_or_else(|| anyhow!("--filter expects COL:OP[:VALUE], got '{}'", value))?;
    let operator = FilterOperator::parse(op).ok_or_else(|| {
        let known: Vec<&str> = FilterOperator::ALL.iter().map(|o| o.as_str()).collect();
        anyhow!("Unknown operator '{}' (expected one of {})", op, known.join(", "))
    })?;
    if column.is_empty() {
        bail!("--filter needs a column name");
    }

    let raw = parts.next();
    let value = match (operator, raw) {
        (op, _) if !op.requires_value() => None,
        (_, None) => bail!("Operator '{}' needs a value", operator),
        (FilterOperator::In | FilterOperator::NotIn, Some(raw)) => Some(Value::Array(
            raw.split(',').map(|item| literal(item.trim())).collect(),
        )),
        (FilterOperator::Regex, Some(raw)) => Some(Value::String(raw.to_string())),
        (_, Some(raw)) => Some(literal(raw)),
    };
    Ok(FilterRule::new(column, operator, value))
}

fn literal(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => value,
        _ => Value::String(raw.to_string()),
    }
}

fn parse_export(value: &str) -> Result<(ExportFormat, Option<PathBuf>)> {
    let (format, path) = match value.split_once(':') {
        Some((format, path)) => (format, Some(PathBuf::from(path))),
        None => (value, None),
    };
    let format = ExportFormat::parse(format)
        .ok_or_else(|| anyhow!("Unknown export format '{}'", format))?;
    Ok((format, path))
}

/// Pick the data service. A local file is loaded up front and its metadata returned.
async fn connect(
    options: &Options,
    config: &Config,
) -> Result<(Arc<dyn DataService>, Option<DatasetInfo>)> {
    if options.server.is_none() && options.dataset.is_none() {
        let Some(file) = &options.file else {
            bail!("No input given. Pass a FILE.jsonl or --dataset ID (see --help)");
        };
        let local = LocalDataService::new();
        let info = local.open(file).await?;
        return Ok((Arc::new(local), Some(info)));
    }

    let url = options
        .server
        .as_deref()
        .unwrap_or(&config.service.base_url);
    let client = ApiClient::with_timeout(
        url,
        Duration::from_secs(config.service.request_timeout_secs),
    );
    Ok((Arc::new(client), None))
}

async fn open_source(
    grid: &mut GridOrchestrator,
    options: &Options,
    local: Option<DatasetInfo>,
) -> Result<()> {
    if let Some(info) = local {
        grid.open_dataset(info).await;
        return Ok(());
    }

    if let Some(id) = &options.dataset {
        return grid
            .open_dataset_by_id(id)
            .await
            .with_context(|| format!("Failed to open dataset {}", id));
    }

    let Some(file) = &options.file else {
        bail!("No input given. Pass a FILE.jsonl or --dataset ID (see --help)");
    };
    grid.load_path(file)
        .await
        .with_context(|| format!("Service failed to load {}", file))
}

async fn apply_query(grid: &mut GridOrchestrator, options: &Options) {
    if let Some(size) = options.page_size {
        grid.set_page_size(size).await;
    }
    if let Some((column, order)) = &options.sort {
        grid.set_sort(column, *order).await;
    }
    for rule in &options.filters {
        grid.set_filter(rule.clone()).await;
    }
    for (column, text) in &options.column_searches {
        grid.set_column_search(column, text).await;
    }
    if let Some(page) = options.page {
        if !grid.go_to_page(page).await {
            warn!("Page {} is out of range", page);
        }
    }
    if let Some(query) = &options.global {
        grid.global_search(query).await;
    }

    if let Some(columns) = &options.columns {
        grid.set_column_order(columns.clone());
        grid.set_visible_columns(columns.clone());
    }
    if options.fit {
        grid.fit_columns_to_content();
    }
}

async fn run_analysis(grid: &mut GridOrchestrator, columns: &[String]) {
    for column in columns {
        match grid.analyze_column(column).await {
            Ok(Submission::Completed { column }) => info!("Analysis of '{}' returned inline", column),
            Ok(Submission::Started { task_id, column }) => {
                println!("{}", format!("Analyzing '{}' (task {})", column, task_id).cyan())
            }
            Err(err) => eprintln!("{}", format!("Analysis of '{}' failed: {}", column, err).red()),
        }
    }

    while let Some(outcome) = grid.next_analysis_update().await {
        match outcome {
            TaskOutcome::Progress { .. } => display_tasks(grid.active_tasks()),
            TaskOutcome::Failed { column, error, .. } => {
                eprintln!("{}", format!("Analysis of '{}' failed: {}", column, error).red())
            }
            _ => {}
        }
    }

    for column in columns {
        if let Some(result) = grid.analyses().analysis(column) {
            display_analysis(column, result);
        } else if let Some(error) = grid.analyses().error(column) {
            eprintln!("{}", format!("{}: {}", column, error).red());
        }
    }
}

async fn run_export(
    grid: &GridOrchestrator,
    format: ExportFormat,
    path: Option<&Path>,
    include_stats: bool,
    config: &Config,
) -> Result<PathBuf> {
    match path {
        Some(path) => {
            let bytes = grid.export(format, include_stats).await?;
            ExportService::write_to(path, &bytes)?;
            Ok(path.to_path_buf())
        }
        None => {
            let dir = match &config.export.output_dir {
                Some(dir) => dir.clone(),
                None => AppPaths::export_dir()?,
            };
            ExportService::new(dir)
                .export_grid(grid, format, include_stats)
                .await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    if args.contains(&"--init-config".to_string()) {
        let path = Config::get_config_path()?;
        Config::default().save_to(&path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    if args.contains(&"--generate-config".to_string()) {
        println!("{}", Config::create_default_with_comments());
        return Ok(());
    }

    let log_dir = AppPaths::log_dir().ok();
    let (_log_buffer, log_file) = init_tracing(log_dir.as_deref());
    if let Some(path) = &log_file {
        info!("Logging to {}", path.display());
    }

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });
    let options = parse_args(&args)?;

    let (service, local) = connect(&options, &config).await?;
    let mut grid = GridOrchestrator::new(service, GridSettings::from(&config));
    open_source(&mut grid, &options, local).await?;
    apply_query(&mut grid, &options).await;

    if options.schema {
        display_schema(&grid);
    }
    if options.overview {
        match grid.dataset_overview().await {
            Ok(overview) => display_overview(&overview),
            Err(e) => eprintln!("{}", format!("Overview failed: {}", e).red()),
        }
    }
    display_page(&grid);

    if !options.analyze.is_empty() {
        run_analysis(&mut grid, &options.analyze).await;
    }

    if let Some((format, path)) = &options.export {
        let include_stats = options.stats || config.export.include_stats;
        let written = run_export(&grid, *format, path.as_deref(), include_stats, &config).await?;
        println!("{}", format!("Exported to {}", written.display()).green());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_sort() {
        assert_eq!(parse_sort("name").unwrap(), ("name".to_string(), SortOrder::Asc));
        assert_eq!(
            parse_sort("score:desc").unwrap(),
            ("score".to_string(), SortOrder::Desc)
        );
        // A colon that isn't an order stays in the column name
        assert_eq!(
            parse_sort("a:b").unwrap(),
            ("a:b".to_string(), SortOrder::Asc)
        );
    }

    #[test]
    fn test_parse_filter_values() {
        let rule = parse_filter("score:greater_than:5").unwrap();
        assert_eq!(rule.operator, FilterOperator::GreaterThan);
        assert_eq!(rule.value, Some(serde_json::json!(5)));

        let rule = parse_filter("name:equals:alpha").unwrap();
        assert_eq!(rule.value, Some(Value::String("alpha".into())));

        let rule = parse_filter("name:in:a, b,3").unwrap();
        assert_eq!(rule.value, Some(serde_json::json!(["a", "b", 3])));

        let rule = parse_filter("score:is_null").unwrap();
        assert_eq!(rule.value, None);

        let rule = parse_filter("url:contains:http://x").unwrap();
        assert_eq!(rule.value, Some(Value::String("http://x".into())));
    }

    #[test]
    fn test_parse_filter_errors() {
        assert!(parse_filter("score").is_err());
        assert!(parse_filter("score:bogus:1").is_err());
        assert!(parse_filter("score:equals").is_err());
        assert!(parse_filter(":equals:1").is_err());
    }

    #[test]
    fn test_parse_args() {
        let options = parse_args(&args(&[
            "data.jsonl",
            "--page-size",
            "25",
            "--filter",
            "level:equals:error",
            "--search",
            "msg=timeout",
            "--columns",
            "ts, level,msg",
            "--export",
            "csv:out/result.csv",
            "--overview",
        ]))
        .unwrap();

        assert_eq!(options.file.as_deref(), Some("data.jsonl"));
        assert!(options.overview);
        assert_eq!(options.page_size, Some(25));
        assert_eq!(options.filters.len(), 1);
        assert_eq!(
            options.column_searches,
            vec![("msg".to_string(), "timeout".to_string())]
        );
        assert_eq!(
            options.columns,
            Some(vec!["ts".to_string(), "level".to_string(), "msg".to_string()])
        );
        assert_eq!(
            options.export,
            Some((ExportFormat::Csv, Some(PathBuf::from("out/result.csv"))))
        );
    }

    #[test]
    fn test_parse_args_rejects_unknown_and_missing() {
        assert!(parse_args(&args(&["--bogus"])).is_err());
        assert!(parse_args(&args(&["--page"])).is_err());
        assert!(parse_args(&args(&["--page", "x"])).is_err());
    }
}
