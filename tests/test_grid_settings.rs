mod common;

use std::time::Duration;

use common::{rows, ScriptedService};
use jsonl_viewer::config::Config;
use jsonl_viewer::services::{GridOrchestrator, GridSettings};

#[test]
fn test_settings_follow_config() {
    let mut config = Config::default();
    config.grid.page_size = 25;
    config.grid.min_column_width = 60;
    config.grid.max_column_width = 400;
    config.grid.default_column_width = 120;
    config.analysis.poll_interval_ms = 500;
    config.search.result_limit = 10;

    let settings = GridSettings::from(&config);
    assert_eq!(settings.page_size, 25);
    assert_eq!(settings.width_bounds.clamp(1000), 400);
    assert_eq!(settings.width_bounds.clamp(1), 60);
    assert_eq!(settings.default_width, 120);
    assert_eq!(settings.poll_interval, Duration::from_millis(500));
    assert_eq!(settings.search_limit, 10);
}

#[tokio::test]
async fn test_grid_uses_configured_sizes() {
    let mut config = Config::default();
    config.grid.page_size = 25;
    config.grid.default_column_width = 120;
    config.search.result_limit = 3;

    let (service, info) = ScriptedService::with_rows(rows(60, |i| format!("row {}", i))).await;
    let mut grid = GridOrchestrator::new(service.clone(), GridSettings::from(&config));
    grid.open_dataset(info).await;

    assert_eq!(service.last_request().unwrap().page_size, 25);
    assert_eq!(grid.pagination().total_pages(), 3);
    assert_eq!(grid.layout().width("text"), 120);

    grid.global_search("row").await;
    assert_eq!(service.searches()[0].limit, Some(3));
    assert_eq!(grid.search_overlay().match_count(), 3);
}
