//! Main application entry point

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use eo_core::domain::parse_instant;
use eo_core::time_distribution::{find_nearest_item, NearestItemSource};
use eo_core::{DatasetViz, DimensionsSnapshot, VizRegistry};
use eo_data::{DatasetFile, LoadedDataset};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::{parse_assignment, parse_range, parse_toi, parse_value, Args};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing, stdout is reserved for the JSON output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    let output = runtime.block_on(run(args))?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(args: Args) -> Result<Value> {
    let file = DatasetFile::load(&args.config)?;
    let base_dir = args.config.parent().unwrap_or_else(|| Path::new("."));
    let loaded = file.build(base_dir)?;
    info!("Loaded dataset '{}' from {}", file.id, args.config.display());

    let dataset = loaded.dataset();
    if let Some(toi) = &args.toi {
        dataset.set_toi(Some(parse_toi(toi)?), true);
    }
    for filter in &args.filters {
        let (key, value) = parse_assignment(filter)?;
        let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
        dataset.set_additional_filter(key, Some(value));
    }

    if let Some(nearest) = &args.nearest {
        return nearest_item(&loaded, nearest).await;
    }

    let registry = VizRegistry::new();
    let init = args.init.unwrap_or(loaded.init_dimensions);
    let viz = Arc::new(DatasetViz::new(dataset.clone(), init, tokio::runtime::Handle::current()));
    registry.register(&viz);
    let timeout = Duration::from_secs(args.timeout_secs);

    settle(&viz, timeout).await?;

    if let Some(path) = &args.restore {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: DimensionsSnapshot = serde_json::from_str(&content)?;
        viz.dimensions().apply_snapshot(&snapshot)?;
        info!("Restored snapshot {}", path.display());
    }

    let dimensions = viz.dimensions();
    for value in &args.values {
        let (id, value) = parse_assignment(value)?;
        dimensions.set_value(&id, parse_value(&id, &value)?);
    }
    for range in &args.ranges {
        let (id, range) = parse_assignment(range)?;
        dimensions.set_range(&id, parse_range(&id, &range)?);
    }

    settle(&viz, timeout).await?;

    let output = if args.snapshot {
        serde_json::to_value(dimensions.get_snapshot())?
    } else {
        state_json(&viz)?
    };

    viz.dispose();
    dataset.dispose();
    Ok(output)
}

async fn settle(viz: &DatasetViz, timeout: Duration) -> Result<()> {
    tokio::time::timeout(timeout, viz.dimensions().settled())
        .await
        .with_context(|| format!("Domain resolution did not finish within {:?}", timeout))
}

fn state_json(viz: &DatasetViz) -> Result<Value> {
    let dimensions = viz.dimensions();
    let values: BTreeMap<_, _> = dimensions.values().into_iter().collect();
    let ranges: BTreeMap<_, _> = dimensions.ranges().into_iter().collect();
    let domains: BTreeMap<_, _> = dimensions.domains().into_iter().collect();

    Ok(json!({
        "dataset": viz.dataset().id(),
        "filters": viz.dataset().filters(),
        "values": values,
        "ranges": ranges,
        "domains": domains,
    }))
}

async fn nearest_item(loaded: &LoadedDataset, instant: &str) -> Result<Value> {
    let instant = parse_instant(instant)?;
    let Some(catalogue) = &loaded.catalogue else {
        warn!("Dataset '{}' has no catalogue", loaded.config.id);
        return Ok(Value::Null);
    };

    let sources = [NearestItemSource {
        dataset_id: loaded.config.id.clone(),
        provider: catalogue.clone(),
    }];
    let nearest = find_nearest_item(&sources, instant, None).await;
    Ok(match nearest {
        Some(nearest) => json!({ "dataset": nearest.dataset_id, "item": nearest.item }),
        None => Value::Null,
    })
}
