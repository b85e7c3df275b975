use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use stemma_data::{CollapseDirective, NodeRecord, Options};
use stemma_engine::Stemma;
use tracing::debug;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Lay out a family tree or org chart and print the result as JSON
///
/// Stands in for an external renderer during development: it loads the
/// records, draws once and dumps either the layout or ranked search hits
/// to stdout.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// JSON file with the node records
    #[arg(long)]
    nodes: PathBuf,

    /// JSON file with the chart options
    #[arg(long)]
    options: Option<PathBuf>,

    /// Print ranked search hits for this query instead of the layout
    #[arg(long)]
    search: Option<String>,

    /// Collapse everything at or beyond this row before drawing
    #[arg(long)]
    collapse_level: Option<u32>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut options: Options = match &args.options {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading options from {}", path.display()))?;
            serde_json::from_str(&text).context("parsing chart options")?
        }
        None => Options::default(),
    };
    if let Some(level) = args.collapse_level {
        options.collapse = Some(CollapseDirective {
            level,
            all_children: true,
        });
    }

    let text = std::fs::read_to_string(&args.nodes)
        .with_context(|| format!("reading records from {}", args.nodes.display()))?;
    let records: Vec<NodeRecord> = serde_json::from_str(&text).context("parsing node records")?;

    let mut chart = Stemma::new(options)?;
    chart.load(records)?;

    if let Some(query) = &args.search {
        let hits = chart.search(query, None, None);
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        let result = chart.draw();
        println!("{}", serde_json::to_string_pretty(&result.layout)?);
    }

    for event in chart.drain_events() {
        debug!(?event, "engine event");
    }
    Ok(())
}
