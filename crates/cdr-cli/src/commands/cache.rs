//! `cdr cache-columns` - staging whitelist cache maintenance

use anyhow::{bail, Result};
use cdr_pipeline::whitelist::{ColumnCache, WhitelistResolver};

pub async fn run(only: Option<String>, clear: bool, show: bool) -> Result<()> {
    let config = super::load_config()?;
    let pool = super::connect_pool().await?;

    let cache = ColumnCache::new(config.cache_path.clone());
    cache.init()?;
    let resolver = WhitelistResolver::new(pool, config.whitelist_mode, cache);

    let sources: Vec<_> = match &only {
        Some(name) => match config.source(name) {
            Some(source) => vec![source],
            None => bail!("Unknown source category: {}", name),
        },
        None => config.sources.iter().collect(),
    };

    for source in sources {
        if clear {
            resolver.forget(source)?;
            println!("{}: cache cleared", source.name);
            continue;
        }

        if show {
            match resolver.cached(source)? {
                Some(columns) => print_columns(source, &columns),
                None => println!("{}: no cached whitelist", source.name),
            }
            continue;
        }

        let columns = resolver.refresh(source).await?;
        print_columns(source, &columns);
    }

    Ok(())
}

fn print_columns(source: &cdr_pipeline::config::SourceConfig, columns: &[String]) {
    println!(
        "{} ({}): {} columns",
        source.name,
        source.staging_table,
        columns.len()
    );
    for column in columns {
        println!("  {}", column);
    }
}
