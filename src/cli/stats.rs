use anyhow::Result;

use super::format_bytes;
use vigil::config::VigilConfig;
use vigil::index::persist;

/// Display statistics for the on-disk vector index.
pub fn stats(config: &VigilConfig) -> Result<()> {
    let paths = config.index_paths();
    let info = persist::inspect(&paths, config.index.dimension);

    println!("Index Statistics");
    println!("{}", "=".repeat(40));
    println!("  Index file:          {}", paths.index.display());
    println!("  Text sidecar:        {}", paths.texts.display());

    if !info.index_exists {
        println!();
        println!("No index saved yet. Run `vigil serve` and process some events.");
        return Ok(());
    }

    let show = |v: Option<usize>| v.map_or_else(|| "unknown".to_string(), |n| n.to_string());
    println!("  Vectors:             {}", show(info.vector_count));
    println!("  Texts:               {}", show(info.text_count));
    println!("  Dimension:           {}", show(info.dimension));
    println!("  Index size:          {}", format_bytes(info.index_bytes));
    println!("  Sidecar size:        {}", format_bytes(info.texts_bytes));

    Ok(())
}
