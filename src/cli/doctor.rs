//! CLI `doctor` command: check the index files and policy configuration.

use anyhow::Result;

use super::format_bytes;
use vigil::config::VigilConfig;
use vigil::index::persist;
use vigil::policy::load_policies;

/// Run diagnostics and print a health report.
pub fn doctor(config: &VigilConfig) -> Result<()> {
    let paths = config.index_paths();
    let info = persist::inspect(&paths, config.index.dimension);

    println!("Vigil Health Report");
    println!("===================");
    println!();
    println!("Data dir:          {}", config.resolved_data_dir().display());
    println!("Index file:        {}", paths.index.display());
    if info.index_exists {
        println!("  Size:            {}", format_bytes(info.index_bytes));
    } else {
        println!("  (not created yet)");
    }
    println!("Text sidecar:      {}", paths.texts.display());
    if info.texts_exists {
        println!("  Size:            {}", format_bytes(info.texts_bytes));
    }
    println!("Dimension:         {} configured", config.index.dimension);
    println!();

    let mut healthy = info.is_consistent();
    if healthy {
        println!("Index check:       PASSED");
    } else {
        println!("Index check:       FAILED");
        for problem in &info.problems {
            println!("  - {problem}");
        }
    }

    match config.resolved_policies_file() {
        None => println!("Policies:          built-in defaults"),
        Some(path) => match load_policies(&path) {
            Ok(policies) => println!(
                "Policies:          {} loaded from {}",
                policies.len(),
                path.display()
            ),
            Err(e) => {
                healthy = false;
                println!("Policies:          FAILED ({})", path.display());
                println!("  - {e}");
            }
        },
    }

    if !healthy {
        println!();
        println!("Recovery steps:");
        println!("  1. Restore both files from a backup taken at the same time.");
        println!("  2. Or delete both files; the index is rebuilt as new events arrive.");
        println!("  3. Fix the policy file, or unset policy.policies_file to use defaults.");
    }

    Ok(())
}
