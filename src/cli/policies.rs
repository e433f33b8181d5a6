use anyhow::{Context, Result};

use vigil::config::VigilConfig;
use vigil::policy::{default_policies, load_policies};

/// Print the healing policies in effect, in evaluation order.
pub fn policies(config: &VigilConfig) -> Result<()> {
    let (policies, source) = match config.resolved_policies_file() {
        Some(path) => (
            load_policies(&path)
                .with_context(|| format!("failed to load policies from {}", path.display()))?,
            path.display().to_string(),
        ),
        None => (default_policies(), "built-in defaults".to_string()),
    };

    println!("Healing Policies ({source})");
    println!("{}", "=".repeat(40));
    for policy in &policies {
        let state = if policy.enabled { "" } else { " [disabled]" };
        println!("{} (priority {}){state}", policy.name, policy.priority);

        let when: Vec<String> = policy.conditions.iter().map(ToString::to_string).collect();
        if when.is_empty() {
            println!("  when:      always");
        } else {
            println!("  when:      {}", when.join(" and "));
        }
        let actions: Vec<&str> = policy.actions.iter().map(|a| a.as_str()).collect();
        println!("  actions:   {}", actions.join(", "));
        print!("  cooldown:  {}s", policy.cool_down_seconds);
        match policy.max_executions_per_hour {
            Some(cap) => println!(", at most {cap}/hour"),
            None => println!(),
        }
    }

    Ok(())
}
