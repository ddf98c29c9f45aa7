//! `ember config`: Configuration management commands.

use ember_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();

            if config.governor.max_tool_calls_per_iteration == 0 {
                warnings.push("governor.max_tool_calls_per_iteration is 0; tools will never run");
            }

            if config.governor.default_confidence >= config.governor.confidence_threshold {
                warnings.push("default_confidence >= confidence_threshold; untagged answers always succeed");
            }

            if config.context.default_keep_last_n < 5 || config.context.default_keep_last_n > 50 {
                warnings.push("context.default_keep_last_n outside 5..=50 is clamped for proactive remediation");
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Iterations: {}", config.governor.max_iterations);
            println!("   Threshold:  {:.2}", config.governor.confidence_threshold);
            println!("   Capacity:   {} tokens", config.context.capacity);
            println!("   Remediate:  {}", config.context.proactive_action.as_str());
            println!("   Storage:    {}", config.memory.storage_root.display());
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = ember_config::AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().ends_with("config.toml"));
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let rendered = toml::to_string_pretty(&ember_config::AppConfig::default()).unwrap();
        let parsed = ember_config::AppConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed.governor.max_iterations, 5);
    }
}
