use sv_domain::config::{Config, ConfigSeverity};

/// Validate the config, printing any issues. Returns `false` when at least
/// one error was found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!(
            "Config OK ({config_path}): {} survey seed(s), {} LLM provider(s)",
            config.surveys.len(),
            config.llm.providers.len()
        );
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!("\n{error_count} error(s), {warning_count} warning(s) in {config_path}");

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("serializing config: {e}"))?;
    print!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_as_toml() {
        let rendered = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(rendered.contains("[server]"));
        assert!(rendered.contains("[insights]"));
        let back: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(back.insights.staleness_secs, 300);
    }
}
