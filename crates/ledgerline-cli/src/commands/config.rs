use ledgerline_core::AppConfig;
use url::Url;

use crate::error::CliError;

/// Print the effective configuration and where each value came from
pub async fn show(config: &AppConfig) -> Result<(), CliError> {
    let database_url = config
        .database_url
        .as_deref()
        .map(mask_database_url)
        .unwrap_or_else(|| "(not set)".to_string());

    let rows = [
        ("environment", config.environment.to_string()),
        ("database_url", database_url),
        ("migrations_dir", config.migrations_dir.display().to_string()),
        ("migrations_table", config.migrations_table.clone()),
        ("lock_timeout", format!("{}s", config.lock_timeout.as_secs())),
        ("log_level", config.log_level.clone()),
        ("log_format", config.log_format.to_string()),
    ];

    println!("Configuration:");
    println!("==============");
    for (field, value) in rows {
        let source = config
            .source(field)
            .map(|source| source.description())
            .unwrap_or_default();
        println!("  {:<17} {:<40} ({})", field, value, source);
    }

    Ok(())
}

/// Replace the password of a database URL with `****`
pub fn mask_database_url(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                // Only fails for URLs that cannot carry credentials.
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
