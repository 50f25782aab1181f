use crate::infrastructure::ecocounter::PrivateDomainCredentials;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// SQLite file backing the submit API and `sqlite:` sinks.
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub directory_url: Option<String>,
    #[serde(default)]
    pub submit_url: Option<String>,
    #[serde(default)]
    pub query_url: Option<String>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub eco_counter_private_domains: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database() -> String {
    "data.db".to_string()
}

fn default_listen_addr() -> String {
    "127.0.0.1:5000".to_string()
}

/// Reads `config/counterbase.*` (or `path`) if present, overlaid with `COUNTERBASE_*`
/// environment variables.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let file = match path {
        Some(p) => config::File::from(p).required(true),
        None => config::File::with_name("config/counterbase").required(false),
    };

    let settings = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("COUNTERBASE")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("eco_counter_private_domains")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Looks up `ECO_VISIO_<DOMAIN>_{USERNAME,PASSWORD,USER_ID,DOMAIN_ID}` for each domain.
/// Domains missing a username, password or domain id are logged and left out.
pub fn private_domain_credentials(
    domains: &[String],
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<PrivateDomainCredentials> {
    domains
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .filter_map(|d| {
            let prefix = format!("ECO_VISIO_{}", d.to_uppercase());
            let var = |suffix: &str| {
                lookup(&format!("{}_{}", prefix, suffix)).filter(|v| !v.is_empty())
            };

            match (var("USERNAME"), var("PASSWORD"), var("DOMAIN_ID")) {
                (Some(username), Some(password), Some(domain_id)) => Some(PrivateDomainCredentials {
                    name: d.to_string(),
                    username,
                    password,
                    user_id: var("USER_ID").unwrap_or_default(),
                    domain_id,
                }),
                _ => {
                    tracing::warn!(
                        "eco counter private domain {:?} missing env {}_USERNAME, {}_PASSWORD, {}_USER_ID, or {}_DOMAIN_ID, skipping",
                        d,
                        prefix,
                        prefix,
                        prefix,
                        prefix
                    );
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_private_domain_credentials() {
        let env: HashMap<&str, &str> = [
            ("ECO_VISIO_HRM_USERNAME", "user"),
            ("ECO_VISIO_HRM_PASSWORD", "secret"),
            ("ECO_VISIO_HRM_USER_ID", "9"),
            ("ECO_VISIO_HRM_DOMAIN_ID", "77"),
            ("ECO_VISIO_PARTIAL_USERNAME", "user"),
        ]
        .into_iter()
        .collect();

        let creds = private_domain_credentials(
            &["hrm".to_string(), "partial".to_string(), "".to_string()],
            |k| env.get(k).map(|v| v.to_string()),
        );

        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].name, "hrm");
        assert_eq!(creds[0].username, "user");
        assert_eq!(creds[0].user_id, "9");
        assert_eq!(creds[0].domain_id, "77");
    }

    #[test]
    fn test_load_settings_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "directory_url = \"file:///srv/counters.json\"\n\
             submit_url = \"sqlite:\"\n\
             eco_counter_private_domains = [\"hrm\"]"
        )
        .unwrap();

        let settings = load_settings(Some(file.path())).unwrap();
        assert_eq!(settings.directory_url.as_deref(), Some("file:///srv/counters.json"));
        assert_eq!(settings.submit_url.as_deref(), Some("sqlite:"));
        assert_eq!(settings.query_url, None);
        assert_eq!(settings.database, "data.db");
        assert_eq!(settings.listen_addr, "127.0.0.1:5000");
        assert_eq!(settings.eco_counter_private_domains, vec!["hrm".to_string()]);
    }
}
