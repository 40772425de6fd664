//! Static service directory
//!
//! Loaded once at startup and served unchanged to every caller.

pub mod models;

pub use models::ServiceEntry;

use std::collections::HashSet;

use crate::config::ServicesSource;

/// Directory used when no SERVICES_JSON / SERVICES_PATH is configured
pub fn builtin_services() -> Vec<ServiceEntry> {
    vec![
        ServiceEntry::new(
            "plane",
            "Plane",
            "https://todo.lyckabc.xyz",
            "Project Management",
            "\u{2708}\u{fe0f}",
        ),
        ServiceEntry::new(
            "keycloak",
            "Keycloak",
            "https://auth.lyckabc.xyz",
            "Identity Provider",
            "\u{1f510}",
        ),
        ServiceEntry::new(
            "pgadmin",
            "pgAdmin",
            "https://pgadmin.lyckabc.xyz",
            "Database Management",
            "\u{1f418}",
        ),
    ]
}

/// Load and validate the service directory from the configured source
///
/// Never logs the raw JSON; only the source and a count.
pub fn load_services(source: &ServicesSource) -> anyhow::Result<Vec<ServiceEntry>> {
    let (services, origin) = match source {
        ServicesSource::Builtin => (builtin_services(), "builtin"),
        ServicesSource::Json(json) => (
            serde_json::from_str::<Vec<ServiceEntry>>(json)
                .map_err(|e| anyhow::anyhow!("SERVICES_JSON is not a valid service list: {}", e))?,
            "env-json",
        ),
        ServicesSource::File(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read SERVICES_PATH {}: {}", path, e))?;
            let services = serde_json::from_str::<Vec<ServiceEntry>>(&contents).map_err(|e| {
                anyhow::anyhow!("{} is not a valid service list: {}", path, e)
            })?;
            (services, "file")
        }
    };

    if let Err(error) = validate_services(&services) {
        tracing::error!(source = origin, error = %error, "Service directory validation failed");
        return Err(anyhow::anyhow!(
            "Service directory validation failed ({}): {}",
            origin,
            error
        ));
    }

    tracing::info!(
        source = origin,
        total_services = services.len(),
        "Service directory loaded"
    );

    Ok(services)
}

/// Ids must be non-empty and unique; URLs must be absolute http(s)
pub fn validate_services(services: &[ServiceEntry]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for service in services {
        if service.id.trim().is_empty() {
            return Err(format!("service '{}' has an empty id", service.name));
        }
        if !seen.insert(service.id.as_str()) {
            return Err(format!("duplicate service id '{}'", service.id));
        }
        let url = url::Url::parse(&service.url)
            .map_err(|e| format!("service '{}' has an invalid url: {}", service.id, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("service '{}' url must be http(s)", service.id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"[
            {
                "id": "demo",
                "name": "Demo App",
                "url": "https://demo.example.com",
                "description": "Demo application",
                "icon": "rocket"
            }
        ]"#
    }

    #[test]
    fn test_builtin_services_are_valid() {
        let services = load_services(&ServicesSource::Builtin).unwrap();
        let ids: Vec<&str> = services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["plane", "keycloak", "pgadmin"]);
    }

    #[test]
    fn test_load_services_from_json() {
        let services = load_services(&ServicesSource::Json(sample_json().to_string())).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "Demo App");
    }

    #[test]
    fn test_load_services_from_file() {
        let temp_file = std::env::temp_dir().join("edge_gateway_test_services.json");
        std::fs::write(&temp_file, sample_json()).unwrap();

        let source = ServicesSource::File(temp_file.to_string_lossy().to_string());
        let services = load_services(&source).unwrap();
        assert_eq!(services[0].id, "demo");

        std::fs::remove_file(&temp_file).ok();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let source = ServicesSource::File("/nonexistent/services.json".to_string());
        assert!(load_services(&source).is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"[{"id":"a","name":"A","url":"https://a.example.com","description":"","icon":"","extra":1}]"#;
        assert!(load_services(&ServicesSource::Json(json.to_string())).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let services = vec![
            ServiceEntry::new("a", "A", "https://a.example.com", "", ""),
            ServiceEntry::new("a", "B", "https://b.example.com", "", ""),
        ];
        let err = validate_services(&services).unwrap_err();
        assert!(err.contains("duplicate"));
    }

    #[test]
    fn test_bad_urls_rejected() {
        let relative = vec![ServiceEntry::new("a", "A", "/relative", "", "")];
        assert!(validate_services(&relative).is_err());

        let ftp = vec![ServiceEntry::new("a", "A", "ftp://files.example.com", "", "")];
        assert!(validate_services(&ftp).is_err());
    }
}
