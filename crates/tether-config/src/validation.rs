// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Covers cross-field constraints serde cannot express: a backend and the
//! settings it needs, backoff bounds, and token uniqueness.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{CredentialBackend, TetherConfig};

/// Validate a deserialized configuration.
///
/// Collects every violation instead of stopping at the first one.
pub fn validate_config(config: &TetherConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    validate_credentials(config, &mut errors);
    validate_registry(config, &mut errors);
    validate_events(config, &mut errors);
    validate_gateway(config, &mut errors);

    if config.audit.mirror_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "audit.mirror_timeout_secs must be greater than 0",
        ));
    }

    if config.audit.max_entries == 0 {
        errors.push(ConfigError::validation(
            "audit.max_entries must be greater than 0",
        ));
    }

    if config.cloud_api.request_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "cloud_api.request_timeout_secs must be greater than 0",
        ));
    }

    if config.pairing.connect_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "pairing.connect_timeout_secs must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_credentials(config: &TetherConfig, errors: &mut Vec<ConfigError>) {
    let creds = &config.credentials;
    match creds.backend {
        CredentialBackend::File => {
            if creds.root_dir.trim().is_empty() {
                errors.push(ConfigError::validation(
                    "credentials.root_dir must not be empty when backend = \"file\"",
                ));
            }
        }
        CredentialBackend::Redis => {
            let url = creds.redis_url.as_deref().unwrap_or("").trim();
            if url.is_empty() {
                errors.push(ConfigError::validation(
                    "credentials.redis_url is required when backend = \"redis\"",
                ));
            } else if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                errors.push(ConfigError::validation(format!(
                    "credentials.redis_url `{url}` must start with redis:// or rediss://"
                )));
            }
        }
        CredentialBackend::Memory => {}
    }

    if creds.io_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "credentials.io_timeout_secs must be greater than 0",
        ));
    }
}

fn validate_registry(config: &TetherConfig, errors: &mut Vec<ConfigError>) {
    let registry = &config.registry;
    if registry.initialize_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "registry.initialize_timeout_secs must be greater than 0",
        ));
    }
    if registry.backoff_base_ms > registry.backoff_max_ms {
        errors.push(ConfigError::validation(format!(
            "registry.backoff_base_ms ({}) must not exceed registry.backoff_max_ms ({})",
            registry.backoff_base_ms, registry.backoff_max_ms
        )));
    }
    if !registry.backoff_factor.is_finite() || registry.backoff_factor < 1.0 {
        errors.push(ConfigError::validation(format!(
            "registry.backoff_factor must be at least 1.0, got {}",
            registry.backoff_factor
        )));
    }
}

fn validate_events(config: &TetherConfig, errors: &mut Vec<ConfigError>) {
    let events = &config.events;
    if events.default_limit == 0 {
        errors.push(ConfigError::validation(
            "events.default_limit must be greater than 0",
        ));
    }
    if events.default_limit > events.max_limit {
        errors.push(ConfigError::validation(format!(
            "events.default_limit ({}) must not exceed events.max_limit ({})",
            events.default_limit, events.max_limit
        )));
    }
    if events.retention_days == 0 {
        errors.push(ConfigError::validation(
            "events.retention_days must be greater than 0",
        ));
    }
    if events.purge_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "events.purge_interval_secs must be greater than 0",
        ));
    }
    if events.default_metrics_days == 0 {
        errors.push(ConfigError::validation(
            "events.default_metrics_days must be greater than 0",
        ));
    }
}

fn validate_gateway(config: &TetherConfig, errors: &mut Vec<ConfigError>) {
    let gateway = &config.gateway;
    if gateway.host.trim().is_empty() {
        errors.push(ConfigError::validation("gateway.host must not be empty"));
    }

    let mut seen = HashSet::new();
    for (i, entry) in gateway.tokens.iter().enumerate() {
        if entry.token.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "gateway.tokens[{i}].token must not be empty"
            )));
        }
        if entry.tenant_id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "gateway.tokens[{i}].tenant_id must not be empty"
            )));
        }
        if !seen.insert(entry.token.as_str()) {
            errors.push(ConfigError::validation(format!(
                "gateway.tokens[{i}] reuses a token already assigned to another tenant"
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GatewayToken;

    fn messages(errors: &[ConfigError]) -> Vec<String> {
        errors.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&TetherConfig::default()).is_ok());
    }

    #[test]
    fn audit_records_need_room_for_an_entry() {
        let mut config = TetherConfig::default();
        config.audit.max_entries = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(messages(&errors).len(), 1);
        assert!(messages(&errors)[0].contains("audit.max_entries"));
    }

    #[test]
    fn redis_backend_requires_url() {
        let mut config = TetherConfig::default();
        config.credentials.backend = CredentialBackend::Redis;
        let errors = validate_config(&config).unwrap_err();
        assert!(messages(&errors)[0].contains("credentials.redis_url"));

        config.credentials.redis_url = Some("redis://127.0.0.1:6379/0".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn redis_url_scheme_is_checked() {
        let mut config = TetherConfig::default();
        config.credentials.backend = CredentialBackend::Redis;
        config.credentials.redis_url = Some("http://cache:6379".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(messages(&errors)[0].contains("redis://"));
    }

    #[test]
    fn collects_every_violation() {
        let mut config = TetherConfig::default();
        config.registry.backoff_base_ms = 10_000;
        config.registry.backoff_max_ms = 1_000;
        config.registry.backoff_factor = 0.5;
        config.events.default_limit = 900;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn duplicate_gateway_tokens_rejected() {
        let mut config = TetherConfig::default();
        config.gateway.tokens = vec![
            GatewayToken {
                token: "shared".into(),
                tenant_id: "tenant-a".into(),
            },
            GatewayToken {
                token: "shared".into(),
                tenant_id: "tenant-b".into(),
            },
        ];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(messages(&errors)[0].contains("gateway.tokens[1]"));
    }
}
