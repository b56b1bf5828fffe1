//! Unit tests for configuration parsing and overrides.

#[cfg(test)]
mod config_tests {
    use crate::config::*;
    use crate::error::ConfigError;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8888);
        assert_eq!(config.llm.model, "c1/openai/gpt-5/v-20250930");
        assert_eq!(config.llm.base_url, "https://api.thesys.dev/v1/embed/");
        assert_eq!(config.market_data.base_url, "https://query2.finance.yahoo.com");
        assert_eq!(config.market_data.cookie_url, "https://fc.yahoo.com");
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.bind_addr(), "0.0.0.0:8888");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  port: 9000
llm:
  model: "gpt-4o-mini"
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_rounds, 8);
    }

    #[test]
    fn test_empty_yaml_and_bom() {
        let config = AppConfig::from_yaml_str("\u{feff}").unwrap();
        assert_eq!(config.server.port, 8888);

        let config = AppConfig::from_yaml_str("\u{feff}server:\n  port: 7000\n").unwrap();
        assert_eq!(config.server.port, 7000);
    }

    #[test]
    fn test_invalid_yaml() {
        let result = AppConfig::from_yaml_str("server: [not, a, map");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:4000/v1"),
            ("LLM_MODEL", "local-model"),
            ("PORT", "9999"),
            ("AGENT_MAX_ROUNDS", "3"),
            ("MARKET_DATA_BASE_URL", "http://127.0.0.1:1234"),
            ("MARKET_DATA_COOKIE_URL", "http://127.0.0.1:1234/consent"),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.base_url, "http://localhost:4000/v1");
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.llm.max_rounds, 3);
        assert_eq!(config.market_data.base_url, "http://127.0.0.1:1234");
        assert_eq!(config.market_data.cookie_url, "http://127.0.0.1:1234/consent");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_port_override() {
        let vars = env(&[("PORT", "eighty")]);
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|k| vars.get(k).cloned());

        match result {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "PORT"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let mut config = AppConfig::default();
        config.llm.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.market_data.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.market_data.cookie_url = "fc.yahoo.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_rounds() {
        let mut config = AppConfig::default();
        config.llm.max_rounds = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-secret".to_string());
        let printed = format!("{:?}", config);

        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
