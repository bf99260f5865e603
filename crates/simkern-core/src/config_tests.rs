//! Tests for config module

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::config::*;
    use crate::dtype::OutputDtype;

    // ========================================================================
    // Default tests
    // ========================================================================

    #[test]
    fn test_config_default_values() {
        // Arrange & Act
        let config = SimkernConfig::default();

        // Assert
        assert!(config.capabilities.enabled.is_empty());
        assert!(config.capabilities.disabled.is_empty());
        assert!(config.batch.parallel);
        assert_eq!(config.batch.parallel_threshold, 256);
        assert!(config.batch.default_output.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
    }

    // ========================================================================
    // TOML parsing tests
    // ========================================================================

    #[test]
    fn test_config_from_toml_minimal() {
        // Arrange
        let toml = r#"
[batch]
parallel = false
"#;

        // Act
        let config = SimkernConfig::from_toml(toml).expect("parse");

        // Assert
        assert!(!config.batch.parallel);
        assert_eq!(config.batch.parallel_threshold, 256);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_from_toml_full() {
        // Arrange
        let toml = r#"
[capabilities]
enabled = ["haswell"]
disabled = ["skylake", "ice"]

[batch]
parallel = true
parallel_threshold = 64
default_output = "f32"

[logging]
level = "debug"
format = "json"
"#;

        // Act
        let config = SimkernConfig::from_toml(toml).expect("parse");

        // Assert
        assert_eq!(config.capabilities.enabled, vec!["haswell"]);
        assert_eq!(config.capabilities.disabled, vec!["skylake", "ice"]);
        assert_eq!(config.batch.parallel_threshold, 64);
        assert_eq!(config.batch.default_output.as_deref(), Some("f32"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml_wrong_type() {
        // Arrange
        let toml = r#"
[batch]
parallel_threshold = "many"
"#;

        // Act
        let result = SimkernConfig::from_toml(toml);

        // Assert
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_load_from_path() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[batch]\nparallel_threshold = 8").expect("write");

        // Act
        let config = SimkernConfig::load_from_path(file.path()).expect("load");

        // Assert
        assert_eq!(config.batch.parallel_threshold, 8);
    }

    #[test]
    fn test_config_load_missing_file_uses_defaults() {
        // Arrange
        let dir = tempfile::tempdir().expect("temp dir");

        // Act
        let config = SimkernConfig::load_from_path(dir.path().join("absent.toml")).expect("load");

        // Assert
        assert_eq!(config.batch, BatchConfig::default());
    }

    // ========================================================================
    // Validation tests
    // ========================================================================

    #[test]
    fn test_config_validate_success() {
        assert!(SimkernConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validate_unknown_capability() {
        // Arrange
        let mut config = SimkernConfig::default();
        config.capabilities.disabled = vec!["avx9000".to_string()];

        // Act
        let err = config.validate().unwrap_err();

        // Assert
        assert!(err.to_string().contains("capabilities.disabled"));
        assert!(err.to_string().contains("avx9000"));
    }

    #[test]
    fn test_config_validate_enabled_and_disabled() {
        // Arrange
        let mut config = SimkernConfig::default();
        config.capabilities.enabled = vec!["haswell".to_string()];
        config.capabilities.disabled = vec!["haswell".to_string()];

        // Act
        let err = config.validate().unwrap_err();

        // Assert
        assert!(err.to_string().contains("both enabled and disabled"));
    }

    #[test]
    fn test_config_validate_zero_threshold() {
        // Arrange
        let mut config = SimkernConfig::default();
        config.batch.parallel_threshold = 0;

        // Act
        let err = config.validate().unwrap_err();

        // Assert
        assert!(err.to_string().contains("batch.parallel_threshold"));
    }

    #[test]
    fn test_config_validate_unknown_output() {
        // Arrange
        let mut config = SimkernConfig::default();
        config.batch.default_output = Some("f128".to_string());

        // Act
        let err = config.validate().unwrap_err();

        // Assert
        assert!(err.to_string().contains("batch.default_output"));
    }

    #[test]
    fn test_config_validate_invalid_log_level() {
        // Arrange
        let mut config = SimkernConfig::default();
        config.logging.level = "verbose".to_string();

        // Act
        let err = config.validate().unwrap_err();

        // Assert
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_config_validate_invalid_log_format() {
        // Arrange
        let mut config = SimkernConfig::default();
        config.logging.format = "xml".to_string();

        // Act
        let result = config.validate();

        // Assert
        assert!(result.is_err());
    }

    #[test]
    fn test_config_default_output_parsed() {
        // Arrange
        let mut config = SimkernConfig::default();
        config.batch.default_output = Some("bf16".to_string());

        // Act
        let out = config.batch.output_dtype().expect("valid tag");

        // Assert
        assert_eq!(out, Some(OutputDtype::BF16));
    }

    // ========================================================================
    // Serialization tests
    // ========================================================================

    #[test]
    fn test_config_to_toml() {
        // Arrange
        let config = SimkernConfig::default();

        // Act
        let toml_str = config.to_toml().expect("serialize");

        // Assert
        assert!(toml_str.contains("[batch]"));
        assert!(toml_str.contains("parallel_threshold = 256"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_config_roundtrip() {
        // Arrange
        let mut config = SimkernConfig::default();
        config.capabilities.disabled = vec!["haswell".to_string()];
        config.batch.parallel_threshold = 1024;
        config.batch.default_output = Some("i32".to_string());

        // Act
        let toml_str = config.to_toml().expect("serialize");
        let parsed = SimkernConfig::from_toml(&toml_str).expect("parse");

        // Assert
        assert_eq!(parsed, config);
    }
}
