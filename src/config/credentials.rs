//! Early credential checks for command-line utilities.
//!
//! A credential is rejected when it is empty or is exactly the literal
//! `${VAR}` placeholder of its own variable (the variable was never
//! exported). Any other value is passed through untouched. The error carries
//! remediation text telling the operator exactly what to do.

use super::error::ConfigError;

/// Validate a credential value that is read from `section.field` and expected
/// to come from the environment variable `env_var`.
pub fn validate_credential(
    env_var: &str,
    section: &str,
    field: &str,
    value: &str,
) -> Result<(), ConfigError> {
    if !value.is_empty() && value != format!("${{{env_var}}}") {
        return Ok(());
    }

    let remediation = format!(
        "Please set the {env_var} environment variable:\n  \
         export {env_var}=your_api_key_here\n\n\
         Or add it to your config.yaml:\n  \
         {section}:\n    \
         {field}: \"${{{env_var}}}\""
    );

    Err(ConfigError::CredentialInvalid {
        name: env_var.to_string(),
        remediation,
    })
}

/// Validate the marketplace API key (`wb.api_key`).
pub fn validate_wb_key(api_key: &str) -> Result<(), ConfigError> {
    validate_credential("WB_API_KEY", "wb", "api_key", api_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_key() {
        let err = validate_wb_key("").unwrap_err();
        assert!(matches!(err, ConfigError::CredentialInvalid { .. }));
    }

    #[test]
    fn test_rejects_unexpanded_placeholder() {
        let err = validate_wb_key("${WB_API_KEY}").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("WB_API_KEY not set"));
        assert!(message.contains("export WB_API_KEY=your_api_key_here"));
        assert!(message.contains("api_key: \"${WB_API_KEY}\""));
    }

    #[test]
    fn test_accepts_any_other_non_empty_value() {
        assert!(validate_wb_key("abc123").is_ok());
        assert!(validate_wb_key("demo_key").is_ok());
        assert!(validate_wb_key("${OTHER}-suffix").is_ok());
    }

    #[test]
    fn test_only_own_placeholder_is_rejected() {
        assert!(validate_wb_key("   ").is_ok());
        assert!(validate_wb_key("${OTHER_KEY}").is_ok());
        assert!(validate_wb_key(" ${WB_API_KEY} ").is_ok());
        assert!(validate_credential("S3_SECRET", "s3", "secret_key", "${WB_API_KEY}").is_ok());
        assert!(validate_credential("S3_SECRET", "s3", "secret_key", "${S3_SECRET}").is_err());
    }
}
