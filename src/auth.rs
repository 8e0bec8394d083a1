use crate::config::Environment;
use crate::error::GatewayError;

/// API key check for inbound requests. Development deployments skip it.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    environment: Environment,
    api_key: Option<String>,
}

impl ApiKeyAuth {
    pub fn new(environment: Environment, api_key: Option<String>) -> Self {
        Self {
            environment,
            api_key,
        }
    }

    /// `credential` is the raw `Authorization` or `X-API-Key` header value;
    /// a `Bearer ` prefix is accepted.
    pub fn authorize(&self, credential: Option<&str>) -> Result<(), GatewayError> {
        if self.environment.is_development() {
            return Ok(());
        }

        let presented = credential.map(|value| value.strip_prefix("Bearer ").unwrap_or(value));

        match (presented, self.api_key.as_deref()) {
            (Some(presented), Some(expected)) if !expected.is_empty() && presented == expected => {
                Ok(())
            }
            _ => Err(GatewayError::Unauthorized(
                "Invalid or missing API key".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_skips_check() {
        let auth = ApiKeyAuth::new(Environment::Development, None);
        assert!(auth.authorize(None).is_ok());
    }

    #[test]
    fn test_production_requires_matching_key() {
        let auth = ApiKeyAuth::new(Environment::Production, Some("secret".to_string()));

        assert!(auth.authorize(Some("secret")).is_ok());
        assert!(auth.authorize(Some("Bearer secret")).is_ok());
        assert!(auth.authorize(Some("Bearer wrong")).is_err());
        assert!(matches!(
            auth.authorize(None),
            Err(GatewayError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_production_without_configured_key_rejects_everything() {
        let auth = ApiKeyAuth::new(Environment::Production, None);
        assert!(auth.authorize(Some("anything")).is_err());
    }
}
