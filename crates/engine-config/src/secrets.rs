use crate::error::ConfigError;
use async_trait::async_trait;

/// Resolves a mapping's `secret_ref` to plaintext at run start.
///
/// The encrypted at-rest store is an external collaborator; the engine only
/// depends on this seam. Resolved plaintext lives for the duration of the run
/// and is never persisted by the core.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<String, ConfigError>;
}

/// Resolver backed by process environment variables: `secret_ref` names the
/// variable holding the credential. Suits unattended scheduler invocations
/// where the wrapper script owns decryption.
#[derive(Debug, Default)]
pub struct EnvSecretResolver;

#[async_trait]
impl SecretResolver for EnvSecretResolver {
    async fn resolve(&self, reference: &str) -> Result<String, ConfigError> {
        std::env::var(reference).map_err(|_| {
            ConfigError::SecretUnresolved(
                reference.to_string(),
                "environment variable is not set".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_from_the_environment() {
        std::env::set_var("BRIDGE_TEST_SECRET", "hunter2");
        let resolver = EnvSecretResolver;
        assert_eq!(
            resolver.resolve("BRIDGE_TEST_SECRET").await.unwrap(),
            "hunter2"
        );
        std::env::remove_var("BRIDGE_TEST_SECRET");
    }

    #[tokio::test]
    async fn missing_secret_is_a_config_error() {
        let resolver = EnvSecretResolver;
        assert!(matches!(
            resolver.resolve("BRIDGE_TEST_SECRET_ABSENT").await,
            Err(ConfigError::SecretUnresolved(_, _))
        ));
    }
}
