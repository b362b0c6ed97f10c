use std::fmt;
use std::io::Error;

/// Name of the environment variable holding the runtime environment.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

const DEV_ENV_NAME: &str = "dev";

const PROD_ENV_NAME: &str = "prod";

/// Runtime environment the service is started in.
///
/// Selects which environment configuration file is layered over the base file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    /// Loads the environment from `APP_ENVIRONMENT`, defaulting to [`Environment::Dev`].
    pub fn load() -> Result<Environment, Error> {
        std::env::var(APP_ENVIRONMENT_ENV_NAME)
            .unwrap_or_else(|_| DEV_ENV_NAME.into())
            .try_into()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => DEV_ENV_NAME,
            Environment::Prod => PROD_ENV_NAME,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Environment {
    type Error = Error;

    /// Parses an environment name case-insensitively.
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            DEV_ENV_NAME => Ok(Self::Dev),
            PROD_ENV_NAME => Ok(Self::Prod),
            other => Err(Error::other(format!(
                "{other} is not a supported environment. Use either `{DEV_ENV_NAME}` or `{PROD_ENV_NAME}`.",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_environment_names_case_insensitively() {
        assert_eq!(
            Environment::try_from("PROD".to_string()).unwrap(),
            Environment::Prod
        );
        assert_eq!(
            Environment::try_from("dev".to_string()).unwrap(),
            Environment::Dev
        );
        assert!(Environment::try_from("staging".to_string()).is_err());
    }
}
