use config::ConfigError;

/// Signing secrets shorter than this are refused at startup.
const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT authentication settings
///
/// The secret is loaded once at process start and handed to handlers as
/// shared read-only state. It is never read ambiently at request time.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 1800 for 30 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    validate_jwt_settings(&settings.jwt)?;
    Ok(settings)
}

/// A weak signing secret makes every issued token forgeable, so refuse to
/// start rather than serve requests with it.
fn validate_jwt_settings(jwt: &JwtSettings) -> Result<(), ConfigError> {
    if jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::Message(format!(
            "jwt.secret must be at least {} characters long",
            MIN_JWT_SECRET_LENGTH
        )));
    }
    if jwt.access_token_expiry <= 0 {
        return Err(ConfigError::Message(
            "jwt.access_token_expiry must be positive".to_string(),
        ));
    }
    if jwt.refresh_token_expiry <= 0 {
        return Err(ConfigError::Message(
            "jwt.refresh_token_expiry must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_jwt_settings() -> JwtSettings {
        JwtSettings {
            secret: "a".repeat(MIN_JWT_SECRET_LENGTH),
            access_token_expiry: 1800,
            refresh_token_expiry: 604800,
            issuer: "expense-tracker".to_string(),
        }
    }

    #[test]
    fn accepts_valid_settings() {
        assert!(validate_jwt_settings(&valid_jwt_settings()).is_ok());
    }

    #[test]
    fn rejects_short_secret() {
        let mut jwt = valid_jwt_settings();
        jwt.secret = "too-short".to_string();
        assert!(validate_jwt_settings(&jwt).is_err());
    }

    #[test]
    fn rejects_non_positive_expiry() {
        let mut jwt = valid_jwt_settings();
        jwt.access_token_expiry = 0;
        assert!(validate_jwt_settings(&jwt).is_err());

        let mut jwt = valid_jwt_settings();
        jwt.refresh_token_expiry = -1;
        assert!(validate_jwt_settings(&jwt).is_err());
    }
}
