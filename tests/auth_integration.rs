use std::net::TcpListener;
use expense_tracker::configuration::{get_configuration, DatabaseSettings};
use expense_tracker::startup::run;
use sqlx::{Connection, Executor, PgConnection, PgPool, Row};
use serde_json::{json, Value};

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let connection_pool = configure_database(&configuration.database).await;

    let jwt_config = configuration.jwt.clone();
    let server = run(listener, connection_pool.clone(), jwt_config)
        .expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool: connection_pool,
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn register_default_user(app: &TestApp, client: &reqwest::Client) -> Value {
    let body = json!({
        "username": "john.doe",
        "email": "john@example.com",
        "password": "SecurePass123",
        "first_name": "John",
        "last_name": "Doe"
    });

    let response = client
        .post(&format!("{}/auth/register", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(201, response.status().as_u16());

    response.json().await.expect("Failed to parse response")
}

// --- Registration Tests ---

#[tokio::test]
async fn register_returns_201_for_valid_credentials() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response_body = register_default_user(&app, &client).await;
    assert!(response_body.get("access_token").is_some());
    assert!(response_body.get("refresh_token").is_some());
    assert_eq!(response_body["token_type"], "Bearer");

    // Verify user was created in database
    let user = sqlx::query("SELECT username, email, password_hash FROM users WHERE email = 'john@example.com'")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch created user");

    assert_eq!(user.get::<String, _>("username"), "john.doe");
    assert_eq!(user.get::<String, _>("email"), "john@example.com");
    // Plaintext is never stored, only the bcrypt encoding
    assert!(user.get::<String, _>("password_hash").starts_with("$2"));
}

#[tokio::test]
async fn register_returns_400_for_invalid_email() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let invalid_emails = vec![
        "notanemail",
        "user@",
        "@example.com",
        "user@@example.com",
    ];

    for invalid_email in invalid_emails {
        let body = json!({
            "username": "testuser",
            "email": invalid_email,
            "password": "SecurePass123"
        });

        let response = client
            .post(&format!("{}/auth/register", &app.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(400, response.status().as_u16(),
            "Should reject invalid email: {}", invalid_email);
    }
}

#[tokio::test]
async fn register_returns_400_for_invalid_username() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let invalid_usernames = vec![
        "ab",                // too short
        "_leading",          // bad leading character
        "has spaces",        // whitespace
        "user@name",         // reserved character
    ];

    for invalid_username in invalid_usernames {
        let body = json!({
            "username": invalid_username,
            "email": "test@example.com",
            "password": "SecurePass123"
        });

        let response = client
            .post(&format!("{}/auth/register", &app.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(400, response.status().as_u16(),
            "Should reject invalid username: {}", invalid_username);
    }
}

#[tokio::test]
async fn register_returns_400_for_weak_password() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let long_password = format!("{}A1", "a".repeat(129));
    let weak_passwords = vec![
        ("Short1", "password too short"),
        ("nouppercase123", "no uppercase"),
        ("NOLOWERCASE123", "no lowercase"),
        ("NoDigits", "no digits"),
        (long_password.as_str(), "password too long"),
    ];

    for (weak_password, reason) in weak_passwords {
        let body = json!({
            "username": "testuser",
            "email": "test@example.com",
            "password": weak_password
        });

        let response = client
            .post(&format!("{}/auth/register", &app.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(400, response.status().as_u16(),
            "Should reject weak password: {}", reason);
    }
}

#[tokio::test]
async fn register_returns_409_for_duplicate_username_or_email() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_default_user(&app, &client).await;

    // Same username, different email
    let body = json!({
        "username": "john.doe",
        "email": "other@example.com",
        "password": "SecurePass123"
    });
    let response = client
        .post(&format!("{}/auth/register", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(409, response.status().as_u16(),
        "Should reject duplicate username with 409 Conflict");

    // Same email, different username
    let body = json!({
        "username": "other.user",
        "email": "john@example.com",
        "password": "SecurePass123"
    });
    let response = client
        .post(&format!("{}/auth/register", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(409, response.status().as_u16(),
        "Should reject duplicate email with 409 Conflict");
}

#[tokio::test]
async fn register_returns_400_for_missing_fields() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let test_cases = vec![
        (json!({"email": "test@example.com", "password": "Pass1234"}), "missing username"),
        (json!({"username": "testuser", "password": "Pass1234"}), "missing email"),
        (json!({"username": "testuser", "email": "test@example.com"}), "missing password"),
        (json!({}), "missing all fields"),
    ];

    for (body, reason) in test_cases {
        let response = client
            .post(&format!("{}/auth/register", &app.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(400, response.status().as_u16(),
            "Should reject request: {}", reason);
    }
}

// --- Login Tests ---

#[tokio::test]
async fn login_returns_200_for_valid_credentials() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_default_user(&app, &client).await;

    let login_body = json!({
        "username": "john.doe",
        "password": "SecurePass123"
    });

    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&login_body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert!(response_body.get("access_token").is_some());
    assert!(response_body.get("refresh_token").is_some());

    // Successful login stamps last_login
    let last_login = sqlx::query("SELECT last_login FROM users WHERE username = 'john.doe'")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch user");
    assert!(last_login
        .get::<Option<chrono::DateTime<chrono::Utc>>, _>("last_login")
        .is_some());
}

#[tokio::test]
async fn login_returns_401_for_invalid_password() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_default_user(&app, &client).await;

    let login_body = json!({
        "username": "john.doe",
        "password": "WrongPassword123"
    });

    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&login_body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_returns_401_for_nonexistent_user() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let login_body = json!({
        "username": "nonexistent",
        "password": "SecurePass123"
    });

    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&login_body)
        .send()
        .await
        .expect("Failed to execute request.");

    // Same response as a wrong password - no user enumeration
    assert_eq!(401, response.status().as_u16());
    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_returns_403_for_inactive_account() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_default_user(&app, &client).await;

    sqlx::query("UPDATE users SET is_active = false WHERE username = 'john.doe'")
        .execute(&app.db_pool)
        .await
        .expect("Failed to deactivate user");

    let login_body = json!({
        "username": "john.doe",
        "password": "SecurePass123"
    });

    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&login_body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(403, response.status().as_u16());
}

// --- Protected Routes Tests ---

#[tokio::test]
async fn protected_route_returns_401_without_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/api/me", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn protected_route_returns_401_with_invalid_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/api/me", &app.address))
        .header("Authorization", "Bearer invalid.token.here")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn protected_route_returns_401_with_tampered_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let register_data = register_default_user(&app, &client).await;
    let access_token = register_data["access_token"]
        .as_str()
        .expect("No access token in response");

    // Any altered byte must invalidate the signature
    let tampered = format!("{}X", access_token);

    let response = client
        .get(&format!("{}/api/me", &app.address))
        .header("Authorization", format!("Bearer {}", tampered))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn get_current_user_returns_200_with_valid_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let register_data = register_default_user(&app, &client).await;
    let access_token = register_data["access_token"]
        .as_str()
        .expect("No access token in response");

    let response = client
        .get(&format!("{}/api/me", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["username"], "john.doe");
    assert_eq!(response_body["email"], "john@example.com");
    assert_eq!(response_body["first_name"], "John");
    assert_eq!(response_body["last_name"], "Doe");
}

#[tokio::test]
async fn protected_route_rejects_malformed_authorization_header() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let malformed_headers = vec![
        "Bearer",  // missing token
        "Basic dXNlcjpwYXNz",  // not Bearer
        "BearerToken",  // missing space
        "",  // empty
    ];

    for header in malformed_headers {
        let response = client
            .get(&format!("{}/api/me", &app.address))
            .header("Authorization", header)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(401, response.status().as_u16(),
            "Should reject malformed header: {}", header);
    }
}

// --- Token Refresh Tests ---

#[tokio::test]
async fn refresh_returns_200_and_rotates_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let register_data = register_default_user(&app, &client).await;
    let old_refresh_token = register_data["refresh_token"]
        .as_str()
        .expect("No refresh token in response");

    let refresh_body = json!({
        "refresh_token": old_refresh_token
    });

    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&refresh_body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert!(response_body.get("access_token").is_some());

    let new_refresh_token = response_body["refresh_token"]
        .as_str()
        .expect("No new refresh token");

    // Verify tokens are different (token rotation)
    assert_ne!(old_refresh_token, new_refresh_token,
        "Refresh token should be rotated on each refresh");

    // The rotated-out token must be dead
    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&refresh_body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16(),
        "Old refresh token should be revoked after rotation");
}

#[tokio::test]
async fn refresh_returns_401_with_unknown_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let refresh_body = json!({
        "refresh_token": "definitely_not_a_valid_token_in_database"
    });

    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&refresh_body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn refresh_returns_400_for_missing_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let refresh_body = json!({});

    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&refresh_body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(400, response.status().as_u16());
}

// --- Logout Tests ---

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let register_data = register_default_user(&app, &client).await;
    let refresh_token = register_data["refresh_token"]
        .as_str()
        .expect("No refresh token in response");

    let body = json!({ "refresh_token": refresh_token });

    let response = client
        .post(&format!("{}/auth/logout", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());

    // Revoked token can no longer refresh
    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());
}

// --- Password Change Tests ---

#[tokio::test]
async fn change_password_rotates_credential_and_revokes_sessions() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let register_data = register_default_user(&app, &client).await;
    let access_token = register_data["access_token"].as_str().unwrap();
    let refresh_token = register_data["refresh_token"].as_str().unwrap();

    let body = json!({
        "current_password": "SecurePass123",
        "new_password": "EvenMoreSecure456"
    });

    let response = client
        .put(&format!("{}/api/me/password", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());

    // Old password no longer works
    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"username": "john.doe", "password": "SecurePass123"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());

    // New password does
    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"username": "john.doe", "password": "EvenMoreSecure456"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    // Pre-change refresh tokens died with the old credential
    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&json!({"refresh_token": refresh_token}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn change_password_rejects_wrong_current_password() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let register_data = register_default_user(&app, &client).await;
    let access_token = register_data["access_token"].as_str().unwrap();

    let body = json!({
        "current_password": "NotMyPassword1",
        "new_password": "EvenMoreSecure456"
    });

    let response = client
        .put(&format!("{}/api/me/password", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

// --- Account Deletion Tests ---

#[tokio::test]
async fn delete_account_removes_user_and_dependents() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let register_data = register_default_user(&app, &client).await;
    let access_token = register_data["access_token"].as_str().unwrap();

    let response = client
        .delete(&format!("{}/api/me", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());

    let user_count = sqlx::query("SELECT COUNT(*) AS n FROM users")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to count users");
    assert_eq!(user_count.get::<i64, _>("n"), 0);

    // Refresh tokens cascade with the user row
    let token_count = sqlx::query("SELECT COUNT(*) AS n FROM refresh_tokens")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to count refresh tokens");
    assert_eq!(token_count.get::<i64, _>("n"), 0);

    // The stateless access token still verifies, but the subject is gone
    let response = client
        .get(&format!("{}/api/me", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(404, response.status().as_u16());
}
