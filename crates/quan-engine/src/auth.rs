//! # Staff Authentication
//!
//! Password login for staff accounts and the access tokens the HTTP and
//! WebSocket surfaces check.
//!
//! ```text
//! ┌──────────┐  username + password   ┌─────────────┐   argon2 verify
//! │  Client  │ ─────────────────────► │ AuthService │ ────────────────► staff_users
//! │          │ ◄───────────────────── │             │
//! └──────────┘   TokenPair (JWT HS256) └─────────────┘
//!      │
//!      │  Authorization: Bearer <token>   /  ?token=<token> on /realtime
//!      ▼
//!  verify() → Claims { sub, username, role, iat, exp, jti }
//!  authorize(claims, permission) → Forbidden unless role allows it
//! ```

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use quan_core::validation::{validate_name, validate_password, validate_username};
use quan_core::{Permission, Role, StaffUser};
use quan_db::Database;

use crate::config::AuthSettings;
use crate::error::{EngineError, EngineResult};

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Staff user id.
    pub sub: String,

    pub username: String,

    pub role: Role,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub token_type: &'static str,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    pub user: StaffUser,
}

// =============================================================================
// JWT
// =============================================================================

/// JWT token manager.
#[derive(Clone)]
pub struct JwtManager {
    secret: String,
    access_lifetime_secs: i64,
}

impl JwtManager {
    pub fn new(secret: String, access_lifetime_secs: i64) -> Self {
        JwtManager {
            secret,
            access_lifetime_secs,
        }
    }

    pub fn access_lifetime_secs(&self) -> i64 {
        self.access_lifetime_secs
    }

    /// Generate an access token for a staff user.
    pub fn generate_access_token(&self, user: &StaffUser) -> EngineResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_lifetime_secs);

        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| EngineError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Validate and decode a token.
    pub fn validate_token(&self, token: &str) -> EngineResult<Claims> {
        let validation = Validation::default();

        let token_data: TokenData<Claims> = decode(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| EngineError::Unauthorized(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// =============================================================================
// Passwords
// =============================================================================

pub fn hash_password(password: &str) -> EngineResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| EngineError::Internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "Stored password hash is unreadable");
            false
        }
    }
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    jwt: JwtManager,
}

impl AuthService {
    pub fn new(db: Database, settings: &AuthSettings) -> Self {
        AuthService {
            db,
            jwt: JwtManager::new(
                settings.jwt_secret.clone(),
                settings.access_token_lifetime_secs,
            ),
        }
    }

    pub async fn create_staff(
        &self,
        username: &str,
        display_name: &str,
        role: Role,
        password: &str,
    ) -> EngineResult<StaffUser> {
        let username = username.trim().to_lowercase();
        validate_username(&username)?;
        validate_name(display_name)?;
        validate_password(password)?;

        let hash = hash_password(password)?;
        let user = self
            .db
            .staff()
            .insert(&username, display_name, role, &hash)
            .await?;

        info!(id = %user.id, username = %user.username, role = ?user.role, "Staff account created");
        Ok(user)
    }

    pub async fn list_staff(&self) -> EngineResult<Vec<StaffUser>> {
        Ok(self.db.staff().list().await?)
    }

    /// Checks the password and issues an access token.
    ///
    /// Unknown users, wrong passwords and disabled accounts all fail the
    /// same way.
    pub async fn login(&self, username: &str, password: &str) -> EngineResult<TokenPair> {
        let denied = || EngineError::Unauthorized("Invalid username or password".into());

        let user = self
            .db
            .staff()
            .find_by_username(username)
            .await?
            .ok_or_else(denied)?;

        if !user.is_active || !verify_password(password, &user.password_hash) {
            debug!(username = %user.username, active = user.is_active, "Login refused");
            return Err(denied());
        }

        let access_token = self.jwt.generate_access_token(&user)?;
        info!(username = %user.username, role = ?user.role, "Staff logged in");

        Ok(TokenPair {
            access_token,
            token_type: "Bearer",
            expires_in: self.jwt.access_lifetime_secs(),
            user,
        })
    }

    pub fn verify(&self, token: &str) -> EngineResult<Claims> {
        self.jwt.validate_token(token)
    }

    /// Fails with `Forbidden` unless the caller's role allows `permission`.
    pub fn authorize(&self, claims: &Claims, permission: Permission) -> EngineResult<()> {
        if claims.role.allows(permission) {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!(
                "{:?} may not {:?}",
                claims.role, permission
            )))
        }
    }

    /// Creates the configured admin when no staff exist yet.
    ///
    /// Returns the new account, or `None` if staff already exist.
    pub async fn ensure_bootstrap_admin(
        &self,
        settings: &AuthSettings,
    ) -> EngineResult<Option<StaffUser>> {
        let Some(admin) = &settings.bootstrap_admin else {
            return Ok(None);
        };
        if !self.db.staff().list().await?.is_empty() {
            return Ok(None);
        }

        let user = self
            .create_staff(&admin.username, "Administrator", Role::Admin, &admin.password)
            .await?;
        warn!(username = %user.username, "Bootstrap admin created; change its password");
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootstrapAdmin;
    use quan_db::DbConfig;

    async fn service() -> (AuthService, AuthSettings) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = AuthSettings {
            jwt_secret: "test-secret-with-enough-length".into(),
            ..AuthSettings::default()
        };
        (AuthService::new(db, &settings), settings)
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("matkhau123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("matkhau123", &hash));
        assert!(!verify_password("matkhau124", &hash));
        assert!(!verify_password("matkhau123", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_token() {
        let (auth, _) = service().await;
        let user = auth
            .create_staff("Thu.Ngan", "Thu Ngân", Role::Cashier, "matkhau123")
            .await
            .unwrap();
        assert_eq!(user.username, "thu.ngan");

        let pair = auth.login("thu.ngan", "matkhau123").await.unwrap();
        let claims = auth.verify(&pair.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::Cashier);
        assert!(claims.exp > claims.iat);

        assert!(auth.authorize(&claims, Permission::TakePayments).is_ok());
        assert!(matches!(
            auth.authorize(&claims, Permission::DecideCancellation),
            Err(EngineError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_login_failures_are_unauthorized() {
        let (auth, _) = service().await;
        let user = auth
            .create_staff("bep01", "Bếp", Role::Kitchen, "matkhau123")
            .await
            .unwrap();

        assert!(matches!(
            auth.login("bep01", "wrong-pass").await,
            Err(EngineError::Unauthorized(_))
        ));
        assert!(matches!(
            auth.login("nobody", "matkhau123").await,
            Err(EngineError::Unauthorized(_))
        ));

        auth.db.staff().set_active(&user.id, false).await.unwrap();
        assert!(matches!(
            auth.login("bep01", "matkhau123").await,
            Err(EngineError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let (auth, _) = service().await;
        auth.create_staff("phucvu", "Phục vụ", Role::Waiter, "matkhau123")
            .await
            .unwrap();
        let err = auth
            .create_staff("phucvu", "Phục vụ 2", Role::Waiter, "matkhau123")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_token_from_other_secret_is_rejected() {
        let (auth, _) = service().await;
        auth.create_staff("admin", "Admin", Role::Admin, "matkhau123")
            .await
            .unwrap();
        let pair = auth.login("admin", "matkhau123").await.unwrap();

        let other = JwtManager::new("another-secret-entirely".into(), 60);
        assert!(matches!(
            other.validate_token(&pair.access_token),
            Err(EngineError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_once() {
        let (auth, mut settings) = service().await;
        settings.bootstrap_admin = Some(BootstrapAdmin {
            username: "admin".into(),
            password: "doimatkhau".into(),
        });

        let created = auth.ensure_bootstrap_admin(&settings).await.unwrap();
        assert_eq!(created.unwrap().role, Role::Admin);
        assert!(auth.ensure_bootstrap_admin(&settings).await.unwrap().is_none());
    }
}
