use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of the password grant request.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// User block of the token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginUserInfo {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token response from `/auth/v1/token?grant_type=password`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: LoginUserInfo,
}
