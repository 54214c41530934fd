use serde::{Deserialize, Serialize};

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub land_area: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAvatarRequest {
    pub avatar_url: String,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotificationsRequest {
    pub notifications: bool,
}
