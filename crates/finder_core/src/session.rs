use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

/// Authentication state of the application, passed around explicitly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSession {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthAction {
    LoggedIn { token: String, user: UserProfile },
    /// Profile refreshed from the backend, token unchanged.
    ProfileLoaded(UserProfile),
    LoggedOut,
    /// The backend rejected the token.
    TokenExpired,
}

impl AppSession {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|user| user.role == Role::Admin)
    }

    /// Apply `action`, returning the next session.
    #[must_use]
    pub fn reduce(self, action: AuthAction) -> AppSession {
        match action {
            AuthAction::LoggedIn { token, user } => AppSession {
                token: Some(token),
                user: Some(user),
            },
            AuthAction::ProfileLoaded(user) if self.is_authenticated() => AppSession {
                user: Some(user),
                ..self
            },
            AuthAction::ProfileLoaded(_) => self,
            AuthAction::LoggedOut | AuthAction::TokenExpired => AppSession::default(),
        }
    }
}
