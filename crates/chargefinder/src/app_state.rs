use finder_api::{ApiError, BackendClient, BackendConfig};
use finder_core::storage::{ProfileStore, StorageError};
use finder_core::{AppSession, AuthAction};

use crate::config::ClientConfig;
use crate::file_store::FileStore;

/// Everything a command needs: the configuration, the persisted profile and
/// the current login session.
#[derive(Debug)]
pub struct AppState {
    /// The configuration loaded at startup (immutable)
    pub config: ClientConfig,
    profile: ProfileStore<FileStore>,
    session: AppSession,
}

impl AppState {
    /// Open the profile named by `config` and restore the saved session.
    pub fn open(config: ClientConfig) -> Result<Self, StorageError> {
        let profile = ProfileStore::open(FileStore::open(&config.profile_path)?)?;
        let session = profile.session()?;
        Ok(AppState {
            config,
            profile,
            session,
        })
    }

    pub fn session(&self) -> &AppSession {
        &self.session
    }

    /// Apply an auth transition and persist the resulting session.
    pub fn dispatch(&mut self, action: AuthAction) -> Result<(), StorageError> {
        self.session = std::mem::take(&mut self.session).reduce(action);
        self.profile.save_session(&self.session)
    }

    pub fn profile(&self) -> &ProfileStore<FileStore> {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut ProfileStore<FileStore> {
        &mut self.profile
    }

    /// Backend client authenticated with the current session.
    pub fn backend(&self) -> Result<BackendClient, ApiError> {
        let client = BackendClient::new(BackendConfig {
            base_url: self.config.backend_url.clone(),
            geocode_url: self.config.geocode_url.clone(),
            ..Default::default()
        })?;
        Ok(client.with_token(self.session.token.clone()))
    }
}

#[cfg(test)]
mod tests {
    use finder_core::{Role, UserProfile};

    use super::*;
    use crate::file_store::tests::scratch_path;

    fn config() -> ClientConfig {
        ClientConfig {
            profile_path: scratch_path("profile.json"),
            ..Default::default()
        }
    }

    #[test]
    fn test_session_is_restored_and_cleared() {
        let config = config();
        let mut state = AppState::open(config.clone()).unwrap();
        assert!(!state.session().is_authenticated());

        state
            .dispatch(AuthAction::LoggedIn {
                token: "jwt".into(),
                user: UserProfile {
                    id: "u-1".into(),
                    email: "admin@example.com".into(),
                    name: "Admin".into(),
                    role: Role::Admin,
                },
            })
            .unwrap();

        let mut state = AppState::open(config.clone()).unwrap();
        assert!(state.session().is_admin());

        state.dispatch(AuthAction::TokenExpired).unwrap();
        let state = AppState::open(config).unwrap();
        assert!(!state.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_backend_without_url_fails_on_first_request() {
        let state = AppState::open(config()).unwrap();
        let client = state.backend().unwrap();
        assert!(matches!(
            client.fetch_stations().await,
            Err(ApiError::NotConfigured("backend"))
        ));
    }
}
