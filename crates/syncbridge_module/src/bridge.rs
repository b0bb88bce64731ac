//! The control surface driven by the host application.
//!
//! Every operation resolves exactly once with a value or a [`ModuleError`].
//! Replication progress is not returned from calls; it arrives as
//! `replicationChanged` events through [`SyncBridge::subscribe`] or a
//! registered observer.

use crate::error::{ModuleError, ModuleResult};
use crate::listener::{
    Credentials, ListenerConfig, ListenerFacade, ListenerFactory, ListenerState, LOCALHOST,
};
use crate::logging::{LogControl, LogLevel};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use syncbridge_core::{
    DatabaseEngine, Direction, EventBus, ObserverId, ReplicationChangeEvent, ReplicationObserver,
    ReplicationOptions, ReplicationRegistry, DEFAULT_COOKIE_NAME,
};
use syncbridge_transfer::{
    ContentResolver, TransferConfig, TransferHandle, TransferProgress, UploadRequest,
    UploadResponse, Uploader,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Options for [`SyncBridge::init`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitOptions {
    /// Listener login.
    pub username: Option<String>,
    /// Listener password.
    pub password: Option<String>,
    /// Run the listener without credentials instead of generating them.
    pub anonymous: bool,
}

impl InitOptions {
    /// Options with explicit credentials.
    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            anonymous: false,
        }
    }

    /// Options for an unprotected listener.
    pub fn anonymous() -> Self {
        Self {
            anonymous: true,
            ..Self::default()
        }
    }

    fn credentials(self) -> ModuleResult<Option<Credentials>> {
        match (self.username, self.password, self.anonymous) {
            (None, None, true) => Ok(None),
            (Some(_), _, true) | (_, Some(_), true) => Err(ModuleError::InvalidCredentials(
                "an anonymous listener takes no username or password".into(),
            )),
            (None, None, false) => Ok(Some(Credentials::new(
                Uuid::new_v4().to_string(),
                Uuid::new_v4().to_string(),
            ))),
            (Some(login), Some(password), false) => Ok(Some(Credentials::new(login, password))),
            _ => Err(ModuleError::InvalidCredentials(
                "username and password must both be set or both be absent".into(),
            )),
        }
    }
}

/// Result of [`SyncBridge::init`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    /// Port the listener is bound to.
    pub listener_port: u16,
    /// Host clients use to reach the listener.
    pub listener_host: String,
    /// Listener base URL.
    pub listener_url: String,
    /// Listener base URL with embedded credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listener_url_with_auth: Option<String>,
    /// Listener login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Listener password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl InitResponse {
    fn new(state: &ListenerState) -> Self {
        let port = state.bound_port;
        let credentials = state.credentials.as_ref();
        Self {
            listener_port: port,
            listener_host: LOCALHOST.to_string(),
            listener_url: format!("http://{LOCALHOST}:{port}/"),
            listener_url_with_auth: credentials
                .map(|c| format!("http://{}:{}@{LOCALHOST}:{port}/", c.login, c.password)),
            username: credentials.map(|c| c.login.clone()),
            password: credentials.map(|c| c.password.clone()),
        }
    }
}

/// A continuous replication request as sent by the host.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationRequest {
    /// `"push"` or `"pull"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Session token for the remote endpoint.
    pub session_id: String,
    /// Cookie name; defaults to `SyncGatewaySession`.
    #[serde(default)]
    pub cookie_name: Option<String>,
    /// TLS-only cookie.
    #[serde(default)]
    pub secure: Option<bool>,
    /// Cookie domain.
    #[serde(default)]
    pub cookie_domain: Option<String>,
    /// Cookie path.
    #[serde(default)]
    pub cookie_path: Option<String>,
}

impl ReplicationRequest {
    /// Creates a request with the default cookie settings.
    pub fn new(kind: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            session_id: session_id.into(),
            cookie_name: None,
            secure: None,
            cookie_domain: None,
            cookie_path: None,
        }
    }

    /// Sets the cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    /// Marks the cookie as TLS-only.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    fn into_options(self) -> ModuleResult<ReplicationOptions> {
        let direction: Direction = self.kind.parse()?;
        let mut options = ReplicationOptions::new(direction, self.session_id)
            .with_cookie_name(self.cookie_name.unwrap_or_else(|| DEFAULT_COOKIE_NAME.into()))
            .with_secure(self.secure.unwrap_or(false));
        if let Some(domain) = self.cookie_domain {
            options = options.with_cookie_domain(domain);
        }
        if let Some(path) = self.cookie_path {
            options = options.with_cookie_path(path);
        }
        Ok(options)
    }
}

/// Configuration for the bridge.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// Listener settings.
    pub listener: ListenerConfig,
    /// Upload settings.
    pub transfer: TransferConfig,
}

impl BridgeConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listener settings.
    pub fn with_listener(mut self, listener: ListenerConfig) -> Self {
        self.listener = listener;
        self
    }

    /// Sets the upload settings.
    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }
}

/// Host-facing module: replication controls, listener lifecycle, uploads.
pub struct SyncBridge {
    registry: ReplicationRegistry,
    listener: ListenerFacade,
    uploader: Uploader,
    logging: LogControl,
}

impl SyncBridge {
    /// Creates a bridge over `engine`.
    pub fn new(
        engine: Arc<dyn DatabaseEngine>,
        listeners: Arc<dyn ListenerFactory>,
        config: BridgeConfig,
    ) -> ModuleResult<Self> {
        Ok(Self {
            registry: ReplicationRegistry::new(engine, Arc::new(EventBus::new())),
            listener: ListenerFacade::new(listeners, config.listener),
            uploader: Uploader::new(config.transfer)?,
            logging: LogControl::unmanaged(),
        })
    }

    /// Uses `logging` for [`set_log_level`](Self::set_log_level).
    pub fn with_log_control(mut self, logging: LogControl) -> Self {
        self.logging = logging;
        self
    }

    /// Registers the resolver for content-handle upload sources.
    pub fn with_content_resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.uploader = self.uploader.with_content_resolver(resolver);
        self
    }

    /// The replication registry.
    pub fn registry(&self) -> &ReplicationRegistry {
        &self.registry
    }

    /// The listener facade.
    pub fn listener(&self) -> &ListenerFacade {
        &self.listener
    }

    /// Sets the log level by host name (`VERBOSE` .. `ASSERT`).
    pub fn set_log_level(&self, level: &str) -> ModuleResult<()> {
        let level: LogLevel = level.parse()?;
        self.logging.set_level(level)
    }

    /// Returns the current log level.
    pub fn log_level(&self) -> LogLevel {
        self.logging.level()
    }

    /// Configures listener credentials and starts the listener.
    ///
    /// Without a username and password, random credentials are generated
    /// unless `anonymous` is set.
    pub fn init(&self, options: InitOptions) -> ModuleResult<InitResponse> {
        let credentials = options.credentials()?;
        if credentials.is_none() {
            warn!("no credentials specified, the listener is unsecured");
        }
        self.listener.configure(credentials);
        let state = self.listener.start()?;
        info!(port = state.bound_port, "sync bridge initialised");
        Ok(InitResponse::new(&state))
    }

    /// Starts or restarts the listener.
    pub fn start_listener(&self) -> ModuleResult<ListenerState> {
        self.listener.start()
    }

    /// Stops the listener. Succeeds when nothing is running.
    pub fn stop_listener(&self) -> ModuleResult<()> {
        self.listener.stop();
        Ok(())
    }

    /// Starts a continuous replication unless an identical one is running.
    ///
    /// Returns true if a new session was started.
    pub fn start_continuous_replication(
        &self,
        database: &str,
        remote_url: &str,
        request: ReplicationRequest,
    ) -> ModuleResult<bool> {
        let options = request.into_options()?;
        let (session, started) = self
            .registry
            .start_continuous(database, remote_url, &options)?;
        debug!(session = %session.id(), started, "start continuous replication");
        Ok(started)
    }

    /// Stops every continuous replication of one direction.
    ///
    /// Returns the number of sessions stopped.
    pub fn stop_continuous_replication(&self, database: &str, kind: &str) -> ModuleResult<usize> {
        Ok(self.registry.stop_all(database, kind.parse()?)?)
    }

    /// Takes every continuous replication of one direction offline.
    pub fn suspend_continuous_replications(
        &self,
        database: &str,
        kind: &str,
    ) -> ModuleResult<usize> {
        Ok(self.registry.suspend_all(database, kind.parse()?)?)
    }

    /// Brings every suspended replication of one direction back online.
    pub fn resume_continuous_replications(
        &self,
        database: &str,
        kind: &str,
    ) -> ModuleResult<usize> {
        Ok(self.registry.resume_all(database, kind.parse()?)?)
    }

    /// Uploads an attachment, reporting each chunk to `on_progress`.
    pub async fn upload<F>(&self, request: UploadRequest, on_progress: F) -> ModuleResult<UploadResponse>
    where
        F: FnMut(TransferProgress),
    {
        Ok(self.uploader.upload(request, on_progress).await?)
    }

    /// Starts an upload in the background.
    pub fn spawn_upload(&self, request: UploadRequest) -> ModuleResult<TransferHandle> {
        Ok(self.uploader.spawn(request)?)
    }

    /// Copies the raw bytes of an attachment to `destination`.
    ///
    /// Returns the number of bytes written.
    pub async fn copy_attachment(
        &self,
        database: &str,
        document_id: &str,
        attachment_name: &str,
        destination: impl AsRef<Path>,
    ) -> ModuleResult<u64> {
        let db = self.registry.engine().database(database)?;
        let mut reader = db
            .open_attachment(document_id, attachment_name)?
            .ok_or_else(|| {
                ModuleError::NotFound(format!(
                    "attachment {attachment_name:?} of document {document_id:?} in {database}"
                ))
            })?;

        let destination: PathBuf = destination.as_ref().to_path_buf();
        let copied = tokio::task::spawn_blocking(move || -> io::Result<u64> {
            let mut file = std::fs::File::create(&destination)?;
            let copied = io::copy(&mut reader, &mut file)?;
            file.sync_all()?;
            Ok(copied)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        info!(database, document_id, attachment_name, bytes = copied, "attachment copied");
        Ok(copied)
    }

    /// Receives every `replicationChanged` event from now on.
    pub fn subscribe(&self) -> Receiver<ReplicationChangeEvent> {
        self.registry.bus().subscribe()
    }

    /// Registers an observer for `replicationChanged` events.
    pub fn register_observer(&self, observer: Arc<dyn ReplicationObserver>) -> ObserverId {
        self.registry.bus().register(observer)
    }

    /// Removes an observer.
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.registry.bus().unregister(id)
    }
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBridge")
            .field("listener", &self.listener)
            .field("uploader", &self.uploader)
            .field("logging", &self.logging)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_are_generated() {
        let creds = InitOptions::default().credentials().unwrap().unwrap();
        assert!(Uuid::parse_str(&creds.login).is_ok());
        assert!(Uuid::parse_str(&creds.password).is_ok());
        assert_ne!(creds.login, creds.password);
    }

    #[test]
    fn half_credentials_are_rejected() {
        let options = InitOptions {
            username: Some("admin".into()),
            ..InitOptions::default()
        };
        assert!(matches!(
            options.credentials(),
            Err(ModuleError::InvalidCredentials(_))
        ));

        let options = InitOptions {
            password: Some("secret".into()),
            anonymous: true,
            ..InitOptions::default()
        };
        assert!(matches!(
            options.credentials(),
            Err(ModuleError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn anonymous_has_no_credentials() {
        assert!(InitOptions::anonymous().credentials().unwrap().is_none());
    }

    #[test]
    fn init_response_wire_shape() {
        let state = ListenerState {
            bound_port: 5984,
            bound_host: "0.0.0.0".into(),
            credentials: Some(Credentials::new("u", "p")),
        };
        let json = serde_json::to_value(InitResponse::new(&state)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "listenerPort": 5984,
                "listenerHost": "localhost",
                "listenerUrl": "http://localhost:5984/",
                "listenerUrlWithAuth": "http://u:p@localhost:5984/",
                "username": "u",
                "password": "p",
            })
        );

        let open = ListenerState {
            credentials: None,
            ..state
        };
        let json = serde_json::to_value(InitResponse::new(&open)).unwrap();
        assert!(json.get("listenerUrlWithAuth").is_none());
        assert!(json.get("username").is_none());
    }

    #[test]
    fn replication_request_from_host_json() {
        let request: ReplicationRequest = serde_json::from_value(serde_json::json!({
            "type": "pull",
            "sessionId": "abc",
            "secure": true,
        }))
        .unwrap();
        let options = request.into_options().unwrap();
        assert_eq!(options.direction, Direction::Pull);
        assert_eq!(options.cookie_name, DEFAULT_COOKIE_NAME);
        assert!(options.secure);
    }

    #[test]
    fn unknown_direction_names_type() {
        let err = ReplicationRequest::new("sideways", "abc")
            .into_options()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::BadParameter);
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn init_options_from_host_json() {
        let options: InitOptions = serde_json::from_str(r#"{"username":"a","password":"b"}"#).unwrap();
        let creds = options.credentials().unwrap().unwrap();
        assert_eq!(creds, Credentials::new("a", "b"));
    }
}
