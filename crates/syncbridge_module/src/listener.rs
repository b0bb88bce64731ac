//! Local HTTP listener lifecycle.
//!
//! The listener that exposes local databases to peers is provided by the
//! host through [`ListenerFactory`]. [`ListenerFacade`] owns the one
//! listener of the process: it is created lazily on the first start, keeps
//! its port across restarts and binds to `localhost` when no credentials
//! protect it.

use crate::error::ModuleResult;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Port requested for a new listener.
pub const DEFAULT_LISTENER_PORT: u16 = 5984;

/// Host name used when the listener is not protected.
pub const LOCALHOST: &str = "localhost";

/// Host name used to listen on all interfaces.
pub const ALL_INTERFACES: &str = "0.0.0.0";

/// Basic-auth credentials the listener accepts.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub login: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for the listener facade.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Port requested when the listener is first created.
    pub port: u16,
    /// Bind host override. When unset, unprotected listeners bind to
    /// `localhost` and protected ones to all interfaces.
    pub bind_host: Option<String>,
}

impl ListenerConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            port: DEFAULT_LISTENER_PORT,
            bind_host: None,
        }
    }

    /// Sets the requested port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the bind host.
    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = Some(host.into());
        self
    }

    fn host_for(&self, credentials: Option<&Credentials>) -> String {
        match (&self.bind_host, credentials) {
            (Some(host), _) => host.clone(),
            (None, None) => LOCALHOST.to_string(),
            (None, Some(_)) => ALL_INTERFACES.to_string(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What a listener is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSpec {
    /// Bind host.
    pub host: String,
    /// Requested port.
    pub port: u16,
    /// Accepted credentials, or none for an open listener.
    pub credentials: Option<Credentials>,
}

/// A local HTTP listener.
pub trait LocalListener: Send + Sync {
    /// Starts serving. Called again after [`stop`](Self::stop) to restart.
    fn start(&self) -> io::Result<()>;

    /// Stops serving.
    fn stop(&self);

    /// The port the listener is bound to.
    fn port(&self) -> u16;
}

/// Creates listeners.
pub trait ListenerFactory: Send + Sync {
    /// Creates a listener; it is not started yet.
    fn create(&self, spec: &ListenerSpec) -> io::Result<Box<dyn LocalListener>>;
}

/// Observable listener state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerState {
    /// Bound port.
    pub bound_port: u16,
    /// Bound host.
    pub bound_host: String,
    /// Accepted credentials.
    pub credentials: Option<Credentials>,
}

#[derive(Default)]
struct FacadeInner {
    credentials: Option<Credentials>,
    listener: Option<Box<dyn LocalListener>>,
    host: String,
    port: Option<u16>,
    running: bool,
}

/// Owns the process listener.
pub struct ListenerFacade {
    factory: Arc<dyn ListenerFactory>,
    config: ListenerConfig,
    inner: Mutex<FacadeInner>,
}

impl ListenerFacade {
    /// Creates a facade; no listener exists until the first start.
    pub fn new(factory: Arc<dyn ListenerFactory>, config: ListenerConfig) -> Self {
        Self {
            factory,
            config,
            inner: Mutex::new(FacadeInner::default()),
        }
    }

    /// Sets the credentials used by the next listener.
    ///
    /// A listener created with other credentials is stopped and discarded;
    /// its port is kept for the replacement.
    pub fn configure(&self, credentials: Option<Credentials>) {
        let mut inner = self.inner.lock();
        if inner.credentials == credentials {
            return;
        }
        if let Some(listener) = inner.listener.take() {
            if inner.running {
                listener.stop();
            }
            inner.running = false;
        }
        inner.credentials = credentials;
    }

    /// Starts the listener, creating it on first use and restarting it on
    /// its existing port otherwise.
    pub fn start(&self) -> ModuleResult<ListenerState> {
        let mut inner = self.inner.lock();
        let listener = match inner.listener.take() {
            Some(listener) => {
                info!(port = listener.port(), "restarting listener");
                if inner.running {
                    listener.stop();
                }
                listener
            }
            None => {
                if inner.credentials.is_none() {
                    info!("no credentials, binding listener to localhost");
                }
                let spec = ListenerSpec {
                    host: self.config.host_for(inner.credentials.as_ref()),
                    port: inner.port.unwrap_or(self.config.port),
                    credentials: inner.credentials.clone(),
                };
                let listener = self.factory.create(&spec)?;
                info!(port = listener.port(), host = %spec.host, "starting listener");
                inner.host = spec.host;
                listener
            }
        };

        let started = listener.start();
        let port = listener.port();
        inner.listener = Some(listener);
        inner.running = started.is_ok();
        started?;
        inner.port = Some(port);

        Ok(ListenerState {
            bound_port: port,
            bound_host: inner.host.clone(),
            credentials: inner.credentials.clone(),
        })
    }

    /// Stops the listener. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match inner.listener.as_ref() {
            Some(listener) if inner.running => {
                info!(port = listener.port(), "stopping listener");
                listener.stop();
                inner.running = false;
                true
            }
            _ => {
                warn!("stop requested but the listener is not running");
                false
            }
        }
    }

    /// Returns true if the listener is serving.
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Returns the state of the listener, if one was ever started.
    pub fn state(&self) -> Option<ListenerState> {
        let inner = self.inner.lock();
        inner.port.map(|port| ListenerState {
            bound_port: port,
            bound_host: inner.host.clone(),
            credentials: inner.credentials.clone(),
        })
    }
}

impl std::fmt::Debug for ListenerFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerFacade")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

#[derive(Debug)]
struct MemoryListenerInner {
    spec: ListenerSpec,
    running: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// In-memory listener that records its lifecycle.
#[derive(Debug, Clone)]
pub struct MemoryListener {
    inner: Arc<MemoryListenerInner>,
}

impl MemoryListener {
    /// Creates a stopped listener.
    pub fn new(spec: ListenerSpec) -> Self {
        Self {
            inner: Arc::new(MemoryListenerInner {
                spec,
                running: AtomicBool::new(false),
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            }),
        }
    }

    /// What the listener was created with.
    pub fn spec(&self) -> &ListenerSpec {
        &self.inner.spec
    }

    /// Returns true if serving.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Number of start calls.
    pub fn starts(&self) -> usize {
        self.inner.starts.load(Ordering::SeqCst)
    }

    /// Number of stop calls.
    pub fn stops(&self) -> usize {
        self.inner.stops.load(Ordering::SeqCst)
    }
}

impl LocalListener for MemoryListener {
    fn start(&self) -> io::Result<()> {
        self.inner.starts.fetch_add(1, Ordering::SeqCst);
        self.inner.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.inner.stops.fetch_add(1, Ordering::SeqCst);
        self.inner.running.store(false, Ordering::SeqCst);
    }

    fn port(&self) -> u16 {
        self.inner.spec.port
    }
}

/// Factory for [`MemoryListener`]s that keeps every listener it created.
#[derive(Debug, Default)]
pub struct MemoryListenerFactory {
    created: Mutex<Vec<MemoryListener>>,
    fail_create: AtomicBool,
}

impl MemoryListenerFactory {
    /// Creates a factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent creations fail as if the port were taken.
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Listeners created so far, oldest first.
    pub fn created(&self) -> Vec<MemoryListener> {
        self.created.lock().clone()
    }

    /// The most recently created listener.
    pub fn last(&self) -> Option<MemoryListener> {
        self.created.lock().last().cloned()
    }
}

impl ListenerFactory for MemoryListenerFactory {
    fn create(&self, spec: &ListenerSpec) -> io::Result<Box<dyn LocalListener>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("port {} is already in use", spec.port),
            ));
        }
        let listener = MemoryListener::new(spec.clone());
        self.created.lock().push(listener.clone());
        Ok(Box::new(listener))
    }
}
