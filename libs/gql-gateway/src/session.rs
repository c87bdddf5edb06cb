use parking_lot::RwLock;
use secrecy::SecretString;

/// Persistence for the opaque session identifier.
///
/// The gateway never reads the value itself. Transports read it to
/// authenticate requests; credential refreshers write the renewed value.
pub trait SessionProvider: Send + Sync {
    /// Current session identifier, if any.
    fn session_id(&self) -> Option<SecretString>;

    /// Replace the session identifier.
    fn set_session_id(&self, session_id: SecretString);

    /// Forget the session (logout).
    fn clear(&self);
}

/// Process-local [`SessionProvider`].
#[derive(Debug, Default)]
pub struct InMemorySessionProvider {
    current: RwLock<Option<SecretString>>,
}

impl InMemorySessionProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(Some(SecretString::from(session_id.into()))),
        }
    }
}

impl SessionProvider for InMemorySessionProvider {
    fn session_id(&self) -> Option<SecretString> {
        self.current.read().clone()
    }

    fn set_session_id(&self, session_id: SecretString) {
        *self.current.write() = Some(session_id);
    }

    fn clear(&self) {
        *self.current.write() = None;
    }
}
