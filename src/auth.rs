//! Authentication context consumed by the sync core.
//!
//! Sign-in and sign-out happen in an external provider; this type only
//! carries who is currently signed in and notifies watchers when that
//! changes. It is constructed by the application root and injected; there
//! is no ambient global.

use tokio::sync::watch;

pub struct AuthContext {
    user_id: watch::Sender<Option<String>>,
}

impl AuthContext {
    pub fn new(user_id: Option<String>) -> Self {
        let (sender, _) = watch::channel(user_id);
        Self { user_id: sender }
    }

    pub fn signed_out() -> Self {
        Self::new(None)
    }

    /// The signed-in user's id, or `None` when nobody is signed in.
    pub fn current_user_id(&self) -> Option<String> {
        self.user_id.borrow().clone()
    }

    /// Called by the auth provider on sign-in/out.
    pub fn set_user(&self, user_id: Option<String>) {
        self.user_id.send_replace(user_id);
    }

    /// Change notifications; the receiver is dropped to unregister.
    pub fn watch_user(&self) -> watch::Receiver<Option<String>> {
        self.user_id.subscribe()
    }
}
