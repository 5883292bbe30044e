//! Everything one signed-in user needs: identity, backend and realtime.

use std::sync::Arc;

use crate::auth::AuthContext;
use crate::backend::Backend;
use crate::event_handlers::EventHandlers;
use crate::feed::NotificationFeed;
use crate::memory::MemoryBackend;
use crate::realtime::Realtime;
use crate::social::{
    FollowService, FriendshipService, MessagingService, ModerationService, PostService,
    PrivacyService,
};
use crate::unread::{UnreadMessages, UnreadNotifications};

/// Factory for the counters, feed and services of one user.
///
/// Each call builds an independent consumer; nothing is shared between them
/// except the backend tables.
#[derive(Clone)]
pub struct Session {
    auth: AuthContext,
    backend: Arc<dyn Backend>,
    realtime: Arc<dyn Realtime>,
    handlers: EventHandlers,
}

impl Session {
    pub fn new(
        auth: AuthContext,
        backend: Arc<dyn Backend>,
        realtime: Arc<dyn Realtime>,
        handlers: EventHandlers,
    ) -> Self {
        Self {
            auth,
            backend,
            realtime,
            handlers,
        }
    }

    /// Session whose backend and realtime are the same in-process store.
    pub fn in_memory(auth: AuthContext, memory: MemoryBackend, handlers: EventHandlers) -> Self {
        let backend = Arc::new(memory);
        Self::new(auth, backend.clone(), backend, handlers)
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn realtime(&self) -> &dyn Realtime {
        self.realtime.as_ref()
    }

    pub fn unread_messages(&self) -> UnreadMessages {
        UnreadMessages::new(self.auth.clone(), self.backend.clone(), self.handlers.clone())
    }

    pub fn unread_notifications(&self) -> UnreadNotifications {
        UnreadNotifications::new(self.auth.clone(), self.backend.clone(), self.handlers.clone())
    }

    pub fn notification_feed(&self) -> NotificationFeed {
        NotificationFeed::new(self.auth.clone(), self.backend.clone())
    }

    pub fn follows(&self) -> FollowService {
        FollowService::new(self.auth.clone(), self.backend.clone())
    }

    pub fn friendship(&self) -> FriendshipService {
        FriendshipService::new(self.auth.clone(), self.backend.clone())
    }

    pub fn privacy(&self) -> PrivacyService {
        PrivacyService::new(self.auth.clone(), self.backend.clone())
    }

    pub fn messaging(&self) -> MessagingService {
        MessagingService::new(self.auth.clone(), self.backend.clone())
    }

    pub fn posts(&self) -> PostService {
        PostService::new(self.auth.clone(), self.backend.clone())
    }

    pub fn moderation(&self) -> ModerationService {
        ModerationService::new(self.auth.clone(), self.backend.clone())
    }
}
