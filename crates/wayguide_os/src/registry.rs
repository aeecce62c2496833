#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};
use wayguide_kernel_contracts::session::SessionId;

use crate::session::{NavigationServices, NavigationSession, SessionConfig};

/// Owns every live session keyed by client id. Creation is atomic: concurrent first requests for
/// one id always end up sharing the same session.
pub struct SessionRegistry {
    config: SessionConfig,
    services: Arc<NavigationServices>,
    sessions: Mutex<BTreeMap<SessionId, Arc<NavigationSession>>>,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig, services: Arc<NavigationServices>) -> Self {
        Self {
            config,
            services,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn services(&self) -> &Arc<NavigationServices> {
        &self.services
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SessionId, Arc<NavigationSession>>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("session registry lock poisoned; recovering");
                self.sessions.clear_poison();
                poisoned.into_inner()
            }
        }
    }

    pub fn get_or_create(&self, session_id: &SessionId) -> Arc<NavigationSession> {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(session_id) {
            return existing.clone();
        }
        let session = Arc::new(NavigationSession::new(
            session_id.clone(),
            self.config,
            self.services.clone(),
        ));
        sessions.insert(session_id.clone(), session.clone());
        info!(session_id = %session_id, total = sessions.len(), "session created");
        session
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<NavigationSession>> {
        self.lock().get(session_id).cloned()
    }

    /// Drops the session after stopping any navigation it still runs.
    pub fn remove(&self, session_id: &SessionId) -> bool {
        let removed = self.lock().remove(session_id);
        match removed {
            Some(session) => {
                let _ = session.stop();
                info!(session_id = %session_id, "session removed");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.lock().keys().cloned().collect()
    }
}
