//! Lock tokens and lock resolution (spec §4.5 "Lock token handling" and
//! "Lock resolution (via LockManager)").

use std::sync::Arc;

use dashmap::DashMap;

use crate::{id::NodeId, path::Path, Error, Result};

use super::service::{LockInfo, RepositoryService, SessionInfo};

/// Session-local record of a lock this session currently holds a token for.
/// Distinct from `LockInfo` (the backing store's view): this is what
/// `addLockToken`/`removeLockToken` manage.
#[derive(Debug, Clone)]
struct HeldLock {
    info: LockInfo,
}

/// Resolves whether a node is locked and, if so, whether the current
/// session may act on it. Session-scoped: one `LockManager` per `Session`.
pub struct LockManager<S: RepositoryService> {
    service: Arc<S>,
    /// Tokens this session holds, by the node id the lock was issued on.
    tokens: DashMap<NodeId, HeldLock>,
}

impl<S: RepositoryService> LockManager<S> {
    #[must_use]
    pub fn new(service: Arc<S>) -> Self {
        Self { service, tokens: DashMap::new() }
    }

    /// Record a token in this session's credentials. The protocol has no
    /// way to check token uniqueness across sessions, so this never fails
    /// on the grounds of a token already being held elsewhere (spec §4.5).
    pub fn add_lock_token(&self, node: NodeId, info: LockInfo) {
        self.tokens.insert(node, HeldLock { info });
    }

    /// Remove a held token. Removing one this session never held raises
    /// `Error::AccessDenied` (the closest taxonomy member to the spec's
    /// `NotHolder`, which this crate does not carry as a separate variant).
    /// A session-scoped lock's token may not be released this way; it must
    /// be unlocked explicitly.
    pub fn remove_lock_token(&self, node: NodeId) -> Result<()> {
        let Some((_, held)) = self.tokens.remove(&node) else {
            return Err(Error::AccessDenied(format!("session does not hold a token for {node}")));
        };
        if held.info.is_session_scoped {
            self.tokens.insert(node, held);
            return Err(Error::NotSupportedOption(
                "a session-scoped lock's token cannot be released via removeLockToken; unlock() instead".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn holds_token_for(&self, node: NodeId) -> bool {
        self.tokens.contains_key(&node)
    }

    /// Walk from `node` up to the nearest ancestor that is locked, applying
    /// the three-step algorithm of spec §4.5: session-local lock, else
    /// ancestor deep-lock walk, else unlocked.
    pub async fn resolve(&self, session: &SessionInfo, ancestry: &[NodeId], node: NodeId) -> Result<Option<LockInfo>> {
        if let Some(held) = self.tokens.get(&node) {
            return Ok(Some(held.info.clone()));
        }
        if let Some(info) = self.service.get_lock_info(session, node).await? {
            return Ok(Some(info));
        }
        for &ancestor in ancestry.iter().rev() {
            if let Some(info) = self.service.get_lock_info(session, ancestor).await? {
                if info.is_deep {
                    return Ok(Some(info));
                }
            }
        }
        Ok(None)
    }

    /// `checkLock(node)`: raises `Error::Locked` iff a lock applies to
    /// `node` and this session does not hold its token.
    pub async fn check_lock(&self, session: &SessionInfo, ancestry: &[NodeId], node: NodeId) -> Result<()> {
        match self.resolve(session, ancestry, node).await? {
            Some(info) if !self.holds_token_for(info.holder) => {
                Err(Error::Locked(format!("{node} is locked by {}", info.owner)))
            }
            _ => Ok(()),
        }
    }
}

/// `checkPermission(path, actions)` (spec §4.5): walks the nearest existing
/// ancestor for non-existing paths, delegating to the service's
/// `isGranted` for the evaluation.
pub async fn check_permission<S: RepositoryService>(
    service: &S,
    session: &SessionInfo,
    resolve: impl Fn(&Path) -> Option<NodeId>,
    path: &Path,
    actions: &[String],
) -> Result<bool> {
    let mut probe = path.clone();
    loop {
        if let Some(id) = resolve(&probe) {
            return service.is_granted(session, &crate::id::ItemId::Node(id), actions).await;
        }
        match probe.parent() {
            Some(parent) => probe = parent,
            None => return service.is_granted(session, &crate::id::ItemId::Node(NodeId::root()), actions).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::service::mock::MockRepositoryService;

    fn session() -> SessionInfo {
        SessionInfo { session_id: "s".into(), workspace_name: "default".into() }
    }

    #[tokio::test]
    async fn session_scoped_token_cannot_be_removed_via_remove_lock_token() {
        let service = Arc::new(MockRepositoryService::with_root());
        let manager = LockManager::new(service);
        manager.add_lock_token(
            NodeId::root(),
            LockInfo { holder: NodeId::root(), owner: "me".into(), is_deep: true, is_session_scoped: true, token: Some("t".into()) },
        );
        assert!(manager.remove_lock_token(NodeId::root()).is_err());
        assert!(manager.holds_token_for(NodeId::root()));
    }

    #[tokio::test]
    async fn check_lock_passes_once_holder_releases() {
        let service = Arc::new(MockRepositoryService::with_root());
        let manager = LockManager::new(service.clone());
        let info = service.lock(&session(), NodeId::root(), true, true).await.expect("lock");
        assert!(manager.check_lock(&session(), &[], NodeId::root()).await.is_err());
        service.unlock(&session(), NodeId::root()).await.expect("unlock");
        let _ = info;
        assert!(manager.check_lock(&session(), &[], NodeId::root()).await.is_ok());
    }
}
