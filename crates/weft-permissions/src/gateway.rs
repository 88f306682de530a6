//! Permission gateway
//!
//! Decides, per request, whether a tool invocation may run:
//!
//! 1. tools and path prefixes on the deny lists are denied outright;
//! 2. tools that need no permission are approved;
//! 3. known-safe commands running inside the workspace are approved unless
//!    they contain shell control characters or an output-file option;
//! 4. a matching session or permanent grant approves. A command whose
//!    working directory lies outside the workspace also needs a write grant
//!    on that directory;
//! 5. otherwise the user is asked, or the request is denied when the
//!    gateway runs non-interactively.
//!
//! The workspace root always carries an implicit session read grant.

use crate::commands::{SafeCommands, first_token};
use crate::error::GatewayError;
use crate::grant::{GrantExpiry, GrantKey, GrantScope, PermissionGrant};
use crate::path::is_within;
use crate::prompt::{Decision, PendingApproval, PendingEntry, PendingMap, PermissionPrompt};
use crate::state::{DecisionState, PermissionState};
use crate::store::GrantStore;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use weft_core::{Access, ActionRequest, PermissionScope, PermissionsConfig, RequestId, normalize_path};

const PROMPT_CHANNEL_CAPACITY: usize = 64;

/// Outcome of [`PermissionGateway::check`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PermissionCheck {
    Approved,
    Denied { reason: String },
    RequiresInteractiveApproval { suggested_scopes: Vec<GrantScope> },
}

impl PermissionCheck {
    fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    /// State the request moves to from `Unchecked`
    pub fn state(&self) -> DecisionState {
        match self {
            PermissionCheck::Approved => DecisionState::Approved,
            PermissionCheck::Denied { .. } => DecisionState::Denied,
            PermissionCheck::RequiresInteractiveApproval { .. } => {
                DecisionState::PendingUserDecision
            }
        }
    }
}

/// Session and permanent grants as of one point in time
#[derive(Debug, Clone, Default)]
pub struct GrantSet {
    grants: Vec<PermissionGrant>,
}

impl GrantSet {
    pub fn grants(&self) -> &[PermissionGrant] {
        &self.grants
    }

    fn covers(&self, tool_name: &str, scope: &PermissionScope, path: Option<&Path>) -> bool {
        let access = scope.access();
        self.grants.iter().any(|grant| {
            grant.covers_tool(tool_name, access)
                || match scope {
                    PermissionScope::Path { .. } => {
                        path.is_some_and(|p| grant.covers_path(p, access))
                    }
                    PermissionScope::Command { command, .. } => grant.covers_command(command),
                    PermissionScope::Tool { .. } => false,
                }
        })
    }
}

pub struct PermissionGateway {
    workspace_root: PathBuf,
    interactive: bool,
    safe_commands: SafeCommands,
    deny_tools: HashSet<String>,
    deny_paths: Vec<PathBuf>,
    decision_timeout: Option<Duration>,
    session: DashMap<GrantKey, PermissionGrant>,
    store: Arc<dyn GrantStore>,
    pending: PendingMap,
    prompts: broadcast::Sender<PermissionPrompt>,
}

impl std::fmt::Debug for PermissionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGateway")
            .field("workspace_root", &self.workspace_root)
            .field("interactive", &self.interactive)
            .field("session_grants", &self.session.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl PermissionGateway {
    pub fn new(config: &PermissionsConfig, store: Arc<dyn GrantStore>) -> Self {
        let workspace_root = normalize_path(Path::new("/"), &config.workspace_root);
        let deny_paths = config
            .deny_paths
            .iter()
            .map(|p| normalize_path(&workspace_root, p))
            .collect();
        let (prompts, _) = broadcast::channel(PROMPT_CHANNEL_CAPACITY);

        let gateway = Self {
            interactive: config.interactive,
            safe_commands: SafeCommands::new(config.safe_commands.iter().cloned()),
            deny_tools: config.deny_tools.iter().cloned().collect(),
            deny_paths,
            decision_timeout: config.decision_timeout,
            session: DashMap::new(),
            store,
            pending: Arc::new(DashMap::new()),
            prompts,
            workspace_root,
        };

        let root_grant = PermissionGrant::new(
            GrantScope::path(&gateway.workspace_root, Access::Read),
            GrantExpiry::Session,
        );
        gateway.session.insert(root_grant.key(), root_grant);
        gateway
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Snapshot of session and permanent grants.
    ///
    /// Fails when the grant store cannot be read.
    pub async fn snapshot(&self) -> Result<GrantSet, GatewayError> {
        let mut grants: Vec<PermissionGrant> =
            self.session.iter().map(|e| e.value().clone()).collect();
        grants.extend(self.store.load().await?);
        Ok(GrantSet { grants })
    }

    /// Every grant currently in force
    pub async fn list_grants(&self) -> Result<Vec<PermissionGrant>, GatewayError> {
        let mut grants = self.snapshot().await?.grants;
        grants.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(grants)
    }

    pub async fn check(
        &self,
        request: &ActionRequest,
        scope: Option<&PermissionScope>,
    ) -> Result<PermissionCheck, GatewayError> {
        let grants = self.snapshot().await?;
        Ok(self.evaluate(&grants, request, scope))
    }

    /// Decide `request` against a grant snapshot. `scope` is `None` for tools
    /// that need no permission.
    pub fn evaluate(
        &self,
        grants: &GrantSet,
        request: &ActionRequest,
        scope: Option<&PermissionScope>,
    ) -> PermissionCheck {
        let tool_name = request.tool_name.as_str();
        if self.deny_tools.contains(tool_name) {
            return PermissionCheck::denied(format!("tool '{tool_name}' is on the deny list"));
        }

        let Some(scope) = scope else {
            return PermissionCheck::Approved;
        };

        // Commands outside the workspace also need a write grant on their cwd.
        let mut cwd_granted = true;
        let normalized = match scope {
            PermissionScope::Path { path, .. } => {
                let normalized = normalize_path(&self.workspace_root, path);
                if let Some(denied) = self.denied_prefix(&normalized) {
                    return denied;
                }
                Some(normalized)
            }
            PermissionScope::Command { command, cwd } => {
                let cwd = normalize_path(
                    &self.workspace_root,
                    cwd.as_deref().unwrap_or_else(|| Path::new(".")),
                );
                if let Some(denied) = self.denied_prefix(&cwd) {
                    return denied;
                }
                if is_within(&cwd, &self.workspace_root) {
                    if self.safe_commands.allows(command) {
                        return PermissionCheck::Approved;
                    }
                } else {
                    cwd_granted = grants
                        .grants
                        .iter()
                        .any(|grant| grant.covers_path(&cwd, Access::Write));
                }
                Some(cwd)
            }
            PermissionScope::Tool { .. } => None,
        };

        if cwd_granted && grants.covers(tool_name, scope, normalized.as_deref()) {
            return PermissionCheck::Approved;
        }

        if !self.interactive {
            return PermissionCheck::denied("approval required but the gateway is non-interactive");
        }

        let mut suggested_scopes = suggest_scopes(tool_name, scope, normalized.as_deref());
        if !cwd_granted {
            if let Some(cwd) = normalized.as_deref() {
                let at = suggested_scopes.len().saturating_sub(1);
                suggested_scopes.insert(at, GrantScope::path(cwd, Access::Write));
            }
        }
        PermissionCheck::RequiresInteractiveApproval { suggested_scopes }
    }

    fn denied_prefix(&self, path: &Path) -> Option<PermissionCheck> {
        self.deny_paths
            .iter()
            .find(|denied| is_within(path, denied))
            .map(|denied| {
                PermissionCheck::denied(format!(
                    "path '{}' is under denied prefix '{}'",
                    path.display(),
                    denied.display()
                ))
            })
    }

    /// Subscribe to pending prompts.
    pub fn subscribe(&self) -> broadcast::Receiver<PermissionPrompt> {
        self.prompts.subscribe()
    }

    /// Prompts still waiting for a decision
    pub fn pending_prompts(&self) -> Vec<PermissionPrompt> {
        let mut prompts: Vec<PermissionPrompt> =
            self.pending.iter().map(|e| e.value().prompt.clone()).collect();
        prompts.sort_by_key(|p| p.requested_at);
        prompts
    }

    /// Register a pending decision for `request` and publish its prompt.
    pub fn request_decision(
        &self,
        request: &ActionRequest,
        suggested_scopes: Vec<GrantScope>,
    ) -> Result<PendingApproval, GatewayError> {
        let mut state = PermissionState::new();
        state.transition(DecisionState::PendingUserDecision)?;

        let prompt = PermissionPrompt {
            request_id: request.id,
            tool_name: request.tool_name.clone(),
            suggested_scopes,
            requested_at: Utc::now(),
        };
        let (responder, receiver) = oneshot::channel();
        self.pending.insert(
            request.id,
            PendingEntry {
                prompt: prompt.clone(),
                state,
                responder,
            },
        );

        tracing::info!(
            request_id = %request.id,
            tool = %request.tool_name,
            "Permission prompt pending"
        );
        // No subscribers is fine: the prompt stays listed in pending_prompts.
        let _ = self.prompts.send(prompt);

        Ok(PendingApproval::new(
            request.id,
            receiver,
            self.decision_timeout,
            Arc::clone(&self.pending),
        ))
    }

    /// Resolve a pending prompt, granting its narrowest suggested scope on
    /// approval.
    pub async fn decide(
        &self,
        request_id: RequestId,
        decision: Decision,
        expiry: GrantExpiry,
    ) -> Result<(), GatewayError> {
        let scope = self
            .pending
            .get(&request_id)
            .ok_or(GatewayError::NoPendingDecision(request_id))?
            .prompt
            .suggested_scopes
            .first()
            .cloned();

        match scope {
            Some(scope) => self.decide_with_scope(request_id, decision, scope, expiry).await,
            None => self.resolve(request_id, decision),
        }
    }

    /// Resolve a pending prompt, granting `scope` on approval. `scope` must be
    /// one of the prompt's suggestions. Denials are never persisted.
    pub async fn decide_with_scope(
        &self,
        request_id: RequestId,
        decision: Decision,
        scope: GrantScope,
        expiry: GrantExpiry,
    ) -> Result<(), GatewayError> {
        {
            let entry = self
                .pending
                .get(&request_id)
                .ok_or(GatewayError::NoPendingDecision(request_id))?;
            if !entry.prompt.suggested_scopes.contains(&scope) {
                return Err(GatewayError::UnknownScope(request_id));
            }
        }

        if decision == Decision::Approved {
            self.grant(scope, expiry).await?;
        }
        self.resolve(request_id, decision)
    }

    fn resolve(&self, request_id: RequestId, decision: Decision) -> Result<(), GatewayError> {
        let (_, mut entry) = self
            .pending
            .remove(&request_id)
            .ok_or(GatewayError::NoPendingDecision(request_id))?;
        entry.state.transition(decision.into())?;

        tracing::info!(
            request_id = %request_id,
            decision = decision.as_str(),
            "Permission decision recorded"
        );
        // The waiter may have been dropped with its batch.
        let _ = entry.responder.send(decision);
        Ok(())
    }

    /// Add a grant directly.
    pub async fn grant(&self, scope: GrantScope, expiry: GrantExpiry) -> Result<(), GatewayError> {
        let grant = PermissionGrant::new(scope, expiry);
        tracing::debug!(grant = %grant.key(), access = %grant.access, expiry = ?expiry, "Grant added");
        match expiry {
            GrantExpiry::Session => {
                let key = grant.key();
                let keep_existing = self
                    .session
                    .get(&key)
                    .is_some_and(|existing| existing.access.satisfies(grant.access));
                if !keep_existing {
                    self.session.insert(key, grant);
                }
                Ok(())
            }
            GrantExpiry::Permanent => self.store.save(grant).await,
        }
    }

    /// Remove a grant from the session and the store.
    pub async fn revoke(&self, key: &GrantKey) -> Result<bool, GatewayError> {
        let in_session = self.session.remove(key).is_some();
        let in_store = self.store.remove(key).await?;
        if in_session || in_store {
            tracing::info!(grant = %key, "Grant revoked");
        }
        Ok(in_session || in_store)
    }
}

fn suggest_scopes(tool_name: &str, scope: &PermissionScope, path: Option<&Path>) -> Vec<GrantScope> {
    let access = scope.access();
    let mut scopes = Vec::with_capacity(3);
    match scope {
        PermissionScope::Path { .. } => {
            if let Some(path) = path {
                scopes.push(GrantScope::path(path, access));
                if let Some(parent) = path.parent() {
                    scopes.push(GrantScope::path(parent, access));
                }
            }
        }
        PermissionScope::Command { command, .. } => {
            let command = command.trim();
            scopes.push(GrantScope::command(command));
            if let Some(first) = first_token(command).filter(|t| *t != command) {
                scopes.push(GrantScope::command(first));
            }
        }
        PermissionScope::Tool { .. } => {}
    }
    scopes.push(GrantScope::tool(tool_name, access));
    scopes
}
