//! gliff SDK - Session
//!
//! Owns the authenticated store handle and the currently bound project.

use log::{info, warn};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::config::SdkConfig;
use crate::error::{GliffError, GliffResult};
use crate::store::{Collection, StoreAccount, StoreClient};

/// Cached handles for one project of one account
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub(crate) account: String,
    pub(crate) uid: String,
    pub(crate) collection: Collection,
}

impl ProjectContext {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Collection as last fetched or committed
    pub fn collection(&self) -> &Collection {
        &self.collection
    }
}

/// Outcome of accepting pending invitations
#[derive(Debug, Clone, Default, Serialize)]
pub struct InvitationReport {
    pub total: usize,
    /// Collection uids joined
    pub accepted: Vec<String>,
    /// (invitation uid, error)
    pub failed: Vec<(String, String)>,
}

impl InvitationReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Logged-in session against the project store
pub struct Session<A: StoreAccount> {
    account: A,
    config: SdkConfig,
    context: Option<ProjectContext>,
    invitations: InvitationReport,
}

/// One bound project, borrowed from its session.
///
/// Gallery and item operations are methods on this type.
pub struct Project<'s, A: StoreAccount> {
    pub(crate) account: &'s A,
    pub(crate) context: &'s mut ProjectContext,
    pub(crate) config: &'s SdkConfig,
}

impl<A: StoreAccount> Session<A> {
    // ═══════════════════════════════════════════════════════════════════════
    // LOGIN / LOGOUT
    // ═══════════════════════════════════════════════════════════════════════

    /// Log in and accept every pending invitation
    pub fn login<C>(client: &C, config: SdkConfig) -> GliffResult<Self>
    where
        C: StoreClient<Account = A>,
    {
        config.validate()?;

        info!("logging in to store at {}...", config.server_url);
        let account = client.login(
            &config.server_url,
            &config.client_name,
            &config.username,
            config.password.expose_secret(),
        )?;
        info!("logged in to store as {}", account.username());

        let mut session = Self::with_account(account, config);
        session.invitations = session.accept_pending_invitations()?;
        Ok(session)
    }

    /// Wrap an already authenticated account
    pub fn with_account(account: A, config: SdkConfig) -> Self {
        Self {
            account,
            config,
            context: None,
            invitations: InvitationReport::default(),
        }
    }

    /// Log out, releasing the store handle
    pub fn logout(mut self) -> GliffResult<()> {
        info!("logging out...");
        self.context = None;
        self.account.logout()?;
        info!("logged out");
        Ok(())
    }

    pub fn account(&self) -> &A {
        &self.account
    }

    pub fn username(&self) -> &str {
        self.account.username()
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Invitations handled during login
    pub fn invitation_report(&self) -> &InvitationReport {
        &self.invitations
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INVITATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Accept all pending invitations to shared projects.
    ///
    /// A failing invitation is recorded in the report and the rest are
    /// still accepted.
    pub fn accept_pending_invitations(&self) -> GliffResult<InvitationReport> {
        let invitations = self.account.list_incoming_invitations()?;
        info!("{} pending invitation(s)", invitations.len());

        let mut report = InvitationReport {
            total: invitations.len(),
            ..Default::default()
        };

        for invitation in &invitations {
            match self.account.accept_invitation(invitation) {
                Ok(()) => {
                    info!(
                        "accepted invitation from {} to project {}",
                        invitation.from_username, invitation.collection_uid
                    );
                    report.accepted.push(invitation.collection_uid.clone());
                }
                Err(e) => {
                    warn!("could not accept invitation {}: {}", invitation.uid, e);
                    report.failed.push((invitation.uid.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PROJECT CONTEXT
    // ═══════════════════════════════════════════════════════════════════════

    /// Bind the session to a project, fetching it unless already bound
    pub fn bind(&mut self, project_uid: &str) -> GliffResult<&ProjectContext> {
        let cached = matches!(
            &self.context,
            Some(ctx) if ctx.uid == project_uid && ctx.account == self.account.username()
        );

        if !cached {
            info!("fetching collection {}...", project_uid);
            let collection = self.account.fetch_collection(project_uid)?;
            info!("fetched collection {}", project_uid);

            self.context = Some(ProjectContext {
                account: self.account.username().to_string(),
                uid: project_uid.to_string(),
                collection,
            });
        }

        self.context.as_ref().ok_or(GliffError::NotBound)
    }

    /// Currently bound project, if any
    pub fn bound(&self) -> Option<&ProjectContext> {
        self.context.as_ref()
    }

    /// Bind `project_uid` and borrow it for gallery and item operations
    pub fn project(&mut self, project_uid: &str) -> GliffResult<Project<'_, A>> {
        self.bind(project_uid)?;
        let context = self.context.as_mut().ok_or(GliffError::NotBound)?;

        Ok(Project {
            account: &self.account,
            context,
            config: &self.config,
        })
    }

    /// Remove this account from a project's members
    pub fn leave(&mut self, project_uid: &str) -> GliffResult<()> {
        info!("leaving collection {}...", project_uid);

        let collection = match &self.context {
            Some(ctx) if ctx.uid == project_uid => ctx.collection.clone(),
            _ => self.account.fetch_collection(project_uid)?,
        };
        self.account.leave_collection(&collection)?;

        if self.context.as_ref().map(|c| c.uid.as_str()) == Some(project_uid) {
            self.context = None;
        }

        info!("left collection {}", project_uid);
        Ok(())
    }
}

impl<'s, A: StoreAccount> Project<'s, A> {
    pub fn uid(&self) -> &str {
        &self.context.uid
    }

    pub fn context(&self) -> &ProjectContext {
        &*self.context
    }

    /// Re-fetch the collection, replacing the cached copy
    pub fn refresh(&mut self) -> GliffResult<()> {
        self.context.collection = self.account.fetch_collection(&self.context.uid)?;
        Ok(())
    }
}
