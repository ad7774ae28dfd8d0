//! Ordered request stages evaluated after a credential has been resolved
//!
//! Each stage sees the same immutable [`RequestContext`] and may end the
//! request by returning an error. Stages run in insertion order and the
//! first error wins.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::auth::principal::{ClientMetadata, Principal};
use crate::auth::rbac::{authorize, Decision};
use crate::auth::user::{Permission, Role};
use crate::error::{Result, RustyGuardError};

/// Everything a stage may inspect about the current request
#[derive(Debug)]
pub struct RequestContext<'a> {
    pub principal: &'a Principal,
    /// Role definitions resolved from the principal's role names
    pub roles: &'a [Role],
    pub required: &'a BTreeSet<Permission>,
    pub metadata: &'a ClientMetadata,
}

/// One step of request admission
pub trait RequestStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &RequestContext<'_>) -> Result<()>;
}

/// Delegates to the RBAC authorizer
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionStage;

impl RequestStage for PermissionStage {
    fn name(&self) -> &'static str {
        "permission"
    }

    fn evaluate(&self, ctx: &RequestContext<'_>) -> Result<()> {
        match authorize(ctx.roles, ctx.required) {
            Decision::Allowed => Ok(()),
            Decision::Denied { missing } if ctx.roles.is_empty() => Err(RustyGuardError::PermissionDenied(
                format!("no recognised role (missing {})", join(&missing)),
            )),
            Decision::Denied { missing } => Err(RustyGuardError::PermissionDenied(format!(
                "missing permissions: {}",
                join(&missing)
            ))),
        }
    }
}

fn join(permissions: &BTreeSet<Permission>) -> String {
    permissions
        .iter()
        .map(Permission::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rejects bearer tokens that are not bound to a session
#[derive(Debug, Default, Clone, Copy)]
pub struct RequireSessionStage;

impl RequestStage for RequireSessionStage {
    fn name(&self) -> &'static str {
        "require-session"
    }

    fn evaluate(&self, ctx: &RequestContext<'_>) -> Result<()> {
        if ctx.principal.session_id().is_some() {
            Ok(())
        } else {
            Err(RustyGuardError::TokenInvalid)
        }
    }
}

/// Stage built from a closure
pub struct FnStage<F> {
    name: &'static str,
    check: F,
}

impl<F> FnStage<F>
where
    F: Fn(&RequestContext<'_>) -> Result<()> + Send + Sync,
{
    pub fn new(name: &'static str, check: F) -> Self {
        Self { name, check }
    }
}

impl<F> RequestStage for FnStage<F>
where
    F: Fn(&RequestContext<'_>) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn evaluate(&self, ctx: &RequestContext<'_>) -> Result<()> {
        (self.check)(ctx)
    }
}

/// Ordered list of stages
#[derive(Clone)]
pub struct RequestPipeline {
    stages: Vec<Arc<dyn RequestStage>>,
}

impl RequestPipeline {
    /// Pipeline with no stages. Admits everything; use with care.
    pub fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn with_stage<S: RequestStage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage in order, stopping at the first failure
    pub fn run(&self, ctx: &RequestContext<'_>) -> Result<()> {
        for stage in &self.stages {
            if let Err(e) = stage.evaluate(ctx) {
                log::debug!("Request stage '{}' rejected user {}: {}", stage.name(), ctx.principal.user_id, e);
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Default for RequestPipeline {
    /// Permission check only
    fn default() -> Self {
        Self::empty().with_stage(PermissionStage)
    }
}
