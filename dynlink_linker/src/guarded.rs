//! Guarded invocations.

use crate::error::LinkResult;
use crate::guard::{Guard, SwitchPoint};
use crate::invocation::Invocation;
use crate::method_type::MethodType;
use crate::services::LinkerServices;
use smallvec::SmallVec;
use dynlink_runtime::Value;

/// A dispatch target with the conditions under which it stays valid.
#[derive(Debug, Clone)]
pub struct GuardedInvocation {
    invocation: Invocation,
    /// `None` means always valid.
    guard: Option<Guard>,
    switch_points: SmallVec<[SwitchPoint; 1]>,
    /// Used by a call site instead of relinking when the guard fails.
    fallback: Option<Invocation>,
}

impl GuardedInvocation {
    pub fn new(invocation: Invocation, guard: Option<Guard>) -> Self {
        Self {
            invocation,
            guard,
            switch_points: SmallVec::new(),
            fallback: None,
        }
    }

    pub fn guarded(invocation: Invocation, guard: Guard) -> Self {
        Self::new(invocation, Some(guard))
    }

    pub fn unguarded(invocation: Invocation) -> Self {
        Self::new(invocation, None)
    }

    pub fn with_switch_point(mut self, switch_point: SwitchPoint) -> Self {
        self.switch_points.push(switch_point);
        self
    }

    pub fn with_fallback(mut self, fallback: Invocation) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[inline]
    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    #[inline]
    pub fn guard(&self) -> Option<&Guard> {
        self.guard.as_ref()
    }

    #[inline]
    pub fn fallback(&self) -> Option<&Invocation> {
        self.fallback.as_ref()
    }

    #[inline]
    pub fn switch_points(&self) -> &[SwitchPoint] {
        &self.switch_points
    }

    /// Check if the target is unconditionally valid.
    pub fn is_unguarded(&self) -> bool {
        self.guard.is_none() && self.switch_points.is_empty()
    }

    /// Check if any switch point has been invalidated.
    pub fn has_been_invalidated(&self) -> bool {
        self.switch_points.iter().any(|sp| !sp.is_valid())
    }

    /// Check if the target may be used for `args`.
    #[inline]
    pub fn is_valid_for(&self, args: &[Value]) -> bool {
        !self.has_been_invalidated() && self.guard.as_ref().is_none_or(|g| g.test(args))
    }

    /// The guard and every switch point folded into one guard.
    pub fn effective_guard(&self) -> Option<Guard> {
        self.switch_points
            .iter()
            .fold(self.guard.clone(), |acc, sp| {
                Some(Guard::and_optional(acc, Guard::SwitchPoint(sp.clone())))
            })
    }

    /// Replace the target, keeping guard, switch points and fallback.
    pub fn replace_invocation(&self, invocation: Invocation) -> Self {
        Self {
            invocation,
            ..self.clone()
        }
    }

    /// Add a guard conjunct.
    pub fn add_guard(self, guard: Guard) -> Self {
        Self {
            guard: Some(Guard::and_optional(self.guard, guard)),
            ..self
        }
    }

    /// Adapt target and fallback to `method_type` through the converter
    /// factory.
    pub fn as_type(&self, services: &LinkerServices, method_type: &MethodType) -> LinkResult<Self> {
        let invocation = services.as_type(&self.invocation, method_type)?;
        let fallback = self
            .fallback
            .as_ref()
            .map(|f| services.as_type(f, method_type))
            .transpose()?;
        Ok(Self {
            invocation,
            guard: self.guard.clone(),
            switch_points: self.switch_points.clone(),
            fallback,
        })
    }

    /// A single invocation that runs the target when valid and `fallback`
    /// otherwise.
    pub fn compose(&self, fallback: &Invocation) -> LinkResult<Invocation> {
        match self.effective_guard() {
            None => Ok(self.invocation.clone()),
            Some(guard) => Invocation::guard_with_test(guard, &self.invocation, fallback),
        }
    }
}
