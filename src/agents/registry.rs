//! Agent capability registry.
//!
//! Provides:
//! - Registration and idempotent removal of agents at runtime
//! - Lookup by id and lazy listing by capability tag
//! - Liveness tracking (dead agents stay registered but are never routed to)
//! - The agent summary embedded in the classifier's system prompt
//!
//! The registry keeps its state in an `Arc<RegistrySnapshot>` behind an
//! `RwLock`. Writers are serialized by the lock and replace the snapshot
//! copy-on-write, so a snapshot taken by a reader is never modified.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use super::errors::RegistryError;
use super::types::{is_reserved_agent_id, normalize_agent_id, AgentDescriptor};

// ─── RegistrySnapshot ────────────────────────────────────────────────────────

/// An immutable view of every registered agent, in registration order.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    agents: Vec<AgentDescriptor>,
    /// `id → position in agents`.
    index: HashMap<String, usize>,
}

impl RegistrySnapshot {
    /// Look up an agent. Ids match in any case or surrounding whitespace.
    pub fn get(&self, id: &str) -> Option<&AgentDescriptor> {
        self.position(id).map(|i| &self.agents[i])
    }

    /// Look up an agent by id.
    pub fn find(&self, id: &str) -> Result<&AgentDescriptor, RegistryError> {
        self.get(id).ok_or_else(|| RegistryError::UnknownAgent { id: id.to_string() })
    }

    /// Registered and live.
    pub fn is_live(&self, id: &str) -> bool {
        self.get(id).map(|d| d.live).unwrap_or(false)
    }

    /// All agents in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.iter()
    }

    /// Every registered id, live or not.
    pub fn ids(&self) -> Vec<&str> {
        self.agents.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Prompt text describing the live agents, one per line.
    ///
    /// Dead agents are left out so the model is never offered them.
    pub fn capability_summary(&self) -> String {
        let lines: Vec<String> = self
            .agents
            .iter()
            .filter(|d| d.live)
            .map(|d| {
                if d.capabilities.is_empty() {
                    format!("- {}: {}", d.id, d.description)
                } else {
                    let tags: Vec<&str> = d.capabilities.iter().map(String::as_str).collect();
                    format!("- {}: {} (handles: {})", d.id, d.description, tags.join(", "))
                }
            })
            .collect();

        if lines.is_empty() {
            return "No agents are currently available.".to_string();
        }
        lines.join("\n")
    }

    fn position(&self, id: &str) -> Option<usize> {
        match self.index.get(id) {
            Some(&pos) => Some(pos),
            None => self.index.get(&normalize_agent_id(id)).copied(),
        }
    }

    /// Expects a descriptor already passed through [`canonical`].
    fn insert(&mut self, descriptor: AgentDescriptor) -> Result<(), RegistryError> {
        if self.index.contains_key(&descriptor.id) {
            return Err(RegistryError::DuplicateAgent { id: descriptor.id });
        }
        self.index.insert(descriptor.id.clone(), self.agents.len());
        self.agents.push(descriptor);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        self.index.remove(&self.agents[pos].id);
        self.agents.remove(pos);
        for i in self.index.values_mut() {
            if *i > pos {
                *i -= 1;
            }
        }
        true
    }
}

// ─── CapabilityMatches ───────────────────────────────────────────────────────

/// Lazy iterator over agents declaring a capability tag.
///
/// Owns the snapshot it was created from, so registrations made while
/// iterating are not observed. Clone it (or call [`Self::rewind`]) to walk
/// the same sequence again.
#[derive(Debug, Clone)]
pub struct CapabilityMatches {
    snapshot: Arc<RegistrySnapshot>,
    tag: String,
    cursor: usize,
}

impl CapabilityMatches {
    /// Restart from the first match.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl Iterator for CapabilityMatches {
    type Item = AgentDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(descriptor) = self.snapshot.agents.get(self.cursor) {
            self.cursor += 1;
            if descriptor.has_capability(&self.tag) {
                return Some(descriptor.clone());
            }
        }
        None
    }
}

// ─── AgentRegistry ───────────────────────────────────────────────────────────

/// Thread-safe registry of agents and their capabilities.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    state: RwLock<Arc<RegistrySnapshot>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from a list of descriptors.
    ///
    /// Fails on the first duplicate id.
    pub fn with_agents<I>(agents: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = AgentDescriptor>,
    {
        let registry = Self::new();
        for agent in agents {
            registry.register(agent)?;
        }
        Ok(registry)
    }

    /// Add an agent under its normalized id.
    ///
    /// Fails with `InvalidAgentId` for empty or reserved ids and with
    /// `DuplicateAgent` if the id is taken.
    pub fn register(&self, descriptor: AgentDescriptor) -> Result<(), RegistryError> {
        let descriptor = canonical(descriptor)?;
        let mut guard = self.write();
        if guard.index.contains_key(&descriptor.id) {
            return Err(RegistryError::DuplicateAgent { id: descriptor.id });
        }
        let id = descriptor.id.clone();
        Arc::make_mut(&mut guard).insert(descriptor)?;
        tracing::info!(agent = %id, total = guard.len(), "agent registered");
        Ok(())
    }

    /// Remove an agent. Returns whether it was registered.
    pub fn unregister(&self, id: &str) -> bool {
        let mut guard = self.write();
        if guard.position(id).is_none() {
            return false;
        }
        let removed = Arc::make_mut(&mut guard).remove(id);
        tracing::info!(agent = %id, total = guard.len(), "agent unregistered");
        removed
    }

    /// Look up an agent by id.
    pub fn find(&self, id: &str) -> Result<AgentDescriptor, RegistryError> {
        self.snapshot().find(id).cloned()
    }

    /// Mark an agent live or dead.
    pub fn set_liveness(&self, id: &str, live: bool) -> Result<(), RegistryError> {
        let mut guard = self.write();
        let pos = guard
            .position(id)
            .ok_or_else(|| RegistryError::UnknownAgent { id: id.to_string() })?;
        if guard.agents[pos].live != live {
            Arc::make_mut(&mut guard).agents[pos].live = live;
            tracing::info!(agent = %id, live, "agent liveness changed");
        }
        Ok(())
    }

    /// Agents declaring `tag`, in registration order, over a snapshot taken now.
    pub fn list_by_capability(&self, tag: &str) -> CapabilityMatches {
        CapabilityMatches {
            snapshot: self.snapshot(),
            tag: tag.to_string(),
            cursor: 0,
        }
    }

    /// A consistent view of the registry.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<RegistrySnapshot>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Normalize a descriptor's id, rejecting ids the router could never
/// dispatch to.
fn canonical(mut descriptor: AgentDescriptor) -> Result<AgentDescriptor, RegistryError> {
    let id = normalize_agent_id(&descriptor.id);
    if id.is_empty() || is_reserved_agent_id(&id) {
        return Err(RegistryError::InvalidAgentId { id: descriptor.id });
    }
    descriptor.id = id;
    Ok(descriptor)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
