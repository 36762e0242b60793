// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Listener rule allocation for tenants sharing one load balancer listener.
//!
//! Each tenant owns a block of rule priorities starting just above its
//! priority base. [`allocate_rules`] turns a fixed, ordered list of
//! [`RouteSpec`]s into one [`ListenerRule`] per route with
//! `priority = priority_base + index + 1`, so the most specific route (listed
//! first) is evaluated first by the listener.
//!
//! The allocator itself is pure; it only refuses a block that would run past
//! [`MAX_RULE_PRIORITY`]. Keeping blocks apart is the job of the [`PriorityRegistry`](crate::registry::PriorityRegistry);
//! [`ListenerRuleTable`] reproduces the listener's own duplicate-priority
//! check and its lowest-priority-first dispatch.

use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Highest rule priority a listener accepts.
pub const MAX_RULE_PRIORITY: u32 = 50_000;

/// Header carrying the tenant id on tenant-scoped routes.
pub const TENANT_HEADER: &str = "tenantId";

/// One route a service exposes on the shared listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    /// Logical rule name (e.g. `ListenerRuleUpload`).
    pub name: String,
    /// Path patterns matched by this route.
    pub path_patterns: Vec<String>,
    /// Header whose value must equal the tenant id, if any.
    pub tenant_header: Option<String>,
}

impl RouteSpec {
    /// Route matching `prefix` and everything below it.
    pub fn prefix(name: impl Into<String>, prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            name: name.into(),
            path_patterns: vec![prefix.to_string(), format!("{prefix}/*")],
            tenant_header: None,
        }
    }

    /// Route matching exactly one path pattern.
    pub fn exact(name: impl Into<String>, path: &str) -> Self {
        Self {
            name: name.into(),
            path_patterns: vec![path.to_string()],
            tenant_header: None,
        }
    }

    /// Additionally require `header` to carry the tenant id.
    pub fn with_tenant_header(mut self, header: impl Into<String>) -> Self {
        self.tenant_header = Some(header.into());
        self
    }
}

/// A single match condition on a listener rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "kebab-case")]
pub enum MatchCondition {
    /// HTTP header equals one of `values`.
    HttpHeader {
        /// Header name.
        name: String,
        /// Accepted values.
        values: Vec<String>,
    },
    /// Request path matches one of `patterns` (`*` is a wildcard).
    PathPattern {
        /// Path patterns.
        patterns: Vec<String>,
    },
}

/// Where matched traffic goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleAction {
    /// Forward to a target group.
    Forward {
        /// Opaque target handle.
        target: String,
    },
}

/// A routing rule declared on the shared listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerRule {
    /// Logical rule name, unique within one tenant stack.
    pub name: String,
    /// Evaluation priority, unique across the listener.
    pub priority: u32,
    /// All conditions must match.
    pub conditions: Vec<MatchCondition>,
    /// Action taken on a match.
    pub action: RuleAction,
}

/// Build one listener rule per route, in route order.
///
/// Rule `i` gets priority `priority_base + i + 1`. Tenant-header routes match
/// on `tenant_id`. Callers keep bases at least `routes.len()` apart; nothing
/// here checks that. A block ending above [`MAX_RULE_PRIORITY`] fails with
/// [`CoreError::ValidationError`].
pub fn allocate_rules(
    priority_base: u32,
    tenant_id: &str,
    target: &str,
    routes: &[RouteSpec],
) -> Result<Vec<ListenerRule>, CoreError> {
    let last = u64::from(priority_base) + routes.len() as u64;
    if last > u64::from(MAX_RULE_PRIORITY) {
        return Err(CoreError::validation(
            "priority_base",
            format!(
                "{} routes from base {} end at {}, above the listener ceiling {}",
                routes.len(),
                priority_base,
                last,
                MAX_RULE_PRIORITY
            ),
        ));
    }

    let rules = routes
        .iter()
        .enumerate()
        .map(|(index, route)| {
            let mut conditions = Vec::with_capacity(2);
            if let Some(header) = &route.tenant_header {
                conditions.push(MatchCondition::HttpHeader {
                    name: header.clone(),
                    values: vec![tenant_id.to_string()],
                });
            }
            conditions.push(MatchCondition::PathPattern {
                patterns: route.path_patterns.clone(),
            });

            ListenerRule {
                name: route.name.clone(),
                priority: priority_base + index as u32 + 1,
                conditions,
                action: RuleAction::Forward {
                    target: target.to_string(),
                },
            }
        })
        .collect();
    Ok(rules)
}

/// Priorities [`allocate_rules`] hands out for `route_count` routes.
pub fn priority_span(priority_base: u32, route_count: usize) -> RangeInclusive<u32> {
    let first = priority_base.saturating_add(1);
    let last = priority_base.saturating_add(route_count as u32);
    first..=last
}

/// Incoming request as seen by the listener.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    /// Request path.
    pub path: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
}

impl RouteRequest {
    /// Request for `path` with no headers.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Rules attached to one listener, keyed by priority.
#[derive(Debug, Default)]
pub struct ListenerRuleTable {
    rules: BTreeMap<u32, (String, ListenerRule)>,
}

impl ListenerRuleTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a tenant's rules.
    ///
    /// Either every rule is attached or none is: a priority already taken by
    /// another rule, or one outside `1..=MAX_RULE_PRIORITY`, rejects the
    /// whole batch.
    pub fn attach(&mut self, owner: &str, rules: &[ListenerRule]) -> Result<(), CoreError> {
        let mut seen = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.priority == 0 || rule.priority > MAX_RULE_PRIORITY {
                return Err(CoreError::ValidationError {
                    field: "priority".to_string(),
                    message: format!(
                        "rule '{}' priority {} is outside 1..={}",
                        rule.name, rule.priority, MAX_RULE_PRIORITY
                    ),
                });
            }
            if let Some((holder, _)) = self.rules.get(&rule.priority) {
                return Err(CoreError::PriorityCollision {
                    tenant_id: owner.to_string(),
                    holder: holder.clone(),
                    priority: rule.priority,
                });
            }
            if seen.contains(&rule.priority) {
                return Err(CoreError::PriorityCollision {
                    tenant_id: owner.to_string(),
                    holder: owner.to_string(),
                    priority: rule.priority,
                });
            }
            seen.push(rule.priority);
        }

        for rule in rules {
            self.rules
                .insert(rule.priority, (owner.to_string(), rule.clone()));
        }
        Ok(())
    }

    /// Remove every rule owned by `owner`. Returns how many were removed.
    pub fn detach(&mut self, owner: &str) -> usize {
        let before = self.rules.len();
        self.rules.retain(|_, (holder, _)| holder != owner);
        before - self.rules.len()
    }

    /// First rule, lowest priority first, whose conditions all match.
    pub fn dispatch(&self, request: &RouteRequest) -> Option<&ListenerRule> {
        self.rules
            .values()
            .map(|(_, rule)| rule)
            .find(|rule| rule_matches(rule, request))
    }

    /// Number of attached rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rules are attached.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn rule_matches(rule: &ListenerRule, request: &RouteRequest) -> bool {
    rule.conditions.iter().all(|condition| match condition {
        MatchCondition::HttpHeader { name, values } => request
            .headers
            .get(name)
            .is_some_and(|value| values.iter().any(|v| v == value)),
        MatchCondition::PathPattern { patterns } => patterns
            .iter()
            .any(|pattern| path_matches(pattern, &request.path)),
    })
}

/// Listener-style path matching: `*` matches any run of characters.
fn path_matches(pattern: &str, path: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == path;
    }

    let (first, rest) = (parts[0], &parts[1..]);
    let Some(mut remaining) = path.strip_prefix(first) else {
        return false;
    };
    for (i, part) in rest.iter().enumerate() {
        let last = i == rest.len() - 1;
        if last {
            return remaining.ends_with(part);
        }
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    true
}
