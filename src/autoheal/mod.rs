//! Keyword rules proposing a remediation action for an incident description.
//!
//! Plans only echo the command they would run; nothing here executes it.

#[cfg(test)]
mod tests;

use std::fmt;

use serde::Serialize;
use tracing::debug;

pub const DEFAULT_TARGET: &str = "service_x";

const SERVICE_PLACEHOLDER: &str = "{service}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealAction {
    ScaleUp,
    RestartService,
    ClearCache,
    ResetPassword,
    EngineerInvestigation,
}

impl HealAction {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScaleUp => "scale_up",
            Self::RestartService => "restart_service",
            Self::ClearCache => "clear_cache",
            Self::ResetPassword => "reset_password",
            Self::EngineerInvestigation => "engineer_investigation",
        }
    }

    /// Command template, with `{service}` standing for the target
    #[inline]
    pub fn command_template(self) -> &'static str {
        match self {
            Self::ScaleUp => "kubectl scale deployment {service} --replicas=5",
            Self::RestartService => "systemctl restart {service}",
            Self::ClearCache => "rm -rf /tmp/cache/*",
            Self::ResetPassword => "Resetting password for user...",
            Self::EngineerInvestigation => "Manual investigation ticket created.",
        }
    }
}

impl fmt::Display for HealAction {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proposed action and the command it would run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealPlan {
    pub action: HealAction,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    keywords: Vec<String>,
    action: HealAction,
}

/// Ordered keyword rules; the first rule with a matching keyword wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<Rule>,
    fallback: HealAction,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new(HealAction::EngineerInvestigation)
            .with_rule(&["latency", "slow"], HealAction::ScaleUp)
            .with_rule(&["down", "crash"], HealAction::RestartService)
            .with_rule(&["disk", "full"], HealAction::ClearCache)
            .with_rule(&["login", "password"], HealAction::ResetPassword)
    }
}

impl RuleTable {
    /// An empty table answering `fallback` for every description
    #[inline]
    pub fn new(fallback: HealAction) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    #[inline]
    pub fn with_rule(mut self, keywords: &[&str], action: HealAction) -> Self {
        self.rules.push(Rule {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            action,
        });
        self
    }

    /// Case-insensitive substring match against each rule in order
    #[inline]
    pub fn determine_action(&self, description: &str) -> HealAction {
        let description = description.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| description.contains(k.as_str())))
            .map_or(self.fallback, |rule| rule.action)
    }

    #[inline]
    pub fn plan(&self, description: &str, target: Option<&str>) -> HealPlan {
        let action = self.determine_action(description);
        let target = target
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TARGET);
        let command = action.command_template().replace(SERVICE_PLACEHOLDER, target);

        debug!("Proposed {} for incident: {}", action, command);
        HealPlan { action, command }
    }
}
