//! Access policy
//!
//! Every service entry point asks an `Enforcer` before touching the store
//! or the network. The decision itself lives outside the service.

use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, ServiceError};
use keel_core::normalize;

/// Resource name for repository registrations
pub const RESOURCE_REPOSITORIES: &str = "repositories";

/// Identity of the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub groups: Vec<String>,
}

impl Claims {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = String>) -> Self {
        self.groups.extend(groups);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Get,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy decision point
pub trait Enforcer: Send + Sync {
    fn enforce(&self, claims: &Claims, resource: &str, action: Action, object: &str) -> bool;

    /// Fail-closed variant returning `PermissionDenied`
    fn enforce_err(&self, claims: &Claims, resource: &str, action: Action, object: &str) -> Result<()> {
        if self.enforce(claims, resource, action, object) {
            Ok(())
        } else {
            tracing::debug!(subject = %claims.subject, %action, object, "permission denied");
            Err(ServiceError::PermissionDenied {
                action: action.to_string(),
                resource: resource.to_string(),
                object: object.to_string(),
            })
        }
    }
}

/// Permits everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Enforcer for AllowAll {
    fn enforce(&self, _claims: &Claims, _resource: &str, _action: Action, _object: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

/// One rule of a policy file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Subjects the rule applies to (`*` for anyone)
    #[serde(default)]
    pub subjects: Vec<String>,

    /// Groups the rule applies to
    #[serde(default)]
    pub groups: Vec<String>,

    /// Actions by name (`*` for all)
    pub actions: Vec<String>,

    /// Resource names (defaults to every resource)
    #[serde(default = "any")]
    pub resources: Vec<String>,

    /// Glob patterns over the object, for repositories its URL. Patterns
    /// also match every other spelling of the same location.
    #[serde(default = "any")]
    pub objects: Vec<String>,

    #[serde(default)]
    pub effect: Effect,
}

fn any() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    rules: Vec<PolicyRule>,
}

/// Request object in its given and normalized forms
struct Object<'a> {
    raw: &'a str,
    normalized: &'a str,
}

/// A pattern plus its normalized form when that parses as a location
fn object_patterns(pattern: &str) -> Result<Vec<Pattern>> {
    let compile = |p: &str| {
        Pattern::new(p).map_err(|e| ServiceError::Validation {
            message: format!("invalid policy object pattern '{}': {}", p, e),
        })
    };
    let mut patterns = vec![compile(pattern)?];
    let normalized = normalize(pattern);
    if !normalized.is_empty() && normalized != pattern {
        patterns.extend(Pattern::new(&normalized).ok());
    }
    Ok(patterns)
}

struct CompiledRule {
    rule: PolicyRule,
    objects: Vec<Pattern>,
}

impl CompiledRule {
    fn matches(&self, claims: &Claims, resource: &str, action: Action, object: &Object<'_>) -> bool {
        let rule = &self.rule;
        let who = rule.subjects.iter().any(|s| s == "*" || *s == claims.subject)
            || rule.groups.iter().any(|g| claims.groups.contains(g));
        who && rule.actions.iter().any(|a| a == "*" || a == action.as_str())
            && rule.resources.iter().any(|r| r == "*" || r == resource)
            && self.objects.iter().any(|p| p.matches(object.raw) || p.matches(object.normalized))
    }
}

/// Rule-based policy loaded from YAML.
///
/// A request is allowed when some `allow` rule matches and no `deny` rule
/// does. With no matching rule the request is denied.
pub struct RuleEnforcer {
    rules: Vec<CompiledRule>,
}

impl RuleEnforcer {
    /// File name inside the config directory
    pub const FILE_NAME: &'static str = "policy.yaml";

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: PolicyFile = serde_yaml::from_str(yaml).map_err(|e| ServiceError::Validation {
            message: format!("invalid policy: {}", e),
        })?;
        Self::from_rules(file.rules)
    }

    pub fn from_rules(rules: Vec<PolicyRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let objects = rule
                    .objects
                    .iter()
                    .map(|o| object_patterns(o.as_str()))
                    .collect::<Result<Vec<_>>>()?
                    .concat();
                Ok(CompiledRule { rule, objects })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Enforcer for RuleEnforcer {
    fn enforce(&self, claims: &Claims, resource: &str, action: Action, object: &str) -> bool {
        let normalized = normalize(object);
        let object = Object {
            raw: object,
            normalized: &normalized,
        };
        let mut allowed = false;
        for rule in &self.rules {
            if !rule.matches(claims, resource, action, &object) {
                continue;
            }
            match rule.rule.effect {
                Effect::Deny => return false,
                Effect::Allow => allowed = true,
            }
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = r#"
rules:
  - subjects: ["*"]
    actions: [get]
  - groups: [platform]
    actions: ["*"]
    resources: [repositories]
    objects: ["https://github.com/acme/*"]
  - subjects: [intern]
    actions: [get]
    objects: ["https://github.com/acme/secrets*"]
    effect: deny
"#;

    #[test]
    fn test_allow_all() {
        let claims = Claims::new("anyone");
        assert!(AllowAll.enforce(&claims, RESOURCE_REPOSITORIES, Action::Delete, "x"));
        assert!(AllowAll.enforce_err(&claims, RESOURCE_REPOSITORIES, Action::Delete, "x").is_ok());
    }

    #[test]
    fn test_rules() {
        let policy = RuleEnforcer::from_yaml(POLICY).unwrap();
        assert_eq!(policy.len(), 3);

        let dev = Claims::new("dev");
        let platform = Claims::new("ops").with_groups(["platform".to_string()]);
        let intern = Claims::new("intern");
        let repo = "https://github.com/acme/app";

        assert!(policy.enforce(&dev, RESOURCE_REPOSITORIES, Action::Get, repo));
        assert!(!policy.enforce(&dev, RESOURCE_REPOSITORIES, Action::Create, repo));
        assert!(policy.enforce(&platform, RESOURCE_REPOSITORIES, Action::Create, repo));
        assert!(!policy.enforce(
            &platform,
            RESOURCE_REPOSITORIES,
            Action::Create,
            "https://gitlab.com/other/app"
        ));
        assert!(!policy.enforce(
            &intern,
            RESOURCE_REPOSITORIES,
            Action::Get,
            "https://github.com/acme/secrets"
        ));
    }

    #[test]
    fn test_deny_covers_other_spellings() {
        let policy = RuleEnforcer::from_yaml(POLICY).unwrap();
        let intern = Claims::new("intern");
        for spelling in [
            "https://github.com/acme/secrets",
            "HTTPS://GITHUB.COM/acme/secrets",
            "https://github.com/Acme/Secrets.git",
            " https://github.com/acme/secrets ",
        ] {
            assert!(
                !policy.enforce(&intern, RESOURCE_REPOSITORIES, Action::Get, spelling),
                "{} should be denied",
                spelling
            );
        }

        let platform = Claims::new("ops").with_groups(["platform".to_string()]);
        assert!(policy.enforce(
            &platform,
            RESOURCE_REPOSITORIES,
            Action::Delete,
            "HTTPS://GITHUB.COM/ACME/app.git"
        ));
    }

    #[test]
    fn test_fail_closed() {
        let policy = RuleEnforcer::from_yaml("rules: []").unwrap();
        let err = policy
            .enforce_err(&Claims::new("dev"), RESOURCE_REPOSITORIES, Action::Get, "repo")
            .unwrap_err();
        assert_eq!(err.code(), "PermissionDenied");
        assert_eq!(err.to_string(), "permission denied: get repositories/repo");
    }

    #[test]
    fn test_invalid_pattern() {
        let yaml = "rules:\n  - subjects: ['*']\n    actions: [get]\n    objects: ['[']\n";
        assert!(RuleEnforcer::from_yaml(yaml).is_err());
    }
}
