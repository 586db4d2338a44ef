use serde::{Deserialize, Serialize};

use crate::ResourceKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRule {
    pub keyword: String,
    pub kind: ResourceKind,
}

impl ResourceRule {
    pub fn new(keyword: &str, kind: ResourceKind) -> Self {
        Self {
            keyword: keyword.trim_matches('/').to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ResourceKind,
    pub resource_id: Option<String>,
}

/// Maps request paths to resource kinds through a fixed keyword table.
///
/// A rule matches when its keyword is a whole segment of the path; rules are
/// tried in declaration order. The resource id is the last path segment
/// unless that segment is itself a known keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceClassifier {
    rules: Vec<ResourceRule>,
}

impl ResourceClassifier {
    pub fn new(rules: Vec<ResourceRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| ResourceRule::new(&rule.keyword, rule.kind))
            .filter(|rule| !rule.keyword.is_empty())
            .collect();
        Self { rules }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_rules())
    }

    pub fn rules(&self) -> &[ResourceRule] {
        &self.rules
    }

    pub fn classify(&self, path: &str) -> Classification {
        let kind = self
            .rules
            .iter()
            .find(|rule| segments(path).any(|segment| segment == rule.keyword))
            .map_or(ResourceKind::Unknown, |rule| rule.kind);
        self.classify_as(kind, path)
    }

    /// Classification for a route whose kind was fixed when it was registered.
    pub fn classify_as(&self, kind: ResourceKind, path: &str) -> Classification {
        Classification {
            kind,
            resource_id: self.resource_id(path),
        }
    }

    pub fn resource_id(&self, path: &str) -> Option<String> {
        let last = segments(path).last()?;
        if self.rules.iter().any(|rule| rule.keyword == last) {
            return None;
        }
        Some(last.to_string())
    }
}

impl Default for ResourceClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn builtin_rules() -> Vec<ResourceRule> {
    vec![
        ResourceRule::new("users", ResourceKind::User),
        ResourceRule::new("system", ResourceKind::System),
        ResourceRule::new("config", ResourceKind::Config),
        ResourceRule::new("broadcasts", ResourceKind::Broadcast),
        ResourceRule::new("audit", ResourceKind::AuditLog),
    ]
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{ResourceClassifier, ResourceRule};
    use crate::ResourceKind;

    #[test]
    fn classifies_builtin_resources() {
        let classifier = ResourceClassifier::builtin();

        let users = classifier.classify("/users/42");
        assert_eq!(users.kind, ResourceKind::User);
        assert_eq!(users.resource_id.as_deref(), Some("42"));

        let broadcasts = classifier.classify("/api/v1/admin/broadcasts");
        assert_eq!(broadcasts.kind, ResourceKind::Broadcast);
        assert_eq!(broadcasts.resource_id, None);

        assert_eq!(
            classifier.classify("/api/v1/admin/audit/9").kind,
            ResourceKind::AuditLog
        );
    }

    #[test]
    fn matches_whole_segments_only() {
        let classifier = ResourceClassifier::builtin();
        let result = classifier.classify("/superusers/3");
        assert_eq!(result.kind, ResourceKind::Unknown);
        assert_eq!(result.resource_id.as_deref(), Some("3"));
    }

    #[test]
    fn earlier_rule_wins_when_several_segments_match() {
        let classifier = ResourceClassifier::builtin();
        let result = classifier.classify("/config/users/7");
        assert_eq!(result.kind, ResourceKind::User);
        assert_eq!(result.resource_id.as_deref(), Some("7"));
    }

    #[test]
    fn root_path_has_no_resource_id() {
        let classifier = ResourceClassifier::builtin();
        let result = classifier.classify("/");
        assert_eq!(result.kind, ResourceKind::Unknown);
        assert_eq!(result.resource_id, None);
    }

    #[test]
    fn custom_rules_are_normalized() {
        let classifier = ResourceClassifier::new(vec![
            ResourceRule {
                keyword: "/flavors/".to_string(),
                kind: ResourceKind::Config,
            },
            ResourceRule {
                keyword: "/".to_string(),
                kind: ResourceKind::System,
            },
        ]);
        assert_eq!(classifier.rules().len(), 1);
        assert_eq!(classifier.classify("/flavors/vanilla").kind, ResourceKind::Config);
    }

    #[test]
    fn pinned_kind_still_extracts_id() {
        let classifier = ResourceClassifier::builtin();
        let result = classifier.classify_as(ResourceKind::System, "/maintenance/17");
        assert_eq!(result.kind, ResourceKind::System);
        assert_eq!(result.resource_id.as_deref(), Some("17"));
    }
}
