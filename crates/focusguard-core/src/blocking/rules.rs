use serde::{Deserialize, Serialize};

pub const DEFAULT_REDIRECT_PATH: &str = "/public/intervention.html";

const RULE_PRIORITY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub extension_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    Redirect { redirect: Redirect },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

/// One redirect rule, serialized in the browser's declarative
/// net-request shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl BlockingRule {
    pub fn redirect(id: u32, site: &str, redirect_path: &str) -> Self {
        Self {
            id,
            priority: RULE_PRIORITY,
            action: RuleAction::Redirect {
                redirect: Redirect {
                    extension_path: format!(
                        "{redirect_path}?site={}",
                        urlencoding::encode(site)
                    ),
                },
            },
            condition: RuleCondition {
                url_filter: format!("*://*.{site}/*"),
                resource_types: vec![ResourceType::MainFrame],
            },
        }
    }

    /// The blocked site this rule matches, recovered from the URL filter.
    pub fn site(&self) -> Option<&str> {
        self.condition
            .url_filter
            .strip_prefix("*://*.")?
            .strip_suffix("/*")
    }

    pub fn redirect_target(&self) -> &str {
        match &self.action {
            RuleAction::Redirect { redirect } => &redirect.extension_path,
        }
    }
}

/// Rules for `blocked` when `focus_active`, else none. Ids are `1..=N` in
/// list order and reassigned from scratch on every call.
pub fn generate_rules(
    blocked: &[String],
    focus_active: bool,
    redirect_path: &str,
) -> Vec<BlockingRule> {
    if !focus_active {
        return Vec::new();
    }
    (1u32..)
        .zip(blocked)
        .map(|(id, site)| BlockingRule::redirect(id, site, redirect_path))
        .collect()
}

/// An installed rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<BlockingRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<BlockingRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[BlockingRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Rule whose site equals the destination host or one of its parent
    /// domains. Accepts a full URL or a bare host.
    pub fn match_destination(&self, url_or_host: &str) -> Option<&BlockingRule> {
        let host = destination_host(url_or_host)?;
        self.rules.iter().find(|rule| {
            rule.site().is_some_and(|site| {
                host == site
                    || host
                        .strip_suffix(site)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
        })
    }
}

fn destination_host(url_or_host: &str) -> Option<String> {
    let trimmed = url_or_host.trim();
    let host = if trimmed.contains("://") {
        url::Url::parse(trimmed).ok()?.host_str()?.to_string()
    } else {
        trimmed
            .split(['/', '?', '#', ':'])
            .next()
            .unwrap_or_default()
            .to_string()
    };
    let host = host.to_ascii_lowercase();
    (!host.is_empty()).then_some(host)
}
