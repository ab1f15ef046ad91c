//! Properties of rule generation and the synchronizer's withdraw-then-install
//! cycle.

use std::sync::Arc;

use focusguard_core::blocking::{
    generate_rules, MemoryRuleSink, RuleSynchronizer, SinkOp, DEFAULT_REDIRECT_PATH,
};
use proptest::prelude::*;

fn site() -> impl Strategy<Value = String> {
    "[a-z]{1,12}\\.(com|org|net|tv)"
}

fn unique_sites() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(site(), 0..20).prop_map(|mut sites| {
        let mut seen = std::collections::HashSet::new();
        sites.retain(|s| seen.insert(s.clone()));
        sites
    })
}

proptest! {
    #[test]
    fn rules_are_numbered_in_list_order(sites in unique_sites()) {
        let rules = generate_rules(&sites, true, DEFAULT_REDIRECT_PATH);
        prop_assert_eq!(rules.len(), sites.len());
        for (i, (rule, site)) in rules.iter().zip(&sites).enumerate() {
            prop_assert_eq!(rule.id as usize, i + 1);
            prop_assert_eq!(rule.site(), Some(site.as_str()));
            prop_assert_eq!(rule.priority, 1);
            prop_assert!(rule.redirect_target().starts_with("/public/intervention.html?site="));
        }
    }

    #[test]
    fn no_rules_outside_focus(sites in unique_sites()) {
        prop_assert!(generate_rules(&sites, false, DEFAULT_REDIRECT_PATH).is_empty());
    }

    #[test]
    fn resync_leaves_exactly_the_generated_set(
        first in unique_sites(),
        second in unique_sites(),
        focus in any::<bool>(),
    ) {
        let sink = Arc::new(MemoryRuleSink::new());
        let sync = RuleSynchronizer::new(sink.clone());
        sync.resync(&first, true).unwrap();
        let rules = sync.resync(&second, focus).unwrap();

        prop_assert_eq!(sink.installed(), rules.clone());
        let current = sync.current();
        prop_assert_eq!(current.rules(), rules.as_slice());
        if !focus {
            prop_assert!(sink.installed().is_empty());
        }
    }
}

#[test]
fn rule_json_matches_declarative_net_request_shape() {
    let rules = generate_rules(&["reddit.com".to_string()], true, DEFAULT_REDIRECT_PATH);
    let json = serde_json::to_value(&rules[0]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "id": 1,
            "priority": 1,
            "action": {
                "type": "redirect",
                "redirect": { "extensionPath": "/public/intervention.html?site=reddit.com" }
            },
            "condition": {
                "urlFilter": "*://*.reddit.com/*",
                "resourceTypes": ["main_frame"]
            }
        })
    );
}

#[test]
fn resync_withdraws_before_installing() {
    let sink = Arc::new(MemoryRuleSink::new());
    let sync = RuleSynchronizer::new(sink.clone());
    let sites = vec!["a.com".to_string(), "b.com".to_string()];
    sync.resync(&sites, true).unwrap();
    sync.resync(&sites, true).unwrap();

    assert_eq!(
        sink.log(),
        vec![
            SinkOp::Added(vec![1, 2]),
            SinkOp::Removed(vec![1, 2]),
            SinkOp::Added(vec![1, 2]),
        ]
    );
}
