// src/services/robots.rs

//! Crawl-permission evaluation.
//!
//! Parses a site's robots.txt and answers "is this path fetchable by this
//! agent?". Policies are fetched at most once per host per run and cached
//! in a shared [`PolicyStore`]. Any fetch or parse failure is treated as
//! allow-all (fail-open) so an inaccessible policy resource never blocks
//! otherwise-public content.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use url::Url;

use crate::utils::http::fetch_text;
use crate::utils::url::host_of;

/// One allow/disallow rule.
#[derive(Debug, Clone)]
struct PathRule {
    prefix: String,
    allow: bool,
}

/// Rules for one user-agent group.
#[derive(Debug, Clone, Default)]
struct AgentRules {
    rules: Vec<PathRule>,
    crawl_delay: Option<f64>,
}

/// Parsed robots.txt for one host. Point-in-time snapshot, never mutated
/// after creation.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    /// Rules per user-agent token (lowercase)
    groups: HashMap<String, AgentRules>,

    /// Rules for the `*` wildcard group
    default_rules: AgentRules,
}

impl RobotsPolicy {
    /// A policy that permits everything. Used on fetch failure.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt content.
    ///
    /// Consecutive `User-agent` lines share the rule group that follows
    /// them. Unknown directives are ignored. A single trailing `*` on a
    /// path is treated as the prefix it abbreviates.
    pub fn parse(content: &str) -> Self {
        let mut policy = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules = AgentRules::default();
        let mut in_group_body = false;

        let flush =
            |agents: &mut Vec<String>, rules: &mut AgentRules, policy: &mut RobotsPolicy| {
                for agent in agents.drain(..) {
                    if agent == "*" {
                        policy.default_rules = rules.clone();
                    } else {
                        policy.groups.insert(agent, rules.clone());
                    }
                }
                *rules = AgentRules::default();
            };

        for line in content.lines() {
            // Strip inline comments
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if in_group_body {
                        flush(&mut current_agents, &mut current_rules, &mut policy);
                        in_group_body = false;
                    }
                    current_agents.push(value.to_lowercase());
                }
                "disallow" => {
                    in_group_body = true;
                    // An empty disallow value permits everything
                    if !value.is_empty() {
                        current_rules.rules.push(PathRule {
                            prefix: normalize_prefix(value),
                            allow: false,
                        });
                    }
                }
                "allow" => {
                    in_group_body = true;
                    if !value.is_empty() {
                        current_rules.rules.push(PathRule {
                            prefix: normalize_prefix(value),
                            allow: true,
                        });
                    }
                }
                "crawl-delay" => {
                    in_group_body = true;
                    if let Ok(delay) = value.parse::<f64>() {
                        current_rules.crawl_delay = Some(delay);
                    }
                }
                _ => {}
            }
        }
        flush(&mut current_agents, &mut current_rules, &mut policy);

        policy
    }

    /// Whether `path` is fetchable by `agent`.
    ///
    /// The longest matching prefix among the applicable rules decides; at
    /// equal length an allow rule wins. No matching rule means allowed.
    pub fn is_allowed(&self, agent: &str, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        let mut best: Option<&PathRule> = None;

        for rule in &self.rules_for(agent).rules {
            if !path.starts_with(rule.prefix.as_str()) {
                continue;
            }
            let better = match best {
                None => true,
                Some(b) => {
                    rule.prefix.len() > b.prefix.len()
                        || (rule.prefix.len() == b.prefix.len() && rule.allow)
                }
            };
            if better {
                best = Some(rule);
            }
        }

        best.map_or(true, |rule| rule.allow)
    }

    /// Crawl-delay for `agent`, if the policy declares one.
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        self.rules_for(agent)
            .crawl_delay
            .or(self.default_rules.crawl_delay)
            .map(Duration::from_secs_f64)
    }

    fn rules_for(&self, agent: &str) -> &AgentRules {
        let agent_lower = agent.to_lowercase();
        self.groups
            .get(&agent_lower)
            .or_else(|| {
                self.groups
                    .iter()
                    .find(|(token, _)| agent_lower.contains(token.as_str()))
                    .map(|(_, rules)| rules)
            })
            .unwrap_or(&self.default_rules)
    }
}

fn normalize_prefix(value: &str) -> String {
    // "/menu*" abbreviates the "/menu" prefix
    value.strip_suffix('*').unwrap_or(value).to_string()
}

/// Run-scoped cache of per-host crawl policies.
///
/// Shared across workers; read-mostly, written once per host by whichever
/// worker visits it first. A race to populate an entry is resolved by
/// first-writer-wins, the losing fetch is discarded.
pub struct PolicyStore {
    client: reqwest::Client,
    timeout: Duration,
    cache: RwLock<HashMap<String, Arc<RobotsPolicy>>>,
}

impl PolicyStore {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The crawl policy for the host of `site`, fetching it on first use.
    pub async fn policy_for(&self, site: &Url) -> Arc<RobotsPolicy> {
        let Some(host) = host_of(site) else {
            return Arc::new(RobotsPolicy::allow_all());
        };

        if let Some(policy) = self.cache.read().await.get(&host) {
            return Arc::clone(policy);
        }

        let fetched = Arc::new(self.fetch_policy(site).await);
        let mut cache = self.cache.write().await;
        Arc::clone(cache.entry(host).or_insert(fetched))
    }

    async fn fetch_policy(&self, site: &Url) -> RobotsPolicy {
        let mut robots_url = site.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);

        match fetch_text(&self.client, robots_url.as_str(), self.timeout).await {
            Ok(page) => RobotsPolicy::parse(&page.body),
            Err(e) => {
                log::warn!("robots.txt fetch failed for {robots_url}, allowing all: {e}");
                RobotsPolicy::allow_all()
            }
        }
    }
}
