// src/services/discovery.rs

//! Menu discovery crawler.
//!
//! Given a restaurant's website, fetches the root page, scores outbound
//! links by menu-likelihood, then fetches the best candidates until one
//! passes the menu-confirmation heuristic. Bounded by the hop budget and
//! the per-page deadline; every fetch goes through the crawl-permission
//! evaluator and the per-host gate.

use std::collections::HashMap;
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::{Config, CrawlResult};
use crate::services::gate::HostGate;
use crate::services::robots::PolicyStore;
use crate::utils::http::{FetchedPage, failure_kind, fetch_text};
use crate::utils::url::{host_of, normalize_site_url, same_host};

/// Keywords that make a link smell like a menu page.
const MENU_KEYWORDS: &[&str] = &[
    "menu",
    "menus",
    "food",
    "eat",
    "drink",
    "brunch",
    "dinner",
    "breakfast",
    "lunch",
    "carte",
    "prix-fixe",
    "wine-list",
    "cocktails",
    "a-la-carte",
    "dining",
];

/// Links containing these are never menu candidates.
const EXCLUDE_KEYWORDS: &[&str] = &[
    "instagram",
    "facebook",
    "twitter",
    "tiktok",
    "login",
    "signin",
    "booking",
    "reservation",
    "cart",
    "checkout",
    "gift",
    "privacy",
    "terms",
];

/// Section headings and tokens that confirm menu content.
const CONFIRM_KEYWORDS: &[&str] = &[
    "starters",
    "mains",
    "main course",
    "dessert",
    "sides",
    "small plates",
    "a la carte",
    "à la carte",
    "tasting menu",
    "wine",
    "cocktails",
    "vegetarian",
    "vegan",
    "gluten",
];

/// Minimum link score for a candidate to be fetched at all.
const MIN_SCORE: u32 = 3;

/// A scored outbound link.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkCandidate {
    url: Url,
    score: u32,
}

/// Service that locates a restaurant's menu page.
pub struct MenuDiscovery {
    config: Arc<Config>,
    client: reqwest::Client,
    policies: Arc<PolicyStore>,
    gate: Arc<HostGate>,
}

impl MenuDiscovery {
    pub fn new(
        config: Arc<Config>,
        client: reqwest::Client,
        policies: Arc<PolicyStore>,
        gate: Arc<HostGate>,
    ) -> Self {
        Self {
            config,
            client,
            policies,
            gate,
        }
    }

    /// Locate the menu page for a website, if it has one.
    ///
    /// Never retries internally; a transient root failure surfaces as
    /// `Failed` and retry policy belongs to the orchestrator.
    pub async fn discover(&self, website: Option<&str>) -> CrawlResult {
        let Some(root) = website.and_then(normalize_site_url) else {
            return CrawlResult::NotFound;
        };
        let Some(host) = host_of(&root) else {
            return CrawlResult::NotFound;
        };

        let token = self.config.crawler.agent_token.as_str();
        let policy = self.policies.policy_for(&root).await;
        if !policy.is_allowed(token, root.path()) {
            return CrawlResult::blocked("robots");
        }
        let delay = policy.crawl_delay(token);

        let root_page = {
            let _permit = self.gate.acquire(&host, delay).await;
            fetch_text(
                &self.client,
                root.as_str(),
                self.config.crawler.page_timeout(),
            )
            .await
        };
        let root_page = match root_page {
            Ok(page) => page,
            Err(e) => {
                log::debug!("Root fetch failed for {root}: {e}");
                return CrawlResult::Failed {
                    kind: failure_kind(&e),
                };
            }
        };
        if !root_page.is_html() {
            return CrawlResult::NotFound;
        }

        let candidates = self.candidates_from(&root_page);
        let mut robots_blocked = 0usize;

        for candidate in candidates {
            if !policy.is_allowed(token, candidate.url.path()) {
                log::debug!("Candidate blocked by robots: {}", candidate.url);
                robots_blocked += 1;
                continue;
            }

            let page = {
                let _permit = self.gate.acquire(&host, delay).await;
                fetch_text(
                    &self.client,
                    candidate.url.as_str(),
                    self.config.crawler.page_timeout(),
                )
                .await
            };
            // A failing candidate never penalizes the overall result
            let Ok(page) = page else { continue };
            if !page.is_html() {
                continue;
            }

            if confirm_menu(&page.body) {
                return CrawlResult::found(page.url);
            }
        }

        if robots_blocked > 0 {
            CrawlResult::blocked("robots")
        } else {
            CrawlResult::NotFound
        }
    }

    /// Top-scoring same-host links from the root page, best first,
    /// truncated to the hop budget.
    fn candidates_from(&self, page: &FetchedPage) -> Vec<LinkCandidate> {
        let Ok(base) = Url::parse(&page.url) else {
            return Vec::new();
        };
        let mut candidates = extract_candidates(&page.body, &base);
        candidates.truncate(self.config.crawler.hop_budget);
        candidates
    }
}

/// Extract and score outbound links. Deterministic for identical content:
/// ties are broken by URL ordering.
fn extract_candidates(body: &str, base: &Url) -> Vec<LinkCandidate> {
    let document = Html::parse_document(body);
    let anchor = Selector::parse("a[href]").expect("anchor selector");

    let mut best: HashMap<String, LinkCandidate> = HashMap::new();
    for link in document.select(&anchor) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Ok(mut url) = base.join(href) else {
            continue;
        };
        url.set_fragment(None);
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        if !same_host(&url, base) || url == *base {
            continue;
        }

        let text: String = link.text().collect();
        let score = score_link(url.path(), &text, in_nav(&link));
        if score < MIN_SCORE {
            continue;
        }

        let entry = best.entry(url.to_string()).or_insert(LinkCandidate {
            url: url.clone(),
            score,
        });
        if score > entry.score {
            entry.score = score;
        }
    }

    let mut candidates: Vec<LinkCandidate> = best.into_values().collect();
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.url.as_str().cmp(b.url.as_str()))
    });
    candidates
}

/// Score a link by menu-likelihood from its path, text, and placement.
fn score_link(path: &str, text: &str, in_nav: bool) -> u32 {
    let path = path.to_lowercase();
    let text = text.to_lowercase();

    if EXCLUDE_KEYWORDS.iter().any(|kw| path.contains(kw)) {
        return 0;
    }

    let mut score = 0;
    for keyword in MENU_KEYWORDS {
        if path.split('/').any(|segment| segment.contains(keyword)) {
            score += 4;
        }
        if text.contains(keyword) {
            score += 3;
        }
    }
    if score > 0 && in_nav {
        score += 2;
    }
    score
}

/// Whether a link sits inside the page's primary navigation.
fn in_nav(link: &ElementRef) -> bool {
    link.ancestors().filter_map(ElementRef::wrap).any(|el| {
        el.value().name() == "nav"
            || el
                .value()
                .attr("class")
                .is_some_and(|c| c.to_lowercase().contains("nav"))
    })
}

/// Whether page content looks like an actual menu: enough price-like
/// tokens or food-category keywords.
fn confirm_menu(body: &str) -> bool {
    let document = Html::parse_document(body);
    let text = document
        .root_element()
        .text()
        .collect::<String>()
        .to_lowercase();

    let price_re = price_regex();
    let prices = price_re.find_iter(&text).count();
    let keywords = CONFIRM_KEYWORDS
        .iter()
        .filter(|kw| text.contains(*kw))
        .count();

    prices >= 3 || (prices >= 1 && keywords >= 2) || keywords >= 4
}

fn price_regex() -> &'static regex::Regex {
    static PRICE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    PRICE.get_or_init(|| regex::Regex::new(r"[£$€]\s*\d+(?:\.\d{2})?").expect("price regex"))
}
