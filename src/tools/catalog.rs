//! Static classification of tool names into domains.
//!
//! The legacy registration path has no per-tool client declaration, so it
//! uses these tables to decide which client a tool needs. The factory keeps
//! its own constructor table; [`catalog_drift`] reports names the two
//! disagree on.

use serde::{Deserialize, Serialize};

use super::factory;
use crate::clients::keys;

/// Marketplace (Wildberries) seller API tools.
pub const MARKETPLACE_TOOLS: &[&str] = &[
    "search_wb_products",
    "list_wb_seller_products",
    "get_wb_parent_categories",
    "get_wb_subjects",
    "ping_wb_api",
    "get_wb_feedbacks",
    "get_wb_questions",
    "get_wb_new_feedbacks_questions",
    "get_wb_unanswered_feedbacks_counts",
    "get_wb_unanswered_questions_counts",
    "get_wb_subjects_by_name",
    "get_wb_characteristics",
    "get_wb_tnved",
    "get_wb_brands",
    "reload_wb_dictionaries",
    "get_wb_product_funnel",
    "get_wb_product_funnel_history",
    "get_wb_search_positions",
    "get_wb_top_search_queries",
    "get_wb_top_organic_positions",
    "get_wb_campaign_stats",
    "get_wb_keyword_stats",
    "get_wb_attribution_summary",
];

pub const OBJECT_STORAGE_TOOLS: &[&str] = &[
    "list_s3_files",
    "read_s3_object",
    "read_s3_image",
    "get_plm_data",
    "download_s3_files",
    "classify_and_download_s3_files",
    "analyze_article_images_batch",
];

pub const MODEL_PROVIDER_TOOLS: &[&str] = &["ping_llm_provider", "ask_user_question"];

pub const PLANNER_TOOLS: &[&str] = &[
    "plan_add_task",
    "plan_mark_done",
    "plan_mark_failed",
    "plan_clear",
    "plan_set_tasks",
];

/// Tools answering from dictionaries held in shared state.
pub const REFERENCE_DATA_TOOLS: &[&str] = &[
    "wb_colors",
    "wb_countries",
    "wb_genders",
    "wb_seasons",
    "wb_vat_rates",
];

/// Group of tools sharing one backing client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Marketplace,
    ObjectStorage,
    ModelProvider,
    Planner,
    ReferenceData,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Marketplace,
        Domain::ObjectStorage,
        Domain::ModelProvider,
        Domain::Planner,
        Domain::ReferenceData,
    ];

    pub fn tools(self) -> &'static [&'static str] {
        match self {
            Domain::Marketplace => MARKETPLACE_TOOLS,
            Domain::ObjectStorage => OBJECT_STORAGE_TOOLS,
            Domain::ModelProvider => MODEL_PROVIDER_TOOLS,
            Domain::Planner => PLANNER_TOOLS,
            Domain::ReferenceData => REFERENCE_DATA_TOOLS,
        }
    }

    /// Client directory key serving this domain. Reference data reads shared
    /// state and needs no client.
    pub fn client_key(self) -> Option<&'static str> {
        match self {
            Domain::Marketplace => Some(keys::WB_CLIENT),
            Domain::ObjectStorage => Some(keys::S3_CLIENT),
            Domain::ModelProvider => Some(keys::MODEL_REGISTRY),
            Domain::Planner => Some(keys::TODO_MANAGER),
            Domain::ReferenceData => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Marketplace => "marketplace",
            Domain::ObjectStorage => "object_storage",
            Domain::ModelProvider => "model_provider",
            Domain::Planner => "planner",
            Domain::ReferenceData => "reference_data",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain of a tool name, `None` for names no table lists.
pub fn classify(name: &str) -> Option<Domain> {
    Domain::ALL
        .into_iter()
        .find(|domain| domain.tools().contains(&name))
}

/// Names listed in a classification table without a factory constructor.
pub fn catalog_drift() -> Vec<&'static str> {
    Domain::ALL
        .into_iter()
        .flat_map(|domain| domain.tools().iter().copied())
        .filter(|name| !factory::is_supported(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_classify() {
        assert_eq!(classify("get_wb_feedbacks"), Some(Domain::Marketplace));
        assert_eq!(classify("read_s3_image"), Some(Domain::ObjectStorage));
        assert_eq!(classify("ask_user_question"), Some(Domain::ModelProvider));
        assert_eq!(classify("plan_set_tasks"), Some(Domain::Planner));
        assert_eq!(classify("wb_vat_rates"), Some(Domain::ReferenceData));
        assert_eq!(classify("send_email"), None);
    }

    #[test]
    fn test_tables_do_not_overlap() {
        let mut seen = HashSet::new();
        for domain in Domain::ALL {
            for name in domain.tools() {
                assert!(seen.insert(*name), "{name} listed twice");
            }
        }
        assert_eq!(seen.len(), 42);
    }

    #[test]
    fn test_every_classified_name_has_a_constructor() {
        assert!(catalog_drift().is_empty(), "drift: {:?}", catalog_drift());
    }

    #[test]
    fn test_client_keys() {
        assert_eq!(Domain::Marketplace.client_key(), Some("wb_client"));
        assert_eq!(Domain::Planner.client_key(), Some("todo_manager"));
        assert_eq!(Domain::ReferenceData.client_key(), None);
    }
}
