//! Tool construction by name.
//!
//! [`CONSTRUCTORS`] is the authoritative catalog: one typed entry per
//! supported tool name. Each entry states which client variant it needs, so
//! a wrong handle is reported as [`RegistrationError::ClientTypeMismatch`]
//! instead of failing later at invocation time.

use std::sync::Arc;

use super::builtin::dictionaries::{self, DictionaryKind};
use super::builtin::llm_ping;
use super::builtin::marketplace::{self, endpoints, MarketplaceTool};
use super::builtin::planner::{self, PlannerTool};
use super::builtin::storage::{self, StorageTool};
use super::{RegistrationError, Tool};
use crate::clients::ClientHandle;
use crate::config::{AppConfig, ToolConfig};
use crate::state::CoreState;

/// Everything a constructor may read besides its client.
pub struct BuildContext<'a> {
    pub name: &'a str,
    pub tool: &'a ToolConfig,
    pub config: &'a AppConfig,
    pub state: &'a Arc<CoreState>,
}

impl BuildContext<'_> {
    /// Configured description, or `default` when the config leaves it empty.
    pub fn description(&self, default: &str) -> String {
        if self.tool.description.is_empty() {
            default.to_string()
        } else {
            self.tool.description.clone()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Constructor {
    Marketplace(MarketplaceTool),
    ObjectStorage(StorageTool),
    ModelRegistry,
    Planner(PlannerTool),
    ReferenceData(DictionaryKind),
    /// Known but not wired yet; building it registers nothing.
    Deferred,
}

use Constructor::*;

pub(crate) static CONSTRUCTORS: &[(&str, Constructor)] = &[
    // marketplace: content
    ("search_wb_products", Marketplace(MarketplaceTool::SearchProducts)),
    ("list_wb_seller_products", Marketplace(MarketplaceTool::Endpoint(&endpoints::SELLER_PRODUCTS))),
    ("get_wb_parent_categories", Marketplace(MarketplaceTool::Endpoint(&endpoints::PARENT_CATEGORIES))),
    ("get_wb_subjects", Marketplace(MarketplaceTool::Endpoint(&endpoints::SUBJECTS))),
    ("ping_wb_api", Marketplace(MarketplaceTool::Ping)),
    ("get_wb_subjects_by_name", Marketplace(MarketplaceTool::Endpoint(&endpoints::SUBJECTS_BY_NAME))),
    ("get_wb_characteristics", Marketplace(MarketplaceTool::Endpoint(&endpoints::CHARACTERISTICS))),
    ("get_wb_tnved", Marketplace(MarketplaceTool::Endpoint(&endpoints::TNVED))),
    ("get_wb_brands", Marketplace(MarketplaceTool::Endpoint(&endpoints::BRANDS))),
    ("reload_wb_dictionaries", Marketplace(MarketplaceTool::ReloadDictionaries)),
    // marketplace: feedbacks
    ("get_wb_feedbacks", Marketplace(MarketplaceTool::Endpoint(&endpoints::FEEDBACKS))),
    ("get_wb_questions", Marketplace(MarketplaceTool::Endpoint(&endpoints::QUESTIONS))),
    ("get_wb_new_feedbacks_questions", Marketplace(MarketplaceTool::Endpoint(&endpoints::NEW_FEEDBACKS_QUESTIONS))),
    ("get_wb_unanswered_feedbacks_counts", Marketplace(MarketplaceTool::Endpoint(&endpoints::UNANSWERED_FEEDBACKS))),
    ("get_wb_unanswered_questions_counts", Marketplace(MarketplaceTool::Endpoint(&endpoints::UNANSWERED_QUESTIONS))),
    // marketplace: analytics
    ("get_wb_product_funnel", Marketplace(MarketplaceTool::Endpoint(&endpoints::PRODUCT_FUNNEL))),
    ("get_wb_product_funnel_history", Marketplace(MarketplaceTool::Endpoint(&endpoints::PRODUCT_FUNNEL_HISTORY))),
    ("get_wb_search_positions", Marketplace(MarketplaceTool::Endpoint(&endpoints::SEARCH_POSITIONS))),
    ("get_wb_top_search_queries", Marketplace(MarketplaceTool::Endpoint(&endpoints::TOP_SEARCH_QUERIES))),
    ("get_wb_top_organic_positions", Marketplace(MarketplaceTool::TopOrganicPositions)),
    ("get_wb_campaign_stats", Marketplace(MarketplaceTool::Endpoint(&endpoints::CAMPAIGN_STATS))),
    ("get_wb_keyword_stats", Marketplace(MarketplaceTool::Endpoint(&endpoints::KEYWORD_STATS))),
    ("get_wb_attribution_summary", Marketplace(MarketplaceTool::AttributionSummary)),
    // reference data
    ("wb_colors", ReferenceData(DictionaryKind::Colors)),
    ("wb_countries", ReferenceData(DictionaryKind::Countries)),
    ("wb_genders", ReferenceData(DictionaryKind::Genders)),
    ("wb_seasons", ReferenceData(DictionaryKind::Seasons)),
    ("wb_vat_rates", ReferenceData(DictionaryKind::VatRates)),
    // models
    ("ping_llm_provider", ModelRegistry),
    ("ask_user_question", Deferred),
    // object storage
    ("list_s3_files", ObjectStorage(StorageTool::List)),
    ("read_s3_object", ObjectStorage(StorageTool::Read)),
    ("read_s3_image", ObjectStorage(StorageTool::ReadImage)),
    ("get_plm_data", ObjectStorage(StorageTool::PlmData)),
    ("download_s3_files", ObjectStorage(StorageTool::Download)),
    ("classify_and_download_s3_files", ObjectStorage(StorageTool::ClassifyAndDownload)),
    ("analyze_article_images_batch", Deferred),
    // planner
    ("plan_add_task", Planner(PlannerTool::Add)),
    ("plan_mark_done", Planner(PlannerTool::MarkDone)),
    ("plan_mark_failed", Planner(PlannerTool::MarkFailed)),
    ("plan_clear", Planner(PlannerTool::Clear)),
    ("plan_set_tasks", Planner(PlannerTool::SetTasks)),
];

pub(crate) fn constructor(name: &str) -> Option<Constructor> {
    CONSTRUCTORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, ctor)| *ctor)
}

/// Whether the factory has a constructor (or a deferral) for `name`.
pub fn is_supported(name: &str) -> bool {
    constructor(name).is_some()
}

/// Names that are recognised but intentionally not built yet.
pub fn deferred_names() -> Vec<&'static str> {
    CONSTRUCTORS
        .iter()
        .filter(|(_, ctor)| matches!(ctor, Deferred))
        .map(|(name, _)| *name)
        .collect()
}

/// Build the tool called `name`.
///
/// Returns `Ok(None)` when the tool is disabled in config or deferred.
pub fn build_tool(
    name: &str,
    config: &AppConfig,
    client: Option<&ClientHandle>,
    state: &Arc<CoreState>,
) -> Result<Option<Arc<dyn Tool>>, RegistrationError> {
    let ctor =
        constructor(name).ok_or_else(|| RegistrationError::UnknownCapability(name.to_string()))?;
    let tool_cfg = config
        .tools
        .get(name)
        .ok_or_else(|| RegistrationError::ToolConfigMissing(name.to_string()))?;

    if !tool_cfg.enabled {
        log::debug!("tool disabled, skipping name={name}");
        return Ok(None);
    }

    let ctx = BuildContext {
        name,
        tool: tool_cfg,
        config,
        state,
    };

    let tool: Arc<dyn Tool> = match ctor {
        Marketplace(kind) => match client {
            Some(ClientHandle::Marketplace(api)) => marketplace::build(kind, api.clone(), &ctx),
            other => return Err(client_error(name, "marketplace", other)),
        },
        ObjectStorage(kind) => match client {
            Some(ClientHandle::ObjectStorage(s3)) => storage::build(kind, s3.clone(), &ctx),
            other => return Err(client_error(name, "object_storage", other)),
        },
        ModelRegistry => match client {
            Some(ClientHandle::ModelRegistry(models)) => llm_ping::build(models.clone(), &ctx),
            other => return Err(client_error(name, "model_registry", other)),
        },
        Planner(kind) => match client {
            Some(ClientHandle::TodoManager(todo)) => planner::build(kind, todo.clone(), &ctx),
            // Without an explicit manager the tools work on the session plan.
            None => planner::build(kind, state.todo().clone(), &ctx),
            Some(other) => {
                return Err(RegistrationError::ClientTypeMismatch {
                    tool: name.to_string(),
                    expected: "todo_manager",
                    found: other.kind(),
                })
            }
        },
        ReferenceData(kind) => dictionaries::build(kind, state, &ctx),
        Deferred => {
            log::debug!("tool deferred, not registered name={name}");
            return Ok(None);
        }
    };

    Ok(Some(tool))
}

fn client_error(
    tool: &str,
    expected: &'static str,
    found: Option<&ClientHandle>,
) -> RegistrationError {
    match found {
        Some(handle) => RegistrationError::ClientTypeMismatch {
            tool: tool.to_string(),
            expected,
            found: handle.kind(),
        },
        None => RegistrationError::MissingDependency {
            tool: tool.to_string(),
            dependency: match expected {
                "marketplace" => "a marketplace client",
                "object_storage" => "an object storage client",
                _ => "a model registry",
            },
        },
    }
}
