//! Registration engine: turns configuration into registered tools.
//!
//! Two strategies share one construction core ([`build_tool`]):
//!
//! - **declarative**: `tool_categories` lists domains, each with one client
//!   key and an ordered list of tools. The first failure aborts the call.
//! - **legacy**: every enabled entry of the flat `tools` map is classified by
//!   name and registered on a best-effort basis. Failures are logged and
//!   skipped; the call itself never fails.
//!
//! [`ToolSet`] is a third, programmatic front-end that compiles a small
//! domain mask into synthesized category declarations.

use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use indexmap::IndexMap;

use super::catalog::{catalog_drift, classify, Domain};
use super::{build_tool, RegistrationError};
use crate::clients::ClientDirectory;
use crate::config::{AppConfig, CategoryConfig};
use crate::state::CoreState;

/// Which strategy a setup call ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupMode {
    Categories,
    Legacy,
}

/// Outcome of a registration pass.
#[derive(Debug, Default)]
pub struct SetupSummary {
    pub mode: Option<SetupMode>,
    pub registered: Vec<String>,
    /// Domains skipped because their client is not in the directory.
    pub skipped_domains: Vec<String>,
    /// Legacy items that failed, with the reason.
    pub skipped_tools: Vec<(String, RegistrationError)>,
}

/// Register tools from `cfg`, choosing the declarative path whenever any
/// category is declared.
pub fn setup_tools_from_config(
    state: &Arc<CoreState>,
    cfg: &AppConfig,
    clients: &ClientDirectory,
) -> Result<SetupSummary, RegistrationError> {
    if cfg.tool_categories.is_empty() {
        Ok(setup_tools_from_legacy(state, cfg, clients))
    } else {
        setup_tools_from_categories(state, cfg, &cfg.tool_categories, clients)
    }
}

/// Declarative path. Stops at the first failing tool; everything registered
/// before it stays registered.
pub fn setup_tools_from_categories(
    state: &Arc<CoreState>,
    cfg: &AppConfig,
    categories: &IndexMap<String, CategoryConfig>,
    clients: &ClientDirectory,
) -> Result<SetupSummary, RegistrationError> {
    let mut summary = SetupSummary {
        mode: Some(SetupMode::Categories),
        ..Default::default()
    };

    for (category, decl) in categories {
        if !decl.enabled {
            log::debug!("category disabled category={category}");
            continue;
        }

        let client = if decl.client.is_empty() {
            None
        } else {
            match clients.get(&decl.client) {
                Some(handle) => Some(handle),
                None => {
                    log::warn!(
                        "client not available, skipping category category={category} client={}",
                        decl.client
                    );
                    summary.skipped_domains.push(category.clone());
                    continue;
                }
            }
        };

        for name in &decl.tools {
            let wrap = |source: RegistrationError| RegistrationError::InCategory {
                category: category.clone(),
                tool: name.clone(),
                source: Box::new(source),
            };
            if let Some(tool) = build_tool(name, cfg, client, state).map_err(wrap)? {
                state.tools().register(tool).map_err(wrap)?;
                summary.registered.push(name.clone());
            }
        }
    }

    log::info!(
        "tools registered from categories count={} skipped_categories={}",
        summary.registered.len(),
        summary.skipped_domains.len()
    );
    Ok(summary)
}

/// Legacy path. Never fails: each problem is logged and the tool skipped.
pub fn setup_tools_from_legacy(
    state: &Arc<CoreState>,
    cfg: &AppConfig,
    clients: &ClientDirectory,
) -> SetupSummary {
    for name in catalog_drift() {
        log::warn!("classified tool has no constructor tool={name}");
    }

    let mut summary = SetupSummary {
        mode: Some(SetupMode::Legacy),
        ..Default::default()
    };

    // BTreeMap iteration keeps this alphabetical.
    for (name, tool_cfg) in &cfg.tools {
        if !tool_cfg.enabled {
            continue;
        }
        let domain = classify(name);
        let client = domain
            .and_then(Domain::client_key)
            .and_then(|key| clients.get(key));

        let result = build_tool(name, cfg, client, state).and_then(|tool| match tool {
            Some(tool) => state.tools().register(tool).map(|_| true),
            None => Ok(false),
        });
        match result {
            Ok(true) => summary.registered.push(name.clone()),
            Ok(false) => {}
            Err(e) => {
                log::warn!(
                    "skipping tool tool={name} domain={} error={e}",
                    domain.map(Domain::as_str).unwrap_or("unclassified")
                );
                summary.skipped_tools.push((name.clone(), e));
            }
        }
    }

    log::info!(
        "tools registered from legacy config count={} skipped={}",
        summary.registered.len(),
        summary.skipped_tools.len()
    );
    summary
}

// ---------------------------------------------------------------------------
// ToolSet
// ---------------------------------------------------------------------------

/// Bit-set over the domains a programmatic caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ToolSet(u8);

impl ToolSet {
    pub const NONE: ToolSet = ToolSet(0);
    pub const MARKETPLACE: ToolSet = ToolSet(1);
    /// Reserved for a second marketplace; no tools are bound to it yet.
    pub const SECOND_MARKETPLACE: ToolSet = ToolSet(1 << 1);
    pub const PLANNER: ToolSet = ToolSet(1 << 2);
    pub const OBJECT_STORAGE: ToolSet = ToolSet(1 << 3);

    pub const MARKETPLACE_AND_PLANNER: ToolSet = ToolSet(Self::MARKETPLACE.0 | Self::PLANNER.0);
    pub const ALL: ToolSet = ToolSet(
        Self::MARKETPLACE.0 | Self::SECOND_MARKETPLACE.0 | Self::PLANNER.0 | Self::OBJECT_STORAGE.0,
    );

    pub fn contains(self, other: ToolSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Catalog domains covered by this set, in registration order.
    /// Reference data rides along with the marketplace it describes.
    pub fn domains(self) -> Vec<Domain> {
        let mut out = Vec::new();
        if self.contains(Self::MARKETPLACE) {
            out.extend([Domain::Marketplace, Domain::ReferenceData]);
        }
        if self.contains(Self::OBJECT_STORAGE) {
            out.push(Domain::ObjectStorage);
        }
        if self.contains(Self::PLANNER) {
            out.push(Domain::Planner);
        }
        out
    }

    /// Category declarations equivalent to this set: each domain lists its
    /// catalog names that are enabled in `cfg.tools`.
    pub fn to_categories(self, cfg: &AppConfig) -> IndexMap<String, CategoryConfig> {
        self.domains()
            .into_iter()
            .map(|domain| {
                let tools = domain
                    .tools()
                    .iter()
                    .filter(|name| cfg.tools.get(**name).is_some_and(|t| t.enabled))
                    .map(|name| name.to_string())
                    .collect();
                let decl = CategoryConfig {
                    enabled: true,
                    client: domain.client_key().unwrap_or_default().to_string(),
                    tools,
                };
                (domain.as_str().to_string(), decl)
            })
            .collect()
    }
}

impl BitOr for ToolSet {
    type Output = ToolSet;

    fn bitor(self, rhs: ToolSet) -> ToolSet {
        ToolSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for ToolSet {
    fn bitor_assign(&mut self, rhs: ToolSet) {
        self.0 |= rhs.0;
    }
}

/// Register the tools of `set`, through the same declarative core as
/// configuration-driven setup.
pub fn setup_tools_for_set(
    state: &Arc<CoreState>,
    cfg: &AppConfig,
    clients: &ClientDirectory,
    set: ToolSet,
) -> Result<SetupSummary, RegistrationError> {
    let categories = set.to_categories(cfg);
    setup_tools_from_categories(state, cfg, &categories, clients)
}
