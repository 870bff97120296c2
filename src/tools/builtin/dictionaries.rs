//! Reference-data tools answering from the dictionaries held in session state.
//!
//! Dictionaries are read at invocation time, so a later
//! `reload_wb_dictionaries` is picked up without re-registering tools.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::clients::Dictionaries;
use crate::state::CoreState;
use crate::tools::factory::BuildContext;
use crate::tools::{empty_parameters, parse_args, to_output, Tool, ToolDefinition, ToolError};

const DEFAULT_COLOR_TOP: usize = 10;
const MAX_COLOR_TOP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryKind {
    Colors,
    Countries,
    Genders,
    Seasons,
    VatRates,
}

impl DictionaryKind {
    fn name(self) -> &'static str {
        match self {
            DictionaryKind::Colors => "wb_colors",
            DictionaryKind::Countries => "wb_countries",
            DictionaryKind::Genders => "wb_genders",
            DictionaryKind::Seasons => "wb_seasons",
            DictionaryKind::VatRates => "wb_vat_rates",
        }
    }

    fn default_description(self) -> &'static str {
        match self {
            DictionaryKind::Colors => "Searches the Wildberries color dictionary by substring; without a search returns the first colors.",
            DictionaryKind::Countries => "Returns the countries of manufacture accepted on product cards.",
            DictionaryKind::Genders => "Returns the gender values (kinds) accepted on product cards.",
            DictionaryKind::Seasons => "Returns the season values accepted on product cards.",
            DictionaryKind::VatRates => "Returns the VAT rates accepted on product cards.",
        }
    }
}

pub fn build(kind: DictionaryKind, state: &Arc<CoreState>, ctx: &BuildContext<'_>) -> Arc<dyn Tool> {
    Arc::new(DictionaryTool {
        kind,
        description: ctx.description(kind.default_description()),
        state: Arc::downgrade(state),
    })
}

pub struct DictionaryTool {
    kind: DictionaryKind,
    description: String,
    state: Weak<CoreState>,
}

impl DictionaryTool {
    fn dictionaries(&self) -> Result<Arc<Dictionaries>, ToolError> {
        self.state
            .upgrade()
            .and_then(|state| state.dictionaries())
            .ok_or(ToolError::ReferenceDataUnavailable)
    }
}

#[async_trait]
impl Tool for DictionaryTool {
    fn definition(&self) -> ToolDefinition {
        let parameters = match self.kind {
            DictionaryKind::Colors => json!({
                "type": "object",
                "properties": {
                    "search": {"type": "string", "description": "Part of a color name, e.g. 'peach'"},
                    "top": {"type": "integer", "description": "Number of results (default 10, max 50)"}
                },
                "required": []
            }),
            _ => empty_parameters(),
        };
        ToolDefinition::new(self.kind.name(), &self.description, parameters)
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        let dicts = self.dictionaries()?;
        match self.kind {
            DictionaryKind::Colors => {
                #[derive(Deserialize)]
                struct Args {
                    #[serde(default)]
                    search: String,
                    #[serde(default)]
                    top: usize,
                }
                let args: Args = parse_args(args_json)?;
                let top = match args.top {
                    0 => DEFAULT_COLOR_TOP,
                    n => n.min(MAX_COLOR_TOP),
                };
                let needle = args.search.trim().to_lowercase();
                let matches: Vec<_> = dicts
                    .colors
                    .iter()
                    .filter(|c| {
                        needle.is_empty()
                            || c.name.to_lowercase().contains(&needle)
                            || c.parent_name.to_lowercase().contains(&needle)
                    })
                    .take(top)
                    .collect();
                to_output(&matches)
            }
            DictionaryKind::Countries => to_output(&dicts.countries),
            DictionaryKind::Genders => to_output(&dicts.genders),
            DictionaryKind::Seasons => to_output(&dicts.seasons),
            DictionaryKind::VatRates => to_output(&dicts.vats),
        }
    }
}
