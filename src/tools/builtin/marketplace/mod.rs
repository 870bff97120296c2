//! Wildberries seller API tools.
//!
//! Most tools are a single request described by an [`endpoints::Endpoint`]
//! and run through [`EndpointTool`]. The rest combine several calls or touch
//! shared state and have their own types.
//!
//! When the client is the demo placeholder, tools answer with an explicit
//! "demo mode" payload instead of calling the API.

pub mod endpoints;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use self::endpoints::{Call, Endpoint, Limits, ProductsArgs, CONTENT_API};
use crate::clients::{MarketplaceApi, Throttled};
use crate::state::CoreState;
use crate::tools::factory::BuildContext;
use crate::tools::{parse_args, to_output, Tool, ToolDefinition, ToolError};

static PATH_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").unwrap());

/// Marketplace tool variants known to the factory.
#[derive(Debug, Clone, Copy)]
pub enum MarketplaceTool {
    Endpoint(&'static Endpoint),
    SearchProducts,
    Ping,
    ReloadDictionaries,
    TopOrganicPositions,
    AttributionSummary,
}

/// Where a tool sends its requests.
#[derive(Debug, Clone)]
struct Target {
    base_url: String,
    path: String,
}

impl Target {
    /// Tool-level `endpoint`/`path` override the defaults. Content API calls
    /// default to `wb.base_url`.
    fn resolve(host: &str, path: &str, ctx: &BuildContext<'_>) -> Self {
        let base_url = if !ctx.tool.endpoint.is_empty() {
            ctx.tool.endpoint.clone()
        } else if host == CONTENT_API {
            ctx.config.wb.with_defaults().base_url
        } else {
            host.to_string()
        };
        let path = if ctx.tool.path.is_empty() {
            path.to_string()
        } else {
            ctx.tool.path.clone()
        };
        Self { base_url, path }
    }
}

pub fn build(
    kind: MarketplaceTool,
    client: Arc<dyn MarketplaceApi>,
    ctx: &BuildContext<'_>,
) -> Arc<dyn Tool> {
    let wb = ctx.config.wb.with_defaults();
    let limits = Limits {
        default_take: if ctx.tool.default_take > 0 {
            ctx.tool.default_take
        } else {
            Limits::default().default_take
        },
        brands_limit: wb.brands_limit,
    };

    let rate = if ctx.tool.rate_limit > 0 { ctx.tool.rate_limit } else { wb.rate_limit };
    let burst = if ctx.tool.burst > 0 { ctx.tool.burst } else { wb.burst_limit };
    let limiter = ctx.state.rate_limiters().get_or_create(ctx.name, rate, burst);
    let client: Arc<dyn MarketplaceApi> = Arc::new(Throttled::new(client, limiter));

    match kind {
        MarketplaceTool::Endpoint(def) => Arc::new(EndpointTool::new(def, client, ctx, limits)),
        MarketplaceTool::SearchProducts => Arc::new(SearchProductsTool {
            description: ctx.description(SearchProductsTool::DESCRIPTION),
            target: Target::resolve(CONTENT_API, "/content/v2/get/cards/list", ctx),
            client,
        }),
        MarketplaceTool::Ping => Arc::new(PingTool {
            description: ctx.description("Checks that the Wildberries API is reachable and the API key is accepted."),
            base_url: Target::resolve(CONTENT_API, "/ping", ctx).base_url,
            client,
        }),
        MarketplaceTool::ReloadDictionaries => Arc::new(ReloadDictionariesTool {
            description: ctx.description("Reloads the Wildberries reference dictionaries (colors, genders, countries, seasons, VAT rates) into the session."),
            base_url: Target::resolve(CONTENT_API, "", ctx).base_url,
            client,
            state: Arc::downgrade(ctx.state),
        }),
        MarketplaceTool::TopOrganicPositions => Arc::new(TopOrganicPositionsTool {
            description: ctx.description("Search queries where the products rank in the organic top 10."),
            queries: EndpointTool::new(&endpoints::TOP_SEARCH_QUERIES, client, ctx, limits),
        }),
        MarketplaceTool::AttributionSummary => {
            let funnel = EndpointTool::new(&endpoints::PRODUCT_FUNNEL, client.clone(), ctx, limits);
            let campaigns = EndpointTool::new(&endpoints::CAMPAIGN_STATS, client, ctx, limits);
            Arc::new(AttributionSummaryTool {
                description: ctx.description("Splits product views and orders into organic and advertising-driven parts for the given campaigns."),
                funnel,
                campaigns,
            })
        }
    }
}

fn demo_response(tool: &str) -> Result<String, ToolError> {
    to_output(&json!({
        "demo": true,
        "tool": tool,
        "message": "Wildberries API key is not configured; no data available in demo mode.",
        "data": [],
    }))
}

// ---------------------------------------------------------------------------
// Single endpoint
// ---------------------------------------------------------------------------

pub struct EndpointTool {
    def: &'static Endpoint,
    description: String,
    target: Target,
    limits: Limits,
    client: Arc<dyn MarketplaceApi>,
}

impl EndpointTool {
    fn new(
        def: &'static Endpoint,
        client: Arc<dyn MarketplaceApi>,
        ctx: &BuildContext<'_>,
        limits: Limits,
    ) -> Self {
        // Composite tools build endpoint tools under their own name; only the
        // registered tool's own config may override the request target.
        let target = if ctx.name == def.name {
            Target::resolve(def.host, def.path, ctx)
        } else {
            Target {
                base_url: if def.host == CONTENT_API {
                    ctx.config.wb.with_defaults().base_url
                } else {
                    def.host.to_string()
                },
                path: def.path.to_string(),
            }
        };
        let description = if ctx.name == def.name {
            ctx.description(def.description)
        } else {
            def.description.to_string()
        };
        Self {
            def,
            description,
            target,
            limits,
            client,
        }
    }

    /// Run the request and return the decoded response body.
    async fn call(&self, args: &Value) -> Result<Value, ToolError> {
        let path = fill_path(&self.target.path, args)?;
        let call = (self.def.request)(args, &self.limits)?;
        log::debug!("marketplace call tool={} path={path}", self.def.name);
        let body = match call {
            Call::Get(query) => self.client.get(&self.target.base_url, &path, &query).await?,
            Call::Post(body) => self.client.post(&self.target.base_url, &path, &body).await?,
        };
        Ok(body)
    }
}

#[async_trait]
impl Tool for EndpointTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.def.name, &self.description, (self.def.parameters)())
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        let args: Value = parse_args(args_json)?;
        if self.client.is_demo() {
            return demo_response(self.def.name);
        }
        to_output(&self.call(&args).await?)
    }
}

/// Substitute `{key}` segments with the argument of the same name.
fn fill_path(path: &str, args: &Value) -> Result<String, ToolError> {
    let mut missing = None;
    let filled = PATH_PARAM.replace_all(path, |caps: &regex::Captures<'_>| {
        let key = &caps[1];
        match args.get(key) {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => {
                missing = Some(key.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(key) => Err(ToolError::InvalidArguments(format!("{key} is required"))),
        None => Ok(filled.into_owned()),
    }
}

// ---------------------------------------------------------------------------
// Product search by vendor code
// ---------------------------------------------------------------------------

struct SearchProductsTool {
    description: String,
    target: Target,
    client: Arc<dyn MarketplaceApi>,
}

#[derive(Debug, Serialize)]
struct VendorCodeMatch {
    vendor_code: String,
    #[serde(rename = "nmID")]
    nm_id: Option<u64>,
    title: String,
    brand: String,
    status: &'static str,
}

impl SearchProductsTool {
    const DESCRIPTION: &'static str = "Finds the seller's products by vendor code (supplier article) and returns their nmIDs. Only sees cards owned by the API key's seller.";
}

#[async_trait]
impl Tool for SearchProductsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "search_wb_products",
            &self.description,
            json!({
                "type": "object",
                "properties": {
                    "vendor_codes": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Vendor codes to look up"
                    }
                },
                "required": ["vendor_codes"]
            }),
        )
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            vendor_codes: Vec<String>,
        }
        let args: Args = parse_args(args_json)?;
        if args.vendor_codes.is_empty() {
            return Err(ToolError::InvalidArguments("vendor_codes cannot be empty".into()));
        }
        if self.client.is_demo() {
            return demo_response("search_wb_products");
        }

        let mut results = Vec::with_capacity(args.vendor_codes.len());
        for code in &args.vendor_codes {
            let body = json!({
                "settings": {
                    "cursor": {"limit": 100},
                    "filter": {"textSearch": code, "withPhoto": -1}
                }
            });
            let response = self
                .client
                .post(&self.target.base_url, &self.target.path, &body)
                .await?;
            results.push(match_vendor_code(code, &response));
        }
        to_output(&results)
    }
}

fn match_vendor_code(code: &str, response: &Value) -> VendorCodeMatch {
    let card = response
        .get("cards")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|card| {
            card.get("vendorCode")
                .and_then(Value::as_str)
                .is_some_and(|v| v.eq_ignore_ascii_case(code))
        });

    let text = |card: &Value, key: &str| {
        card.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match card {
        Some(card) => VendorCodeMatch {
            vendor_code: code.to_string(),
            nm_id: card.get("nmID").and_then(Value::as_u64),
            title: text(card, "title"),
            brand: text(card, "brand"),
            status: "found",
        },
        None => VendorCodeMatch {
            vendor_code: code.to_string(),
            nm_id: None,
            title: String::new(),
            brand: String::new(),
            status: "not_found",
        },
    }
}

// ---------------------------------------------------------------------------
// Ping
// ---------------------------------------------------------------------------

struct PingTool {
    description: String,
    base_url: String,
    client: Arc<dyn MarketplaceApi>,
}

#[async_trait]
impl Tool for PingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("ping_wb_api", &self.description, crate::tools::empty_parameters())
    }

    async fn execute(&self, _args_json: &str) -> Result<String, ToolError> {
        if self.client.is_demo() {
            return to_output(&json!({
                "available": false,
                "demo": true,
                "message": "Wildberries API key is not configured",
            }));
        }
        // Reachability problems are the answer, not a tool failure.
        let report = match self.client.ping(&self.base_url).await {
            Ok(resp) => json!({"available": true, "status": resp.status, "ts": resp.ts}),
            Err(e) => json!({
                "available": false,
                "error": e.to_string(),
                "auth_error": e.is_auth_failure(),
            }),
        };
        to_output(&report)
    }
}

// ---------------------------------------------------------------------------
// Dictionary reload
// ---------------------------------------------------------------------------

struct ReloadDictionariesTool {
    description: String,
    base_url: String,
    client: Arc<dyn MarketplaceApi>,
    state: Weak<CoreState>,
}

#[async_trait]
impl Tool for ReloadDictionariesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "reload_wb_dictionaries",
            &self.description,
            crate::tools::empty_parameters(),
        )
    }

    async fn execute(&self, _args_json: &str) -> Result<String, ToolError> {
        let state = self
            .state
            .upgrade()
            .ok_or_else(|| ToolError::Failed("session state is no longer available".into()))?;
        let dicts = self.client.load_dictionaries(&self.base_url).await?;
        let summary = json!({
            "reloaded": true,
            "colors": dicts.colors.len(),
            "genders": dicts.genders.len(),
            "countries": dicts.countries.len(),
            "seasons": dicts.seasons.len(),
            "vat_rates": dicts.vats.len(),
        });
        state.set_dictionaries(Some(dicts));
        log::info!("dictionaries reloaded");
        to_output(&summary)
    }
}

// ---------------------------------------------------------------------------
// Top-10 organic positions
// ---------------------------------------------------------------------------

struct TopOrganicPositionsTool {
    description: String,
    queries: EndpointTool,
}

const ORGANIC_TOP: f64 = 10.0;

#[async_trait]
impl Tool for TopOrganicPositionsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "get_wb_top_organic_positions",
            &self.description,
            (endpoints::TOP_SEARCH_QUERIES.parameters)(),
        )
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        let args: Value = parse_args(args_json)?;
        if self.queries.client.is_demo() {
            return demo_response("get_wb_top_organic_positions");
        }
        let response = self.queries.call(&args).await?;
        to_output(&top_positions(&response))
    }
}

fn top_positions(response: &Value) -> Vec<Value> {
    let items: Vec<&Value> = response
        .pointer("/data/items")
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
        .unwrap_or_default();

    let mut ranked = Vec::new();
    for item in &items {
        let top: Vec<Value> = item
            .get("queries")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|q| {
                q.get("position")
                    .and_then(Value::as_f64)
                    .is_some_and(|p| p <= ORGANIC_TOP)
            })
            .map(|q| {
                json!({
                    "query": q.get("text").cloned().unwrap_or(Value::Null),
                    "position": q.get("position").and_then(Value::as_f64).map(|p| p as i64),
                    "orders": q.get("orders").cloned().unwrap_or(json!(0)),
                    "views": q.get("views").cloned().unwrap_or(json!(0)),
                })
            })
            .collect();
        if !top.is_empty() {
            ranked.push(json!({"nmID": item.get("nmId"), "topPositions": top}));
        }
    }

    if ranked.is_empty() {
        return items
            .iter()
            .map(|item| {
                json!({
                    "nmID": item.get("nmId"),
                    "topPositions": [],
                    "message": "The product is not in the organic top 10 for any analysed query",
                })
            })
            .collect();
    }
    ranked
}

// ---------------------------------------------------------------------------
// Attribution summary
// ---------------------------------------------------------------------------

struct AttributionSummaryTool {
    description: String,
    funnel: EndpointTool,
    campaigns: EndpointTool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CampaignTotals {
    advert_id: u64,
    views: i64,
    orders: i64,
    sum: f64,
}

#[async_trait]
impl Tool for AttributionSummaryTool {
    fn definition(&self) -> ToolDefinition {
        let mut params = (endpoints::PRODUCT_FUNNEL.parameters)();
        params["properties"]["advertIds"] = json!({
            "type": "array",
            "items": {"type": "integer"},
            "description": "Campaign IDs to attribute",
        });
        params["properties"]["days"]["description"] = json!("Number of days to analyse (1-90)");
        params["required"] = json!(["nmIDs", "advertIds", "days"]);
        ToolDefinition::new("get_wb_attribution_summary", &self.description, params)
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        let args: Value = parse_args(args_json)?;
        let products = ProductsArgs::decode(&args, 90)?;
        let advert_ids = args.get("advertIds").cloned().unwrap_or(json!([]));
        if advert_ids.as_array().map_or(true, Vec::is_empty) {
            return Err(ToolError::InvalidArguments("advertIds cannot be empty".into()));
        }
        if self.funnel.client.is_demo() {
            return demo_response("get_wb_attribution_summary");
        }

        let funnel = self
            .funnel
            .call(&json!({"nmIDs": products.nm_ids, "days": products.days}))
            .await?;

        // Campaign data is optional: without it everything counts as organic.
        let campaigns: Vec<CampaignTotals> = match self
            .campaigns
            .call(&json!({"advertIds": advert_ids, "days": products.days}))
            .await
        {
            Ok(body) => serde_json::from_value(body).unwrap_or_default(),
            Err(e) => {
                log::warn!("campaign stats unavailable for attribution: {e}");
                Vec::new()
            }
        };

        to_output(&attribute(&funnel, &campaigns, products.days))
    }
}

fn attribute(funnel: &Value, campaigns: &[CampaignTotals], days: i64) -> Vec<Value> {
    let ad_views: i64 = campaigns.iter().map(|c| c.views).sum();
    let ad_orders: i64 = campaigns.iter().map(|c| c.orders).sum();

    let mut orders_by_campaign: HashMap<u64, i64> = HashMap::new();
    for c in campaigns {
        *orders_by_campaign.entry(c.advert_id).or_default() += c.orders;
    }
    let by_campaign: Vec<Value> = campaigns
        .iter()
        .map(|c| {
            json!({
                "advertId": c.advert_id,
                "orders": orders_by_campaign.get(&c.advert_id).copied().unwrap_or_default(),
                "spent": c.sum,
            })
        })
        .collect();

    let (begin, end) = endpoints::period(days);
    let products = funnel
        .pointer("/data/products")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    products
        .iter()
        .map(|p| {
            let stat = |key: &str| {
                p.pointer(&format!("/statistic/selected/{key}"))
                    .and_then(Value::as_i64)
                    .unwrap_or_default()
            };
            let views = stat("openCount");
            let orders = stat("orderCount");
            json!({
                "nmID": p.pointer("/product/nmId"),
                "period": {"begin": begin, "end": end},
                "summary": {
                    "totalViews": views,
                    "organicViews": (views - ad_views).max(0),
                    "adViews": ad_views,
                    "totalOrders": orders,
                    "organicOrders": (orders - ad_orders).max(0),
                    "adOrders": ad_orders,
                },
                "byCampaign": by_campaign,
            })
        })
        .collect()
}
