//! Static table of single-request marketplace endpoints.
//!
//! Each [`Endpoint`] pairs a JSON schema with a function turning the model's
//! arguments into one GET or POST call. Path segments written as `{key}` are
//! filled from the arguments of the same name.

use chrono::{Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::ToolError;

pub const CONTENT_API: &str = "https://content-api.wildberries.ru";
pub const PRICES_API: &str = "https://discounts-prices-api.wildberries.ru";
pub const FEEDBACKS_API: &str = "https://feedbacks-api.wildberries.ru";
pub const ANALYTICS_API: &str = "https://seller-analytics-api.wildberries.ru";
pub const ADVERT_API: &str = "https://advert-api.wildberries.ru";

const MAX_NM_IDS: usize = 100;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Per-tool numbers taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub default_take: u32,
    pub brands_limit: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            default_take: 100,
            brands_limit: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get(Vec<(String, String)>),
    Post(Value),
}

#[derive(Debug)]
pub struct Endpoint {
    pub name: &'static str,
    pub description: &'static str,
    pub host: &'static str,
    pub path: &'static str,
    pub parameters: fn() -> Value,
    pub request: fn(&Value, &Limits) -> Result<Call, ToolError>,
}

// ---------------------------------------------------------------------------
// Content API
// ---------------------------------------------------------------------------

pub static SELLER_PRODUCTS: Endpoint = Endpoint {
    name: "list_wb_seller_products",
    description: "Lists the seller's own products with prices (nmID, vendor code, brand, subject). Supports paging and filtering by subject or brand.",
    host: PRICES_API,
    path: "/api/v2/list/goods/filter",
    parameters: || {
        schema(
            json!({
                "limit": {"type": "integer", "description": "Page size (default 100, max 1000)"},
                "offset": {"type": "integer", "description": "Number of products to skip"},
                "filter_subject_id": {"type": "integer", "description": "Only products of this subject"},
                "filter_brand": {"type": "string", "description": "Only products of this brand"}
            }),
            &[],
        )
    },
    request: |args, _| {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            limit: u32,
            #[serde(default)]
            offset: u32,
            filter_subject_id: Option<u64>,
            filter_brand: Option<String>,
        }
        let a: Args = decode(args)?;
        let mut query = vec![
            pair("limit", clamp_default(a.limit, 100, 1000)),
            pair("offset", a.offset),
        ];
        if let Some(subject) = a.filter_subject_id {
            query.push(pair("filter.subjectID", subject));
        }
        if let Some(brand) = a.filter_brand.filter(|b| !b.is_empty()) {
            query.push(pair("filter.brand", brand));
        }
        Ok(Call::Get(query))
    },
};

pub static PARENT_CATEGORIES: Endpoint = Endpoint {
    name: "get_wb_parent_categories",
    description: "Returns the top-level Wildberries product categories with their IDs.",
    host: CONTENT_API,
    path: "/content/v2/object/parent/all",
    parameters: crate::tools::empty_parameters,
    request: |_, _| Ok(Call::Get(Vec::new())),
};

pub static SUBJECTS: Endpoint = Endpoint {
    name: "get_wb_subjects",
    description: "Returns Wildberries subjects (sub-categories), optionally limited to one parent category.",
    host: CONTENT_API,
    path: "/content/v2/object/all",
    parameters: || {
        schema(
            json!({
                "parentID": {"type": "integer", "description": "Parent category ID from get_wb_parent_categories"},
                "limit": {"type": "integer", "description": "Page size (default 1000)"},
                "offset": {"type": "integer", "description": "Number of subjects to skip"}
            }),
            &[],
        )
    },
    request: |args, _| {
        #[derive(Deserialize)]
        struct Args {
            #[serde(rename = "parentID")]
            parent_id: Option<u64>,
            #[serde(default)]
            limit: u32,
            #[serde(default)]
            offset: u32,
        }
        let a: Args = decode(args)?;
        let mut query = vec![
            pair("limit", clamp_default(a.limit, 1000, 1000)),
            pair("offset", a.offset),
        ];
        if let Some(parent) = a.parent_id.filter(|p| *p > 0) {
            query.push(pair("parentID", parent));
        }
        Ok(Call::Get(query))
    },
};

pub static SUBJECTS_BY_NAME: Endpoint = Endpoint {
    name: "get_wb_subjects_by_name",
    description: "Finds Wildberries subjects whose name contains the given text (case-insensitive). Returns subject IDs with their parent categories.",
    host: CONTENT_API,
    path: "/content/v2/object/all",
    parameters: || {
        schema(
            json!({
                "name": {"type": "string", "description": "Substring to search for, e.g. 'dress'"},
                "limit": {"type": "integer", "description": "Maximum results (default 50, max 1000)"}
            }),
            &["name"],
        )
    },
    request: |args, _| {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            name: String,
            #[serde(default)]
            limit: u32,
        }
        let a: Args = decode(args)?;
        if a.name.trim().is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        Ok(Call::Get(vec![
            pair("name", a.name.trim()),
            pair("limit", clamp_default(a.limit, 50, 1000)),
        ]))
    },
};

pub static CHARACTERISTICS: Endpoint = Endpoint {
    name: "get_wb_characteristics",
    description: "Returns the characteristics of a subject: which are required, their types and units.",
    host: CONTENT_API,
    path: "/content/v2/object/charcs/{subjectID}",
    parameters: || subject_schema(json!({})),
    request: |_, _| Ok(Call::Get(Vec::new())),
};

pub static TNVED: Endpoint = Endpoint {
    name: "get_wb_tnved",
    description: "Returns customs (TNVED) codes allowed for a subject, optionally filtered by a code prefix.",
    host: CONTENT_API,
    path: "/content/v2/directory/tnved",
    parameters: || {
        subject_schema(json!({
            "search": {"type": "string", "description": "Code prefix to filter by"}
        }))
    },
    request: |args, _| {
        #[derive(Deserialize)]
        struct Args {
            #[serde(rename = "subjectID")]
            subject_id: u64,
            search: Option<String>,
        }
        let a: Args = decode(args)?;
        let mut query = vec![pair("subjectID", a.subject_id)];
        if let Some(search) = a.search.filter(|s| !s.is_empty()) {
            query.push(pair("search", search));
        }
        Ok(Call::Get(query))
    },
};

pub static BRANDS: Endpoint = Endpoint {
    name: "get_wb_brands",
    description: "Returns brands used for a subject, most popular first.",
    host: CONTENT_API,
    path: "/api/content/v1/brands",
    parameters: || subject_schema(json!({})),
    request: |args, limits| {
        #[derive(Deserialize)]
        struct Args {
            #[serde(rename = "subjectID")]
            subject_id: u64,
        }
        let a: Args = decode(args)?;
        Ok(Call::Get(vec![
            pair("subjectId", a.subject_id),
            pair("top", limits.brands_limit),
        ]))
    },
};

// ---------------------------------------------------------------------------
// Feedbacks API
// ---------------------------------------------------------------------------

pub static FEEDBACKS: Endpoint = Endpoint {
    name: "get_wb_feedbacks",
    description: "Returns customer feedbacks, answered or not, optionally for one product (nmId).",
    host: FEEDBACKS_API,
    path: "/api/v1/feedbacks",
    parameters: || listing_schema("feedbacks", 5000),
    request: |args, limits| listing_query(args, limits, 5000),
};

pub static QUESTIONS: Endpoint = Endpoint {
    name: "get_wb_questions",
    description: "Returns customer questions, answered or not, optionally for one product (nmId).",
    host: FEEDBACKS_API,
    path: "/api/v1/questions",
    parameters: || listing_schema("questions", 10000),
    request: |args, limits| listing_query(args, limits, 10000),
};

pub static NEW_FEEDBACKS_QUESTIONS: Endpoint = Endpoint {
    name: "get_wb_new_feedbacks_questions",
    description: "Reports whether there are unseen feedbacks or questions.",
    host: FEEDBACKS_API,
    path: "/api/v1/new-feedbacks-questions",
    parameters: crate::tools::empty_parameters,
    request: |_, _| Ok(Call::Get(Vec::new())),
};

pub static UNANSWERED_FEEDBACKS: Endpoint = Endpoint {
    name: "get_wb_unanswered_feedbacks_counts",
    description: "Returns the number of unanswered feedbacks, total and for today, and the average rating.",
    host: FEEDBACKS_API,
    path: "/api/v1/feedbacks/count-unanswered",
    parameters: crate::tools::empty_parameters,
    request: |_, _| Ok(Call::Get(Vec::new())),
};

pub static UNANSWERED_QUESTIONS: Endpoint = Endpoint {
    name: "get_wb_unanswered_questions_counts",
    description: "Returns the number of unanswered questions, total and for today.",
    host: FEEDBACKS_API,
    path: "/api/v1/questions/count-unanswered",
    parameters: crate::tools::empty_parameters,
    request: |_, _| Ok(Call::Get(Vec::new())),
};

// ---------------------------------------------------------------------------
// Analytics API
// ---------------------------------------------------------------------------

pub static PRODUCT_FUNNEL: Endpoint = Endpoint {
    name: "get_wb_product_funnel",
    description: "Sales funnel for products over the last N days: card views, add-to-cart, orders, buyouts and conversions.",
    host: ANALYTICS_API,
    path: "/api/analytics/v3/sales-funnel/products",
    parameters: || products_schema(365),
    request: |args, _| {
        let a = ProductsArgs::decode(args, 365)?;
        let (start, end) = period(a.days);
        Ok(Call::Post(json!({
            "nmIds": a.nm_ids,
            "selectedPeriod": {"start": start, "end": end},
        })))
    },
};

pub static PRODUCT_FUNNEL_HISTORY: Endpoint = Endpoint {
    name: "get_wb_product_funnel_history",
    description: "Day-by-day sales funnel history for products over the last N days.",
    host: ANALYTICS_API,
    path: "/api/analytics/v3/sales-funnel/products/history",
    parameters: || products_schema(365),
    request: |args, _| {
        let a = ProductsArgs::decode(args, 365)?;
        let (start, end) = period(a.days);
        Ok(Call::Post(json!({
            "nmIds": a.nm_ids,
            "selectedPeriod": {"start": start, "end": end},
            "aggregationLevel": "day",
        })))
    },
};

pub static SEARCH_POSITIONS: Endpoint = Endpoint {
    name: "get_wb_search_positions",
    description: "Average search positions and search-driven traffic for products, compared with the preceding period of equal length.",
    host: ANALYTICS_API,
    path: "/api/v2/search-report/report",
    parameters: || products_schema(30),
    request: |args, _| {
        let a = ProductsArgs::decode(args, 30)?;
        let (start, end) = period(a.days);
        let (past_start, past_end) = period_before(a.days);
        Ok(Call::Post(json!({
            "nmIds": a.nm_ids,
            "currentPeriod": {"start": start, "end": end},
            "pastPeriod": {"start": past_start, "end": past_end},
            "orderBy": {"field": "orders", "mode": "desc"},
            "positionCluster": "all",
            "limit": MAX_NM_IDS,
            "offset": 0,
        })))
    },
};

pub static TOP_SEARCH_QUERIES: Endpoint = Endpoint {
    name: "get_wb_top_search_queries",
    description: "Top search queries that led buyers to the products, with views, orders and average position.",
    host: ANALYTICS_API,
    path: "/api/v2/search-report/product/search-texts",
    parameters: || {
        let mut params = products_schema(30);
        params["properties"]["limit"] =
            json!({"type": "integer", "description": "Queries per product (default 30, max 100)"});
        params
    },
    request: |args, _| {
        let a = ProductsArgs::decode(args, 30)?;
        let (start, end) = period(a.days);
        Ok(Call::Post(json!({
            "nmIds": a.nm_ids,
            "currentPeriod": {"start": start, "end": end},
            "topOrderBy": "orders",
            "limit": clamp_default(a.limit, 30, 100),
        })))
    },
};

// ---------------------------------------------------------------------------
// Advert API
// ---------------------------------------------------------------------------

pub static CAMPAIGN_STATS: Endpoint = Endpoint {
    name: "get_wb_campaign_stats",
    description: "Advertising campaign statistics over the last N days: views, clicks, CTR, CPC, spend and orders.",
    host: ADVERT_API,
    path: "/adv/v2/fullstats",
    parameters: || {
        schema(
            json!({
                "advertIds": {"type": "array", "items": {"type": "integer"}, "description": "Campaign IDs"},
                "days": {"type": "integer", "description": "Number of days to analyse (1-90)"}
            }),
            &["advertIds", "days"],
        )
    },
    request: |args, _| {
        #[derive(Deserialize)]
        struct Args {
            #[serde(rename = "advertIds", default)]
            advert_ids: Vec<u64>,
            #[serde(default)]
            days: i64,
        }
        let a: Args = decode(args)?;
        if a.advert_ids.is_empty() {
            return Err(invalid("advertIds cannot be empty"));
        }
        check_days(a.days, 90)?;
        let (begin, end) = period(a.days);
        let body: Vec<Value> = a
            .advert_ids
            .iter()
            .map(|id| json!({"id": id, "interval": {"begin": begin, "end": end}}))
            .collect();
        Ok(Call::Post(Value::Array(body)))
    },
};

pub static KEYWORD_STATS: Endpoint = Endpoint {
    name: "get_wb_keyword_stats",
    description: "Per-keyword statistics of one advertising campaign for the last N days (the API allows at most 7).",
    host: ADVERT_API,
    path: "/adv/v0/stats/keywords",
    parameters: || {
        schema(
            json!({
                "advertId": {"type": "integer", "description": "Campaign ID"},
                "days": {"type": "integer", "description": "Number of days to analyse (1-7)"}
            }),
            &["advertId", "days"],
        )
    },
    request: |args, _| {
        #[derive(Deserialize)]
        struct Args {
            #[serde(rename = "advertId", default)]
            advert_id: u64,
            #[serde(default)]
            days: i64,
        }
        let a: Args = decode(args)?;
        if a.advert_id == 0 {
            return Err(invalid("advertId must be positive"));
        }
        check_days(a.days, 7)?;
        let (from, to) = period(a.days);
        Ok(Call::Get(vec![
            pair("advert_id", a.advert_id),
            pair("from", from),
            pair("to", to),
        ]))
    },
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `nmIDs` + `days` arguments shared by the analytics endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct ProductsArgs {
    #[serde(rename = "nmIDs", default)]
    pub nm_ids: Vec<u64>,
    #[serde(default)]
    pub days: i64,
    #[serde(default)]
    pub limit: u32,
}

impl ProductsArgs {
    pub fn decode(args: &Value, max_days: i64) -> Result<Self, ToolError> {
        let a: Self = decode(args)?;
        if a.nm_ids.is_empty() {
            return Err(invalid("nmIDs cannot be empty"));
        }
        if a.nm_ids.len() > MAX_NM_IDS {
            return Err(invalid(&format!("nmIDs cannot exceed {MAX_NM_IDS} items")));
        }
        check_days(a.days, max_days)?;
        Ok(a)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    T::deserialize(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

pub(crate) fn invalid(msg: &str) -> ToolError {
    ToolError::InvalidArguments(msg.to_string())
}

pub(crate) fn check_days(days: i64, max: i64) -> Result<(), ToolError> {
    if !(1..=max).contains(&days) {
        return Err(invalid(&format!("days must be between 1 and {max}")));
    }
    Ok(())
}

fn pair(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

fn clamp_default(value: u32, default: u32, max: u32) -> u32 {
    match value {
        0 => default,
        v => v.min(max),
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// The last `days` days ending today, as `(start, end)`.
pub(crate) fn period(days: i64) -> (String, String) {
    let today = Utc::now().date_naive();
    (format_date(today - Duration::days(days)), format_date(today))
}

/// The `days`-long period immediately preceding [`period`].
fn period_before(days: i64) -> (String, String) {
    let today = Utc::now().date_naive();
    let end = today - Duration::days(days + 1);
    (format_date(end - Duration::days(days)), format_date(end))
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn subject_schema(mut extra: Value) -> Value {
    extra["subjectID"] = json!({
        "type": "integer",
        "description": "Subject ID from get_wb_subjects or get_wb_subjects_by_name",
    });
    schema(extra, &["subjectID"])
}

fn products_schema(max_days: i64) -> Value {
    schema(
        json!({
            "nmIDs": {"type": "array", "items": {"type": "integer"}, "description": "Product nmIDs (max 100)"},
            "days": {"type": "integer", "description": format!("Number of days to analyse (1-{max_days})")}
        }),
        &["nmIDs", "days"],
    )
}

fn listing_schema(what: &str, max_take: u32) -> Value {
    schema(
        json!({
            "isAnswered": {"type": "boolean", "description": format!("true for answered {what}, false for unanswered")},
            "take": {"type": "integer", "description": format!("How many {what} to return (max {max_take})")},
            "skip": {"type": "integer", "description": "How many to skip"},
            "nmId": {"type": "integer", "description": "Only for this product"},
            "order": {"type": "string", "enum": ["dateAsc", "dateDesc"], "description": "Sort by date"}
        }),
        &["isAnswered"],
    )
}

fn listing_query(args: &Value, limits: &Limits, max_take: u32) -> Result<Call, ToolError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        #[serde(default)]
        is_answered: bool,
        #[serde(default)]
        take: u32,
        #[serde(default)]
        skip: u32,
        #[serde(default)]
        nm_id: u64,
        #[serde(default)]
        order: String,
    }
    let a: Args = decode(args)?;
    if a.take > max_take {
        return Err(invalid(&format!("take cannot exceed {max_take}")));
    }
    let take = if a.take == 0 { limits.default_take } else { a.take };

    let mut query = vec![
        pair("isAnswered", a.is_answered),
        pair("take", take),
        pair("skip", a.skip),
    ];
    if a.nm_id > 0 {
        query.push(pair("nmId", a.nm_id));
    }
    if !a.order.is_empty() {
        query.push(pair("order", a.order));
    }
    Ok(Call::Get(query))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(call: Call) -> Vec<(String, String)> {
        match call {
            Call::Get(q) => q,
            Call::Post(_) => panic!("expected GET"),
        }
    }

    #[test]
    fn test_feedbacks_query_uses_default_take() {
        let limits = Limits {
            default_take: 30,
            ..Default::default()
        };
        let q = get((FEEDBACKS.request)(&json!({"isAnswered": false, "nmId": 12}), &limits).unwrap());
        assert_eq!(
            q,
            vec![
                pair("isAnswered", false),
                pair("take", 30),
                pair("skip", 0),
                pair("nmId", 12),
            ]
        );
        assert!((QUESTIONS.request)(&json!({"take": 20000}), &limits).is_err());
    }

    #[test]
    fn test_funnel_validation() {
        let limits = Limits::default();
        assert!((PRODUCT_FUNNEL.request)(&json!({"nmIDs": [], "days": 7}), &limits).is_err());
        assert!((PRODUCT_FUNNEL.request)(&json!({"nmIDs": [1], "days": 0}), &limits).is_err());
        assert!((SEARCH_POSITIONS.request)(&json!({"nmIDs": [1], "days": 31}), &limits).is_err());

        let Call::Post(body) =
            (PRODUCT_FUNNEL.request)(&json!({"nmIDs": [1, 2], "days": 7}), &limits).unwrap()
        else {
            panic!("expected POST");
        };
        assert_eq!(body["nmIds"], json!([1, 2]));
        assert_eq!(body["selectedPeriod"]["end"].as_str().unwrap().len(), 10);
    }

    #[test]
    fn test_campaign_stats_body_is_per_campaign() {
        let Call::Post(body) = (CAMPAIGN_STATS.request)(
            &json!({"advertIds": [7, 8], "days": 3}),
            &Limits::default(),
        )
        .unwrap() else {
            panic!("expected POST");
        };
        assert_eq!(body[1]["id"], 8);
        assert!(body[0]["interval"]["begin"].is_string());
        assert!((KEYWORD_STATS.request)(&json!({"advertId": 7, "days": 8}), &Limits::default()).is_err());
    }

    #[test]
    fn test_brands_use_configured_limit() {
        let limits = Limits {
            brands_limit: 50,
            ..Default::default()
        };
        let q = get((BRANDS.request)(&json!({"subjectID": 105}), &limits).unwrap());
        assert_eq!(q, vec![pair("subjectId", 105), pair("top", 50)]);
    }

    #[test]
    fn test_period_before_does_not_overlap() {
        let (start, _) = period(7);
        let (_, past_end) = period_before(7);
        assert!(past_end < start);
    }

    #[test]
    fn test_schemas_are_objects() {
        for ep in [&SELLER_PRODUCTS, &SUBJECTS, &TNVED, &FEEDBACKS, &TOP_SEARCH_QUERIES, &KEYWORD_STATS] {
            let params = (ep.parameters)();
            assert_eq!(params["type"], "object", "{}", ep.name);
        }
        assert_eq!((TOP_SEARCH_QUERIES.parameters)()["properties"]["limit"]["type"], "integer");
    }
}
