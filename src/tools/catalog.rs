//! The 14 SEO tool definitions.
//!
//! Each tool maps to exactly one upstream endpoint and one request shape:
//! parameterless reads are GETs, keyword volume posts URL-encoded form data
//! (the upstream's legacy endpoint), everything else posts a JSON body.

use serde_json::{json, Value};

use crate::upstream::Payload;

use super::ToolDef;

const DEFAULT_RESULT_COUNT: u64 = 10;

pub(super) fn catalog() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "get_credits",
            description: "Get the number of API credits remaining on the account.",
            endpoint: "credits",
            schema: json!({ "type": "object", "properties": {} }),
            build: |_| Ok(Payload::None),
        },
        ToolDef {
            name: "get_countries",
            description: "List the country codes supported for keyword volume lookups.",
            endpoint: "countries",
            schema: json!({ "type": "object", "properties": {} }),
            build: |_| Ok(Payload::None),
        },
        ToolDef {
            name: "get_currencies",
            description: "List the currency codes supported for CPC data.",
            endpoint: "currencies",
            schema: json!({ "type": "object", "properties": {} }),
            build: |_| Ok(Payload::None),
        },
        ToolDef {
            name: "get_keyword_volume",
            description: "Get search volume, CPC and competition for up to 100 keywords.",
            endpoint: "get_keyword_data",
            schema: json!({
                "type": "object",
                "properties": {
                    "keywords": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Keywords to look up (max 100)"
                    },
                    "country": {
                        "type": "string",
                        "description": "Two-letter country code; empty for global volume"
                    },
                    "currency": {
                        "type": "string",
                        "description": "Currency code for CPC values (default 'usd')"
                    },
                    "data_source": {
                        "type": "string",
                        "description": "'gkp' for Google Keyword Planner data, 'cli' for clickstream (default 'gkp')"
                    }
                },
                "required": ["keywords"]
            }),
            build: build_keyword_volume,
        },
        ToolDef {
            name: "get_related_keywords",
            description: "Get keywords related to a seed keyword, with volume data.",
            endpoint: "get_related_keywords",
            schema: keyword_seed_schema("Seed keyword to find related terms for"),
            build: |args| build_keyword_seed(args),
        },
        ToolDef {
            name: "get_pasf_keywords",
            description: "Get 'People Also Search For' keywords for a seed keyword.",
            endpoint: "get_pasf_keywords",
            schema: keyword_seed_schema("Seed keyword to find PASF terms for"),
            build: |args| build_keyword_seed(args),
        },
        ToolDef {
            name: "get_domain_keywords",
            description: "Get the keywords a domain ranks for in organic search.",
            endpoint: "get_domain_keywords",
            schema: target_schema("domain", "Domain to inspect, e.g. 'example.com'", true),
            build: |args| build_target("domain", args, true),
        },
        ToolDef {
            name: "get_url_keywords",
            description: "Get the keywords a specific URL ranks for in organic search.",
            endpoint: "get_url_keywords",
            schema: target_schema("url", "Full page URL to inspect", true),
            build: |args| build_target("url", args, true),
        },
        ToolDef {
            name: "get_domain_traffic",
            description: "Estimate monthly organic traffic for a domain.",
            endpoint: "get_domain_traffic",
            schema: target_schema("domain", "Domain to estimate traffic for", false),
            build: |args| build_target("domain", args, false),
        },
        ToolDef {
            name: "get_url_traffic",
            description: "Estimate monthly organic traffic for a specific URL.",
            endpoint: "get_url_traffic",
            schema: target_schema("url", "Full page URL to estimate traffic for", false),
            build: |args| build_target("url", args, false),
        },
        ToolDef {
            name: "get_domain_backlinks",
            description: "Get backlinks pointing at a domain.",
            endpoint: "get_domain_backlinks",
            schema: target_schema("domain", "Domain to list backlinks for", true),
            build: |args| build_target("domain", args, true),
        },
        ToolDef {
            name: "get_url_backlinks",
            description: "Get backlinks pointing at a specific URL.",
            endpoint: "get_url_backlinks",
            schema: target_schema("url", "Full page URL to list backlinks for", true),
            build: |args| build_target("url", args, true),
        },
        ToolDef {
            name: "get_domain_referrers",
            description: "Get the unique referring domains linking to a domain.",
            endpoint: "get_domain_referrers",
            schema: target_schema("domain", "Domain to list referrers for", true),
            build: |args| build_target("domain", args, true),
        },
        ToolDef {
            name: "get_url_referrers",
            description: "Get the unique referring domains linking to a specific URL.",
            endpoint: "get_url_referrers",
            schema: target_schema("url", "Full page URL to list referrers for", true),
            build: |args| build_target("url", args, true),
        },
    ]
}

// ── Schema helpers ──────────────────────────────────────────────────────────

fn keyword_seed_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "keyword": { "type": "string", "description": description },
            "num": {
                "type": "integer",
                "description": "Number of results to return (default 10)"
            }
        },
        "required": ["keyword"]
    })
}

fn target_schema(key: &str, description: &str, with_num: bool) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        key.to_string(),
        json!({ "type": "string", "description": description }),
    );
    if with_num {
        properties.insert(
            "num".to_string(),
            json!({
                "type": "integer",
                "description": "Number of results to return (default 10)"
            }),
        );
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": [key]
    })
}

// ── Argument extraction ─────────────────────────────────────────────────────

fn req_str(args: &Value, key: &str) -> Result<String, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("missing required parameter '{}'", key))
}

fn opt_str(args: &Value, key: &str, default: &str) -> String {
    args.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

fn opt_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}

// ── Payload builders ────────────────────────────────────────────────────────

fn build_keyword_volume(args: &Value) -> Result<Payload, String> {
    let keywords: Vec<String> = args
        .get("keywords")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|k| k.as_str())
                .map(str::to_string)
                .collect()
        })
        .ok_or("missing required parameter 'keywords' (array of strings)")?;
    if keywords.is_empty() {
        return Err("'keywords' must contain at least one keyword".to_string());
    }
    if keywords.len() > 100 {
        return Err("'keywords' accepts at most 100 keywords per call".to_string());
    }

    let mut pairs: Vec<(String, String)> = keywords
        .into_iter()
        .map(|kw| ("kw[]".to_string(), kw))
        .collect();
    pairs.push(("country".to_string(), opt_str(args, "country", "")));
    pairs.push(("currency".to_string(), opt_str(args, "currency", "usd")));
    pairs.push(("dataSource".to_string(), opt_str(args, "data_source", "gkp")));
    Ok(Payload::Form(pairs))
}

fn build_keyword_seed(args: &Value) -> Result<Payload, String> {
    let keyword = req_str(args, "keyword")?;
    Ok(Payload::Json(json!({
        "keyword": keyword,
        "num": opt_u64(args, "num", DEFAULT_RESULT_COUNT),
    })))
}

fn build_target(key: &str, args: &Value, with_num: bool) -> Result<Payload, String> {
    let target = req_str(args, key)?;
    let mut body = json!({ key: target });
    if with_num {
        body["num"] = json!(opt_u64(args, "num", DEFAULT_RESULT_COUNT));
    }
    Ok(Payload::Json(body))
}
